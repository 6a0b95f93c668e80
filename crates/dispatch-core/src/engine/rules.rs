//! Rule tables for the status transition engine.
//!
//! A [`RuleTable`] is the strict allow-list of status changes. It is built
//! once, checked for duplicate edges at construction, and never mutated.

use dispatch_config::{RuleConfig, RuleSetKind, TransitionsConfig};
use dispatch_types::{OrderStatus, Role, TransitionRule, UnknownRole, UnknownStatus};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a rule table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
	#[error("Duplicate transition rule from {from} to {to}")]
	DuplicateRule { from: OrderStatus, to: OrderStatus },
	#[error("Transition rule leads from {0} to itself")]
	SelfLoop(OrderStatus),
	#[error("Transition rule from {from} to {to} has an empty role list")]
	EmptyRoleSet { from: OrderStatus, to: OrderStatus },
	#[error(transparent)]
	UnknownStatus(#[from] UnknownStatus),
	#[error(transparent)]
	UnknownRole(#[from] UnknownRole),
}

/// Immutable allow-list of status transitions.
///
/// Holds at most one rule per ordered `(from, to)` pair. Rules keep the
/// order they were given in, which is the order listings report them in.
#[derive(Debug, Clone)]
pub struct RuleTable {
	rules: Vec<TransitionRule>,
	index: HashMap<(OrderStatus, OrderStatus), usize>,
}

static STANDARD: Lazy<Arc<RuleTable>> = Lazy::new(|| {
	Arc::new(RuleTable::new(standard_rules()).expect("built-in rule table has no duplicate edges"))
});

impl RuleTable {
	/// Builds a table, rejecting duplicate edges, self loops and empty role lists.
	pub fn new(rules: impl IntoIterator<Item = TransitionRule>) -> Result<Self, RuleTableError> {
		let rules: Vec<TransitionRule> = rules.into_iter().collect();
		let mut index = HashMap::with_capacity(rules.len());

		for (position, rule) in rules.iter().enumerate() {
			if rule.from == rule.to {
				return Err(RuleTableError::SelfLoop(rule.from));
			}
			if rule.allowed_roles.as_ref().is_some_and(Vec::is_empty) {
				return Err(RuleTableError::EmptyRoleSet {
					from: rule.from,
					to: rule.to,
				});
			}
			if index.insert((rule.from, rule.to), position).is_some() {
				return Err(RuleTableError::DuplicateRule {
					from: rule.from,
					to: rule.to,
				});
			}
		}

		Ok(Self { rules, index })
	}

	/// The built-in delivery workflow.
	pub fn standard() -> Arc<RuleTable> {
		Arc::clone(&STANDARD)
	}

	/// Builds the table selected by the `[transitions]` configuration section.
	pub fn from_config(config: &TransitionsConfig) -> Result<Arc<RuleTable>, RuleTableError> {
		match config.rule_set {
			RuleSetKind::Standard => Ok(Self::standard()),
			RuleSetKind::Custom => {
				let rules = config
					.rules
					.iter()
					.map(rule_from_config)
					.collect::<Result<Vec<_>, _>>()?;
				Ok(Arc::new(Self::new(rules)?))
			},
		}
	}

	/// Returns the rule for the exact ordered pair, if any.
	pub fn get(&self, from: OrderStatus, to: OrderStatus) -> Option<&TransitionRule> {
		self.index.get(&(from, to)).map(|&i| &self.rules[i])
	}

	/// All rules in table order.
	pub fn rules(&self) -> &[TransitionRule] {
		&self.rules
	}

	/// Rules leaving `from`, in table order.
	pub fn rules_from(&self, from: OrderStatus) -> impl Iterator<Item = &TransitionRule> {
		self.rules.iter().filter(move |rule| rule.from == from)
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}
}

fn rule_from_config(config: &RuleConfig) -> Result<TransitionRule, RuleTableError> {
	let from = OrderStatus::from_str(&config.from)?;
	let to = OrderStatus::from_str(&config.to)?;

	let allowed_roles = config
		.allowed_roles
		.as_ref()
		.map(|roles| {
			roles
				.iter()
				.map(|role| Role::from_str(role))
				.collect::<Result<Vec<_>, _>>()
		})
		.transpose()?;

	let confirmation_message = match (&config.confirmation_message, config.requires_confirmation) {
		(Some(message), _) => Some(message.clone()),
		(None, true) => Some(format!("Change the order status to {}?", to.label())),
		(None, false) => None,
	};

	Ok(TransitionRule {
		from,
		to,
		requires_driver: config.requires_driver,
		requires_confirmation: config.requires_confirmation,
		confirmation_message,
		allowed_roles,
	})
}

/// The delivery workflow used by every branch unless configured otherwise.
///
/// Edges are directed; a reverse edge exists only where listed.
pub fn standard_rules() -> Vec<TransitionRule> {
	use OrderStatus::*;
	const MANAGERS: &[Role] = &[Role::Admin, Role::Supervisor];

	vec![
		TransitionRule::new(Pending, AwaitingDriver).with_driver(),
		TransitionRule::new(AwaitingDriver, OutForDelivery)
			.with_driver()
			.with_confirmation("Confirm that the driver picked up the order and is out for delivery?")
			.restricted_to(&[Role::Admin, Role::Driver]),
		TransitionRule::new(Pending, OutForDelivery)
			.with_driver()
			.with_confirmation("Send this order out for delivery directly?"),
		TransitionRule::new(OutForDelivery, Delivered)
			.with_confirmation("Confirm that the order was delivered to the customer?"),
		TransitionRule::new(OutForDelivery, Returned)
			.with_confirmation("Mark this order as returned?"),
		TransitionRule::new(Pending, Postponed).with_confirmation("Postpone this order?"),
		TransitionRule::new(Delivered, CashReceivedAtBranch)
			.with_confirmation("Confirm that the cash for this order was received at the branch?")
			.restricted_to(MANAGERS),
		TransitionRule::new(CashReceivedAtBranch, MerchantSettled)
			.with_confirmation("Confirm that the merchant has been settled for this order?")
			.restricted_to(MANAGERS),
		TransitionRule::new(OutForDelivery, AwaitingDriver)
			.with_confirmation("Take this order off the road and back to awaiting driver?")
			.restricted_to(MANAGERS),
		TransitionRule::new(OutForDelivery, Pending)
			.with_confirmation("Cancel the delivery and return this order to pending?")
			.restricted_to(MANAGERS),
		TransitionRule::new(AwaitingDriver, Pending).restricted_to(MANAGERS),
		TransitionRule::new(Postponed, Pending),
		TransitionRule::new(Postponed, AwaitingDriver).with_driver(),
		TransitionRule::new(Postponed, OutForDelivery)
			.with_driver()
			.with_confirmation("Send this postponed order out for delivery?"),
		TransitionRule::new(Returned, Pending)
			.with_confirmation("Reopen this returned order as pending?")
			.restricted_to(MANAGERS),
		TransitionRule::new(Returned, AwaitingDriver)
			.with_driver()
			.with_confirmation("Hand this returned order to a driver again?")
			.restricted_to(MANAGERS),
		TransitionRule::new(Delivered, OutForDelivery)
			.with_confirmation("Undo the delivery and mark this order as out for delivery again?")
			.restricted_to(MANAGERS),
		TransitionRule::new(CashReceivedAtBranch, Delivered)
			.with_confirmation("Undo the cash receipt and mark this order as delivered?")
			.restricted_to(MANAGERS),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use OrderStatus::*;

	#[test]
	fn test_standard_table_is_well_formed() {
		let table = RuleTable::new(standard_rules()).unwrap();
		assert_eq!(table.len(), 18);
		assert_eq!(RuleTable::standard().len(), 18);
	}

	#[test]
	fn test_standard_table_flags() {
		let table = RuleTable::standard();

		// (from, to, requires_driver, requires_confirmation, allowed_roles)
		let expected: &[(OrderStatus, OrderStatus, bool, bool, Option<&[Role]>)] = &[
			(Pending, AwaitingDriver, true, false, None),
			(AwaitingDriver, OutForDelivery, true, true, Some(&[Role::Admin, Role::Driver])),
			(Pending, OutForDelivery, true, true, None),
			(OutForDelivery, Delivered, false, true, None),
			(OutForDelivery, Returned, false, true, None),
			(Pending, Postponed, false, true, None),
			(Delivered, CashReceivedAtBranch, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(CashReceivedAtBranch, MerchantSettled, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(OutForDelivery, AwaitingDriver, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(OutForDelivery, Pending, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(AwaitingDriver, Pending, false, false, Some(&[Role::Admin, Role::Supervisor])),
			(Postponed, Pending, false, false, None),
			(Postponed, AwaitingDriver, true, false, None),
			(Postponed, OutForDelivery, true, true, None),
			(Returned, Pending, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(Returned, AwaitingDriver, true, true, Some(&[Role::Admin, Role::Supervisor])),
			(Delivered, OutForDelivery, false, true, Some(&[Role::Admin, Role::Supervisor])),
			(CashReceivedAtBranch, Delivered, false, true, Some(&[Role::Admin, Role::Supervisor])),
		];

		for (from, to, driver, confirmation, roles) in expected {
			let rule = table
				.get(*from, *to)
				.unwrap_or_else(|| panic!("missing rule {} -> {}", from, to));
			assert_eq!(rule.requires_driver, *driver, "{} -> {}", from, to);
			assert_eq!(rule.requires_confirmation, *confirmation, "{} -> {}", from, to);
			assert_eq!(rule.allowed_roles.as_deref(), *roles, "{} -> {}", from, to);
			assert_eq!(
				rule.confirmation_message.is_some(),
				*confirmation,
				"{} -> {}",
				from,
				to
			);
		}
	}

	#[test]
	fn test_duplicate_edge_rejected() {
		let result = RuleTable::new(vec![
			TransitionRule::new(Pending, Postponed),
			TransitionRule::new(Pending, Postponed).with_confirmation("again"),
		]);
		assert_eq!(
			result.unwrap_err(),
			RuleTableError::DuplicateRule {
				from: Pending,
				to: Postponed
			}
		);
	}

	#[test]
	fn test_reverse_edge_is_not_a_duplicate() {
		let table = RuleTable::new(vec![
			TransitionRule::new(Pending, Postponed),
			TransitionRule::new(Postponed, Pending),
		])
		.unwrap();
		assert_eq!(table.len(), 2);
	}

	#[test]
	fn test_self_loop_and_empty_roles_rejected() {
		assert_eq!(
			RuleTable::new(vec![TransitionRule::new(Returned, Returned)]).unwrap_err(),
			RuleTableError::SelfLoop(Returned)
		);
		assert_eq!(
			RuleTable::new(vec![TransitionRule::new(Pending, Postponed).restricted_to(&[])])
				.unwrap_err(),
			RuleTableError::EmptyRoleSet {
				from: Pending,
				to: Postponed
			}
		);
	}

	#[test]
	fn test_rules_from_keeps_table_order() {
		let table = RuleTable::standard();
		let targets: Vec<OrderStatus> = table.rules_from(OutForDelivery).map(|r| r.to).collect();
		assert_eq!(targets, vec![Delivered, Returned, AwaitingDriver, Pending]);
		assert_eq!(table.rules_from(MerchantSettled).count(), 0);
	}

	#[test]
	fn test_from_config_custom() {
		let config = TransitionsConfig {
			rule_set: RuleSetKind::Custom,
			rules: vec![
				RuleConfig {
					from: "PENDING".into(),
					to: "مؤجل".into(),
					requires_driver: false,
					requires_confirmation: true,
					confirmation_message: None,
					allowed_roles: Some(vec!["Supervisor".into()]),
				},
				RuleConfig {
					from: "POSTPONED".into(),
					to: "PENDING".into(),
					requires_driver: false,
					requires_confirmation: false,
					confirmation_message: None,
					allowed_roles: None,
				},
			],
		};

		let table = RuleTable::from_config(&config).unwrap();
		assert_eq!(table.len(), 2);

		let rule = table.get(Pending, Postponed).unwrap();
		assert_eq!(rule.allowed_roles.as_deref(), Some(&[Role::Supervisor][..]));
		assert_eq!(
			rule.confirmation_message.as_deref(),
			Some("Change the order status to مؤجل?")
		);
		assert!(table.get(Postponed, Pending).unwrap().confirmation_message.is_none());
	}

	#[test]
	fn test_from_config_unknown_values() {
		let mut config = TransitionsConfig {
			rule_set: RuleSetKind::Custom,
			rules: vec![RuleConfig {
				from: "PENDING".into(),
				to: "LOST".into(),
				requires_driver: false,
				requires_confirmation: false,
				confirmation_message: None,
				allowed_roles: None,
			}],
		};
		assert!(matches!(
			RuleTable::from_config(&config),
			Err(RuleTableError::UnknownStatus(_))
		));

		config.rules[0].to = "POSTPONED".into();
		config.rules[0].allowed_roles = Some(vec!["courier".into()]);
		assert!(matches!(
			RuleTable::from_config(&config),
			Err(RuleTableError::UnknownRole(_))
		));
	}

	#[test]
	fn test_from_config_standard_shares_table() {
		let table = RuleTable::from_config(&TransitionsConfig::default()).unwrap();
		assert!(Arc::ptr_eq(&table, &RuleTable::standard()));
	}
}
