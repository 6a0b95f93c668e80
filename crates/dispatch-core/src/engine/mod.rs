//! Status transition engine.
//!
//! Answers, without side effects, whether a delivery order may move from one
//! status to another: which rule applies, whether a driver must be attached,
//! whether the user must confirm, and which message to show when the change
//! is refused.
//!
//! Statuses, drivers and roles arrive as plain strings from the callers and
//! are matched exactly: no trimming and no case folding. Unrecognized
//! statuses simply have no transitions; nothing here panics on bad input.

pub mod rules;

use dispatch_types::{
	DriverAssignment, OrderStatus, Role, TransitionCheck, TransitionError, TransitionPlan,
	TransitionRule,
};
use std::sync::Arc;

pub use rules::{standard_rules, RuleTable, RuleTableError};

/// Pure decision logic over an immutable [`RuleTable`].
///
/// Cloning is cheap and clones share the table, so one engine can be handed
/// to any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct StatusTransitionEngine {
	rules: Arc<RuleTable>,
}

impl Default for StatusTransitionEngine {
	fn default() -> Self {
		Self::new(RuleTable::standard())
	}
}

impl StatusTransitionEngine {
	pub fn new(rules: Arc<RuleTable>) -> Self {
		Self { rules }
	}

	/// The rule table this engine decides with.
	pub fn rules(&self) -> &RuleTable {
		&self.rules
	}

	/// Returns the rule for the exact ordered pair.
	pub fn find_rule(&self, from: &str, to: &str) -> Option<&TransitionRule> {
		let from = OrderStatus::from_exact(from)?;
		let to = OrderStatus::from_exact(to)?;
		self.rules.get(from, to)
	}

	/// Whether the change is allowed by the table, ignoring drivers and roles.
	pub fn is_valid_transition(&self, from: &str, to: &str) -> bool {
		is_identity(from, to) || self.find_rule(from, to).is_some()
	}

	/// Whether the rule for the pair requires an attached driver.
	pub fn requires_driver(&self, from: &str, to: &str) -> bool {
		self.find_rule(from, to)
			.is_some_and(|rule| rule.requires_driver)
	}

	/// Whether the rule for the pair asks the user to confirm.
	pub fn requires_confirmation(&self, from: &str, to: &str) -> bool {
		self.find_rule(from, to)
			.is_some_and(|rule| rule.requires_confirmation)
	}

	/// Prompt to show before applying the change, if the rule has one.
	pub fn confirmation_message(&self, from: &str, to: &str) -> Option<&str> {
		self.find_rule(from, to)
			.and_then(|rule| rule.confirmation_message.as_deref())
	}

	/// Validates a proposed change and reports the outcome as a
	/// [`TransitionCheck`] ready to hand to the UI.
	pub fn validate_transition(
		&self,
		from: &str,
		to: &str,
		driver: Option<&str>,
		role: Option<&str>,
	) -> TransitionCheck {
		self.check_transition(from, to, driver, role).into()
	}

	/// Validates a proposed change.
	///
	/// Checks run in a fixed order and the first failure wins:
	/// 1. a change to the same status is always accepted;
	/// 2. the pair must have a rule;
	/// 3. if the rule restricts roles and a role is given, it must be listed;
	/// 4. if the rule requires a driver, one must be attached.
	///
	/// Only a missing role (or the empty string) skips step 3. Any other
	/// string must be exactly one of the listed role names.
	pub fn check_transition(
		&self,
		from: &str,
		to: &str,
		driver: Option<&str>,
		role: Option<&str>,
	) -> Result<(), TransitionError> {
		if is_identity(from, to) {
			return Ok(());
		}

		let rule = self.find_rule(from, to).ok_or_else(|| {
			tracing::debug!(from, to, "No transition rule");
			TransitionError::NoSuchTransition {
				from: from.to_string(),
				to: to.to_string(),
			}
		})?;

		if let Some(role) = role.filter(|r| !r.is_empty()) {
			// An unknown role is only let through rules without restrictions
			let permitted = match Role::from_exact(role) {
				Some(role) => rule.permits(role),
				None => rule.allowed_roles.is_none(),
			};
			if !permitted {
				tracing::debug!(from, to, role, "Role not allowed for transition");
				return Err(TransitionError::PermissionDenied {
					role: role.to_string(),
				});
			}
		}

		if rule.requires_driver && !DriverAssignment::from_input(driver).is_assigned() {
			tracing::debug!(from, to, "Transition requires an assigned driver");
			return Err(TransitionError::MissingDriver { to: to.to_string() });
		}

		Ok(())
	}

	/// Validates a change and bundles what a confirmation dialog needs.
	pub fn plan_transition(
		&self,
		from: &str,
		to: &str,
		driver: Option<&str>,
		role: Option<&str>,
	) -> TransitionPlan {
		let check = self.validate_transition(from, to, driver, role);
		let rule = if is_identity(from, to) {
			None
		} else {
			self.find_rule(from, to)
		};

		TransitionPlan {
			check,
			requires_driver: rule.is_some_and(|r| r.requires_driver),
			requires_confirmation: rule.is_some_and(|r| r.requires_confirmation),
			confirmation_message: rule.and_then(|r| r.confirmation_message.clone()),
		}
	}

	/// Statuses the caller could move an order to right now, in table order.
	///
	/// Excludes the current status itself.
	pub fn allowed_targets(
		&self,
		from: &str,
		driver: Option<&str>,
		role: Option<&str>,
	) -> Vec<OrderStatus> {
		let Some(current) = OrderStatus::from_exact(from) else {
			return Vec::new();
		};

		self.rules
			.rules_from(current)
			.filter(|rule| {
				self.check_transition(from, rule.to.code(), driver, role)
					.is_ok()
			})
			.map(|rule| rule.to)
			.collect()
	}
}

/// Two inputs naming the same status (by code or label) are the same
/// status; anything unrecognized compares as raw text.
fn is_identity(from: &str, to: &str) -> bool {
	match (OrderStatus::from_exact(from), OrderStatus::from_exact(to)) {
		(Some(from), Some(to)) => from == to,
		_ => from == to,
	}
}
