//! Subcommand implementations.
//!
//! Each command renders its output as a string so the binary only has to
//! print it.

use dispatch_core::StatusTransitionEngine;
use dispatch_types::{OrderStatus, TransitionRule};

/// Renders the rule table, one rule per line.
pub fn render_rules(engine: &StatusTransitionEngine) -> String {
	engine
		.rules()
		.rules()
		.iter()
		.map(describe_rule)
		.collect::<Vec<_>>()
		.join("\n")
}

fn describe_rule(rule: &TransitionRule) -> String {
	let mut line = format!("{} -> {}", rule.from, rule.to);
	if rule.requires_driver {
		line.push_str(" [driver]");
	}
	if rule.requires_confirmation {
		line.push_str(" [confirm]");
	}
	if let Some(roles) = &rule.allowed_roles {
		let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
		line.push_str(&format!(" roles={}", roles.join(",")));
	}
	line
}

/// Renders the statuses reachable from `from` with their labels.
pub fn render_targets(
	engine: &StatusTransitionEngine,
	from: &str,
	driver: Option<&str>,
	role: Option<&str>,
) -> String {
	engine
		.allowed_targets(from, driver, role)
		.into_iter()
		.map(|status: OrderStatus| format!("{}\t{}", status.code(), status.label()))
		.collect::<Vec<_>>()
		.join("\n")
}

/// Renders the validation plan for a change as JSON.
///
/// Returns the rendered output and whether the change is valid.
pub fn render_check(
	engine: &StatusTransitionEngine,
	from: &str,
	to: &str,
	driver: Option<&str>,
	role: Option<&str>,
) -> Result<(String, bool), serde_json::Error> {
	let plan = engine.plan_transition(from, to, driver, role);
	let output = serde_json::to_string_pretty(&plan)?;
	Ok((output, plan.check.valid))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_render_rules() {
		let output = render_rules(&StatusTransitionEngine::default());
		let lines: Vec<&str> = output.lines().collect();
		assert_eq!(lines.len(), 18);
		assert_eq!(lines[0], "PENDING -> AWAITING_DRIVER [driver]");
		assert_eq!(
			lines[1],
			"AWAITING_DRIVER -> OUT_FOR_DELIVERY [driver] [confirm] roles=admin,driver"
		);
		assert_eq!(lines[11], "POSTPONED -> PENDING");
	}

	#[test]
	fn test_render_targets() {
		let output = render_targets(
			&StatusTransitionEngine::default(),
			"DELIVERED",
			None,
			Some("admin"),
		);
		assert_eq!(
			output,
			"CASH_RECEIVED_AT_BRANCH\tتم استلام المال في الفرع\nOUT_FOR_DELIVERY\tجاري التوصيل"
		);
	}

	#[test]
	fn test_render_check() {
		let engine = StatusTransitionEngine::default();

		let (output, valid) =
			render_check(&engine, "OUT_FOR_DELIVERY", "POSTPONED", None, None).unwrap();
		assert!(!valid);
		let json: serde_json::Value = serde_json::from_str(&output).unwrap();
		assert_eq!(json["valid"], false);
		assert_eq!(
			json["error"],
			"cannot change status from OUT_FOR_DELIVERY to POSTPONED"
		);
		assert_eq!(json["kind"], "no_such_transition");

		let (output, valid) =
			render_check(&engine, "PENDING", "POSTPONED", None, None).unwrap();
		assert!(valid);
		let json: serde_json::Value = serde_json::from_str(&output).unwrap();
		assert_eq!(json["requires_confirmation"], true);
		assert_eq!(json["confirmation_message"], "Postpone this order?");
	}
}
