//! Acting roles and driver assignment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder stored in an order's driver field when no driver is attached.
pub const UNASSIGNED_DRIVER: &str = "unassigned";

/// Error returned when a string does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Permission class of the user requesting a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Admin,
	Supervisor,
	Driver,
	Merchant,
	Accountant,
}

impl Role {
	pub const ALL: [Role; 5] = [
		Role::Admin,
		Role::Supervisor,
		Role::Driver,
		Role::Merchant,
		Role::Accountant,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::Supervisor => "supervisor",
			Role::Driver => "driver",
			Role::Merchant => "merchant",
			Role::Accountant => "accountant",
		}
	}

	/// Looks up a role by its exact lowercase name.
	pub fn from_exact(input: &str) -> Option<Self> {
		Role::ALL.into_iter().find(|role| role.as_str() == input)
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Case-insensitive and whitespace tolerant. Used for configuration input.
impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		Role::ALL
			.into_iter()
			.find(|role| role.as_str().eq_ignore_ascii_case(trimmed))
			.ok_or_else(|| UnknownRole(s.to_string()))
	}
}

/// Driver attached to an order, as far as transition rules are concerned.
///
/// A missing value, a blank string and [`UNASSIGNED_DRIVER`] all mean that
/// no driver is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAssignment<'a> {
	Unassigned,
	Assigned(&'a str),
}

impl<'a> DriverAssignment<'a> {
	/// Interprets the raw driver field of an order.
	pub fn from_input(driver: Option<&'a str>) -> Self {
		match driver.map(str::trim) {
			None | Some("") | Some(UNASSIGNED_DRIVER) => DriverAssignment::Unassigned,
			Some(id) => DriverAssignment::Assigned(id),
		}
	}

	pub fn is_assigned(&self) -> bool {
		matches!(self, DriverAssignment::Assigned(_))
	}

	/// Returns the driver identity when one is attached.
	pub fn id(&self) -> Option<&'a str> {
		match self {
			DriverAssignment::Assigned(id) => Some(id),
			DriverAssignment::Unassigned => None,
		}
	}
}
