//! Transition rules and validation outcomes.
//!
//! A [`TransitionRule`] is one allowed edge of the status graph together
//! with its preconditions. Validating a proposed change yields either a
//! [`TransitionError`] or a [`TransitionCheck`] carrying the user-facing
//! message.

use crate::{OrderStatus, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One allowed, directed status change and its preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
	pub from: OrderStatus,
	pub to: OrderStatus,
	/// The order must carry a real driver before the change applies.
	pub requires_driver: bool,
	/// The caller must obtain explicit assent before applying the change.
	pub requires_confirmation: bool,
	/// Prompt shown when confirmation is required.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmation_message: Option<String>,
	/// Roles allowed to make the change. `None` means anyone.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub allowed_roles: Option<Vec<Role>>,
}

impl TransitionRule {
	/// Creates an unrestricted rule with no preconditions.
	pub fn new(from: OrderStatus, to: OrderStatus) -> Self {
		Self {
			from,
			to,
			requires_driver: false,
			requires_confirmation: false,
			confirmation_message: None,
			allowed_roles: None,
		}
	}

	/// Requires an assigned driver.
	pub fn with_driver(mut self) -> Self {
		self.requires_driver = true;
		self
	}

	/// Requires confirmation with the given prompt.
	pub fn with_confirmation(mut self, message: impl Into<String>) -> Self {
		self.requires_confirmation = true;
		self.confirmation_message = Some(message.into());
		self
	}

	/// Restricts the rule to the given roles.
	pub fn restricted_to(mut self, roles: &[Role]) -> Self {
		self.allowed_roles = Some(roles.to_vec());
		self
	}

	/// Whether `role` is allowed by this rule.
	pub fn permits(&self, role: Role) -> bool {
		self.allowed_roles
			.as_ref()
			.is_none_or(|roles| roles.contains(&role))
	}
}

/// Category of a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionErrorKind {
	/// No rule exists for the requested pair.
	NoSuchTransition,
	/// A role restriction exists and the caller's role is not in it.
	PermissionDenied,
	/// A driver is required but none is attached.
	MissingDriver,
}

/// Reason a status change was rejected.
///
/// The display form is the sentence surfaced to the end user. Status
/// values are echoed exactly as the caller supplied them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
	#[error("cannot change status from {from} to {to}")]
	NoSuchTransition { from: String, to: String },
	#[error("insufficient permission to change this status")]
	PermissionDenied { role: String },
	#[error("a driver must be assigned before changing status to {to}")]
	MissingDriver { to: String },
}

impl TransitionError {
	pub fn kind(&self) -> TransitionErrorKind {
		match self {
			TransitionError::NoSuchTransition { .. } => TransitionErrorKind::NoSuchTransition,
			TransitionError::PermissionDenied { .. } => TransitionErrorKind::PermissionDenied,
			TransitionError::MissingDriver { .. } => TransitionErrorKind::MissingDriver,
		}
	}
}

/// Outcome of validating a proposed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCheck {
	pub valid: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Category of the error, for callers that localize by category.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub kind: Option<TransitionErrorKind>,
}

impl TransitionCheck {
	pub fn valid() -> Self {
		Self {
			valid: true,
			error: None,
			kind: None,
		}
	}

	pub fn rejected(error: &TransitionError) -> Self {
		Self {
			valid: false,
			error: Some(error.to_string()),
			kind: Some(error.kind()),
		}
	}
}

impl From<Result<(), TransitionError>> for TransitionCheck {
	fn from(result: Result<(), TransitionError>) -> Self {
		match result {
			Ok(()) => TransitionCheck::valid(),
			Err(e) => TransitionCheck::rejected(&e),
		}
	}
}

/// Everything a confirmation dialog needs to know about a proposed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPlan {
	#[serde(flatten)]
	pub check: TransitionCheck,
	pub requires_driver: bool,
	pub requires_confirmation: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmation_message: Option<String>,
}
