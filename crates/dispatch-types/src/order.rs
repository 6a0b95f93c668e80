//! Order types for the dispatch back office.
//!
//! Defines the closed set of lifecycle statuses a delivery order moves
//! through, and the order record the order store persists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string does not name a known order status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

/// Lifecycle stage of a delivery order.
///
/// Each status has a stable code (used on the wire and in configuration)
/// and the Arabic label shown to back-office users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order has been created and waits for dispatch.
	Pending,
	/// A driver is attached and the order waits for pickup.
	AwaitingDriver,
	/// The driver is on the way to the customer.
	OutForDelivery,
	/// The customer received the order.
	Delivered,
	/// The order came back undelivered.
	Returned,
	/// Delivery was deferred to a later date.
	Postponed,
	/// The collected cash reached the branch.
	CashReceivedAtBranch,
	/// The merchant has been paid out for the order.
	MerchantSettled,
}

impl OrderStatus {
	/// Every status, in lifecycle order.
	pub const ALL: [OrderStatus; 8] = [
		OrderStatus::Pending,
		OrderStatus::AwaitingDriver,
		OrderStatus::OutForDelivery,
		OrderStatus::Delivered,
		OrderStatus::Returned,
		OrderStatus::Postponed,
		OrderStatus::CashReceivedAtBranch,
		OrderStatus::MerchantSettled,
	];

	/// Returns the stable code of the status.
	pub fn code(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "PENDING",
			OrderStatus::AwaitingDriver => "AWAITING_DRIVER",
			OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Returned => "RETURNED",
			OrderStatus::Postponed => "POSTPONED",
			OrderStatus::CashReceivedAtBranch => "CASH_RECEIVED_AT_BRANCH",
			OrderStatus::MerchantSettled => "MERCHANT_SETTLED",
		}
	}

	/// Returns the label shown to back-office users.
	pub fn label(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "بالانتظار",
			OrderStatus::AwaitingDriver => "بانتظار السائق",
			OrderStatus::OutForDelivery => "جاري التوصيل",
			OrderStatus::Delivered => "تم التوصيل",
			OrderStatus::Returned => "مرتجع",
			OrderStatus::Postponed => "مؤجل",
			OrderStatus::CashReceivedAtBranch => "تم استلام المال في الفرع",
			OrderStatus::MerchantSettled => "تم محاسبة التاجر",
		}
	}

	/// Looks up a status by its exact code or label.
	///
	/// Unlike [`FromStr`], surrounding whitespace is not stripped.
	pub fn from_exact(input: &str) -> Option<Self> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.code() == input || status.label() == input)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.code())
	}
}

/// Accepts either the code or the label of a status, ignoring surrounding
/// whitespace. Used for configuration input.
impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::from_exact(s.trim()).ok_or_else(|| UnknownStatus(s.to_string()))
	}
}

/// A delivery order as seen by the order store.
///
/// Only the fields the transition engine and the store need are modelled;
/// pricing, addresses and merchant data live with the callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Assigned driver, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver: Option<String>,
	/// Incremented on every persisted change.
	#[serde(default)]
	pub version: u64,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
	/// Status changes applied to this order, oldest first.
	#[serde(default)]
	pub history: Vec<StatusChange>,
}

impl Order {
	/// Creates a pending order without a driver.
	pub fn new(id: impl Into<String>, created_at: u64) -> Self {
		Self {
			id: id.into(),
			status: OrderStatus::Pending,
			driver: None,
			version: 0,
			created_at,
			updated_at: created_at,
			history: Vec::new(),
		}
	}

	/// Sets the assigned driver.
	pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
		self.driver = Some(driver.into());
		self
	}

	/// Sets the current status.
	pub fn with_status(mut self, status: OrderStatus) -> Self {
		self.status = status;
		self
	}
}

/// One applied status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
	pub from: OrderStatus,
	pub to: OrderStatus,
	/// Role of the user who made the change, as supplied by the caller.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Driver attached when the change was made.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver: Option<String>,
	pub at: u64,
}
