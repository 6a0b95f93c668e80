//! Order store.
//!
//! Persists order records and applies status changes only after the
//! transition engine has accepted them. Each change is written with a
//! compare-and-set against the record that was validated, so a concurrent
//! change made in between is reported as a conflict rather than overwritten.

use crate::engine::StatusTransitionEngine;
use dispatch_storage::{Snapshot, StorageError, StorageService};
use dispatch_types::{
	DriverAssignment, Order, OrderStatus, StatusChange, StorageKey, TransitionError,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error(transparent)]
	Rejected(#[from] TransitionError),
	#[error("Confirmation required: {message}")]
	ConfirmationRequired { message: String },
	#[error("Order {order_id} is at version {actual}, expected {expected}")]
	VersionMismatch {
		order_id: String,
		expected: u64,
		actual: u64,
	},
	#[error("Order {0} was modified concurrently")]
	Conflict(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Time error: {0}")]
	TimeError(String),
}

/// A requested status change, as submitted by the UI.
#[derive(Debug, Clone, Default)]
pub struct StatusChangeRequest {
	/// Target status, by code or label.
	pub to: String,
	/// Role of the acting user. `None` skips role restrictions.
	pub role: Option<String>,
	/// The user has already confirmed the change.
	pub confirmed: bool,
	/// Reject the change unless the order is still at this version.
	pub expected_version: Option<u64>,
}

impl StatusChangeRequest {
	pub fn new(to: impl Into<String>) -> Self {
		Self {
			to: to.into(),
			..Default::default()
		}
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}

	pub fn confirmed(mut self) -> Self {
		self.confirmed = true;
		self
	}

	pub fn expecting_version(mut self, version: u64) -> Self {
		self.expected_version = Some(version);
		self
	}
}

/// Manages order status changes and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	engine: StatusTransitionEngine,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, engine: StatusTransitionEngine) -> Self {
		Self { storage, engine }
	}

	pub fn engine(&self) -> &StatusTransitionEngine {
		&self.engine
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| not_found_or_storage(order_id, e))
	}

	/// Stores a new order, or replaces an existing one wholesale
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Attaches a driver to an order, or detaches it.
	///
	/// A blank driver or the unassigned placeholder detaches the driver.
	pub async fn assign_driver(
		&self,
		order_id: &str,
		driver: Option<&str>,
	) -> Result<Order, OrderStateError> {
		let driver = DriverAssignment::from_input(driver)
			.id()
			.map(str::to_string);

		let order = self
			.update_order_with(order_id, |order| order.driver = driver)
			.await?;
		tracing::info!(order_id, driver = ?order.driver, "Driver assignment updated");
		Ok(order)
	}

	/// Validates and applies a status change.
	///
	/// A change to the current status is accepted and persists nothing.
	pub async fn transition_order_status(
		&self,
		order_id: &str,
		request: StatusChangeRequest,
	) -> Result<Order, OrderStateError> {
		let snapshot = self.load(order_id).await?;
		let order = &snapshot.value;

		if let Some(expected) = request.expected_version {
			if expected != order.version {
				return Err(OrderStateError::VersionMismatch {
					order_id: order_id.to_string(),
					expected,
					actual: order.version,
				});
			}
		}

		let from = order.status.code();
		self.engine.check_transition(
			from,
			&request.to,
			order.driver.as_deref(),
			request.role.as_deref(),
		)?;

		// The check passed, so the target names a known status
		let to = OrderStatus::from_exact(&request.to).ok_or_else(|| {
			TransitionError::NoSuchTransition {
				from: from.to_string(),
				to: request.to.clone(),
			}
		})?;
		if to == order.status {
			return Ok(snapshot.value.clone());
		}

		if self.engine.requires_confirmation(from, to.code()) && !request.confirmed {
			let message = self
				.engine
				.confirmation_message(from, to.code())
				.map(str::to_string)
				.unwrap_or_else(|| format!("Change the order status to {}?", to.label()));
			return Err(OrderStateError::ConfirmationRequired { message });
		}

		let mut updated = order.clone();
		updated.status = to;
		updated.history.push(StatusChange {
			from: order.status,
			to,
			role: request.role.clone(),
			driver: order.driver.clone(),
			at: now()?,
		});

		let updated = self.commit(order_id, &snapshot, updated).await?;
		tracing::info!(order_id, from = %order.status, to = %to, "Order status changed");
		Ok(updated)
	}

	/// Applies `updater` to the stored order and writes it back.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		let snapshot = self.load(order_id).await?;
		let mut order = snapshot.value.clone();
		updater(&mut order);
		self.commit(order_id, &snapshot, order).await
	}

	async fn load(&self, order_id: &str) -> Result<Snapshot<Order>, OrderStateError> {
		self.storage
			.snapshot(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| not_found_or_storage(order_id, e))
	}

	/// Bumps version and timestamp, then writes only if the stored record is
	/// still the one in `snapshot`.
	async fn commit(
		&self,
		order_id: &str,
		snapshot: &Snapshot<Order>,
		mut order: Order,
	) -> Result<Order, OrderStateError> {
		order.version = snapshot.value.version + 1;
		order.updated_at = now()?;

		let swapped = self
			.storage
			.compare_and_swap(StorageKey::Orders.as_str(), order_id, snapshot, &order)
			.await
			.map_err(|e| not_found_or_storage(order_id, e))?;

		if !swapped {
			tracing::warn!(order_id, "Order changed while an update was being applied");
			return Err(OrderStateError::Conflict(order_id.to_string()));
		}
		Ok(order)
	}
}

fn not_found_or_storage(order_id: &str, error: StorageError) -> OrderStateError {
	match error {
		StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
		other => OrderStateError::Storage(other.to_string()),
	}
}

fn now() -> Result<u64, OrderStateError> {
	Ok(SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_err(|e| OrderStateError::TimeError(e.to_string()))?
		.as_secs())
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_storage::implementations::memory::MemoryStorage;
	use dispatch_types::TransitionErrorKind;

	fn state_machine() -> OrderStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		OrderStateMachine::new(storage, StatusTransitionEngine::default())
	}

	async fn seeded(order: Order) -> OrderStateMachine {
		let machine = state_machine();
		machine.store_order(&order).await.unwrap();
		machine
	}

	#[tokio::test]
	async fn test_transition_with_driver() {
		let machine = seeded(Order::new("o-1", 1).with_driver("driver-123")).await;

		let order = machine
			.transition_order_status("o-1", StatusChangeRequest::new("AWAITING_DRIVER"))
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::AwaitingDriver);
		assert_eq!(order.version, 1);
		assert_eq!(order.history.len(), 1);
		assert_eq!(order.history[0].from, OrderStatus::Pending);
		assert_eq!(order.history[0].driver.as_deref(), Some("driver-123"));

		let stored = machine.get_order("o-1").await.unwrap();
		assert_eq!(stored, order);
	}

	#[tokio::test]
	async fn test_rejected_transition_persists_nothing() {
		let machine = seeded(Order::new("o-2", 1)).await;

		let err = machine
			.transition_order_status("o-2", StatusChangeRequest::new("AWAITING_DRIVER"))
			.await
			.unwrap_err();
		match err {
			OrderStateError::Rejected(e) => assert_eq!(e.kind(), TransitionErrorKind::MissingDriver),
			other => panic!("unexpected error: {other}"),
		}

		let stored = machine.get_order("o-2").await.unwrap();
		assert_eq!(stored.status, OrderStatus::Pending);
		assert_eq!(stored.version, 0);
	}

	#[tokio::test]
	async fn test_confirmation_handshake() {
		let machine = seeded(
			Order::new("o-3", 1)
				.with_driver("d-7")
				.with_status(OrderStatus::OutForDelivery),
		)
		.await;

		let err = machine
			.transition_order_status("o-3", StatusChangeRequest::new("DELIVERED"))
			.await
			.unwrap_err();
		match err {
			OrderStateError::ConfirmationRequired { message } => {
				assert_eq!(message, "Confirm that the order was delivered to the customer?")
			},
			other => panic!("unexpected error: {other}"),
		}
		assert_eq!(
			machine.get_order("o-3").await.unwrap().status,
			OrderStatus::OutForDelivery
		);

		let order = machine
			.transition_order_status("o-3", StatusChangeRequest::new("DELIVERED").confirmed())
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Delivered);
	}

	#[tokio::test]
	async fn test_role_forwarded_to_engine() {
		let machine = seeded(Order::new("o-4", 1).with_status(OrderStatus::Delivered)).await;

		let err = machine
			.transition_order_status(
				"o-4",
				StatusChangeRequest::new("CASH_RECEIVED_AT_BRANCH")
					.with_role("driver")
					.confirmed(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, OrderStateError::Rejected(TransitionError::PermissionDenied { .. })));

		let order = machine
			.transition_order_status(
				"o-4",
				StatusChangeRequest::new("CASH_RECEIVED_AT_BRANCH")
					.with_role("supervisor")
					.confirmed(),
			)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::CashReceivedAtBranch);
		assert_eq!(order.history[0].role.as_deref(), Some("supervisor"));
	}

	#[tokio::test]
	async fn test_same_status_is_a_no_op() {
		let machine = seeded(Order::new("o-5", 1)).await;

		let order = machine
			.transition_order_status("o-5", StatusChangeRequest::new("بالانتظار"))
			.await
			.unwrap();
		assert_eq!(order.version, 0);
		assert!(order.history.is_empty());
	}

	#[tokio::test]
	async fn test_padded_target_is_rejected() {
		let machine = seeded(Order::new("o-10", 1).with_driver("d-1")).await;

		let err = machine
			.transition_order_status("o-10", StatusChangeRequest::new("AWAITING_DRIVER "))
			.await
			.unwrap_err();
		match err {
			OrderStateError::Rejected(e) => {
				assert_eq!(e.kind(), TransitionErrorKind::NoSuchTransition)
			},
			other => panic!("unexpected error: {other}"),
		}
		assert_eq!(machine.get_order("o-10").await.unwrap().version, 0);
	}

	#[tokio::test]
	async fn test_expected_version() {
		let machine = seeded(Order::new("o-6", 1).with_driver("d-1")).await;

		let err = machine
			.transition_order_status(
				"o-6",
				StatusChangeRequest::new("AWAITING_DRIVER").expecting_version(3),
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			OrderStateError::VersionMismatch {
				expected: 3,
				actual: 0,
				..
			}
		));

		let order = machine
			.transition_order_status(
				"o-6",
				StatusChangeRequest::new("AWAITING_DRIVER").expecting_version(0),
			)
			.await
			.unwrap();
		assert_eq!(order.version, 1);
	}

	#[tokio::test]
	async fn test_stale_snapshot_conflicts() {
		let machine = seeded(Order::new("o-7", 1).with_driver("d-1")).await;

		let stale = machine
			.storage
			.snapshot::<Order>(StorageKey::Orders.as_str(), "o-7")
			.await
			.unwrap();

		machine
			.transition_order_status("o-7", StatusChangeRequest::new("AWAITING_DRIVER"))
			.await
			.unwrap();

		let mut late = stale.value.clone();
		late.status = OrderStatus::Postponed;
		let err = machine.commit("o-7", &stale, late).await.unwrap_err();
		assert!(matches!(err, OrderStateError::Conflict(id) if id == "o-7"));
		assert_eq!(
			machine.get_order("o-7").await.unwrap().status,
			OrderStatus::AwaitingDriver
		);
	}

	#[tokio::test]
	async fn test_assign_and_clear_driver() {
		let machine = seeded(Order::new("o-8", 1)).await;

		let order = machine.assign_driver("o-8", Some("driver-42")).await.unwrap();
		assert_eq!(order.driver.as_deref(), Some("driver-42"));
		assert_eq!(order.version, 1);

		let order = machine.assign_driver("o-8", Some("unassigned")).await.unwrap();
		assert_eq!(order.driver, None);
		assert_eq!(order.version, 2);

		let err = machine
			.transition_order_status("o-8", StatusChangeRequest::new("AWAITING_DRIVER"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderStateError::Rejected(TransitionError::MissingDriver { .. })));
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let machine = state_machine();
		let err = machine.get_order("missing").await.unwrap_err();
		assert!(matches!(err, OrderStateError::OrderNotFound(id) if id == "missing"));

		let err = machine.assign_driver("missing", Some("d-1")).await.unwrap_err();
		assert!(matches!(err, OrderStateError::OrderNotFound(_)));
	}

	#[tokio::test]
	async fn test_full_lifecycle() {
		let machine = seeded(Order::new("o-9", 1)).await;
		machine.assign_driver("o-9", Some("driver-123")).await.unwrap();

		let steps = [
			("AWAITING_DRIVER", None),
			("OUT_FOR_DELIVERY", Some("admin")),
			("DELIVERED", None),
			("CASH_RECEIVED_AT_BRANCH", Some("supervisor")),
			("MERCHANT_SETTLED", Some("admin")),
		];
		for (to, role) in steps {
			let mut request = StatusChangeRequest::new(to).confirmed();
			request.role = role.map(str::to_string);
			machine.transition_order_status("o-9", request).await.unwrap();
		}

		let order = machine.get_order("o-9").await.unwrap();
		assert_eq!(order.status, OrderStatus::MerchantSettled);
		assert_eq!(order.history.len(), 5);
		assert_eq!(order.version, 6);
	}
}
