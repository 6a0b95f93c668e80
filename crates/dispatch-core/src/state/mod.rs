//! State management for orders.
//!
//! Persists order records and applies status changes that the transition
//! engine has accepted.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine, StatusChangeRequest};
