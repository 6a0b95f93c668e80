//! Core of the dispatch back office.
//!
//! Holds the status transition engine that decides which order status
//! changes are legal, the order store that applies accepted changes, and the
//! builder that wires both up from configuration.

pub mod builder;
pub mod engine;
pub mod state;

pub use builder::{BuilderError, Dispatch, DispatchBuilder};
pub use engine::{RuleTable, RuleTableError, StatusTransitionEngine};
pub use state::{OrderStateError, OrderStateMachine, StatusChangeRequest};
