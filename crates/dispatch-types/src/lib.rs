//! Common types for the dispatch back office.
//!
//! This crate defines the vocabulary shared by every dispatch component:
//! order statuses, acting roles, transition rules and their outcomes, and
//! the order record persisted by the order store.

/// Order records and the closed set of lifecycle statuses.
pub mod order;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Acting roles and driver assignment handling.
pub mod role;
/// Storage key namespaces.
pub mod storage;
/// Transition rules and the results of validating a transition.
pub mod transition;

pub use order::*;
pub use registry::ImplementationRegistry;
pub use role::*;
pub use storage::*;
pub use transition::*;
