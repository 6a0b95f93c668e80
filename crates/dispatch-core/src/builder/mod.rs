//! Builder for a configured dispatch instance.
//!
//! Turns a validated [`Config`] into a rule table, a transition engine and
//! an order store backed by the configured storage implementation.

use crate::engine::{RuleTable, StatusTransitionEngine};
use crate::state::OrderStateMachine;
use dispatch_config::{Config, RuleSetKind};
use dispatch_storage::StorageService;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building a dispatch instance.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// A wired-up dispatch instance.
pub struct Dispatch {
	config: Config,
	engine: StatusTransitionEngine,
	orders: Arc<OrderStateMachine>,
}

impl Dispatch {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn engine(&self) -> &StatusTransitionEngine {
		&self.engine
	}

	pub fn orders(&self) -> &Arc<OrderStateMachine> {
		&self.orders
	}
}

/// Builds a [`Dispatch`] from configuration.
pub struct DispatchBuilder {
	config: Config,
}

impl DispatchBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds only the transition engine, without touching storage.
	pub fn build_engine(&self) -> Result<StatusTransitionEngine, BuilderError> {
		let rules = RuleTable::from_config(&self.config.transitions).map_err(|e| {
			BuilderError::Config(format!("Failed to build transition rules: {}", e))
		})?;
		let rule_set = match self.config.transitions.rule_set {
			RuleSetKind::Standard => "standard",
			RuleSetKind::Custom => "custom",
		};
		tracing::info!(component = "transitions", rule_set, rules = rules.len(), "Loaded");
		Ok(StatusTransitionEngine::new(rules))
	}

	/// Builds the engine and an order store on the primary storage backend.
	pub fn build(self) -> Result<Dispatch, BuilderError> {
		let engine = self.build_engine()?;

		let primary = &self.config.storage.primary;
		let storage_config = self
			.config
			.storage
			.implementations
			.get(primary)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' not found in implementations",
					primary
				))
			})?;
		let backend = dispatch_storage::create_backend(primary, storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let storage = Arc::new(StorageService::new(backend));
		let orders = Arc::new(OrderStateMachine::new(storage, engine.clone()));

		Ok(Dispatch {
			config: self.config,
			engine,
			orders,
		})
	}
}
