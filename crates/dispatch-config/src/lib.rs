//! Configuration module for the dispatch back office.
//!
//! This module provides structures and utilities for managing dispatch
//! configuration. It supports loading configuration from TOML files and
//! validates that the storage selection and any custom transition rules are
//! consistent before anything is built from them.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use dispatch_types::{OrderStatus, Role};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Which transition rules govern status changes.
	#[serde(default)]
	pub transitions: TransitionsConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Selects the rule table used by the transition engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransitionsConfig {
	/// `standard` uses the built-in table, `custom` uses `rules`.
	#[serde(default)]
	pub rule_set: RuleSetKind,
	/// Rules for a custom rule set, in lookup order.
	#[serde(default)]
	pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetKind {
	#[default]
	Standard,
	Custom,
}

/// One transition rule as written in a configuration file.
///
/// Statuses and roles stay strings here; [`Config::validate`] checks that
/// they name known values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
	pub from: String,
	pub to: String,
	#[serde(default)]
	pub requires_driver: bool,
	#[serde(default)]
	pub requires_confirmation: bool,
	pub confirmation_message: Option<String>,
	pub allowed_roles: Option<Vec<String>>,
}

impl Default for Config {
	/// Built-in rules over in-memory storage.
	fn default() -> Self {
		let mut implementations = HashMap::new();
		implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);
		Self {
			service: ServiceConfig {
				id: "dispatch".to_string(),
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations,
			},
			transitions: TransitionsConfig::default(),
		}
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Parses TOML whose environment variables have already been resolved.
	pub(crate) fn from_resolved(resolved: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the service id is not empty
	/// - Checks that the primary storage is among the configured implementations
	/// - Validates the transition rule set
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		self.validate_transitions()
	}

	/// Validates the transition rule set.
	///
	/// # Validation Rules
	/// 1. `standard` takes no rules, `custom` needs at least one
	/// 2. Every status and role must be known
	/// 3. A rule may not lead from a status to itself
	/// 4. No two rules may cover the same (from, to) pair
	/// 5. A role list, when given, may not be empty
	fn validate_transitions(&self) -> Result<(), ConfigError> {
		let transitions = &self.transitions;
		match transitions.rule_set {
			RuleSetKind::Standard if !transitions.rules.is_empty() => {
				return Err(ConfigError::Validation(
					"Transition rules can only be given with rule_set = \"custom\"".into(),
				));
			},
			RuleSetKind::Custom if transitions.rules.is_empty() => {
				return Err(ConfigError::Validation(
					"Custom rule set requires at least one rule".into(),
				));
			},
			_ => {},
		}

		let mut seen: HashSet<(OrderStatus, OrderStatus)> = HashSet::new();
		for (index, rule) in transitions.rules.iter().enumerate() {
			let from = OrderStatus::from_str(&rule.from).map_err(|e| {
				ConfigError::Validation(format!("Transition rule {}: {}", index, e))
			})?;
			let to = OrderStatus::from_str(&rule.to).map_err(|e| {
				ConfigError::Validation(format!("Transition rule {}: {}", index, e))
			})?;

			if from == to {
				return Err(ConfigError::Validation(format!(
					"Transition rule {} leads from {} to itself",
					index, from
				)));
			}
			if !seen.insert((from, to)) {
				return Err(ConfigError::Validation(format!(
					"Duplicate transition rule from {} to {}",
					from, to
				)));
			}

			if let Some(roles) = &rule.allowed_roles {
				if roles.is_empty() {
					return Err(ConfigError::Validation(format!(
						"Transition rule from {} to {} has an empty allowed_roles list",
						from, to
					)));
				}
				for role in roles {
					Role::from_str(role).map_err(|e| {
						ConfigError::Validation(format!("Transition rule {}: {}", index, e))
					})?;
				}
			}
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating
/// the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Config::from_resolved(&resolve_env_vars(s)?)
	}
}
