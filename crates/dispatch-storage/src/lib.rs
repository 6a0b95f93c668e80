//! Storage module for the dispatch back office.
//!
//! This module provides abstractions for persisting order records, with
//! pluggable backends selected by name in the configuration. Backends expose
//! a compare-and-swap primitive so that the order store can apply a validated
//! status change only if nobody changed the record in the meantime.

use async_trait::async_trait;
use dispatch_types::ImplementationRegistry;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface every storage backend implements.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any existing value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Replaces the value only if it currently equals `expected`.
	///
	/// Returns `Ok(false)` without writing when the stored value differs,
	/// and `StorageError::NotFound` when the key is absent.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError>;
}

/// Factory signature every storage implementation provides.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns (name, factory) pairs for every available storage implementation.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Builds the backend registered under `name`.
pub fn create_backend(
	name: &str,
	config: &toml::Value,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	let (_, factory) = get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.ok_or_else(|| {
			StorageError::Configuration(format!("Unknown storage implementation '{}'", name))
		})?;
	factory(config)
}

/// A value read from storage together with the exact bytes it came from.
///
/// Hand the snapshot back to [`StorageService::compare_and_swap`] to write a
/// new value only if the stored bytes are still the ones that were read.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
	pub value: T,
	raw: Vec<u8>,
}

/// Typed storage operations over a backend.
///
/// Values are serialized as JSON and keyed by `namespace:id`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		Ok(self.snapshot(namespace, id).await?.value)
	}

	/// Retrieves a value and keeps the raw bytes for a later compare-and-swap.
	pub async fn snapshot<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Snapshot<T>, StorageError> {
		let raw = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		let value =
			serde_json::from_slice(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Snapshot { value, raw })
	}

	/// Writes `data` only if the stored value is still the one in `snapshot`.
	///
	/// Returns `Ok(false)` when another writer changed the value first.
	pub async fn compare_and_swap<T, U: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		snapshot: &Snapshot<T>,
		data: &U,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		let swapped = self
			.backend
			.compare_and_swap(&Self::key(namespace, id), &snapshot.raw, bytes)
			.await?;
		if !swapped {
			tracing::debug!(namespace, id, "Compare-and-swap lost to a concurrent write");
		}
		Ok(swapped)
	}
}
