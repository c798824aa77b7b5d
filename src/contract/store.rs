//! Persistence contracts and built-in stores for learned operation contracts.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, contract::OperationContract};

/// Boxed future returned by [`ContractStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend that keeps contract snapshots across restarts.
pub trait ContractStore
where
	Self: Send + Sync,
{
	/// Persists the snapshot, replacing any previous one.
	fn save(&self, snapshot: ContractSnapshot) -> StoreFuture<'_, ()>;

	/// Loads the most recently saved snapshot, if any.
	fn load(&self) -> StoreFuture<'_, Option<ContractSnapshot>>;
}

/// Error type produced by [`ContractStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Point-in-time export of every registered and learned contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractSnapshot {
	/// Instant the snapshot was taken.
	#[serde(with = "time::serde::rfc3339")]
	pub taken_at: OffsetDateTime,
	/// Contracts ordered by operation then version.
	pub contracts: Vec<OperationContract>,
}
impl ContractSnapshot {
	/// Finds the contract stored for `operation` and `version`.
	pub fn find(&self, operation: &str, version: Option<&str>) -> Option<&OperationContract> {
		self.contracts.iter().find(|contract| {
			contract.operation.as_str() == operation
				&& contract.version.as_ref().map(|v| v.as_str()) == version
		})
	}
}
