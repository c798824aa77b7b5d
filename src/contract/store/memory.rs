//! Thread-safe in-memory [`ContractStore`] for tests and single-process deployments.

// self
use crate::{
	_prelude::*,
	contract::store::{ContractSnapshot, ContractStore, StoreFuture},
};

/// Keeps the latest snapshot in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<ContractSnapshot>>>);
impl MemoryStore {
	/// Number of contracts in the stored snapshot.
	pub fn len(&self) -> usize {
		self.0.read().as_ref().map_or(0, |snapshot| snapshot.contracts.len())
	}

	/// Returns `true` when nothing has been saved yet or the snapshot is empty.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl ContractStore for MemoryStore {
	fn save(&self, snapshot: ContractSnapshot) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(snapshot);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Option<ContractSnapshot>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}
}
