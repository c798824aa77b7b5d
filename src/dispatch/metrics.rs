// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for dispatcher calls.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	calls: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	auth_retries: AtomicU64,
	contracts_learned: AtomicU64,
}
impl DispatchMetrics {
	/// Returns the number of dispatched calls.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that succeeded.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that failed, locally or remotely.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how many times a rejected credential triggered a retry.
	pub fn auth_retries(&self) -> u64 {
		self.auth_retries.load(Ordering::Relaxed)
	}

	/// Returns how many validation rejections tightened a contract.
	pub fn contracts_learned(&self) -> u64 {
		self.contracts_learned.load(Ordering::Relaxed)
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_auth_retry(&self) {
		self.auth_retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_contract_learned(&self) {
		self.contracts_learned.fetch_add(1, Ordering::Relaxed);
	}
}
