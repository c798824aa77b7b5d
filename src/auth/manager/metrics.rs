// std
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Credential refresh counters.
///
/// `attempts` counts calls into the credential source, while `coalesced` counts callers that
/// piggybacked on a refresh someone else had already started. Under load the ratio between the
/// two shows how much work single-flight saved.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	coalesced: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
}
impl RefreshMetrics {
	/// Refreshes issued to the credential source.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Relaxed)
	}

	/// Callers that awaited an in-flight refresh instead of starting one.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Relaxed)
	}

	/// Refreshes that produced a usable credential.
	pub fn successes(&self) -> u64 {
		self.succeeded.load(Relaxed)
	}

	/// Refreshes that failed or returned an unusable credential.
	pub fn failures(&self) -> u64 {
		self.failed.load(Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.succeeded.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Relaxed);
	}
}
