//! Credential caching with single-flight refresh.
//!
//! [`CredentialManager::current_credential`] serves the cached credential through a lock-free
//! read while it stays valid. Once it expires or is invalidated, the first caller starts a
//! refresh against the [`CredentialSource`] and parks it as a shared future; every concurrent
//! caller awaits that same future and observes the same credential or the same failure. The
//! shared future is owned by the manager, so a caller that gives up early never cancels the
//! refresh other callers are still waiting on.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialSource, CredentialStatus, RefreshError},
	obs::{self, CallSpan, CallStage, StageOutcome},
};

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<Credential>, RefreshError>>>;

struct CredentialState {
	cached: ArcSwapOption<Credential>,
	inflight: Mutex<Option<SharedRefresh>>,
	metrics: RefreshMetrics,
}

/// Owns the current credential and refreshes it on demand.
#[derive(Clone)]
pub struct CredentialManager {
	state: Arc<CredentialState>,
	source: Arc<dyn CredentialSource>,
	refresh_skew: Duration,
}
impl CredentialManager {
	/// Creates a manager with an empty cache backed by `source`.
	pub fn new(source: Arc<dyn CredentialSource>) -> Self {
		Self {
			state: Arc::new(CredentialState {
				cached: ArcSwapOption::empty(),
				inflight: Mutex::new(None),
				metrics: RefreshMetrics::default(),
			}),
			source,
			refresh_skew: Duration::ZERO,
		}
	}

	/// Seeds the cache with a credential obtained elsewhere (e.g. an interactive login).
	pub fn with_credential(self, credential: Credential) -> Self {
		self.state.cached.store(Some(Arc::new(credential)));

		self
	}

	/// Treats credentials as stale `skew` before their reported expiry.
	pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Refresh counters for this manager.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.state.metrics
	}

	/// Number of refreshes issued to the credential source so far.
	pub fn refresh_count(&self) -> u64 {
		self.state.metrics.attempts()
	}

	/// Returns the cached credential without validating or refreshing it.
	pub fn cached(&self) -> Option<Arc<Credential>> {
		self.state.cached.load_full()
	}

	/// Returns a valid credential, refreshing first when the cached one is stale.
	pub async fn current_credential(&self) -> Result<Arc<Credential>> {
		self.current_credential_at(OffsetDateTime::now_utc()).await
	}

	/// Same as [`current_credential`](Self::current_credential) with an explicit clock reading.
	pub async fn current_credential_at(&self, now: OffsetDateTime) -> Result<Arc<Credential>> {
		if let Some(credential) = self.valid_cached(now) {
			return Ok(credential);
		}

		let refresh = {
			let mut inflight = self.state.inflight.lock();

			// Another caller may have completed a refresh while we waited for the lock.
			if let Some(credential) = self.valid_cached(now) {
				return Ok(credential);
			}

			match inflight.as_ref() {
				Some(pending) => {
					self.state.metrics.record_coalesced();

					pending.clone()
				},
				None => {
					let pending = self.start_refresh(now);

					*inflight = Some(pending.clone());

					pending
				},
			}
		};

		refresh.await.map_err(Error::from)
	}

	/// Marks the cached credential as rejected so the next request refreshes it.
	pub fn invalidate(&self) {
		self.mark_rejected(None, OffsetDateTime::now_utc());
	}

	/// Invalidates the cache only if it still holds `rejected`'s token.
	///
	/// Returns `false` when another caller already replaced or invalidated the credential.
	pub fn invalidate_if_current(&self, rejected: &Credential) -> bool {
		self.mark_rejected(Some(rejected), OffsetDateTime::now_utc())
	}

	fn valid_cached(&self, now: OffsetDateTime) -> Option<Arc<Credential>> {
		let guard = self.state.cached.load();

		(*guard)
			.as_ref()
			.filter(|credential| {
				matches!(credential.status_with_skew(now, self.refresh_skew), CredentialStatus::Valid)
			})
			.cloned()
	}

	fn mark_rejected(&self, expected: Option<&Credential>, now: OffsetDateTime) -> bool {
		let mut changed = false;

		self.state.cached.rcu(|current| {
			changed = false;

			match current {
				Some(credential)
					if !credential.is_rejected()
						&& expected.is_none_or(|other| other.token == credential.token) =>
				{
					let mut rejected = Credential::clone(credential);

					rejected.reject(now);
					changed = true;

					Some(Arc::new(rejected))
				},
				other => other.clone(),
			}
		});

		changed
	}

	fn start_refresh(&self, now: OffsetDateTime) -> SharedRefresh {
		let state = self.state.clone();
		let source = self.source.clone();
		let skew = self.refresh_skew;
		let previous = state.cached.load_full();
		let span = CallSpan::new("credential_refresh", CallStage::Refresh);

		obs::record_call_outcome(CallStage::Refresh, StageOutcome::Attempt);

		let refresh = async move {
			state.metrics.record_attempt();

			let result = source.refresh(previous.as_deref()).await.and_then(|credential| {
				match credential.status_with_skew(now, skew) {
					CredentialStatus::Valid => Ok(Arc::new(credential)),
					_ => Err(RefreshError::Stale),
				}
			});

			match &result {
				Ok(credential) => {
					state.cached.store(Some(credential.clone()));
					state.metrics.record_success();
					obs::record_call_outcome(CallStage::Refresh, StageOutcome::Success);
				},
				Err(_) => {
					state.metrics.record_failure();
					obs::record_call_outcome(CallStage::Refresh, StageOutcome::Failure);
				},
			}

			state.inflight.lock().take();

			result
		};

		span.instrument(refresh).boxed().shared()
	}
}
impl Debug for CredentialManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager")
			.field("cached", &self.state.cached.load_full())
			.field("refresh_in_flight", &self.state.inflight.lock().is_some())
			.field("refresh_skew", &self.refresh_skew)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{CredentialFuture, StaticCredentialSource};

	struct FailingSource;
	impl CredentialSource for FailingSource {
		fn refresh<'a>(&'a self, _previous: Option<&'a Credential>) -> CredentialFuture<'a> {
			Box::pin(async { Err(RefreshError::Unreachable { message: "auth down".into() }) })
		}
	}

	fn credential(token: &str, expires_at: OffsetDateTime) -> Credential {
		Credential::builder(token)
			.issued_at(expires_at - Duration::hours(1))
			.expires_at(expires_at)
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn valid_cache_is_served_without_refresh() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let manager = CredentialManager::new(Arc::new(FailingSource))
			.with_credential(credential("cached", expires));
		let current = manager
			.current_credential_at(macros::datetime!(2025-01-01 00:30 UTC))
			.await
			.expect("Valid cached credential should be served.");

		assert_eq!(current.token.expose(), "cached");
		assert_eq!(manager.metrics().attempts(), 0);
	}

	#[tokio::test]
	async fn failed_refresh_is_not_cached() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let manager = CredentialManager::new(Arc::new(FailingSource))
			.with_credential(credential("old", expires));
		let err = manager
			.current_credential_at(macros::datetime!(2025-01-01 02:00 UTC))
			.await
			.expect_err("Refresh failures should surface.");

		assert!(matches!(err, Error::AuthRefreshFailed(RefreshError::Unreachable { .. })));

		let cached = manager.cached().expect("Previous credential should remain for inspection.");

		assert_eq!(cached.token.expose(), "old");
		assert_eq!(manager.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn invalidate_forces_refresh() {
		let manager = CredentialManager::new(Arc::new(StaticCredentialSource::new("fresh")))
			.with_credential(credential("stale", OffsetDateTime::now_utc() + Duration::hours(1)));

		manager.invalidate();

		let current = manager.current_credential().await.expect("Refresh should succeed.");

		assert_eq!(current.token.expose(), "fresh");
		assert_eq!(manager.refresh_count(), 1);
	}

	#[tokio::test]
	async fn invalidate_if_current_ignores_replaced_credentials() {
		let manager = CredentialManager::new(Arc::new(StaticCredentialSource::new("newer")))
			.with_credential(credential("older", OffsetDateTime::now_utc() + Duration::hours(1)));
		let older = manager.cached().expect("Seeded credential should be cached.");

		manager.invalidate();

		let newer = manager.current_credential().await.expect("Refresh should succeed.");

		assert!(!manager.invalidate_if_current(&older));
		assert!(manager.cached().is_some_and(|cached| cached.is_valid()));
		assert!(manager.invalidate_if_current(&newer));
		assert!(manager.cached().is_some_and(|cached| cached.is_rejected()));
	}

	#[tokio::test]
	async fn skew_refreshes_before_expiry() {
		let now = OffsetDateTime::now_utc();
		let manager = CredentialManager::new(Arc::new(StaticCredentialSource::new("fresh")))
			.with_credential(credential("expiring", now + Duration::seconds(10)))
			.with_refresh_skew(Duration::seconds(30));
		let current = manager.current_credential().await.expect("Refresh should succeed.");

		assert_eq!(current.token.expose(), "fresh");
	}
}
