// std
use std::sync::atomic::{AtomicU32, Ordering};
// crates.io
use futures_util::future;
use time::macros;
// self
use api_relay::{
	_preludet::*,
	auth::{Credential, CredentialFuture, CredentialManager, CredentialSource, RefreshError},
};

const T0: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

/// Source that takes a while to answer, so concurrent callers overlap with the refresh.
#[derive(Default)]
struct SlowSource {
	calls: AtomicU32,
	fail: bool,
}
impl CredentialSource for SlowSource {
	fn refresh<'a>(&'a self, _previous: Option<&'a Credential>) -> CredentialFuture<'a> {
		Box::pin(async move {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			tokio::time::sleep(std::time::Duration::from_millis(50)).await;

			if self.fail {
				return Err(RefreshError::Rejected { reason: "revoked client".into() });
			}

			Ok(Credential::builder(format!("fresh-{n}"))
				.issued_at(T0 + Duration::milliseconds(600))
				.expires_at(T0 + Duration::hours(1))
				.build()?)
		})
	}
}

fn expiring_at_500() -> Credential {
	Credential::builder("stale")
		.issued_at(T0)
		.expires_at(T0 + Duration::milliseconds(500))
		.build()
		.expect("Expiring credential fixture should build.")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_concurrent_callers_share_one_refresh() {
	let source = Arc::new(SlowSource::default());
	let manager = CredentialManager::new(source.clone()).with_credential(expiring_at_500());
	let now = T0 + Duration::milliseconds(600);
	let results = future::join_all((0..5).map(|_| {
		let manager = manager.clone();

		tokio::spawn(async move { manager.current_credential_at(now).await })
	}))
	.await;

	for result in results {
		let credential = result
			.expect("Caller task should not panic.")
			.expect("Shared refresh should succeed.");

		assert_eq!(credential.token.expose(), "fresh-1");
	}

	assert_eq!(source.calls.load(Ordering::SeqCst), 1);
	assert_eq!(manager.metrics().attempts(), 1);
	assert_eq!(manager.metrics().coalesced(), 4);
	assert_eq!(manager.metrics().successes(), 1);
}

#[tokio::test]
async fn concurrent_callers_observe_the_same_failure() {
	let source = Arc::new(SlowSource { fail: true, ..Default::default() });
	let manager = CredentialManager::new(source.clone()).with_credential(expiring_at_500());
	let now = T0 + Duration::milliseconds(600);
	let results = future::join_all((0..3).map(|_| manager.current_credential_at(now))).await;

	for result in results {
		assert!(matches!(result, Err(Error::AuthRefreshFailed(RefreshError::Rejected { .. }))));
	}

	assert_eq!(source.calls.load(Ordering::SeqCst), 1);
	assert!(
		manager.cached().is_some_and(|cached| cached.token.expose() == "stale"),
		"A failed refresh must not replace the cache."
	);
}

#[tokio::test]
async fn cancelled_caller_does_not_cancel_the_shared_refresh() {
	let source = Arc::new(SlowSource::default());
	let manager = CredentialManager::new(source.clone()).with_credential(expiring_at_500());
	let now = T0 + Duration::milliseconds(600);
	let impatient = {
		let manager = manager.clone();

		tokio::spawn(async move { manager.current_credential_at(now).await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(10)).await;
	impatient.abort();

	let credential =
		manager.current_credential_at(now).await.expect("Remaining caller should get a credential.");

	assert_eq!(credential.token.expose(), "fresh-1");
	assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn counting_source_mints_sequential_tokens_after_invalidation() {
	let source = Arc::new(CountingSource::new(Duration::minutes(5)));
	let manager = CredentialManager::new(source.clone());
	let first = manager.current_credential().await.expect("First refresh should succeed.");

	assert_eq!(first.token.expose(), "token-1");
	assert!(manager.invalidate_if_current(&first));

	let second = manager.current_credential().await.expect("Second refresh should succeed.");

	assert_eq!(second.token.expose(), "token-2");
	assert_eq!(source.calls(), 2);
}
