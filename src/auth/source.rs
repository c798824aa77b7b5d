//! Authentication collaborator contract used by the credential manager.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialBuildError},
};

/// Boxed future returned by [`CredentialSource::refresh`].
pub type CredentialFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, RefreshError>> + 'a + Send>>;

/// External authentication collaborator that issues credentials.
///
/// The token format and expiry semantics are opaque to the relay. Implementations are expected
/// to impose their own timeouts and surface them as [`RefreshError::Timeout`].
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Issues a new credential, optionally informed by the one being replaced.
	fn refresh<'a>(&'a self, previous: Option<&'a Credential>) -> CredentialFuture<'a>;
}

/// Failures raised while acquiring a new credential.
///
/// The type is `Clone` so every caller waiting on a shared refresh observes the same failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RefreshError {
	/// The authentication collaborator could not be reached.
	#[error("Authentication service is unreachable: {message}.")]
	Unreachable {
		/// Collaborator-supplied detail.
		message: String,
	},
	/// The authentication collaborator refused to issue a credential.
	#[error("Authentication service rejected the refresh: {reason}.")]
	Rejected {
		/// Collaborator-supplied reason.
		reason: String,
	},
	/// The refresh did not complete in time.
	#[error("Credential refresh timed out.")]
	Timeout,
	/// The collaborator returned malformed credential data.
	#[error("Authentication service returned an invalid credential.")]
	Invalid(#[from] CredentialBuildError),
	/// The collaborator returned a credential that is already unusable.
	#[error("Authentication service returned an already expired credential.")]
	Stale,
}

/// Source that always hands out the same token; handy for demos and static API keys.
#[derive(Clone, Debug)]
pub struct StaticCredentialSource {
	token: String,
	ttl: Option<Duration>,
}
impl StaticCredentialSource {
	/// Creates a source issuing `token` with no known expiry.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: token.into(), ttl: None }
	}

	/// Issues credentials valid for `ttl` from the moment of each refresh.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);

		self
	}
}
impl CredentialSource for StaticCredentialSource {
	fn refresh<'a>(&'a self, _previous: Option<&'a Credential>) -> CredentialFuture<'a> {
		Box::pin(async move {
			let mut builder = Credential::builder(self.token.clone()).issued_now();

			if let Some(ttl) = self.ttl {
				builder = builder.expires_in(ttl);
			}

			Ok(builder.build()?)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn static_source_issues_configured_token() {
		let source = StaticCredentialSource::new("api-key").with_ttl(Duration::minutes(5));
		let credential = source.refresh(None).await.expect("Static source should issue a token.");

		assert_eq!(credential.token.expose(), "api-key");
		assert!(credential.expires_at.is_some());
		assert!(credential.is_valid());
	}

	#[tokio::test]
	async fn static_source_surfaces_invalid_tokens() {
		let err = StaticCredentialSource::new("")
			.refresh(None)
			.await
			.expect_err("Empty static tokens must be rejected.");

		assert_eq!(err, RefreshError::Invalid(CredentialBuildError::EmptyToken));
	}
}
