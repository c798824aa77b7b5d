//! Request signing: how a credential is attached to an outbound request.

// self
use crate::{_prelude::*, auth::Credential, http::OutboundRequest};

/// Attaches a [`Credential`] to an outbound request without constraining the token format.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Injects authorization state derived from `credential` into `request`.
	fn sign(&self, request: &mut OutboundRequest, credential: &Credential);
}

/// Sends the token as `Authorization: Bearer <token>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
impl RequestSigner for BearerSigner {
	fn sign(&self, request: &mut OutboundRequest, credential: &Credential) {
		request
			.headers
			.insert("authorization".into(), format!("Bearer {}", credential.token.expose()));
	}
}

/// Sends the token in a custom header, optionally behind a prefix (e.g. `X-Api-Key: <token>`).
#[derive(Clone, Debug)]
pub struct HeaderSigner {
	name: String,
	prefix: Option<String>,
}
impl HeaderSigner {
	/// Places the raw token in header `name`.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self { name: name.as_ref().to_ascii_lowercase(), prefix: None }
	}

	/// Prepends `prefix` and a space to the token (e.g. `Token`).
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());

		self
	}
}
impl RequestSigner for HeaderSigner {
	fn sign(&self, request: &mut OutboundRequest, credential: &Credential) {
		let token = credential.token.expose();
		let value = match &self.prefix {
			Some(prefix) => format!("{prefix} {token}"),
			None => token.to_owned(),
		};

		request.headers.insert(self.name.clone(), value);
	}
}
