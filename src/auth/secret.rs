//! Credential token wrapper that never prints its contents.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Opaque token value.
///
/// `Debug` and `Display` redact the token. Use [`fingerprint`](Self::fingerprint) to correlate
/// credentials in logs without exposing them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSecret(Box<str>);
impl CredentialSecret {
	/// Wraps a token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into().into_boxed_str())
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the wrapped token is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// First 8 bytes of the token's SHA-256 digest, hex encoded.
	pub fn fingerprint(&self) -> String {
		Sha256::digest(self.0.as_bytes())[..8].iter().map(|b| format!("{b:02x}")).collect()
	}
}
impl PartialEq for CredentialSecret {
	// Length leaks, content does not.
	fn eq(&self, other: &Self) -> bool {
		let (lhs, rhs) = (self.0.as_bytes(), other.0.as_bytes());

		lhs.len() == rhs.len() && lhs.iter().zip(rhs).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
	}
}
impl Eq for CredentialSecret {}
impl Debug for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CredentialSecret(<redacted {}>)", self.fingerprint())
	}
}
impl Display for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
