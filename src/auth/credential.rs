//! Credential structs, validity helpers, and builders.

// self
use crate::{_prelude::*, auth::secret::CredentialSecret};

/// Current lifecycle status for a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Credential may be attached to outbound calls.
	Valid,
	/// Credential reached its expiry instant.
	Expired,
	/// The remote API rejected the credential or the relay invalidated it.
	Rejected,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuildError {
	/// Issued when the token value is empty.
	#[error("Credential token cannot be empty.")]
	EmptyToken,
	/// Issued when the expiry does not come after the issued-at instant.
	#[error("Credential expiry must be later than its issued-at instant.")]
	ExpiryNotAfterIssue,
	/// Issued when a relative expiry lands outside the representable calendar.
	#[error("Credential expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Authentication token plus its known validity window.
///
/// An unknown expiry means the credential stays valid until the server rejects it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Token value; callers must avoid logging it.
	pub token: CredentialSecret,
	/// Issued-at instant reported by the authentication collaborator.
	pub issued_at: OffsetDateTime,
	/// Expiry instant, when the collaborator reports one.
	pub expires_at: Option<OffsetDateTime>,
	/// Instant the credential was rejected or invalidated.
	pub rejected_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for the provided token value.
	pub fn builder(token: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(token)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		self.status_with_skew(instant, Duration::ZERO)
	}

	/// Computes the status treating the credential as expired `skew` before its expiry.
	pub fn status_with_skew(&self, instant: OffsetDateTime, skew: Duration) -> CredentialStatus {
		if self.rejected_at.is_some() {
			return CredentialStatus::Rejected;
		}

		match self.expires_at {
			// A horizon past the calendar end is beyond any expiry.
			Some(expires_at)
				if instant.checked_add(skew).is_none_or(|horizon| horizon >= expires_at) =>
				CredentialStatus::Expired,
			_ => CredentialStatus::Valid,
		}
	}

	/// Returns `true` if the credential can be used at the provided instant.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Valid)
	}

	/// Returns `true` if the credential is usable relative to the current clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` once the credential has been rejected.
	pub fn is_rejected(&self) -> bool {
		self.rejected_at.is_some()
	}

	/// Marks the credential as rejected.
	pub fn reject(&mut self, instant: OffsetDateTime) {
		self.rejected_at = Some(instant);
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &self.token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("rejected_at", &self.rejected_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	token: CredentialSecret,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(token: impl Into<String>) -> Self {
		Self { token: CredentialSecret::new(token), issued_at: None, expires_at: None, expires_in: None }
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuildError> {
		if self.token.is_empty() {
			return Err(CredentialBuildError::EmptyToken);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) =>
				Some(issued_at.checked_add(delta).ok_or(CredentialBuildError::ExpiryOutOfRange)?),
			(None, None) => None,
		};

		if expires_at.is_some_and(|instant| instant <= issued_at) {
			return Err(CredentialBuildError::ExpiryNotAfterIssue);
		}

		Ok(Credential { token: self.token, issued_at, expires_at, rejected_at: None })
	}
}
