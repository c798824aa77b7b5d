//! Relay-level error types shared across the enforcer, limiter, credential manager, and dispatcher.

// self
use crate::{_prelude::*, auth::RefreshError, contract::ContractViolation};

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
///
/// Every variant carries structured detail (field names, retry hints, or the underlying cause)
/// so callers can act without parsing the rendered message.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The request is missing required parameters or carries invalid ones.
	#[error(transparent)]
	ContractViolation(#[from] ContractViolation),
	/// The server rejected the credential, even after one refresh.
	#[error("Remote API rejected the credential (HTTP {status}).")]
	AuthRejected {
		/// HTTP status returned with the final rejection.
		status: u16,
	},
	/// The credential could not be refreshed.
	#[error("Credential refresh failed.")]
	AuthRefreshFailed(
		#[from]
		#[source]
		RefreshError,
	),
	/// The call exceeded a local or remote rate budget.
	#[error("Call was rate limited by the {origin} budget; retry after {retry_after}.")]
	RateLimited {
		/// Time to wait before the call can be admitted.
		retry_after: Duration,
		/// Which side enforced the limit.
		origin: RateLimitOrigin,
	},
	/// Network, timeout, or unexpected upstream failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Contract snapshot persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::contract::StoreError,
	),
}
impl Error {
	/// Classifies the failure by who has to act on it.
	pub fn class(&self) -> FailureClass {
		match self {
			Self::ContractViolation(_) | Self::Config(_) => FailureClass::CallerFixable,
			Self::RateLimited { .. } => FailureClass::RetryLater,
			Self::AuthRejected { .. }
			| Self::AuthRefreshFailed(_)
			| Self::Transport(_)
			| Self::Storage(_) => FailureClass::Infrastructure,
		}
	}

	/// Retry hint carried by rate-limit failures.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after, .. } => Some(*retry_after),
			_ => None,
		}
	}
}

/// Coarse grouping of failures by the party expected to resolve them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
	/// The caller must change the call (missing fields, unknown operation).
	CallerFixable,
	/// The call may succeed unchanged after waiting.
	RetryLater,
	/// Credentials, network, or upstream are broken.
	Infrastructure,
}

/// Side that enforced a rate limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOrigin {
	/// The relay's own sliding-window budget denied the call.
	Local,
	/// The remote API answered with a rate rejection.
	Remote,
}
impl Display for RateLimitOrigin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Local => f.write_str("local"),
			Self::Remote => f.write_str("remote"),
		}
	}
}

/// Configuration and validation failures raised by the relay.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid at `{path}`.")]
	Parse {
		/// Path to the offending field.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// A URL could not be built from the base URL and operation path.
	#[error("Endpoint URL `{value}` is invalid.")]
	InvalidUrl {
		/// Raw value that failed to parse.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// No contract is registered for the requested operation.
	#[error("No contract is registered for operation `{operation}`.")]
	UnknownOperation {
		/// Operation name supplied by the caller.
		operation: String,
	},
	/// The operation exists but not in the requested version.
	#[error("Operation `{operation}` has no contract version `{version}`.")]
	UnknownVersion {
		/// Operation name supplied by the caller.
		operation: String,
		/// Version label supplied by the caller.
		version: String,
	},
	/// Contract registration failed.
	#[error(transparent)]
	Contract(#[from] crate::contract::ContractError),
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::id::IdentifierError),
	/// Parameter name validation failed.
	#[error(transparent)]
	Parameter(#[from] crate::contract::ParameterValidationError),
	/// Rate-limit policy values are out of range.
	#[error(transparent)]
	RatePolicy(#[from] crate::rate_limit::RatePolicyError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Parse { path, source: e.into_inner() }
	}
}

/// Transport-level failures (network, timeout, unexpected upstream status).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call did not complete within its timeout.
	#[error("Remote API call timed out.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote API.")]
	Io(#[from] std::io::Error),
	/// The remote API answered with a status the relay cannot act on.
	#[error("Remote API returned unexpected HTTP {status}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Truncated response body for operators.
		body_preview: Option<String>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
