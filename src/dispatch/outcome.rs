//! Terminal outcome of a dispatched call.

// self
use crate::{
	_prelude::*,
	auth::RefreshError,
	contract::ContractViolation,
	error::{RateLimitOrigin, TransportError},
	http::ApiResponse,
};

/// Flattened view of a call's terminal state, convenient for `match`-heavy callers.
#[derive(Debug)]
pub enum CallOutcome {
	/// The remote API accepted the call.
	Success(ApiResponse),
	/// Required parameters were missing or the server refused supplied ones.
	ContractViolation(ContractViolation),
	/// The credential was rejected twice.
	AuthRejected {
		/// HTTP status of the final rejection.
		status: u16,
	},
	/// The credential could not be refreshed.
	AuthRefreshFailed(RefreshError),
	/// A local or remote rate budget refused the call.
	RateLimited {
		/// Time to wait before retrying.
		retry_after: Duration,
		/// Which side enforced the limit.
		origin: RateLimitOrigin,
	},
	/// Network failure, timeout, or unexpected status.
	TransportFailure(TransportError),
	/// Local configuration or persistence problem.
	Internal(Error),
}
impl CallOutcome {
	/// Returns `true` for [`CallOutcome::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Stable label suitable for logs and metrics.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Success(_) => "success",
			Self::ContractViolation(_) => "contract_violation",
			Self::AuthRejected { .. } => "auth_rejected",
			Self::AuthRefreshFailed(_) => "auth_refresh_failed",
			Self::RateLimited { .. } => "rate_limited",
			Self::TransportFailure(_) => "transport_failure",
			Self::Internal(_) => "internal",
		}
	}

	/// Converts back into the dispatcher's `Result` form.
	pub fn into_result(self) -> Result<ApiResponse> {
		match self {
			Self::Success(response) => Ok(response),
			Self::ContractViolation(violation) => Err(violation.into()),
			Self::AuthRejected { status } => Err(Error::AuthRejected { status }),
			Self::AuthRefreshFailed(err) => Err(err.into()),
			Self::RateLimited { retry_after, origin } => Err(Error::RateLimited { retry_after, origin }),
			Self::TransportFailure(err) => Err(err.into()),
			Self::Internal(err) => Err(err),
		}
	}
}
impl From<Result<ApiResponse>> for CallOutcome {
	fn from(result: Result<ApiResponse>) -> Self {
		match result {
			Ok(response) => Self::Success(response),
			Err(Error::ContractViolation(violation)) => Self::ContractViolation(violation),
			Err(Error::AuthRejected { status }) => Self::AuthRejected { status },
			Err(Error::AuthRefreshFailed(err)) => Self::AuthRefreshFailed(err),
			Err(Error::RateLimited { retry_after, origin }) => Self::RateLimited { retry_after, origin },
			Err(Error::Transport(err)) => Self::TransportFailure(err),
			Err(err @ (Error::Config(_) | Error::Storage(_))) => Self::Internal(err),
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Success(response) => write!(f, "success (HTTP {})", response.status),
			other => f.write_str(other.as_str()),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn results_map_onto_outcomes() {
		let ok = CallOutcome::from(Ok(ApiResponse::new(200, "{}")));
		let limited = CallOutcome::from(Err(Error::RateLimited {
			retry_after: Duration::milliseconds(700),
			origin: RateLimitOrigin::Local,
		}));
		let violation = CallOutcome::from(Err(ContractViolation::missing(["category"]).into()));

		assert!(ok.is_success());
		assert_eq!(ok.to_string(), "success (HTTP 200)");
		assert!(matches!(
			limited,
			CallOutcome::RateLimited { origin: RateLimitOrigin::Local, retry_after } if retry_after == Duration::milliseconds(700)
		));
		assert_eq!(violation.as_str(), "contract_violation");
		assert!(matches!(violation.into_result(), Err(Error::ContractViolation(_))));
	}
}
