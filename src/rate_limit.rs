//! Sliding-window rate limiting keyed by rate scope.
//!
//! Each scope owns a [`RateBudget`] behind its own mutex, so admissions for different scopes
//! proceed in parallel while admissions for the same scope are serialized. The limiter never
//! waits: a call over budget is denied immediately with the time until a slot frees up.

pub mod budget;

pub use budget::RateBudget;

// self
use crate::{
	_prelude::*,
	config::RelayConfig,
	error::ConfigError,
	http::OutboundRequest,
	id::RateScope,
};

/// Errors raised when a rate policy is out of range.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RatePolicyError {
	/// The window must be strictly positive.
	#[error("Rate-limit window must be positive.")]
	NonPositiveWindow,
	/// At least one call must be allowed per window.
	#[error("Rate-limit max_calls must be at least 1.")]
	ZeroCalls,
	/// The window exceeds [`RatePolicy::MAX_WINDOW`].
	#[error("Rate-limit window must not exceed 365 days.")]
	WindowTooLarge,
}

/// Maximum number of calls admitted within any sliding window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RatePolicy {
	window: Duration,
	max_calls: u32,
}
impl RatePolicy {
	/// Longest window a policy may span.
	pub const MAX_WINDOW: Duration = Duration::days(365);

	/// Creates a policy admitting `max_calls` per `window`.
	pub fn new(window: Duration, max_calls: u32) -> Result<Self, RatePolicyError> {
		if !window.is_positive() {
			return Err(RatePolicyError::NonPositiveWindow);
		}
		if window > Self::MAX_WINDOW {
			return Err(RatePolicyError::WindowTooLarge);
		}
		if max_calls == 0 {
			return Err(RatePolicyError::ZeroCalls);
		}

		Ok(Self { window, max_calls })
	}

	/// Window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Calls admitted per window.
	pub fn max_calls(&self) -> u32 {
		self.max_calls
	}
}

/// Result of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
	/// The call may proceed; it has been recorded against the budget.
	Admitted,
	/// The budget is exhausted.
	Denied {
		/// Time until the call would be admitted.
		retry_after: Duration,
	},
}
impl Admission {
	/// Returns `true` for [`Admission::Admitted`].
	pub fn is_admitted(&self) -> bool {
		matches!(self, Self::Admitted)
	}
}

/// How outbound requests map onto rate scopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKeying {
	/// One budget shared by every call.
	#[default]
	Global,
	/// One budget per operation name.
	PerOperation,
	/// One budget per method and contract path template, shared by every resource it addresses.
	PerEndpoint,
}
impl ScopeKeying {
	/// Resolves the scope a request is charged against.
	///
	/// Operation keys read `op:<operation>` and endpoint keys `<METHOD>:<path template>`, so
	/// `/orders/{id}` is one budget no matter which id is addressed. Endpoint keys that are not
	/// valid scope identifiers (e.g. overly long templates) fall back to the operation key.
	pub fn resolve(self, request: &OutboundRequest) -> RateScope {
		match self {
			Self::Global => RateScope::global(),
			Self::PerOperation => RateScope::for_operation(&request.operation),
			Self::PerEndpoint =>
				RateScope::new(format!("{}:{}", request.method, request.path_template))
					.unwrap_or_else(|_| RateScope::for_operation(&request.operation)),
		}
	}
}

type BudgetMap = HashMap<RateScope, Arc<Mutex<RateBudget>>>;

/// Per-scope sliding-window rate limiter.
///
/// Scopes without an explicit policy use the default policy; with no default they are
/// unlimited (though still subject to cooldowns from [`penalize`](Self::penalize)).
#[derive(Debug, Default)]
pub struct RateLimiter {
	policies: HashMap<RateScope, RatePolicy>,
	default_policy: Option<RatePolicy>,
	budgets: RwLock<BudgetMap>,
}
impl RateLimiter {
	/// Creates a limiter with no policies (every scope unlimited).
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a limiter from the configured scoped and default policies.
	pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
		let mut limiter = Self::new();

		for limit in &config.rate_limits {
			limiter = limiter.with_policy(limit.scope.clone(), limit.policy()?);
		}
		if let Some(default) = &config.default_rate_limit {
			limiter = limiter.with_default_policy(default.policy()?);
		}

		Ok(limiter)
	}

	/// Sets the policy for one scope.
	pub fn with_policy(mut self, scope: RateScope, policy: RatePolicy) -> Self {
		self.budgets.get_mut().remove(&scope);
		self.policies.insert(scope, policy);

		self
	}

	/// Sets the policy applied to scopes without their own.
	pub fn with_default_policy(mut self, policy: RatePolicy) -> Self {
		self.default_policy = Some(policy);

		self
	}

	/// Policy enforced for `scope`, if any.
	pub fn policy_for(&self, scope: &RateScope) -> Option<RatePolicy> {
		self.policies.get(scope).copied().or(self.default_policy)
	}

	/// Checks and records admission for `scope` against the current clock.
	pub fn try_acquire(&self, scope: &RateScope) -> Admission {
		self.try_acquire_at(scope, OffsetDateTime::now_utc())
	}

	/// Same as [`try_acquire`](Self::try_acquire) with an explicit clock reading.
	pub fn try_acquire_at(&self, scope: &RateScope, now: OffsetDateTime) -> Admission {
		match self.budget(scope, false) {
			Some(budget) => budget.lock().try_acquire_at(now),
			None => Admission::Admitted,
		}
	}

	/// Blocks `scope` until `until`, typically after the remote API answered with a rate rejection.
	pub fn penalize(&self, scope: &RateScope, until: OffsetDateTime) {
		if let Some(budget) = self.budget(scope, true) {
			budget.lock().penalize(until);
		}
	}

	/// Remaining admissions for `scope` at `now`; `None` when the scope is unlimited.
	pub fn remaining_at(&self, scope: &RateScope, now: OffsetDateTime) -> Option<u32> {
		match self.budget(scope, false) {
			Some(budget) => budget.lock().remaining_at(now),
			None => None,
		}
	}

	fn budget(&self, scope: &RateScope, create_unlimited: bool) -> Option<Arc<Mutex<RateBudget>>> {
		if let Some(budget) = self.budgets.read().get(scope) {
			return Some(budget.clone());
		}

		let policy = self.policy_for(scope);

		if policy.is_none() && !create_unlimited {
			return None;
		}

		let mut budgets = self.budgets.write();

		Some(
			budgets
				.entry(scope.clone())
				.or_insert_with(|| Arc::new(Mutex::new(RateBudget::new(policy))))
				.clone(),
		)
	}
}
