//! Relay configuration document.
//!
//! [`RelayConfig`] is deserialized from JSON with path-aware errors, then handed to
//! [`ContractEnforcer::from_config`](crate::contract::ContractEnforcer::from_config),
//! [`RateLimiter::from_config`](crate::rate_limit::RateLimiter::from_config), and
//! [`Dispatcher::from_config`](crate::dispatch::Dispatcher::from_config).

// self
use crate::{
	_prelude::*,
	contract::OperationContract,
	error::ConfigError,
	id::RateScope,
	rate_limit::{RatePolicy, RatePolicyError, ScopeKeying},
};

/// Top-level relay configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
	/// Base URL every contract path is resolved against.
	pub base_url: Url,
	/// Contracts registered at startup.
	#[serde(default)]
	pub contracts: Vec<OperationContract>,
	/// Policies for specific rate scopes.
	#[serde(default)]
	pub rate_limits: Vec<ScopedRateLimit>,
	/// Policy for scopes without their own.
	#[serde(default)]
	pub default_rate_limit: Option<RateLimitConfig>,
	/// How requests map onto rate scopes.
	#[serde(default)]
	pub scope_keying: ScopeKeying,
	/// Upper bound for each remote call, in milliseconds.
	#[serde(default)]
	pub call_timeout_ms: Option<u64>,
	/// Margin before expiry at which credentials are treated as stale, in milliseconds.
	#[serde(default)]
	pub refresh_skew_ms: Option<u64>,
}
impl RelayConfig {
	/// Creates a configuration with no contracts or limits.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			contracts: Vec::new(),
			rate_limits: Vec::new(),
			default_rate_limit: None,
			scope_keying: ScopeKeying::default(),
			call_timeout_ms: None,
			refresh_skew_ms: None,
		}
	}

	/// Parses a JSON document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}

	/// Parses a JSON document from bytes.
	pub fn from_json_slice(raw: &[u8]) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_slice(raw);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}

	/// Per-call timeout, if configured.
	pub fn call_timeout(&self) -> Option<Duration> {
		self.call_timeout_ms.map(millis)
	}

	/// Credential refresh skew, if configured.
	pub fn refresh_skew(&self) -> Option<Duration> {
		self.refresh_skew_ms.map(millis)
	}
}

/// Window and budget of a rate policy as written in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Window length in milliseconds.
	pub window_ms: u64,
	/// Calls admitted per window.
	pub max_calls: u32,
}
impl RateLimitConfig {
	/// Validates the values into a [`RatePolicy`].
	pub fn policy(&self) -> Result<RatePolicy, RatePolicyError> {
		RatePolicy::new(millis(self.window_ms), self.max_calls)
	}
}

/// Rate policy bound to a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRateLimit {
	/// Scope the policy applies to.
	pub scope: RateScope,
	/// Window length in milliseconds.
	pub window_ms: u64,
	/// Calls admitted per window.
	pub max_calls: u32,
}
impl ScopedRateLimit {
	/// Validates the values into a [`RatePolicy`].
	pub fn policy(&self) -> Result<RatePolicy, RatePolicyError> {
		RateLimitConfig { window_ms: self.window_ms, max_calls: self.max_calls }.policy()
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::rate_limit::RateLimiter;

	const SAMPLE: &str = r#"{
		"base_url": "https://api.example.com/v1/",
		"contracts": [
			{ "operation": "getProducts", "path": "/products", "required": ["category"] },
			{ "operation": "createOrder", "method": "POST", "path": "/orders", "required": ["sku"] }
		],
		"rate_limits": [{ "scope": "op:getProducts", "window_ms": 1000, "max_calls": 3 }],
		"default_rate_limit": { "window_ms": 60000, "max_calls": 100 },
		"scope_keying": "per_operation",
		"call_timeout_ms": 5000
	}"#;

	#[test]
	fn sample_document_parses() {
		let config = RelayConfig::from_json_str(SAMPLE).expect("Sample config should parse.");

		assert_eq!(config.contracts.len(), 2);
		assert_eq!(config.scope_keying, ScopeKeying::PerOperation);
		assert_eq!(config.call_timeout(), Some(Duration::seconds(5)));
		assert_eq!(config.refresh_skew(), None);
		assert_eq!(
			config.rate_limits[0].policy().expect("Scoped policy should be valid.").max_calls(),
			3
		);
	}

	#[test]
	fn parse_errors_carry_the_field_path() {
		let raw = SAMPLE.replace("\"max_calls\": 3", "\"max_calls\": \"three\"");
		let err = RelayConfig::from_json_slice(raw.as_bytes()).expect_err("String budget must fail.");

		assert!(
			matches!(&err, ConfigError::Parse { path, .. } if path == "rate_limits[0].max_calls"),
			"Unexpected error: {err:?}"
		);
	}

	#[test]
	fn zero_budgets_are_rejected_on_validation() {
		let limit = RateLimitConfig { window_ms: 1_000, max_calls: 0 };

		assert_eq!(limit.policy(), Err(RatePolicyError::ZeroCalls));
	}

	#[test]
	fn oversized_windows_are_rejected_on_validation() {
		let raw = SAMPLE.replace("\"window_ms\": 60000", "\"window_ms\": 1000000000000000");
		let config = RelayConfig::from_json_str(&raw).expect("Large windows should still parse.");
		let limit = config.default_rate_limit.expect("Sample config should carry a default limit.");

		assert_eq!(limit.policy(), Err(RatePolicyError::WindowTooLarge));
		assert!(matches!(
			RateLimiter::from_config(&config),
			Err(ConfigError::RatePolicy(RatePolicyError::WindowTooLarge))
		));
		assert_eq!(
			RateLimitConfig { window_ms: u64::MAX, max_calls: 1 }.policy(),
			Err(RatePolicyError::WindowTooLarge)
		);
	}
}
