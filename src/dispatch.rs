//! Request dispatcher composing the contract enforcer, rate limiter, and credential manager.
//!
//! Every call walks an explicit state machine:
//!
//! ```text
//! Preparing -> RateChecking -> Authenticating -> Sending -> Succeeded
//!                   ^                               |
//!                   +---------- Retrying <----------+  (auth rejection, once)
//!                                                   +-> Failed
//! ```
//!
//! A rejected credential is invalidated and the call is retried exactly once, re-entering the
//! rate check so the retry is charged against the budget like any other call. A validation
//! rejection tightens the operation's contract and fails without retrying. A remote rate
//! rejection puts the scope on cooldown so subsequent calls fail locally until it elapses.

mod metrics;

pub mod outcome;
pub mod signer;

pub use metrics::DispatchMetrics;
pub use outcome::CallOutcome;
pub use signer::*;

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialManager, CredentialSource},
	config::RelayConfig,
	contract::{ContractEnforcer, ContractStore, ContractViolation, Parameters},
	error::{ConfigError, RateLimitOrigin, TransportError},
	http::{ApiResponse, ApiTransport, OutboundRequest},
	id::{ContractVersion, RateScope},
	obs::{self, CallSpan, CallStage, StageOutcome},
	rate_limit::{Admission, RateLimiter, ScopeKeying},
	strategy::{DefaultResponseStrategy, ResponseKind, ResponseStrategy},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Dispatcher specialized for the crate's default reqwest transport.
pub type ReqwestDispatcher = Dispatcher<ReqwestTransport>;

const MAX_AUTH_RETRIES: u8 = 1;

/// Stages of a dispatched call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
	/// Validating and augmenting parameters against the contract.
	Preparing,
	/// Consulting the rate limiter.
	RateChecking,
	/// Obtaining a valid credential.
	Authenticating,
	/// Waiting on the remote API.
	Sending,
	/// Re-entering the rate check after a credential rejection.
	Retrying,
	/// Terminal success.
	Succeeded,
	/// Terminal failure.
	Failed,
}
impl CallState {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallState::Preparing => "preparing",
			CallState::RateChecking => "rate_checking",
			CallState::Authenticating => "authenticating",
			CallState::Sending => "sending",
			CallState::Retrying => "retrying",
			CallState::Succeeded => "succeeded",
			CallState::Failed => "failed",
		}
	}
}
impl Display for CallState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A logical call: operation name plus whatever the caller knows about its parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiCall {
	/// Operation to invoke.
	pub operation: String,
	/// Explicit contract version; the active version when absent.
	pub version: Option<ContractVersion>,
	/// Caller-supplied parameters.
	pub parameters: Parameters,
	/// JSON body for methods that carry one.
	pub body: Option<JsonValue>,
	/// Extra headers; override contract headers of the same name.
	pub headers: BTreeMap<String, String>,
	/// Rate scope override for this call.
	pub scope: Option<RateScope>,
	/// Timeout override for this call.
	pub timeout: Option<Duration>,
}
impl ApiCall {
	/// Starts a call for `operation`.
	pub fn new(operation: impl Into<String>) -> Self {
		Self { operation: operation.into(), ..Default::default() }
	}

	/// Adds one parameter.
	pub fn param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
		self.parameters.insert(name.into(), value.into());

		self
	}

	/// Adds several parameters.
	pub fn params<I, K, V>(mut self, parameters: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<JsonValue>,
	{
		self.parameters.extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Targets an explicit contract version.
	pub fn version(mut self, version: ContractVersion) -> Self {
		self.version = Some(version);

		self
	}

	/// Sets the JSON body.
	pub fn body(mut self, body: JsonValue) -> Self {
		self.body = Some(body);

		self
	}

	/// Adds a header.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Charges the call against `scope` instead of the dispatcher's keying.
	pub fn scope(mut self, scope: RateScope) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Overrides the dispatcher's call timeout.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

enum Step {
	Preparing,
	RateChecking(OutboundRequest),
	Authenticating(OutboundRequest, RateScope),
	Sending(OutboundRequest, RateScope, Arc<Credential>),
	Retrying(OutboundRequest),
	Succeeded(ApiResponse),
	Failed(Error),
}
impl Step {
	fn state(&self) -> CallState {
		match self {
			Step::Preparing => CallState::Preparing,
			Step::RateChecking(..) => CallState::RateChecking,
			Step::Authenticating(..) => CallState::Authenticating,
			Step::Sending(..) => CallState::Sending,
			Step::Retrying(..) => CallState::Retrying,
			Step::Succeeded(_) => CallState::Succeeded,
			Step::Failed(_) => CallState::Failed,
		}
	}
}

/// Mediates every outbound call to the remote API.
///
/// All shared state (contracts, rate budgets, credentials) is injected, so clones of a
/// dispatcher, or several dispatchers built from the same components, observe the same state.
pub struct Dispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	contracts: Arc<ContractEnforcer>,
	limiter: Arc<RateLimiter>,
	credentials: Arc<CredentialManager>,
	strategy: Arc<dyn ResponseStrategy>,
	signer: Arc<dyn RequestSigner>,
	store: Option<Arc<dyn ContractStore>>,
	scope_keying: ScopeKeying,
	call_timeout: Option<Duration>,
	remote_backoff: Duration,
	metrics: Arc<DispatchMetrics>,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	const DEFAULT_REMOTE_BACKOFF: Duration = Duration::seconds(1);

	/// Creates a dispatcher from its collaborators with default strategy and bearer signing.
	pub fn new(
		transport: Arc<T>,
		contracts: Arc<ContractEnforcer>,
		limiter: Arc<RateLimiter>,
		credentials: Arc<CredentialManager>,
	) -> Self {
		Self {
			transport,
			contracts,
			limiter,
			credentials,
			strategy: Arc::new(DefaultResponseStrategy),
			signer: Arc::new(BearerSigner),
			store: None,
			scope_keying: ScopeKeying::default(),
			call_timeout: None,
			remote_backoff: Self::DEFAULT_REMOTE_BACKOFF,
			metrics: Default::default(),
		}
	}

	/// Builds every component from `config` around the provided transport and credential source.
	pub fn from_config(
		config: &RelayConfig,
		transport: Arc<T>,
		source: Arc<dyn CredentialSource>,
	) -> Result<Self, ConfigError> {
		let contracts = ContractEnforcer::from_config(config)?;
		let limiter = RateLimiter::from_config(config)?;
		let mut credentials = CredentialManager::new(source);

		if let Some(skew) = config.refresh_skew() {
			credentials = credentials.with_refresh_skew(skew);
		}

		let mut dispatcher =
			Self::new(transport, Arc::new(contracts), Arc::new(limiter), Arc::new(credentials))
				.with_scope_keying(config.scope_keying);

		dispatcher.call_timeout = config.call_timeout();

		Ok(dispatcher)
	}

	/// Replaces the response classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ResponseStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Replaces the credential signer.
	pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
		self.signer = signer;

		self
	}

	/// Persists the contract table to `store` whenever a contract is learned.
	pub fn with_contract_store(mut self, store: Arc<dyn ContractStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Sets how requests map onto rate scopes.
	pub fn with_scope_keying(mut self, keying: ScopeKeying) -> Self {
		self.scope_keying = keying;

		self
	}

	/// Sets the default per-call timeout handed to the transport.
	pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = Some(timeout);

		self
	}

	/// Cooldown applied after a remote rate rejection that carries no `Retry-After` hint.
	pub fn with_remote_backoff(mut self, backoff: Duration) -> Self {
		self.remote_backoff = backoff;

		self
	}

	/// Call counters for this dispatcher and its clones.
	pub fn metrics(&self) -> &DispatchMetrics {
		&self.metrics
	}

	/// Shared contract enforcer.
	pub fn contracts(&self) -> &Arc<ContractEnforcer> {
		&self.contracts
	}

	/// Shared rate limiter.
	pub fn limiter(&self) -> &Arc<RateLimiter> {
		&self.limiter
	}

	/// Shared credential manager.
	pub fn credentials(&self) -> &Arc<CredentialManager> {
		&self.credentials
	}

	/// Reapplies the attached store's snapshot to the contract table.
	///
	/// Returns how many contracts changed; zero when no store is attached or it is empty.
	pub async fn restore_contracts(&self) -> Result<usize> {
		let Some(store) = &self.store else {
			return Ok(0);
		};
		let Some(snapshot) = store.load().await? else {
			return Ok(0);
		};

		Ok(self.contracts.restore(&snapshot).map_err(ConfigError::from)?)
	}

	/// Runs `call` to a terminal state and returns the response or the failure.
	pub async fn dispatch(&self, call: ApiCall) -> Result<ApiResponse> {
		let span = CallSpan::new(&call.operation, CallStage::Dispatch);

		obs::record_call_outcome(CallStage::Dispatch, StageOutcome::Attempt);
		self.metrics.record_call();

		let result = span.instrument(self.run(&call, &span)).await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_call_outcome(CallStage::Dispatch, StageOutcome::Success);
			},
			Err(err) => {
				self.metrics.record_failure();
				obs::record_call_outcome(CallStage::Dispatch, StageOutcome::Failure);
				obs::record_call_failure(failure_label(err));
			},
		}

		result
	}

	/// Same as [`dispatch`](Self::dispatch), flattened into a [`CallOutcome`].
	pub async fn execute(&self, call: ApiCall) -> CallOutcome {
		self.dispatch(call).await.into()
	}

	async fn run(&self, call: &ApiCall, span: &CallSpan) -> Result<ApiResponse> {
		let mut auth_retries = 0_u8;
		let mut step = Step::Preparing;

		loop {
			let from = step.state();
			let next = match step {
				Step::Preparing => match self.prepare(call) {
					Ok(request) => Step::RateChecking(request),
					Err(err) => Step::Failed(err),
				},
				Step::RateChecking(request) => {
					let scope =
						call.scope.clone().unwrap_or_else(|| self.scope_keying.resolve(&request));

					match self.limiter.try_acquire(&scope) {
						Admission::Admitted => Step::Authenticating(request, scope),
						Admission::Denied { retry_after } => Step::Failed(Error::RateLimited {
							retry_after,
							origin: RateLimitOrigin::Local,
						}),
					}
				},
				Step::Authenticating(request, scope) =>
					match self.credentials.current_credential().await {
						Ok(credential) => Step::Sending(request, scope, credential),
						Err(err) => Step::Failed(err),
					},
				Step::Sending(request, scope, credential) => {
					let mut signed = request.clone();

					self.signer.sign(&mut signed, &credential);

					match self.transport.send(&signed).await {
						Ok(response) => {
							self.classify(request, scope, &credential, response, &mut auth_retries, span)
								.await
						},
						Err(err) => Step::Failed(err.into()),
					}
				},
				Step::Retrying(request) => Step::RateChecking(request),
				Step::Succeeded(response) => return Ok(response),
				Step::Failed(err) => return Err(err),
			};

			span.transition(from.as_str(), next.state().as_str());

			step = next;
		}
	}

	fn prepare(&self, call: &ApiCall) -> Result<OutboundRequest> {
		let mut request = match &call.version {
			Some(version) => self.contracts.prepare_version(&call.operation, version, &call.parameters)?,
			None => self.contracts.prepare(&call.operation, &call.parameters)?,
		};

		request.headers.extend(call.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
		request.body = call.body.clone();
		request.timeout = call.timeout.or(self.call_timeout);

		Ok(request)
	}

	async fn classify(
		&self,
		request: OutboundRequest,
		scope: RateScope,
		credential: &Credential,
		response: ApiResponse,
		auth_retries: &mut u8,
		span: &CallSpan,
	) -> Step {
		match self.strategy.classify(&response) {
			ResponseKind::Success => Step::Succeeded(response),
			ResponseKind::AuthRejected => {
				self.credentials.invalidate_if_current(credential);

				if *auth_retries < MAX_AUTH_RETRIES {
					*auth_retries += 1;
					self.metrics.record_auth_retry();

					Step::Retrying(request)
				} else {
					Step::Failed(Error::AuthRejected { status: response.status })
				}
			},
			ResponseKind::ValidationRejected { fields } =>
				Step::Failed(self.learn(&request, fields, span).await.into()),
			ResponseKind::RateRejected { retry_after } => {
				let retry_after =
					retry_after.filter(|hint| hint.is_positive()).unwrap_or(self.remote_backoff);

				let until = OffsetDateTime::now_utc()
					.checked_add(retry_after)
					.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());

				self.limiter.penalize(&scope, until);

				Step::Failed(Error::RateLimited { retry_after, origin: RateLimitOrigin::Remote })
			},
			ResponseKind::Unexpected => Step::Failed(
				TransportError::UnexpectedStatus {
					status: response.status,
					body_preview: response.body_preview(),
				}
				.into(),
			),
		}
	}

	// Fields absent from the request are learned; fields the caller did send are reported as
	// invalid and left out of the contract.
	async fn learn(
		&self,
		request: &OutboundRequest,
		fields: Vec<String>,
		span: &CallSpan,
	) -> ContractViolation {
		let (invalid, missing): (BTreeSet<_>, BTreeSet<_>) =
			fields.into_iter().partition(|field| self.was_supplied(request, field));

		if !missing.is_empty() {
			match self.contracts.learn_contract_version(
				&request.operation,
				request.contract_version.as_ref(),
				missing.iter().cloned(),
			) {
				Ok(true) => {
					self.metrics.record_contract_learned();
					self.persist_contracts(span).await;
				},
				Ok(false) => {},
				Err(_) => span.warn("validation rejection referenced an unregistered contract"),
			}
		}

		ContractViolation { operation: Some(request.operation.clone()), missing, invalid }
	}

	fn was_supplied(&self, request: &OutboundRequest, field: &str) -> bool {
		if request.parameters.contains_key(field) {
			return true;
		}
		if request.body.as_ref().is_some_and(|body| body.get(field).is_some()) {
			return true;
		}

		let contract = match &request.contract_version {
			Some(version) => self.contracts.contract_version(&request.operation, version),
			None => self.contracts.contract(&request.operation),
		};

		// Path placeholders are consumed into the URL, so they no longer appear as parameters.
		contract
			.and_then(|contract| contract.path_placeholders().ok())
			.is_some_and(|placeholders| placeholders.iter().any(|name| name == field))
	}

	async fn persist_contracts(&self, span: &CallSpan) {
		let Some(store) = &self.store else {
			return;
		};

		if store.save(self.contracts.snapshot()).await.is_err() {
			span.warn("failed to persist learned contracts");
		}
	}
}
impl<T> Clone for Dispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			contracts: self.contracts.clone(),
			limiter: self.limiter.clone(),
			credentials: self.credentials.clone(),
			strategy: self.strategy.clone(),
			signer: self.signer.clone(),
			store: self.store.clone(),
			scope_keying: self.scope_keying,
			call_timeout: self.call_timeout,
			remote_backoff: self.remote_backoff,
			metrics: self.metrics.clone(),
		}
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("operations", &self.contracts.operations())
			.field("scope_keying", &self.scope_keying)
			.field("call_timeout", &self.call_timeout)
			.field("remote_backoff", &self.remote_backoff)
			.field("contract_store_set", &self.store.is_some())
			.finish()
	}
}

fn failure_label(err: &Error) -> &'static str {
	match err {
		Error::ContractViolation(_) => "contract_violation",
		Error::AuthRejected { .. } => "auth_rejected",
		Error::AuthRefreshFailed(_) => "auth_refresh_failed",
		Error::RateLimited { .. } => "rate_limited",
		Error::Transport(_) => "transport",
		Error::Config(_) => "config",
		Error::Storage(_) => "storage",
	}
}
