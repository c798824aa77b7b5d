//! Resilient API request layer: adaptive request contracts, single-flight credential refresh, and
//! sliding-window rate pacing in front of a remote API whose rules keep changing.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod id;
pub mod obs;
pub mod rate_limit;
pub mod strategy;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		auth::{Credential, CredentialFuture, CredentialManager, CredentialSource, RefreshError},
		contract::ContractEnforcer,
		dispatch::Dispatcher,
		error::TransportError,
		http::{ApiResponse, ApiTransport, OutboundRequest, TransportFuture},
		rate_limit::RateLimiter,
	};

	/// Scripted transport that replays queued responses and records every request it sees.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
		requests: Mutex<Vec<OutboundRequest>>,
	}
	impl ScriptedTransport {
		/// Queues a response with the provided status and JSON body.
		pub fn respond(&self, status: u16, body: serde_json::Value) -> &Self {
			self.responses.lock().push_back(Ok(ApiResponse::json(status, body)));

			self
		}

		/// Queues a full response value.
		pub fn respond_with(&self, response: ApiResponse) -> &Self {
			self.responses.lock().push_back(Ok(response));

			self
		}

		/// Queues a transport failure.
		pub fn fail(&self, error: TransportError) -> &Self {
			self.responses.lock().push_back(Err(error));

			self
		}

		/// Returns every request sent so far.
		pub fn requests(&self) -> Vec<OutboundRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests sent so far.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn send<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
			Box::pin(async move {
				self.requests.lock().push(request.clone());

				self.responses.lock().pop_front().unwrap_or_else(|| {
					Err(TransportError::network(std::io::Error::other(
						"Scripted transport has no queued response.",
					)))
				})
			})
		}
	}

	/// Credential source that mints sequential tokens and counts invocations.
	#[derive(Debug)]
	pub struct CountingSource {
		ttl: Duration,
		calls: Mutex<u32>,
		fail_with: Mutex<Option<RefreshError>>,
	}
	impl CountingSource {
		/// Creates a source issuing tokens valid for `ttl`.
		pub fn new(ttl: Duration) -> Self {
			Self { ttl, calls: Mutex::new(0), fail_with: Mutex::new(None) }
		}

		/// Makes every subsequent refresh fail with `error`.
		pub fn fail_with(&self, error: RefreshError) {
			*self.fail_with.lock() = Some(error);
		}

		/// Number of refresh invocations observed.
		pub fn calls(&self) -> u32 {
			*self.calls.lock()
		}
	}
	impl CredentialSource for CountingSource {
		fn refresh<'a>(&'a self, _previous: Option<&'a Credential>) -> CredentialFuture<'a> {
			Box::pin(async move {
				let n = {
					let mut calls = self.calls.lock();

					*calls += 1;

					*calls
				};

				if let Some(err) = self.fail_with.lock().clone() {
					return Err(err);
				}

				Credential::builder(format!("token-{n}"))
					.issued_now()
					.expires_in(self.ttl)
					.build()
					.map_err(RefreshError::from)
			})
		}
	}

	/// Assembles a dispatcher from the provided components around a scripted transport.
	pub fn build_test_dispatcher(
		contracts: ContractEnforcer,
		limiter: RateLimiter,
		source: Arc<CountingSource>,
	) -> (Dispatcher<ScriptedTransport>, Arc<ScriptedTransport>) {
		let transport = Arc::new(ScriptedTransport::default());
		let credentials = CredentialManager::new(source);
		let dispatcher = Dispatcher::new(
			transport.clone(),
			Arc::new(contracts),
			Arc::new(limiter),
			Arc::new(credentials),
		);

		(dispatcher, transport)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
