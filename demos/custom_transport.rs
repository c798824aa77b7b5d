//! Demonstrates plugging a non-HTTP transport into the relay and watching it adapt.
//!
//! 1. Implement [`ApiTransport`] for an in-process fake of the remote API.
//! 2. Build a [`Dispatcher`] from a JSON [`RelayConfig`] around that transport.
//! 3. Let the fake start demanding a new field and observe the relay learn it from the 422.
//! 4. Exhaust the local rate budget and inspect the retry hint.

// std
use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};
// crates.io
use color_eyre::Result;
use serde_json::json;
// self
use api_relay::{
	auth::StaticCredentialSource,
	config::RelayConfig,
	dispatch::{ApiCall, CallOutcome, Dispatcher},
	error::TransportError,
	http::{ApiResponse, ApiTransport, OutboundRequest, TransportFuture},
};

const CONFIG: &str = r#"{
	"base_url": "https://inventory.example.com/v2/",
	"contracts": [{ "operation": "getProducts", "path": "/products", "required": ["category"] }],
	"default_rate_limit": { "window_ms": 1000, "max_calls": 3 }
}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = RelayConfig::from_json_str(CONFIG)?;
	let inventory = Arc::new(InventoryServer::default());
	let dispatcher = Dispatcher::from_config(
		&config,
		Arc::clone(&inventory),
		Arc::new(StaticCredentialSource::new("demo-key")),
	)?;
	let shoes = || ApiCall::new("getProducts").param("category", "shoes");
	let response = dispatcher.dispatch(shoes()).await?;

	println!("First call answered with HTTP {}.", response.status);

	inventory.require_region.store(true, Ordering::Relaxed);

	match dispatcher.execute(shoes()).await {
		CallOutcome::ContractViolation(violation) =>
			println!("Server changed its rules: {violation}"),
		other => println!("Expected a contract violation, got {other}."),
	}
	match dispatcher.execute(shoes()).await {
		CallOutcome::ContractViolation(violation) =>
			println!("Rejected locally before reaching the server: {violation}"),
		other => println!("Expected a local rejection, got {other}."),
	}

	let response = dispatcher.dispatch(shoes().param("region", "eu")).await?;

	println!("Call with the learned field answered with HTTP {}.", response.status);

	match dispatcher.execute(shoes().param("region", "eu")).await {
		CallOutcome::RateLimited { retry_after, origin } =>
			println!("The {origin} budget is spent; retry after {retry_after}."),
		other => println!("Expected the local budget to be exhausted, got {other}."),
	}

	println!("Server saw {} requests in total.", inventory.seen());

	Ok(())
}

#[derive(Debug, Default)]
struct InventoryServer {
	require_region: AtomicBool,
	requests: parking_lot::Mutex<Vec<OutboundRequest>>,
}
impl InventoryServer {
	fn seen(&self) -> usize {
		self.requests.lock().len()
	}

	fn answer(&self, request: &OutboundRequest) -> Result<ApiResponse, TransportError> {
		if request.headers.get("authorization").map(String::as_str) != Some("Bearer demo-key") {
			return Ok(ApiResponse::json(401, json!({ "error": "unauthorized" })));
		}
		if self.require_region.load(Ordering::Relaxed)
			&& !request.parameters.contains_key("region")
		{
			return Ok(ApiResponse::json(
				422,
				json!({ "error": "validation", "missing_fields": ["region"] }),
			));
		}

		Ok(ApiResponse::json(200, json!({ "items": [{ "sku": "runner-1" }] })))
	}
}
impl ApiTransport for InventoryServer {
	fn send<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			self.requests.lock().push(request.clone());

			self.answer(request)
		})
	}
}
