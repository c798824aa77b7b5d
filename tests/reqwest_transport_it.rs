// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use api_relay::{
	auth::StaticCredentialSource,
	config::RelayConfig,
	dispatch::{ApiCall, CallOutcome, ReqwestDispatcher},
	error::{Error, RateLimitOrigin, TransportError},
	http::ReqwestTransport,
};

fn build_dispatcher(server: &MockServer, extra: &str) -> ReqwestDispatcher {
	let raw = format!(
		r#"{{
			"base_url": "{}/api/",
			"contracts": [
				{{ "operation": "getProducts", "path": "/products", "required": ["category"] }},
				{{ "operation": "createOrder", "method": "POST", "path": "/orders/{{customer}}", "required": ["sku"] }}
			]{extra}
		}}"#,
		server.base_url()
	);
	let config = RelayConfig::from_json_str(&raw).expect("Test config should parse.");

	ReqwestDispatcher::from_config(
		&config,
		Arc::new(ReqwestTransport::default()),
		Arc::new(StaticCredentialSource::new("static-token")),
	)
	.expect("Dispatcher should build from config.")
}

#[tokio::test]
async fn get_parameters_travel_in_the_query_string() {
	let server = MockServer::start_async().await;
	let dispatcher = build_dispatcher(&server, "");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/products")
				.query_param("category", "shoes")
				.header("authorization", "Bearer static-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[{\"sku\":\"runner-1\"}]}");
		})
		.await;
	let response = dispatcher
		.dispatch(ApiCall::new("getProducts").param("category", "shoes"))
		.await
		.expect("Mocked call should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status, 200);
	assert_eq!(response.header("content-type"), Some("application/json"));
	assert_eq!(
		response.json_value().expect("Body should be JSON.")["items"][0]["sku"],
		"runner-1"
	);
}

#[tokio::test]
async fn post_parameters_merge_into_the_json_body() {
	let server = MockServer::start_async().await;
	let dispatcher = build_dispatcher(&server, "");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/orders/acme-corp")
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "sku": "runner-1", "quantity": 2 }));
			then.status(201)
				.header("content-type", "application/json")
				.body("{\"order_id\":\"o-1\"}");
		})
		.await;
	let call = ApiCall::new("createOrder")
		.param("customer", "acme-corp")
		.param("sku", "runner-1")
		.body(serde_json::json!({ "quantity": 2 }));
	let response = dispatcher.dispatch(call).await.expect("Order creation should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status, 201);
}

#[tokio::test]
async fn remote_retry_after_pauses_the_scope_locally() {
	let server = MockServer::start_async().await;
	let dispatcher = build_dispatcher(&server, "");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/products");
			then.status(429).header("retry-after", "30").body("slow down");
		})
		.await;
	let err = dispatcher
		.dispatch(ApiCall::new("getProducts").param("category", "shoes"))
		.await
		.expect_err("Remote throttling should surface.");

	assert!(
		matches!(
			err,
			Error::RateLimited { retry_after, origin: RateLimitOrigin::Remote }
				if retry_after == Duration::seconds(30)
		),
		"Unexpected error: {err:?}."
	);

	let err = dispatcher
		.dispatch(ApiCall::new("getProducts").param("category", "shoes"))
		.await
		.expect_err("The paused scope should deny locally.");

	assert!(
		matches!(err, Error::RateLimited { origin: RateLimitOrigin::Local, .. }),
		"Unexpected error: {err:?}."
	);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn validation_rejection_is_learned_without_retrying() {
	let server = MockServer::start_async().await;
	let dispatcher = build_dispatcher(&server, "");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/products");
			then.status(422)
				.header("content-type", "application/json")
				.body("{\"error\":\"validation\",\"missing_fields\":[\"region\"]}");
		})
		.await;
	let outcome = dispatcher.execute(ApiCall::new("getProducts").param("category", "shoes")).await;

	assert!(
		matches!(&outcome, CallOutcome::ContractViolation(v) if v.missing_fields() == vec!["region"]),
		"Unexpected outcome: {outcome:?}."
	);

	let outcome = dispatcher.execute(ApiCall::new("getProducts").param("category", "shoes")).await;

	assert!(matches!(outcome, CallOutcome::ContractViolation(_)), "Unexpected outcome: {outcome:?}.");

	mock.assert_calls_async(1).await;

	assert_eq!(dispatcher.metrics().contracts_learned(), 1);
}

#[tokio::test]
async fn elapsed_call_timeout_maps_to_transport_timeout() {
	let server = MockServer::start_async().await;
	let dispatcher = build_dispatcher(&server, ", \"call_timeout_ms\": 50");

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/products");
			then.status(200).delay(StdDuration::from_millis(500)).body("{}");
		})
		.await;

	let outcome = dispatcher.execute(ApiCall::new("getProducts").param("category", "shoes")).await;

	assert!(
		matches!(outcome, CallOutcome::TransportFailure(TransportError::Timeout)),
		"Unexpected outcome: {outcome:?}."
	);
}
