//! Transport primitives for calls to the remote API.
//!
//! The module exposes [`ApiTransport`] alongside the transient [`OutboundRequest`] and the
//! captured [`ApiResponse`] so downstream crates can plug in any HTTP stack. The default
//! [`ReqwestTransport`] maps requests onto `reqwest`, honors per-call timeouts, and records the
//! `Retry-After` hint so the dispatcher can feed remote throttling back into the local limiter.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::TransportError,
	id::{ContractVersion, OperationName},
};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Remote API collaborator that executes prepared requests.
///
/// Implementations return every HTTP response, successful or not, as an [`ApiResponse`]; only
/// failures that prevent a response from arriving (network, timeout) map to
/// [`TransportError`]. The dispatcher classifies statuses itself.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Issues the request and resolves with the raw response.
	fn send<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a>;
}

/// HTTP methods supported by operation contracts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// `GET`
	#[default]
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl HttpMethod {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}

	/// Returns `true` when parameters travel in the query string rather than the body.
	pub const fn uses_query(self) -> bool {
		matches!(self, HttpMethod::Get | HttpMethod::Delete)
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully prepared call produced by the contract enforcer; discarded after the response.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
	/// Logical operation the request belongs to.
	pub operation: OperationName,
	/// Contract version the request was prepared against.
	pub contract_version: Option<ContractVersion>,
	/// HTTP method.
	pub method: HttpMethod,
	/// Absolute URL with path parameters substituted.
	pub url: Url,
	/// Contract path template the URL was rendered from (e.g. `/orders/{id}`).
	pub path_template: String,
	/// Request headers, including contract headers and the signed credential.
	pub headers: BTreeMap<String, String>,
	/// Parameters after default injection.
	pub parameters: BTreeMap<String, JsonValue>,
	/// Optional JSON body supplied by the caller.
	pub body: Option<JsonValue>,
	/// Upper bound for the call; elapsed timeouts surface as [`TransportError::Timeout`].
	pub timeout: Option<Duration>,
}
impl OutboundRequest {
	/// Query pairs for methods that carry parameters in the URL.
	pub fn query_pairs(&self) -> Vec<(String, String)> {
		if !self.method.uses_query() {
			return Vec::new();
		}

		self.parameters.iter().map(|(name, value)| (name.clone(), query_value(value))).collect()
	}

	/// JSON body for methods that carry parameters in the payload.
	///
	/// Parameters are merged into an object body; contract-injected values win over body fields
	/// of the same name. Non-object bodies are sent unchanged.
	pub fn encoded_body(&self) -> Option<JsonValue> {
		if self.method.uses_query() {
			return self.body.clone();
		}

		match &self.body {
			Some(JsonValue::Object(fields)) => {
				let mut merged = fields.clone();

				for (name, value) in &self.parameters {
					merged.insert(name.clone(), value.clone());
				}

				Some(JsonValue::Object(merged))
			},
			Some(other) => Some(other.clone()),
			None if self.parameters.is_empty() => None,
			None => Some(JsonValue::Object(
				self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
			)),
		}
	}
}

fn query_value(value: &JsonValue) -> String {
	match value {
		JsonValue::String(text) => text.clone(),
		JsonValue::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
		other => other.to_string(),
	}
}

/// Response captured from the remote API.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lowercase names.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ApiResponse {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a response with a raw body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into(), retry_after: None }
	}

	/// Creates a response carrying a JSON body.
	pub fn json(status: u16, body: JsonValue) -> Self {
		Self::new(status, body.to_string()).with_header("content-type", "application/json")
	}

	/// Adds a header (name is lowercased).
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets the Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
		self.retry_after = Some(retry_after);

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Deserializes the body, reporting the JSON path of any mismatch.
	pub fn json_body<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: for<'de> Deserialize<'de>,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
	}

	/// Parses the body as loose JSON, if it is JSON at all.
	pub fn json_value(&self) -> Option<JsonValue> {
		serde_json::from_slice(&self.body).ok()
	}

	/// Truncated UTF-8 rendering of the body for diagnostics.
	pub fn body_preview(&self) -> Option<String> {
		if self.body.is_empty() {
			return None;
		}

		let text = String::from_utf8_lossy(&self.body);

		if text.chars().count() <= Self::BODY_PREVIEW_LIMIT {
			return Some(text.into_owned());
		}

		let mut buf: String = text.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

		buf.push('…');

		Some(buf)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn execute(&self, request: &OutboundRequest) -> Result<ApiResponse, TransportError> {
		let method = match request.method {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.0.request(method, request.url.clone());
		let query = request.query_pairs();

		if !query.is_empty() {
			builder = builder.query(&query);
		}
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.encoded_body() {
			builder = builder.json(&body);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(timeout.unsigned_abs());
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.bytes().await?.to_vec();

		Ok(ApiResponse { status, headers, body, retry_after })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a OutboundRequest) -> TransportFuture<'a> {
		Box::pin(self.execute(request))
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
