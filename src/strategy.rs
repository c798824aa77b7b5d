//! Response strategy hooks that classify remote API answers.
//!
//! Implementations map raw [`ApiResponse`] values into the relay's response taxonomy without
//! tying the dispatcher to any particular HTTP client or error-body dialect.

// self
use crate::{_prelude::*, http::ApiResponse};

/// Strategy hook that decides how the dispatcher reacts to a response.
///
/// Implementors are required to be `Send + Sync`. Override it when a remote API signals
/// validation or auth failures in a non-standard way (e.g. a 400 with a custom error code).
pub trait ResponseStrategy: Send + Sync {
	/// Classifies the response.
	fn classify(&self, response: &ApiResponse) -> ResponseKind;
}

/// Canonical response categories used by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseKind {
	/// The call succeeded.
	Success,
	/// The credential was rejected (expired or invalid token).
	AuthRejected,
	/// The server refused the request's parameters.
	ValidationRejected {
		/// Field names the server reported, deduplicated and sorted.
		fields: Vec<String>,
	},
	/// The remote rate limit was hit.
	RateRejected {
		/// Server-provided hint, when present.
		retry_after: Option<Duration>,
	},
	/// Any other status; surfaced as a transport failure.
	Unexpected,
}

/// Default strategy built on HTTP status conventions.
///
/// 2xx is success, 401/403 is an auth rejection, 422 is a validation rejection, and 429 is a
/// rate rejection. A 400 whose body names offending fields is also treated as a validation
/// rejection, since many APIs use it for missing parameters.
#[derive(Debug, Default)]
pub struct DefaultResponseStrategy;
impl Display for DefaultResponseStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-response-strategy")
	}
}
impl ResponseStrategy for DefaultResponseStrategy {
	fn classify(&self, response: &ApiResponse) -> ResponseKind {
		match response.status {
			200..=299 => ResponseKind::Success,
			401 | 403 => ResponseKind::AuthRejected,
			422 => ResponseKind::ValidationRejected { fields: offending_fields(response) },
			429 => ResponseKind::RateRejected { retry_after: response.retry_after },
			400 => {
				let fields = offending_fields(response);

				if fields.is_empty() {
					ResponseKind::Unexpected
				} else {
					ResponseKind::ValidationRejected { fields }
				}
			},
			_ => ResponseKind::Unexpected,
		}
	}
}

/// Extracts offending field names from common validation-error body shapes.
///
/// Recognized shapes: `{"missing_fields": [..]}`, `{"fields": [..]}`, `{"required": [..]}`,
/// `{"errors": [{"field": ..}]}`, `{"errors": {"name": [..]}}`, and `{"detail": [{"loc": [..]}]}`.
pub fn offending_fields(response: &ApiResponse) -> Vec<String> {
	let Some(body) = response.json_value() else {
		return Vec::new();
	};
	let mut fields = BTreeSet::new();

	for key in ["missing_fields", "missingFields", "fields", "required"] {
		if let Some(JsonValue::Array(items)) = body.get(key) {
			fields.extend(items.iter().filter_map(JsonValue::as_str).map(str::to_owned));
		}
	}

	match body.get("errors") {
		Some(JsonValue::Array(items)) =>
			for item in items {
				let name = ["field", "param", "name", "path"]
					.iter()
					.find_map(|key| item.get(key).and_then(JsonValue::as_str));

				if let Some(name) = name {
					fields.insert(name.to_owned());
				}
			},
		Some(JsonValue::Object(map)) => fields.extend(map.keys().cloned()),
		_ => {},
	}

	if let Some(JsonValue::Array(items)) = body.get("detail") {
		for item in items {
			let last = item
				.get("loc")
				.and_then(JsonValue::as_array)
				.and_then(|loc| loc.iter().rev().find_map(JsonValue::as_str));

			if let Some(name) = last {
				fields.insert(name.to_owned());
			}
		}
	}

	fields.retain(|name| !name.is_empty());
	fields.into_iter().collect()
}
