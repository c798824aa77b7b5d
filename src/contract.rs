//! Operation contracts: which parameters each remote operation requires, plus the enforcer that
//! applies them to outgoing requests and the stores that persist what it learns.

pub mod enforcer;
pub mod parameter;
pub mod store;
pub mod violation;

pub use enforcer::*;
pub use parameter::*;
pub use store::{ContractSnapshot, ContractStore, FileStore, MemoryStore, StoreError};
pub use violation::*;

// self
use crate::{
	_prelude::*,
	http::HttpMethod,
	id::{ContractVersion, OperationName},
};

/// Caller-supplied request parameters keyed by name.
pub type Parameters = BTreeMap<String, JsonValue>;

/// Errors raised while building or registering contracts.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ContractError {
	/// A contract with a different shape is already registered under the same key.
	#[error("Contract for `{operation}` (version {version}) conflicts with the registered one.")]
	Conflict {
		/// Operation whose registration conflicted.
		operation: OperationName,
		/// Version label, or `unversioned`.
		version: String,
	},
	/// The endpoint path template is malformed.
	#[error("Contract path `{path}` is invalid: {reason}.")]
	InvalidPath {
		/// Offending path template.
		path: String,
		/// Why the template was rejected.
		reason: &'static str,
	},
	/// A declared parameter name is invalid.
	#[error(transparent)]
	Parameter(#[from] ParameterValidationError),
}

/// The set of parameters a server operation currently requires, plus how to reach it.
///
/// Path templates may contain `{name}` placeholders; each placeholder is implicitly required
/// and is substituted into the URL instead of being sent as a parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationContract {
	/// Logical operation name.
	pub operation: OperationName,
	/// Version tag, for servers that version their operations.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<ContractVersion>,
	/// HTTP method.
	#[serde(default)]
	pub method: HttpMethod,
	/// Endpoint path template relative to the base URL.
	pub path: String,
	/// Required parameter names. Never shrinks once registered.
	#[serde(default)]
	pub required: ParameterSet,
	/// Values injected when the caller omits a parameter.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub defaults: BTreeMap<String, JsonValue>,
	/// Static headers attached to every request for this operation.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
}
impl OperationContract {
	/// Starts a builder for `operation` served at `path`.
	pub fn builder(operation: OperationName, path: impl Into<String>) -> OperationContractBuilder {
		OperationContractBuilder::new(operation, path.into())
	}

	/// Names of the `{placeholders}` in the path template, in order of appearance.
	pub fn path_placeholders(&self) -> Result<Vec<String>, ContractError> {
		path_placeholders(&self.path)
	}

	/// Label used for the version in messages and snapshots.
	pub fn version_label(&self) -> String {
		self.version.as_ref().map(ToString::to_string).unwrap_or_else(|| "unversioned".into())
	}

	/// Returns `true` when both contracts reach the same endpoint the same way.
	pub fn same_endpoint(&self, other: &OperationContract) -> bool {
		self.method == other.method && self.path == other.path
	}

	/// Ensures the path is well-formed and that placeholders are part of the required set.
	pub(crate) fn normalized(mut self) -> Result<Self, ContractError> {
		let placeholders = path_placeholders(&self.path)?;

		if !placeholders.is_empty() {
			self.required = self.required.union(&ParameterSet::new(placeholders)?);
		}
		for name in self.defaults.keys() {
			parameter::validate(name.clone())?;
		}

		Ok(self)
	}
}

/// Builder for [`OperationContract`].
#[derive(Clone, Debug)]
pub struct OperationContractBuilder {
	contract: OperationContract,
	required: Vec<String>,
}
impl OperationContractBuilder {
	fn new(operation: OperationName, path: String) -> Self {
		Self {
			contract: OperationContract {
				operation,
				version: None,
				method: HttpMethod::default(),
				path,
				required: ParameterSet::default(),
				defaults: BTreeMap::new(),
				headers: BTreeMap::new(),
			},
			required: Vec::new(),
		}
	}

	/// Sets the version tag.
	pub fn version(mut self, version: ContractVersion) -> Self {
		self.contract.version = Some(version);

		self
	}

	/// Sets the HTTP method.
	pub fn method(mut self, method: HttpMethod) -> Self {
		self.contract.method = method;

		self
	}

	/// Adds required parameter names.
	pub fn require<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.required.extend(names.into_iter().map(Into::into));

		self
	}

	/// Declares a default value for a parameter.
	pub fn default_value(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
		self.contract.defaults.insert(name.into(), value.into());

		self
	}

	/// Adds a static header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.contract.headers.insert(name.into(), value.into());

		self
	}

	/// Validates names and the path template, producing the contract.
	pub fn build(self) -> Result<OperationContract, ContractError> {
		let Self { mut contract, required } = self;

		contract.required = ParameterSet::new(required)?;

		contract.normalized()
	}
}

/// Piece of a path template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathToken<'a> {
	/// Text copied into the URL as is.
	Literal(&'a str),
	/// `{name}` replaced by a parameter value.
	Placeholder(&'a str),
}

/// Splits a path template into literal text and placeholders in a single scan.
pub fn path_tokens(path: &str) -> Result<Vec<PathToken<'_>>, ContractError> {
	let invalid = |reason| ContractError::InvalidPath { path: path.to_owned(), reason };
	let mut tokens = Vec::new();
	let mut rest = path;

	while let Some(open) = rest.find(['{', '}']) {
		if rest[open..].starts_with('}') {
			return Err(invalid("unbalanced `}`"));
		}

		let after = &rest[open + 1..];
		let close = after.find('}').ok_or_else(|| invalid("unclosed `{`"))?;
		let name = &after[..close];

		if name.contains('{') {
			return Err(invalid("nested `{`"));
		}
		if open > 0 {
			tokens.push(PathToken::Literal(&rest[..open]));
		}

		tokens.push(PathToken::Placeholder(name));
		rest = &after[close + 1..];
	}

	if !rest.is_empty() {
		tokens.push(PathToken::Literal(rest));
	}

	Ok(tokens)
}

fn path_placeholders(path: &str) -> Result<Vec<String>, ContractError> {
	let mut names = Vec::new();

	for token in path_tokens(path)? {
		if let PathToken::Placeholder(name) = token {
			names.push(parameter::validate(name.to_owned())?);
		}
	}

	Ok(names)
}
