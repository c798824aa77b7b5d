//! Contract table and the preparation step that turns caller parameters into requests.
//!
//! The table is single-writer/multi-reader: [`prepare`](ContractEnforcer::prepare) only takes the
//! read lock, while registration and learning take the write lock briefly. Required sets only
//! ever grow, so a learned requirement is never lost to a concurrent registration.

// self
use crate::{
	_prelude::*,
	config::RelayConfig,
	contract::{
		ContractError, ContractSnapshot, ContractViolation, OperationContract, ParameterSet,
		Parameters, PathToken, parameter, path_tokens,
	},
	error::ConfigError,
	http::OutboundRequest,
	id::{ContractVersion, OperationName},
	obs::{self, CallStage, StageOutcome},
};

#[derive(Debug, Default)]
struct OperationEntry {
	active: Option<ContractVersion>,
	versions: BTreeMap<Option<ContractVersion>, Arc<OperationContract>>,
}

/// Registry of operation contracts plus the request preparation logic.
#[derive(Debug)]
pub struct ContractEnforcer {
	base_url: Url,
	table: RwLock<HashMap<OperationName, OperationEntry>>,
}
impl ContractEnforcer {
	/// Creates an empty enforcer whose endpoints resolve against `base_url`.
	pub fn new(base_url: Url) -> Self {
		Self { base_url, table: RwLock::new(HashMap::new()) }
	}

	/// Builds an enforcer and registers every contract declared in the configuration.
	pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
		let enforcer = Self::new(config.base_url.clone());

		for contract in &config.contracts {
			enforcer.register(contract.clone())?;
		}

		Ok(enforcer)
	}

	/// Registers `contract` and returns the enforcer, for builder-style setup.
	pub fn with_contract(self, contract: OperationContract) -> Result<Self, ContractError> {
		self.register(contract)?;

		Ok(self)
	}

	/// Base URL endpoints are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Registers a contract and makes its version the active one for the operation.
	///
	/// Registering a contract whose required set is already covered by the stored one (same
	/// endpoint, defaults and headers) is a no-op, so startup registration never undoes learned
	/// requirements. Any other difference under the same operation and version is a
	/// [`ContractError::Conflict`].
	pub fn register(&self, contract: OperationContract) -> Result<(), ContractError> {
		let contract = contract.normalized()?;
		let mut table = self.table.write();
		let entry = table.entry(contract.operation.clone()).or_default();

		match entry.versions.get(&contract.version) {
			Some(existing)
				if existing.same_endpoint(&contract)
					&& existing.defaults == contract.defaults
					&& existing.headers == contract.headers
					&& contract.required.is_subset(&existing.required) => {},
			Some(_) =>
				return Err(ContractError::Conflict {
					version: contract.version_label(),
					operation: contract.operation,
				}),
			None => {
				entry.versions.insert(contract.version.clone(), Arc::new(contract.clone()));
			},
		}

		entry.active = contract.version;

		Ok(())
	}

	/// Registered operation names in sorted order.
	pub fn operations(&self) -> Vec<OperationName> {
		let mut names = self.table.read().keys().cloned().collect::<Vec<_>>();

		names.sort();

		names
	}

	/// Active contract for `operation`.
	pub fn contract(&self, operation: &str) -> Option<Arc<OperationContract>> {
		self.lookup(operation, None).ok()
	}

	/// Contract for `operation` at an explicit version.
	pub fn contract_version(
		&self,
		operation: &str,
		version: &ContractVersion,
	) -> Option<Arc<OperationContract>> {
		self.lookup(operation, Some(version)).ok()
	}

	/// Validates and augments `supplied` against the active contract for `operation`.
	///
	/// Absent parameters with a declared default are injected; every required parameter that is
	/// still absent is reported in a single [`ContractViolation`]. JSON `null` counts as absent.
	/// The output depends only on the inputs and the current contract state.
	pub fn prepare(&self, operation: &str, supplied: &Parameters) -> Result<OutboundRequest> {
		let contract = self.lookup(operation, None)?;

		self.prepare_with(&contract, supplied)
	}

	/// Same as [`prepare`](Self::prepare) against an explicit contract version.
	pub fn prepare_version(
		&self,
		operation: &str,
		version: &ContractVersion,
		supplied: &Parameters,
	) -> Result<OutboundRequest> {
		let contract = self.lookup(operation, Some(version))?;

		self.prepare_with(&contract, supplied)
	}

	/// Merges server-reported fields into the active contract's required set.
	///
	/// Returns `true` when the set grew. Names that are not valid parameter names are ignored.
	pub fn learn_contract<I, S>(&self, operation: &str, fields: I) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let version = {
			let table = self.table.read();
			let entry = table.get(operation).ok_or_else(|| unknown_operation(operation))?;

			entry.active.clone()
		};

		self.learn_contract_version(operation, version.as_ref(), fields)
	}

	/// Merges server-reported fields into the contract stored under exactly `version`.
	pub fn learn_contract_version<I, S>(
		&self,
		operation: &str,
		version: Option<&ContractVersion>,
		fields: I,
	) -> Result<bool>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let learned = ParameterSet::new(
			fields.into_iter().map(Into::into).filter(|name| parameter::validate(name.clone()).is_ok()),
		)
		.map_err(ConfigError::from)?;
		let mut table = self.table.write();
		let entry = table.get_mut(operation).ok_or_else(|| unknown_operation(operation))?;
		let key = version.cloned();
		let slot = entry
			.versions
			.get_mut(&key)
			.ok_or_else(|| unknown_version(operation, version))?;

		if learned.is_subset(&slot.required) {
			return Ok(false);
		}

		let mut tightened = OperationContract::clone(&**slot);

		tightened.required = slot.required.union(&learned);
		*slot = Arc::new(tightened);

		obs::record_call_outcome(CallStage::LearnContract, StageOutcome::Success);

		Ok(true)
	}

	/// Exports every contract, including learned requirements.
	pub fn snapshot(&self) -> ContractSnapshot {
		let table = self.table.read();
		let mut contracts = table
			.values()
			.flat_map(|entry| entry.versions.values())
			.map(|contract| OperationContract::clone(&**contract))
			.collect::<Vec<_>>();

		contracts.sort_by(|a, b| (&a.operation, &a.version).cmp(&(&b.operation, &b.version)));

		ContractSnapshot { taken_at: OffsetDateTime::now_utc(), contracts }
	}

	/// Reapplies a snapshot on top of the current table.
	///
	/// Known contracts gain the snapshot's required fields when they target the same endpoint;
	/// contracts whose endpoint changed since the snapshot keep their current definition.
	/// Unknown contracts are added. Returns how many contracts changed.
	pub fn restore(&self, snapshot: &ContractSnapshot) -> Result<usize, ContractError> {
		let mut table = self.table.write();
		let mut changed = 0;

		for contract in &snapshot.contracts {
			let contract = contract.clone().normalized()?;
			let entry = table.entry(contract.operation.clone()).or_default();

			match entry.versions.get_mut(&contract.version) {
				Some(existing) if existing.same_endpoint(&contract) => {
					if contract.required.is_subset(&existing.required) {
						continue;
					}

					let mut merged = OperationContract::clone(&**existing);

					merged.required = existing.required.union(&contract.required);
					*existing = Arc::new(merged);
				},
				Some(_) => continue,
				None => {
					if entry.versions.is_empty() {
						entry.active = contract.version.clone();
					}

					entry.versions.insert(contract.version.clone(), Arc::new(contract));
				},
			}

			changed += 1;
		}

		Ok(changed)
	}

	fn lookup(
		&self,
		operation: &str,
		version: Option<&ContractVersion>,
	) -> Result<Arc<OperationContract>, ConfigError> {
		let table = self.table.read();
		let entry = table.get(operation).ok_or_else(|| unknown_operation(operation))?;
		let key = match version {
			Some(version) => Some(version.clone()),
			None => entry.active.clone(),
		};

		entry.versions.get(&key).cloned().ok_or_else(|| unknown_version(operation, version))
	}

	fn prepare_with(
		&self,
		contract: &OperationContract,
		supplied: &Parameters,
	) -> Result<OutboundRequest> {
		let mut parameters = supplied
			.iter()
			.filter(|(_, value)| !value.is_null())
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect::<Parameters>();

		for (name, value) in &contract.defaults {
			parameters.entry(name.clone()).or_insert_with(|| value.clone());
		}

		let missing = contract
			.required
			.iter()
			.filter(|name| !parameters.contains_key(*name))
			.map(str::to_owned)
			.collect::<BTreeSet<_>>();

		if !missing.is_empty() {
			return Err(ContractViolation {
				operation: Some(contract.operation.clone()),
				missing,
				invalid: BTreeSet::new(),
			}
			.into());
		}

		let url = self.endpoint_url(contract, &mut parameters)?;

		Ok(OutboundRequest {
			operation: contract.operation.clone(),
			contract_version: contract.version.clone(),
			method: contract.method,
			url,
			path_template: contract.path.clone(),
			headers: contract.headers.clone(),
			parameters,
			body: None,
			timeout: None,
		})
	}

	fn endpoint_url(
		&self,
		contract: &OperationContract,
		parameters: &mut Parameters,
	) -> Result<Url, ConfigError> {
		let mut substitutions = BTreeMap::new();

		for name in contract.path_placeholders()? {
			if let Some(value) = parameters.remove(&name) {
				substitutions.insert(name, path_value(&value));
			}
		}

		// Values are appended after scanning, so text inside them is never read as a placeholder.
		let mut rendered = vec![(String::new(), false)];

		for token in path_tokens(&contract.path)? {
			match token {
				PathToken::Literal(text) => {
					for (i, piece) in text.split('/').enumerate() {
						if i > 0 {
							rendered.push((String::new(), false));
						}
						if let Some((segment, filled)) = rendered.last_mut() {
							segment.push_str(piece);
							*filled |= !piece.is_empty();
						}
					}
				},
				PathToken::Placeholder(name) => {
					if let Some((segment, filled)) = rendered.last_mut() {
						match substitutions.get(name) {
							Some(value) => segment.push_str(value),
							None => segment.push_str(&format!("{{{name}}}")),
						}

						*filled = true;
					}
				},
			}
		}

		let mut url = self.base_url.clone();

		{
			let mut segments = url.path_segments_mut().map_err(|_| ConfigError::InvalidUrl {
				value: self.base_url.to_string(),
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			})?;

			segments.pop_if_empty();

			for (segment, _) in rendered.iter().filter(|(_, filled)| *filled) {
				segments.push(segment);
			}
		}

		Ok(url)
	}
}

fn path_value(value: &JsonValue) -> String {
	match value {
		JsonValue::String(text) => text.clone(),
		other => other.to_string(),
	}
}

fn unknown_operation(operation: &str) -> ConfigError {
	ConfigError::UnknownOperation { operation: operation.to_owned() }
}

fn unknown_version(operation: &str, version: Option<&ContractVersion>) -> ConfigError {
	ConfigError::UnknownVersion {
		operation: operation.to_owned(),
		version: version.map(ToString::to_string).unwrap_or_else(|| "unversioned".into()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::HttpMethod;

	fn operation(name: &str) -> OperationName {
		OperationName::new(name).expect("Operation fixture should be valid.")
	}

	fn enforcer() -> ContractEnforcer {
		ContractEnforcer::new(
			Url::parse("https://api.example.com/v1/").expect("Base URL fixture should parse."),
		)
	}

	fn params(pairs: &[(&str, JsonValue)]) -> Parameters {
		pairs.iter().map(|(name, value)| ((*name).to_owned(), value.clone())).collect()
	}

	#[test]
	fn violation_lists_exactly_the_missing_names() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("search"), "/search")
					.require(["a", "b", "c", "d"])
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");
		let err = enforcer
			.prepare("search", &params(&[("b", "x".into()), ("d", 1.into()), ("e", true.into())]))
			.expect_err("Two required fields are absent.");
		let Error::ContractViolation(violation) = err else {
			panic!("Expected a contract violation, got {err:?}.");
		};

		assert_eq!(violation.missing_fields(), vec!["a", "c"]);
		assert!(violation.invalid.is_empty());
		assert_eq!(violation.operation, Some(operation("search")));
	}

	#[test]
	fn defaults_are_injected_and_nulls_count_as_missing() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getProducts"), "/products")
					.require(["category", "limit"])
					.default_value("limit", 20)
					.header("x-api-version", "2")
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");
		let request = enforcer
			.prepare("getProducts", &params(&[("category", "shoes".into())]))
			.expect("Defaults should satisfy the contract.");

		assert_eq!(request.parameters["limit"], 20);
		assert_eq!(request.headers["x-api-version"], "2");
		assert_eq!(request.url.as_str(), "https://api.example.com/v1/products");

		let err = enforcer
			.prepare("getProducts", &params(&[("category", JsonValue::Null)]))
			.expect_err("Null values must count as missing.");

		assert!(matches!(err, Error::ContractViolation(v) if v.missing_fields() == vec!["category"]));
	}

	#[test]
	fn prepare_is_idempotent() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getProducts"), "/products")
					.require(["category"])
					.default_value("limit", 20)
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");
		let supplied = params(&[("category", "shoes".into())]);
		let first = enforcer.prepare("getProducts", &supplied).expect("First prepare should pass.");
		let second = enforcer.prepare("getProducts", &supplied).expect("Second prepare should pass.");

		assert_eq!(first, second);
	}

	#[test]
	fn learning_only_grows_the_required_set() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getProducts"), "/products")
					.require(["limit"])
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");

		assert!(enforcer.learn_contract("getProducts", ["category"]).expect("Learning should work."));
		assert!(!enforcer.learn_contract("getProducts", ["category", "limit"]).expect("Repeat is a no-op."));
		assert!(!enforcer.learn_contract("getProducts", ["with space", ""]).expect("Invalid names are ignored."));

		let contract = enforcer.contract("getProducts").expect("Contract should be registered.");

		assert_eq!(contract.required.iter().collect::<Vec<_>>(), vec!["category", "limit"]);

		let err = enforcer
			.learn_contract("unknownOp", ["x"])
			.expect_err("Unknown operations cannot learn.");

		assert!(matches!(err, Error::Config(ConfigError::UnknownOperation { .. })));
	}

	#[test]
	fn registration_keeps_learned_state_and_rejects_conflicts() {
		let base = OperationContract::builder(operation("getProducts"), "/products")
			.require(["limit"])
			.build()
			.expect("Contract fixture should build.");
		let enforcer = enforcer().with_contract(base.clone()).expect("Registration should succeed.");

		enforcer.learn_contract("getProducts", ["category"]).expect("Learning should work.");
		enforcer.register(base.clone()).expect("Re-registering a covered contract is a no-op.");

		assert!(
			enforcer
				.contract("getProducts")
				.is_some_and(|contract| contract.required.contains("category"))
		);

		let wider = OperationContract::builder(operation("getProducts"), "/products")
			.require(["limit", "region"])
			.build()
			.expect("Contract fixture should build.");
		let defaulted = OperationContract::builder(operation("getProducts"), "/products")
			.require(["limit"])
			.default_value("limit", 50)
			.build()
			.expect("Contract fixture should build.");
		let headed = OperationContract::builder(operation("getProducts"), "/products")
			.header("x-api-version", "3")
			.build()
			.expect("Contract fixture should build.");
		let moved = OperationContract { path: "/catalog".into(), ..base };

		assert!(matches!(enforcer.register(wider), Err(ContractError::Conflict { .. })));
		assert!(matches!(enforcer.register(defaulted), Err(ContractError::Conflict { .. })));
		assert!(matches!(enforcer.register(headed), Err(ContractError::Conflict { .. })));
		assert!(matches!(enforcer.register(moved), Err(ContractError::Conflict { .. })));
		assert!(
			enforcer.contract("getProducts").is_some_and(|contract| contract.defaults.is_empty()),
			"A rejected registration must leave the stored contract untouched."
		);
	}

	#[test]
	fn versions_are_tracked_independently() {
		let v1 = ContractVersion::new("v1").expect("Version fixture should be valid.");
		let v2 = ContractVersion::new("v2").expect("Version fixture should be valid.");
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getProducts"), "/products")
					.version(v1.clone())
					.build()
					.expect("Contract fixture should build."),
			)
			.and_then(|e| {
				e.with_contract(
					OperationContract::builder(operation("getProducts"), "/v2/products")
						.version(v2.clone())
						.require(["region"])
						.build()
						.expect("Contract fixture should build."),
				)
			})
			.expect("Registration should succeed.");

		assert!(enforcer.prepare("getProducts", &Parameters::new()).is_err(), "v2 is active.");

		let legacy = enforcer
			.prepare_version("getProducts", &v1, &Parameters::new())
			.expect("v1 has no requirements.");

		assert_eq!(legacy.contract_version, Some(v1));

		let unknown = ContractVersion::new("v9").expect("Version fixture should be valid.");

		assert!(matches!(
			enforcer.prepare_version("getProducts", &unknown, &Parameters::new()),
			Err(Error::Config(ConfigError::UnknownVersion { .. }))
		));
	}

	#[test]
	fn path_placeholders_are_substituted_and_encoded() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getOrder"), "/orders/{order_id}")
					.method(HttpMethod::Delete)
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");
		let request = enforcer
			.prepare("getOrder", &params(&[("order_id", "a/b c".into()), ("reason", "dup".into())]))
			.expect("Placeholder value is present.");

		assert_eq!(request.url.as_str(), "https://api.example.com/v1/orders/a%2Fb%20c");
		assert!(!request.parameters.contains_key("order_id"));
		assert_eq!(request.parameters["reason"], "dup");
	}

	#[test]
	fn substituted_values_are_never_rescanned_for_placeholders() {
		let enforcer = enforcer()
			.with_contract(
				OperationContract::builder(operation("getPair"), "/pairs/{a}-{b}/rates")
					.build()
					.expect("Contract fixture should build."),
			)
			.expect("Registration should succeed.");
		let request = enforcer
			.prepare("getPair", &params(&[("a", "{b}".into()), ("b", "X".into())]))
			.expect("Both placeholders are present.");

		assert_eq!(request.url.as_str(), "https://api.example.com/v1/pairs/%7Bb%7D-X/rates");
	}

	#[test]
	fn unknown_operations_are_configuration_errors() {
		let err = enforcer()
			.prepare("missing", &Parameters::new())
			.expect_err("Unregistered operations must fail.");

		assert!(matches!(err, Error::Config(ConfigError::UnknownOperation { operation }) if operation == "missing"));
	}

	#[test]
	fn snapshot_restores_learned_requirements() {
		let contract = OperationContract::builder(operation("getProducts"), "/products")
			.build()
			.expect("Contract fixture should build.");
		let trained = enforcer().with_contract(contract.clone()).expect("Registration should succeed.");

		trained.learn_contract("getProducts", ["category"]).expect("Learning should work.");

		let snapshot = trained.snapshot();
		let fresh = enforcer().with_contract(contract).expect("Registration should succeed.");

		assert_eq!(fresh.restore(&snapshot).expect("Restore should succeed."), 1);
		assert_eq!(fresh.restore(&snapshot).expect("Restore should be idempotent."), 0);
		assert!(
			fresh.prepare("getProducts", &Parameters::new()).is_err(),
			"Restored requirement must be enforced."
		);
	}
}
