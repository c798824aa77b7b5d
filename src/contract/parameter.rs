//! Parameter-name sets used by operation contracts.

// std
use std::{cmp::Ordering, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating parameter names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ParameterValidationError {
	/// Empty parameter names are not allowed.
	#[error("Parameter names cannot be empty.")]
	Empty,
	/// Parameter names cannot contain whitespace characters.
	#[error("Parameter name contains whitespace: {name}.")]
	ContainsWhitespace {
		/// The offending parameter name.
		name: String,
	},
}

/// Normalized set of parameter names with a stable fingerprint.
///
/// Names are deduplicated and sorted, so two contracts requiring the same parameters compare
/// equal regardless of declaration order. The [`fingerprint`](Self::fingerprint) is a base64
/// (no padding) SHA-256 digest of the comma-joined names and serves as a revision id for a
/// contract's required set in logs and snapshots.
#[derive(Default)]
pub struct ParameterSet {
	names: Arc<[String]>,
	fingerprint_cache: OnceLock<String>,
}
impl ParameterSet {
	/// Creates a normalized set from any iterator of names.
	pub fn new<I, S>(names: I) -> Result<Self, ParameterValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for name in names {
			set.insert(validate(name.into())?);
		}

		Ok(Self::from_sorted(set))
	}

	fn from_sorted(set: BTreeSet<String>) -> Self {
		Self { names: Arc::from(set.into_iter().collect::<Vec<_>>()), fingerprint_cache: OnceLock::new() }
	}

	/// Number of distinct names.
	pub fn len(&self) -> usize {
		self.names.len()
	}

	/// Returns true if no names are defined.
	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Returns true if the set contains `name`.
	pub fn contains(&self, name: &str) -> bool {
		self.names.binary_search_by(|candidate| candidate.as_str().cmp(name)).is_ok()
	}

	/// Iterator over names in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.names.iter().map(String::as_str)
	}

	/// Returns true if every name in `self` is also in `other`.
	pub fn is_subset(&self, other: &ParameterSet) -> bool {
		self.iter().all(|name| other.contains(name))
	}

	/// Returns the union of both sets.
	pub fn union(&self, other: &ParameterSet) -> ParameterSet {
		let merged = self.iter().chain(other.iter()).map(str::to_owned).collect();

		Self::from_sorted(merged)
	}

	/// Stable fingerprint derived from the normalized names; cached after the first call.
	pub fn fingerprint(&self) -> String {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.names)).clone()
	}

	/// Returns the underlying sorted slice.
	pub fn as_slice(&self) -> &[String] {
		&self.names
	}
}
impl Clone for ParameterSet {
	fn clone(&self) -> Self {
		Self { names: self.names.clone(), fingerprint_cache: OnceLock::new() }
	}
}
impl PartialEq for ParameterSet {
	fn eq(&self, other: &Self) -> bool {
		self.names == other.names
	}
}
impl Eq for ParameterSet {}
impl PartialOrd for ParameterSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ParameterSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.names.cmp(&other.names)
	}
}
impl Hash for ParameterSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.names.hash(state);
	}
}
impl Debug for ParameterSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ParameterSet").field(&self.names).finish()
	}
}
impl Display for ParameterSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.names.join(","))
	}
}
impl TryFrom<Vec<String>> for ParameterSet {
	type Error = ParameterValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl Serialize for ParameterSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.names.len()))?;

		for name in self.names.iter() {
			seq.serialize_element(name)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ParameterSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ParameterSet::new(values).map_err(DeError::custom)
	}
}

/// Validates a single parameter name.
pub fn validate(name: String) -> Result<String, ParameterValidationError> {
	if name.is_empty() {
		return Err(ParameterValidationError::Empty);
	}
	if name.chars().any(char::is_whitespace) {
		return Err(ParameterValidationError::ContainsWhitespace { name });
	}

	Ok(name)
}

fn compute_fingerprint(names: &[String]) -> String {
	let mut hasher = Sha256::new();

	hasher.update(names.join(",").as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn names_normalize_and_fingerprint_stably() {
		let lhs = ParameterSet::new(["region", "category", "region"])
			.expect("Left-hand parameter set should be valid.");
		let rhs = ParameterSet::new(["category", "region"])
			.expect("Right-hand parameter set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.to_string(), "category,region");
		assert_eq!(lhs.fingerprint(), rhs.fingerprint());
		assert_ne!(lhs.fingerprint(), ParameterSet::default().fingerprint());
	}

	#[test]
	fn invalid_names_error() {
		assert_eq!(ParameterSet::new([""]), Err(ParameterValidationError::Empty));
		assert!(matches!(
			ParameterSet::new(["page size"]),
			Err(ParameterValidationError::ContainsWhitespace { .. })
		));
	}

	#[test]
	fn union_only_grows() {
		let base = ParameterSet::new(["limit"]).expect("Base set should be valid.");
		let learned = ParameterSet::new(["category"]).expect("Learned set should be valid.");
		let merged = base.union(&learned);

		assert!(base.is_subset(&merged));
		assert!(learned.is_subset(&merged));
		assert!(!merged.is_subset(&base));
		assert_eq!(merged.iter().collect::<Vec<_>>(), vec!["category", "limit"]);
	}

	#[test]
	fn serde_rejects_invalid_names() {
		let set: ParameterSet =
			serde_json::from_str("[\"b\",\"a\"]").expect("Name list should deserialize.");

		assert_eq!(set.as_slice(), ["a".to_owned(), "b".to_owned()].as_slice());
		assert!(serde_json::from_str::<ParameterSet>("[\"\"]").is_err());
	}
}
