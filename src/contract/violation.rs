//! Structured contract violations reported back to callers.

// self
use crate::{_prelude::*, id::OperationName};

/// A request that does not satisfy its operation contract.
///
/// `missing` lists required parameters the caller did not supply (and that have no default).
/// `invalid` lists parameters the caller did supply but the server refused.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractViolation {
	/// Operation the request targeted, when known.
	pub operation: Option<OperationName>,
	/// Required parameters absent from the request.
	pub missing: BTreeSet<String>,
	/// Supplied parameters rejected by the server.
	pub invalid: BTreeSet<String>,
}
impl ContractViolation {
	/// Builds a violation listing missing fields.
	pub fn missing<I, S>(fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { missing: fields.into_iter().map(Into::into).collect(), ..Default::default() }
	}

	/// Attaches the operation name.
	pub fn with_operation(mut self, operation: OperationName) -> Self {
		self.operation = Some(operation);

		self
	}

	/// Adds fields the server refused even though they were supplied.
	pub fn with_invalid<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.invalid.extend(fields.into_iter().map(Into::into));

		self
	}

	/// Missing field names in sorted order.
	pub fn missing_fields(&self) -> Vec<&str> {
		self.missing.iter().map(String::as_str).collect()
	}

	/// Every offending field, missing or invalid, in sorted order.
	pub fn fields(&self) -> Vec<&str> {
		self.missing.union(&self.invalid).map(String::as_str).collect()
	}

	/// Returns `true` when no field is reported.
	pub fn is_empty(&self) -> bool {
		self.missing.is_empty() && self.invalid.is_empty()
	}
}
impl Display for ContractViolation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.operation {
			Some(operation) => write!(f, "Request for `{operation}` violates its contract")?,
			None => f.write_str("Request violates its contract")?,
		}

		if !self.missing.is_empty() {
			write!(f, "; missing: {}", join(&self.missing))?;
		}
		if !self.invalid.is_empty() {
			write!(f, "; invalid: {}", join(&self.invalid))?;
		}
		if self.is_empty() {
			f.write_str("; the server did not name the offending fields")?;
		}

		f.write_str(".")
	}
}
impl StdError for ContractViolation {}

fn join(fields: &BTreeSet<String>) -> String {
	fields.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn display_lists_every_field() {
		let violation = ContractViolation::missing(["region", "category"])
			.with_operation(OperationName::new("getProducts").expect("Operation should be valid."))
			.with_invalid(["limit"]);

		assert_eq!(
			violation.to_string(),
			"Request for `getProducts` violates its contract; missing: category, region; invalid: limit."
		);
		assert_eq!(violation.missing_fields(), vec!["category", "region"]);
		assert_eq!(violation.fields(), vec!["category", "limit", "region"]);
	}

	#[test]
	fn empty_violation_still_renders() {
		let violation = ContractViolation::default();

		assert!(violation.is_empty());
		assert!(violation.to_string().contains("did not name"));
	}
}
