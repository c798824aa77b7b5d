//! Strongly typed identifiers for operations, contract versions, and rate-limit scopes.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $kind:expr, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` and wraps it.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				Self::try_from(value.into())
			}

			/// Borrowed view of the identifier.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Unwraps the owned string.
			pub fn into_inner(self) -> String {
				self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$kind.check(&value)?;

				Ok(Self(value))
			}
		}
		impl TryFrom<&str> for $name {
			type Error = IdentifierError;

			fn try_from(value: &str) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.into_inner()
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				self.as_str()
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				self.as_str()
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				self.as_str()
			}
		}
		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0 == other
			}
		}
		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.0 == *other
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", $kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

/// Which family of identifier failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
	/// [`OperationName`]
	Operation,
	/// [`ContractVersion`]
	Version,
	/// [`RateScope`]
	Scope,
}
impl IdentifierKind {
	/// Longest accepted identifier, in bytes.
	pub const MAX_LEN: usize = 128;

	const fn as_str(self) -> &'static str {
		match self {
			IdentifierKind::Operation => "Operation",
			IdentifierKind::Version => "Version",
			IdentifierKind::Scope => "Scope",
		}
	}

	fn check(self, value: &str) -> Result<(), IdentifierError> {
		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: self });
		}
		if value.len() > Self::MAX_LEN {
			return Err(IdentifierError::TooLong { kind: self, max: Self::MAX_LEN });
		}
		if let Some(found) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
			return Err(IdentifierError::InvalidChar { kind: self, found });
		}
		// Keeps operation-derived scope keys disjoint from `METHOD:/path` endpoint keys.
		if self == IdentifierKind::Operation && value.contains('/') {
			return Err(IdentifierError::InvalidChar { kind: self, found: '/' });
		}

		Ok(())
	}
}
impl Display for IdentifierKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier family.
		kind: IdentifierKind,
	},
	/// A whitespace, control, or otherwise disallowed character was found.
	#[error("{kind} identifier contains disallowed character {found:?}.")]
	InvalidChar {
		/// Identifier family.
		kind: IdentifierKind,
		/// First offending character.
		found: char,
	},
	/// The identifier is longer than [`IdentifierKind::MAX_LEN`].
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Identifier family.
		kind: IdentifierKind,
		/// Maximum permitted length.
		max: usize,
	},
}

def_id! { OperationName, IdentifierKind::Operation, "Logical name of a remote API operation (e.g. `getProducts`)." }
def_id! { ContractVersion, IdentifierKind::Version, "Version tag the server attaches to an operation contract." }
def_id! { RateScope, IdentifierKind::Scope, "Key identifying one rate-limit budget." }

impl RateScope {
	/// Scope shared by every call when limits are tracked globally.
	pub fn global() -> Self {
		Self("global".into())
	}

	/// Scope charged per operation; the `op:` prefix keeps it apart from [`global`](Self::global).
	pub fn for_operation(operation: &OperationName) -> Self {
		Self(format!("op:{operation}").into())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_empty_values() {
		assert!(OperationName::new(" getProducts").is_err(), "Leading whitespace must be rejected.");
		assert!(OperationName::new("getProducts ").is_err(), "Trailing whitespace must be rejected.");
		assert!(ContractVersion::new("").is_err());
		assert!(RateScope::new("GET /products").is_err());

		let operation =
			OperationName::new("getProducts").expect("Operation fixture should be considered valid.");

		assert_eq!(operation.as_str(), "getProducts");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let scope: RateScope =
			serde_json::from_str("\"GET:/products\"").expect("Scope should deserialize.");

		assert_eq!(scope.as_ref(), "GET:/products");
		assert!(serde_json::from_str::<RateScope>("\"with space\"").is_err());
	}

	#[test]
	fn length_limit_is_inclusive() {
		OperationName::new("a".repeat(IdentifierKind::MAX_LEN)).expect("Exact length should succeed.");

		assert_eq!(
			OperationName::new("a".repeat(IdentifierKind::MAX_LEN + 1)),
			Err(IdentifierError::TooLong { kind: IdentifierKind::Operation, max: IdentifierKind::MAX_LEN })
		);
	}

	#[test]
	fn operations_reject_path_separators_but_scopes_accept_them() {
		assert_eq!(
			OperationName::new("orders/get"),
			Err(IdentifierError::InvalidChar { kind: IdentifierKind::Operation, found: '/' })
		);
		assert!(RateScope::new("GET:/orders").is_ok());
		assert_eq!(
			ContractVersion::new("v\t2").map_err(|e| e.to_string()),
			Err("Version identifier contains disallowed character '\\t'.".to_owned())
		);
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<OperationName, u8> = HashMap::from_iter([(
			OperationName::new("listOrders").expect("Operation used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("listOrders"), Some(&7));
	}
}
