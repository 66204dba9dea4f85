//! Serializer collaborator: converts between typed documents and stored JSON, and
//! optionally reports how members are named in stored documents.

use crate::errors::N1qlError;
use crate::n1ql::NamingConvention;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Member-name contract of a serializer: the stored field name for a host member.
pub trait MemberContract: Send + Sync {
    /// `None` when the contract has no opinion about this member.
    fn member_name(&self, declaring_type: &str, member: &str) -> Option<String>;
}

pub trait Serializer: Send + Sync {
    /// Hook applied to a document before it is written.
    ///
    /// # Errors
    /// Implementation specific.
    fn to_document(&self, value: Value) -> Result<Value, N1qlError> {
        Ok(value)
    }

    /// Hook applied to a stored document before it is handed to callers.
    ///
    /// # Errors
    /// Implementation specific.
    fn from_document(&self, value: Value) -> Result<Value, N1qlError> {
        Ok(value)
    }

    fn member_contract(&self) -> Option<&dyn MemberContract> {
        None
    }
}

/// Explicit renames plus a naming convention for everything else, mirroring what the
/// serde attributes on the document types produce.
#[derive(Debug, Clone, Default)]
pub struct FieldContract {
    convention: NamingConvention,
    renames: HashMap<(String, String), String>,
}

impl FieldContract {
    #[must_use]
    pub fn new(convention: NamingConvention) -> Self {
        Self { convention, renames: HashMap::new() }
    }

    #[must_use]
    pub fn rename(
        mut self,
        declaring_type: impl Into<String>,
        member: impl Into<String>,
        stored: impl Into<String>,
    ) -> Self {
        self.renames.insert((declaring_type.into(), member.into()), stored.into());
        self
    }
}

impl MemberContract for FieldContract {
    fn member_name(&self, declaring_type: &str, member: &str) -> Option<String> {
        if let Some(n) = self.renames.get(&(declaring_type.to_string(), member.to_string())) {
            return Some(n.clone());
        }
        Some(self.convention.apply(member))
    }
}

/// `serde_json` backed serializer.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    contract: Option<FieldContract>,
}

impl JsonSerializer {
    /// Serializer without a member contract; name resolution falls back to the configured
    /// naming convention.
    #[must_use]
    pub const fn new() -> Self {
        Self { contract: None }
    }

    #[must_use]
    pub const fn with_contract(contract: FieldContract) -> Self {
        Self { contract: Some(contract) }
    }
}

impl Serializer for JsonSerializer {
    fn member_contract(&self) -> Option<&dyn MemberContract> {
        self.contract.as_ref().map(|c| c as &dyn MemberContract)
    }
}

/// `T` -> stored JSON through `serializer`.
///
/// # Errors
/// Serde or serializer-hook failure.
pub fn to_stored<T: Serialize>(serializer: &dyn Serializer, doc: &T) -> Result<Value, N1qlError> {
    serializer.to_document(serde_json::to_value(doc)?)
}

/// Stored JSON -> `T` through `serializer`.
///
/// # Errors
/// Serde or serializer-hook failure.
pub fn from_stored<T: DeserializeOwned>(
    serializer: &dyn Serializer,
    value: Value,
) -> Result<T, N1qlError> {
    Ok(serde_json::from_value(serializer.from_document(value)?)?)
}
