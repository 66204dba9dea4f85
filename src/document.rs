//! Document types and key resolution.

use crate::errors::N1qlError;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;

/// A stored document type.
pub trait Document: Serialize + DeserializeOwned + 'static {
    /// Name of the field holding the document key.
    fn key_field() -> Option<&'static str> {
        None
    }

    /// Type name used as the declaring type of members in queries.
    #[must_use]
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Last path segment of a type name, generic arguments dropped:
/// `app::Wrapper<app::Beer>` is `Wrapper`.
#[must_use]
pub fn short_type_name(full: &str) -> &str {
    let base = full.split_once('<').map_or(full, |(head, _)| head);
    base.rsplit("::").next().unwrap_or(base)
}

/// Type -> key field, resolved once per type. Failed lookups are not remembered, so a
/// later `register` takes effect.
#[derive(Debug, Default)]
pub struct KeyResolver {
    fields: RwLock<HashMap<TypeId, &'static str>>,
}

impl KeyResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the key field for a type that doesn't name one itself.
    pub fn register<T: Document>(&self, field: &'static str) {
        self.fields.write().insert(TypeId::of::<T>(), field);
    }

    /// # Errors
    /// `DocumentKeyMissing` when `T` has no key field.
    pub fn key_field<T: Document>(&self) -> Result<&'static str, N1qlError> {
        let id = TypeId::of::<T>();
        if let Some(f) = self.fields.read().get(&id) {
            return Ok(*f);
        }
        let field = T::key_field().ok_or_else(|| N1qlError::DocumentKeyMissing(T::type_name().to_string()))?;
        self.fields.write().insert(id, field);
        Ok(field)
    }

    /// Key of a serialized `T`.
    ///
    /// # Errors
    /// `DocumentKeyMissing` when the type has no key field or the field is absent, null or
    /// not a string or number.
    pub fn key_of<T: Document>(&self, value: &Value) -> Result<String, N1qlError> {
        let field = self.key_field::<T>()?;
        key_in(value, field).ok_or_else(|| {
            N1qlError::DocumentKeyMissing(format!("{}.{field} is empty", T::type_name()))
        })
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.fields.read().len()
    }
}

/// String or numeric value of `field`.
#[must_use]
pub fn key_in(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Beer {
        id: String,
    }
    impl Document for Beer {
        fn key_field() -> Option<&'static str> {
            Some("id")
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Loose {
        code: u32,
    }
    impl Document for Loose {}

    #[test]
    fn resolves_and_caches_on_success() {
        let r = KeyResolver::new();
        assert_eq!(r.key_of::<Beer>(&json!({"id": "beer_1"})).unwrap(), "beer_1");
        assert_eq!(r.cached(), 1);
        assert!(matches!(r.key_of::<Beer>(&json!({"id": null})), Err(N1qlError::DocumentKeyMissing(_))));
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapper<T> {
        inner: T,
    }
    impl<T: Serialize + serde::de::DeserializeOwned + 'static> Document for Wrapper<T> {}

    #[test]
    fn type_names_drop_paths_and_generics() {
        assert_eq!(Beer::type_name(), "Beer");
        assert_eq!(Wrapper::<Beer>::type_name(), "Wrapper");
        assert_eq!(short_type_name("app::Wrapper<app::Beer>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn failures_are_not_cached() {
        let r = KeyResolver::new();
        assert!(matches!(r.key_field::<Loose>(), Err(N1qlError::DocumentKeyMissing(m)) if m == "Loose"));
        assert_eq!(r.cached(), 0);
        r.register::<Loose>("code");
        assert_eq!(r.key_of::<Loose>(&json!({"code": 7})).unwrap(), "7");
    }
}
