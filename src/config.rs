//! Context configuration: TOML file plus environment overrides.

use crate::errors::N1qlError;
use crate::n1ql::NamingConvention;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_BUCKET: &str = "N1QLITE_BUCKET";
pub const ENV_NAMING: &str = "N1QLITE_NAMING";
pub const ENV_CHANGE_TRACKING: &str = "N1QLITE_CHANGE_TRACKING";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Bucket queried when a model names no explicit source.
    pub bucket: String,
    /// Fallback naming convention when the serializer has no contract for a member.
    pub naming: NamingConvention,
    /// Open a change-tracking scope as soon as the context is created.
    pub change_tracking: bool,
    /// Log every compiled statement on the query target.
    pub log_queries: bool,
    pub query_timeout_ms: Option<u64>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            bucket: "default".to_string(),
            naming: NamingConvention::AsIs,
            change_tracking: false,
            log_queries: true,
            query_timeout_ms: None,
        }
    }
}

impl ContextConfig {
    /// # Errors
    /// Returns an error if the file can't be read or isn't valid TOML for this shape.
    pub fn load(path: &Path) -> Result<Self, N1qlError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml(&s)
    }

    /// # Errors
    /// Returns `Config` when the text doesn't parse.
    pub fn from_toml(s: &str) -> Result<Self, N1qlError> {
        toml::from_str::<Self>(s).map_err(|e| N1qlError::Config(e.to_string()))
    }

    /// Defaults overlaid with environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Overlay environment variables on the current values. Unparseable values are ignored
    /// with a warning.
    pub fn apply_env(&mut self) {
        if let Ok(b) = std::env::var(ENV_BUCKET)
            && !b.trim().is_empty()
        {
            self.bucket = b;
        }
        if let Ok(n) = std::env::var(ENV_NAMING) {
            match n.parse::<NamingConvention>() {
                Ok(conv) => self.naming = conv,
                Err(e) => log::warn!("ignoring {ENV_NAMING}: {e}"),
            }
        }
        if let Ok(t) = std::env::var(ENV_CHANGE_TRACKING) {
            self.change_tracking = matches!(t.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// # Errors
    /// Returns `Config` if the configuration can't be rendered as TOML.
    pub fn to_toml(&self) -> Result<String, N1qlError> {
        toml::to_string_pretty(self).map_err(|e| N1qlError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_fields_missing() {
        let cfg = ContextConfig::from_toml("bucket = \"beer-sample\"\n").unwrap();
        assert_eq!(cfg.bucket, "beer-sample");
        assert_eq!(cfg.naming, NamingConvention::AsIs);
        assert!(cfg.log_queries);
        assert!(!cfg.change_tracking);
    }

    #[test]
    fn naming_parses_from_toml() {
        let cfg = ContextConfig::from_toml("naming = \"camelCase\"\nchange_tracking = true\n").unwrap();
        assert_eq!(cfg.naming, NamingConvention::CamelCase);
        assert!(cfg.change_tracking);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = ContextConfig::from_toml("bucket = [").unwrap_err();
        assert!(matches!(err, N1qlError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("n1qlite.toml");
        std::fs::write(&p, "bucket = \"travel\"\nquery_timeout_ms = 2500\n").unwrap();
        let cfg = ContextConfig::load(&p).unwrap();
        assert_eq!(cfg.bucket, "travel");
        assert_eq!(cfg.query_timeout_ms, Some(2500));
        let again = ContextConfig::from_toml(&cfg.to_toml().unwrap()).unwrap();
        assert_eq!(again, cfg);
    }
}
