use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::filter::apply_filter;
use crate::model::{Map, Value};

/// Filter configuration bundled with the library.
pub const DEFAULT_FILTER_JSON: &str = include_str!("../../filter.json");

#[derive(Debug, Error)]
pub enum FilterConfigError {
    #[error("Failed to read filter config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse filter config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse filter config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Filter config must be a mapping of report keys to filter rules")]
    NotAMapping,
}

/// Report key -> filter rule tree.
///
/// Rules are stored raw and only interpreted when applied, so one malformed
/// rule degrades to a pass-through for its key instead of rejecting the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    rules: Map<String, Value>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, FilterConfigError> {
        match value {
            Value::Object(rules) => Ok(Self { rules }),
            _ => Err(FilterConfigError::NotAMapping),
        }
    }

    pub fn from_json_str(body: &str) -> Result<Self, FilterConfigError> {
        Self::from_value(serde_json::from_str(body)?)
    }

    pub fn from_yaml_str(body: &str) -> Result<Self, FilterConfigError> {
        Self::from_value(serde_yaml::from_str(body)?)
    }

    /// Load a filter config from disk; `.yaml`/`.yml` files are parsed as YAML,
    /// anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterConfigError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .map_err(|source| FilterConfigError::Io { path: path.to_path_buf(), source })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&body),
            _ => Self::from_json_str(&body),
        }
    }

    /// The default rules shipped with the library.
    pub fn builtin() -> Self {
        Self::from_json_str(DEFAULT_FILTER_JSON).unwrap_or_default()
    }

    /// Add or replace the rule for `key`.
    pub fn with_rule(mut self, key: impl Into<String>, rule: Value) -> Self {
        self.rules.insert(key.into(), rule);
        self
    }

    pub fn rule(&self, key: &str) -> Option<&Value> {
        self.rules.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Filter the value stored under `key`, if a rule exists for it.
    pub fn apply(&self, key: &str, value: Value) -> Value {
        match self.rules.get(key) {
            Some(rule) => apply_filter(value, rule),
            None => value,
        }
    }
}
