//! Report filtering: a small recursive include/exclude language.
//!
//! A filter node looks like
//!
//! ```json
//! { "action": "exclude", "keys": ["added", "modified"], "data": ["^/tmp/", "\\.pyc$"] }
//! ```
//!
//! - `action` is `include` or `exclude`.
//! - `data` is a list of regular expressions, joined with `|` into one pattern.
//! - `keys` (optional) turns the node into a descent node: the rule is applied
//!   to the value stored under each named key instead of the value itself.
//!
//! Without `keys` the node filters a list, matching each element's string
//! form anywhere (search, not anchored match).
//!
//! Filtering never fails. A malformed node is logged and the data passes
//! through untouched.

use std::borrow::Cow;

use regex::Regex;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::Value;

mod config;

pub use config::{FilterConfig, FilterConfigError, DEFAULT_FILTER_JSON};

/// What a leaf node does with elements matching its pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    /// Keep only matching elements.
    Include,
    /// Drop matching elements.
    Exclude,
    /// Any other string. Applying such a node leaves the data unchanged.
    Unrecognized(String),
}

impl FilterAction {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "include" => FilterAction::Include,
            "exclude" => FilterAction::Exclude,
            other => FilterAction::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterAction::Include => "include",
            FilterAction::Exclude => "exclude",
            FilterAction::Unrecognized(raw) => raw,
        }
    }
}

/// Reasons a raw filter node cannot be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterSpecError {
    #[error("filter options are not a mapping")]
    NotAMapping,
    #[error("wrong or missing \"action\" key in filter options")]
    Action,
    #[error("wrong or missing \"data\" key in filter options")]
    Data,
    #[error("\"data\" entry {0} in filter options is not a string")]
    Pattern(usize),
    #[error("\"keys\" filter option must be a list of strings")]
    Keys,
}

/// A validated filter node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub action: FilterAction,
    pub patterns: Vec<String>,
    pub keys: Option<Vec<String>>,
}

impl FilterSpec {
    pub fn new(action: FilterAction, patterns: Vec<String>) -> Self {
        Self { action, patterns, keys: None }
    }

    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterAction::Include, patterns.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterAction::Exclude, patterns.into_iter().map(Into::into).collect())
    }

    /// Turn this node into a descent node over `keys`.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Interpret a raw filter node.
    pub fn from_value(raw: &Value) -> Result<Self, FilterSpecError> {
        let node = raw.as_object().ok_or(FilterSpecError::NotAMapping)?;

        let action = node.get("action").and_then(Value::as_str).ok_or(FilterSpecError::Action)?;
        let data = node.get("data").and_then(Value::as_array).ok_or(FilterSpecError::Data)?;
        let patterns = data
            .iter()
            .enumerate()
            .map(|(idx, p)| p.as_str().map(str::to_string).ok_or(FilterSpecError::Pattern(idx)))
            .collect::<Result<Vec<_>, _>>()?;

        let keys = match node.get("keys") {
            None => None,
            Some(Value::Array(keys)) => Some(
                keys.iter()
                    .map(|k| k.as_str().map(str::to_string).ok_or(FilterSpecError::Keys))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(FilterSpecError::Keys),
        };

        Ok(Self { action: FilterAction::parse(action), patterns, keys })
    }

    /// Raw form, as it would appear in a filter config file.
    pub fn to_value(&self) -> Value {
        let mut node = serde_json::Map::new();
        node.insert("action".into(), Value::String(self.action.as_str().to_string()));
        node.insert(
            "data".into(),
            Value::Array(self.patterns.iter().cloned().map(Value::String).collect()),
        );
        if let Some(keys) = &self.keys {
            node.insert("keys".into(), Value::Array(keys.iter().cloned().map(Value::String).collect()));
        }
        Value::Object(node)
    }

    /// Apply this node to `data`, returning the filtered value.
    pub fn apply(&self, data: Value) -> Value {
        match &self.keys {
            Some(keys) => self.descend(data, keys),
            None => self.filter_sequence(data),
        }
    }

    fn descend(&self, data: Value, keys: &[String]) -> Value {
        let mut map = match data {
            Value::Object(map) => map,
            other => {
                error!("\"keys\" filter option specified but filtered data is not a mapping");
                return other;
            }
        };

        for key in keys {
            // A missing key ends the walk: later keys are left alone as well.
            let Some(slot) = map.get_mut(key) else {
                warn!(key = %key, "filtered data has no such key");
                break;
            };
            let value = slot.take();
            *slot = self.filter_sequence(value);
        }

        Value::Object(map)
    }

    fn filter_sequence(&self, data: Value) -> Value {
        let items = match data {
            Value::Array(items) => items,
            other => {
                error!("filtered data is not a list");
                return other;
            }
        };
        if self.patterns.is_empty() {
            warn!("\"data\" filter option is empty");
            return Value::Array(items);
        }

        let keep_matches = match &self.action {
            FilterAction::Include => true,
            FilterAction::Exclude => false,
            FilterAction::Unrecognized(action) => {
                warn!(action = %action, "unrecognized filter action; data left unchanged");
                return Value::Array(items);
            }
        };

        let pattern = match Regex::new(&self.patterns.join("|")) {
            Ok(re) => re,
            Err(err) => {
                error!(error = %err, "invalid pattern in \"data\" filter option");
                return Value::Array(items);
            }
        };

        Value::Array(
            items
                .into_iter()
                .filter(|item| pattern.is_match(&element_text(item)) == keep_matches)
                .collect(),
        )
    }
}

/// Apply a raw filter node to `data`.
///
/// Malformed nodes are logged and `data` is returned unchanged.
pub fn apply_filter(data: Value, spec: &Value) -> Value {
    match FilterSpec::from_value(spec) {
        Ok(spec) => spec.apply(data),
        Err(err) => {
            error!(error = %err, "ignoring malformed filter");
            data
        }
    }
}

/// String form an element is matched against: raw text for strings, compact
/// JSON for everything else.
pub fn element_text(item: &Value) -> Cow<'_, str> {
    match item {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}
