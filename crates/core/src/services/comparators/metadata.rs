use std::collections::BTreeSet;

use crate::filter::element_text;
use crate::model::{ComparatorResult, ImageContext, Map, Value};
use crate::services::dispatch::{Comparator, ComparatorError};

/// Differences in the image configuration (`Env`, `Cmd`, `Labels`, ...).
///
/// Adds one key to the report: `metadata`, one `Key: old -> new` line per
/// differing configuration key, keys in lexicographic order. Silent mode skips
/// keys that are empty or unset on both sides.
pub struct MetadataComparator;

impl Comparator for MetadataComparator {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn description(&self) -> &'static str {
        "Changed image configuration keys (Env, Cmd, Labels, ...)"
    }

    fn run(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        let old = config_of(first)?;
        let new = config_of(second)?;

        let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        let lines: Vec<Value> = keys
            .into_iter()
            .filter_map(|key| {
                let (a, b) = (old.get(key.as_str()), new.get(key.as_str()));
                if a == b || (silent && is_blank(a) && is_blank(b)) {
                    return None;
                }
                Some(Value::String(format!("{key}: {} -> {}", render(a), render(b))))
            })
            .collect();

        let mut result = ComparatorResult::new();
        result.insert("metadata".into(), Value::Array(lines));
        Ok(result)
    }
}

fn config_of(image: &ImageContext) -> Result<&Map<String, Value>, ComparatorError> {
    match image.metadata.get("config") {
        Some(Value::Object(config)) => Ok(config),
        _ => Err(ComparatorError::Contract(format!(
            "metadata of image {} has no \"config\" mapping",
            image.short_id()
        ))),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        None => "<none>".to_string(),
        Some(v) => element_text(v).into_owned(),
    }
}
