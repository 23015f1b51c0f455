use similar::{ChangeTag, TextDiff};

use crate::model::{ComparatorResult, ImageContext, Value};
use crate::services::dispatch::{Comparator, ComparatorError};

/// Prefix docker puts in front of metadata-only instructions (ENV, LABEL, ...).
const NOP_PREFIX: &str = "/bin/sh -c #(nop) ";

/// Diff of the commands used to build each image.
///
/// Adds one key to the report: `history`, the unified-diff lines (no context,
/// no headers) between the two command lists, e.g. `+RUN yum -y update`.
pub struct HistoryComparator;

impl Comparator for HistoryComparator {
    fn name(&self) -> &'static str {
        "history"
    }

    fn description(&self) -> &'static str {
        "Unified diff of the layer-creation commands (image history)"
    }

    fn run(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        _silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        let old = layer_commands(first)?;
        let new = layer_commands(second)?;

        let diff: Vec<Value> = history_diff(&old, &new).into_iter().map(Value::String).collect();

        let mut result = ComparatorResult::new();
        result.insert("history".into(), Value::Array(diff));
        Ok(result)
    }
}

/// Layer-creation commands of an image, oldest first.
///
/// Reads `metadata.history`, a list whose entries are either plain strings or
/// objects carrying the command in `created_by` / `CreatedBy`.
pub fn layer_commands(image: &ImageContext) -> Result<Vec<String>, ComparatorError> {
    let entries = image.metadata.get("history").and_then(Value::as_array).ok_or_else(|| {
        ComparatorError::Contract(format!(
            "metadata of image {} has no \"history\" list",
            image.short_id()
        ))
    })?;

    entries
        .iter()
        .map(|entry| {
            let command = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj
                    .get("created_by")
                    .or_else(|| obj.get("CreatedBy"))
                    .and_then(Value::as_str),
                _ => None,
            };
            command.map(strip_nop).ok_or_else(|| {
                ComparatorError::Contract(format!(
                    "unexpected history entry in image {}: {entry}",
                    image.short_id()
                ))
            })
        })
        .collect()
}

fn strip_nop(command: &str) -> String {
    command.strip_prefix(NOP_PREFIX).unwrap_or(command).to_string()
}

/// Changed lines between two command lists, `-` for removed, `+` for added.
pub fn history_diff(old: &[String], new: &[String]) -> Vec<String> {
    let old: Vec<&str> = old.iter().map(String::as_str).collect();
    let new: Vec<&str> = new.iter().map(String::as_str).collect();
    let diff = TextDiff::from_slices(&old, &new);

    diff.iter_all_changes()
        .filter_map(|change| match change.tag() {
            ChangeTag::Equal => None,
            ChangeTag::Delete => Some(format!("-{}", change.value())),
            ChangeTag::Insert => Some(format!("+{}", change.value())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nop_prefix_is_stripped() {
        assert_eq!(strip_nop("/bin/sh -c #(nop) CMD [\"bash\"]"), "CMD [\"bash\"]");
        assert_eq!(strip_nop("/bin/sh -c yum -y update"), "/bin/sh -c yum -y update");
    }

    #[test]
    fn replaced_command_lists_removal_before_addition() {
        let diff = history_diff(&strings(&["FROM base", "RUN a"]), &strings(&["FROM base", "RUN b"]));
        assert_eq!(diff, vec!["-RUN a".to_string(), "+RUN b".to_string()]);
    }

    #[test]
    fn identical_histories_produce_no_lines() {
        let cmds = strings(&["FROM base", "RUN a"]);
        assert!(history_diff(&cmds, &cmds).is_empty());
    }
}
