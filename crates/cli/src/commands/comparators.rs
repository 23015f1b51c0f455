use anyhow::Result;
use serde::Serialize;

use containerdiff_core::services::dispatch::default_comparator_registry;

#[derive(Debug, Serialize)]
pub struct ComparatorInfo {
    pub name: String,
    pub description: String,
}

/// List the comparators built into this binary, in dispatch order.
pub fn list_comparators_command(json: bool) -> Result<()> {
    let registry = default_comparator_registry();
    let entries: Vec<ComparatorInfo> = registry
        .descriptions()
        .into_iter()
        .map(|(name, description)| ComparatorInfo {
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Comparators: (none)");
        return Ok(());
    }

    println!("Comparators:");
    for entry in entries {
        println!("- {}: {}", entry.name, entry.description);
    }

    Ok(())
}
