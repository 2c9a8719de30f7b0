//! Tag command handlers

use anyhow::Result;

use markstore_core::Store;

use crate::output::Output;

/// List all tags with usage counts
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let tags = store.tag_counts()?;
    output.print_tags(&tags);
    Ok(())
}

/// Replace a tag in every bookmark; no replacement removes it
pub fn replace(store: &Store, old: &str, new: &[String], output: &Output) -> Result<()> {
    let new: Vec<&str> = new.iter().map(String::as_str).collect();
    let changed = store.replace_tag(old, &new)?;

    if new.is_empty() {
        output.success(&format!("Removed tag '{}' from {} bookmark(s)", old, changed));
    } else {
        output.success(&format!(
            "Replaced tag '{}' with '{}' in {} bookmark(s)",
            old,
            new.join(","),
            changed
        ));
    }
    Ok(())
}
