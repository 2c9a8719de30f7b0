//! Status command handler

use anyhow::Result;

use markstore_core::Store;

use crate::output::{Output, OutputFormat};

/// Show database location and contents
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let config = store.config();
    let db_path = config.db_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let bookmarks = store.count()?;
    let tags = store.tag_counts()?.len();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "database": db_path,
                    "database_size": db_size,
                    "threads": config.worker_threads(),
                    "counts": {
                        "bookmarks": bookmarks,
                        "tags": tags
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", bookmarks);
        }
        OutputFormat::Human => {
            println!("markstore Status");
            println!("================");
            println!();
            println!("Storage:");
            println!("  Database: {}", db_path.display());
            println!("  Size:     {}", human_size(db_size));
            println!();
            println!("Contents:");
            println!("  Bookmarks: {}", bookmarks);
            println!("  Tags:      {}", tags);
        }
    }

    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
