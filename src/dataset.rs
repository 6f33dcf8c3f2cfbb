use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::record::ProductRecord;

/// Write the full batch as a pretty-printed JSON array, replacing whatever
/// was at `path`. A run's snapshot is always the whole file, never an
/// append.
pub fn write_snapshot(batch: &[ProductRecord], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(batch)?;
    fs::write(path, json).with_context(|| format!("writing dataset {}", path.display()))?;
    Ok(())
}

/// Read a snapshot back for the load phase. A missing, unreadable,
/// malformed, or empty document is "no data", not an error; the caller
/// skips the load.
pub fn read_snapshot(path: &Path) -> Option<Vec<ProductRecord>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("cannot read dataset {}: {}", path.display(), e);
            return None;
        }
    };
    let batch: Vec<ProductRecord> = match serde_json::from_str(&raw) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("malformed dataset {}: {}", path.display(), e);
            return None;
        }
    };
    if batch.is_empty() {
        warn!("dataset {} is empty", path.display());
        return None;
    }
    Some(batch)
}
