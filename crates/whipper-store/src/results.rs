//! Per-prompt result cache (`results/<prompt id>.json`).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use whipper_core::{Error, Result};

use crate::persist::{file_for, read_json, write_json};
use crate::types::{ResultRow, ReviewEdit};

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Prompt ids with a cached result file.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    name.strip_suffix(".json").map(str::to_string)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }

    /// Cached rows for `prompt_id`; empty when nothing was cached yet.
    pub fn load(&self, prompt_id: &str) -> Result<Vec<ResultRow>> {
        let path = file_for(&self.dir, prompt_id)?;
        Ok(read_json(&path)?.unwrap_or_default())
    }

    /// Rewrite the whole cache for `prompt_id`.
    pub fn save(&self, prompt_id: &str, rows: &[ResultRow]) -> Result<()> {
        let path = file_for(&self.dir, prompt_id)?;
        write_json(&path, rows)?;
        debug!("Persisted {} result rows for {}", rows.len(), prompt_id);
        Ok(())
    }

    /// Remove the cache for `prompt_id`. Returns true if it existed.
    pub fn delete(&self, prompt_id: &str) -> Result<bool> {
        let path = file_for(&self.dir, prompt_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted result cache {}", prompt_id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge reviewer flags and comments into the cached rows.
    pub fn save_review(&self, prompt_id: &str, edits: &[ReviewEdit]) -> Result<Vec<ResultRow>> {
        let mut rows = self.load(prompt_id)?;
        let count = rows.len();
        for edit in edits {
            let row = rows.get_mut(edit.index).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Review row {} is out of range ({} rows)",
                    edit.index, count
                ))
            })?;
            if let Some(flagged) = edit.flagged {
                row.flagged = flagged;
            }
            if let Some(comment) = &edit.comment {
                row.comment = comment.clone();
            }
        }
        self.save(prompt_id, &rows)?;
        Ok(rows)
    }
}
