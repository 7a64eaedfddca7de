//! Saved input tables (`inputs/<prompt id>.json`).

use std::path::{Path, PathBuf};

use whipper_core::Result;

use crate::persist::{file_for, read_json, write_json};
use crate::types::InputTable;

pub struct InputStore {
    dir: PathBuf,
}

impl InputStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn load(&self, prompt_id: &str) -> Result<Option<InputTable>> {
        read_json(&file_for(&self.dir, prompt_id)?)
    }

    pub fn save(&self, prompt_id: &str, table: &InputTable) -> Result<()> {
        write_json(&file_for(&self.dir, prompt_id)?, table)
    }
}
