//! Prompt registry: CRUD over prompts.json, most recent entry first.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use whipper_core::{Error, Result};

use crate::persist::{check_id, read_json, write_json};
use crate::types::PromptDefinition;

pub struct PromptRegistry {
    prompts_file: PathBuf,
    prompts: RwLock<Vec<PromptDefinition>>,
}

impl PromptRegistry {
    pub fn new(prompts_file: &Path) -> Self {
        let prompts = match read_json::<Vec<PromptDefinition>>(prompts_file) {
            Ok(prompts) => prompts.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read {}: {}", prompts_file.display(), e);
                Vec::new()
            }
        };
        info!("PromptRegistry: {} prompts loaded", prompts.len());

        Self {
            prompts_file: prompts_file.to_path_buf(),
            prompts: RwLock::new(prompts),
        }
    }

    // ---------------------------------------------------------------
    // CRUD
    // ---------------------------------------------------------------

    pub fn list(&self) -> Vec<PromptDefinition> {
        self.prompts.read().clone()
    }

    /// The single entry with `id`; none or several is an error.
    pub fn find_unique(&self, id: &str) -> Result<PromptDefinition> {
        let prompts = self.prompts.read();
        let mut matches = prompts.iter().filter(|p| p.id == id);
        match (matches.next(), matches.next()) {
            (Some(prompt), None) => Ok(prompt.clone()),
            _ => Err(Error::AmbiguousPrompt {
                id: id.to_string(),
                matches: prompts.iter().filter(|p| p.id == id).count(),
            }),
        }
    }

    /// Add a prompt at the top. Its id is `{name}_{n}`, or `{n}` when unnamed,
    /// where `n` is the registry size, bumped past ids already taken.
    pub fn add(&self, template: &str, name: &str) -> Result<PromptDefinition> {
        let mut prompts = self.prompts.write();
        let mut index = prompts.len();
        let id = loop {
            let candidate = if name.is_empty() {
                index.to_string()
            } else {
                format!("{}_{}", name, index)
            };
            if !prompts.iter().any(|p| p.id == candidate) {
                break candidate;
            }
            index += 1;
        };
        check_id(&id)?;

        let prompt = PromptDefinition {
            id,
            created_date: today(),
            template: template.to_string(),
            conversation_id: None,
            parent_message_id: None,
        };
        prompts.insert(0, prompt.clone());
        self.save(&prompts)?;

        info!("Added prompt {}", prompt.id);
        Ok(prompt)
    }

    /// Replace the template of `id` and move it to the top; adds it when absent.
    pub fn set(&self, id: &str, template: &str) -> Result<PromptDefinition> {
        check_id(id)?;
        let mut prompts = self.prompts.write();
        let Some(pos) = prompts.iter().position(|p| p.id == id) else {
            drop(prompts);
            return self.add(template, id);
        };

        let mut prompt = prompts.remove(pos);
        prompt.template = template.to_string();
        prompt.created_date = today();
        prompts.insert(0, prompt.clone());
        self.save(&prompts)?;
        Ok(prompt)
    }

    /// Store the thread ids a run ended on and move the entry to the top.
    pub fn update_thread(
        &self,
        id: &str,
        conversation_id: Option<String>,
        parent_message_id: Option<String>,
    ) -> Result<PromptDefinition> {
        let mut prompts = self.prompts.write();
        let pos = prompts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("Prompt '{}'", id)))?;

        let mut prompt = prompts.remove(pos);
        prompt.conversation_id = conversation_id;
        prompt.parent_message_id = parent_message_id;
        prompt.created_date = today();
        prompts.insert(0, prompt.clone());
        self.save(&prompts)?;
        Ok(prompt)
    }

    /// Remove every entry with `id`. Returns true if any was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut prompts = self.prompts.write();
        let len_before = prompts.len();
        prompts.retain(|p| p.id != id);
        let deleted = prompts.len() < len_before;
        if deleted {
            self.save(&prompts)?;
        }
        Ok(deleted)
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    fn save(&self, prompts: &[PromptDefinition]) -> Result<()> {
        write_json(&self.prompts_file, prompts)
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry(dir: &Path) -> PromptRegistry {
        PromptRegistry::new(&dir.join("prompts.json"))
    }

    #[test]
    fn test_add_assigns_ids_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());

        let first = registry.add("Classify: ", "").unwrap();
        let second = registry.add("Translate: ", "fr").unwrap();
        assert_eq!(first.id, "0");
        assert_eq!(second.id, "fr_1");

        let ids: Vec<String> = registry.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["fr_1", "0"]);
    }

    #[test]
    fn test_add_skips_taken_ids() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());

        registry.add("a", "").unwrap();
        registry.add("b", "").unwrap();
        assert!(registry.delete("0").unwrap());
        // Registry size is 1 again, but "1" is still in use.
        let third = registry.add("c", "").unwrap();
        assert_eq!(third.id, "2");
    }

    #[test]
    fn test_rejects_names_unusable_as_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());

        for name in ["a/b", "..\\up", "nul\0"] {
            let err = registry.add("t", name).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}", name);
        }
        assert!(matches!(
            registry.set("a/b", "t").unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(registry.list().is_empty());
        assert!(!dir.path().join("prompts.json").exists());
    }

    #[test]
    fn test_set_moves_to_top_or_adds() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path());

        registry.add("old", "a").unwrap();
        registry.add("other", "b").unwrap();
        let updated = registry.set("a_0", "new").unwrap();
        assert_eq!(updated.template, "new");
        assert_eq!(registry.list()[0].id, "a_0");

        let added = registry.set("fresh", "text").unwrap();
        assert_eq!(added.id, "fresh_2");
        assert_eq!(registry.list()[0].id, "fresh_2");
    }

    #[test]
    fn test_find_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        let dup = PromptDefinition {
            id: "dup".into(),
            created_date: "2024-01-01".into(),
            template: "t".into(),
            conversation_id: None,
            parent_message_id: None,
        };
        write_json(&path, &vec![dup.clone(), dup]).unwrap();

        let registry = PromptRegistry::new(&path);
        match registry.find_unique("dup").unwrap_err() {
            Error::AmbiguousPrompt { matches, .. } => assert_eq!(matches, 2),
            other => panic!("unexpected error: {}", other),
        }
        match registry.find_unique("missing").unwrap_err() {
            Error::AmbiguousPrompt { matches, .. } => assert_eq!(matches, 0),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_update_thread_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        {
            let registry = PromptRegistry::new(&path);
            registry.add("Classify: ", "").unwrap();
            registry.add("Other", "").unwrap();
            registry
                .update_thread("0", Some("conv".into()), Some("msg".into()))
                .unwrap();
        }

        let reloaded = PromptRegistry::new(&path);
        let prompt = reloaded.find_unique("0").unwrap();
        assert_eq!(prompt.conversation_id.as_deref(), Some("conv"));
        assert_eq!(prompt.parent_message_id.as_deref(), Some("msg"));
        assert_eq!(reloaded.list()[0].id, "0");
        assert!(reloaded.update_thread("nope", None, None).is_err());
    }
}
