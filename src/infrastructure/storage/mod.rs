//! File-based storage implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::traits::ConfigStore;

fn empty_document() -> Value {
    Value::Object(serde_json::Map::new())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// JSON file store: one `<name>.json` per document under a directory
pub struct JsonFileStore {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Value>>,
}

impl JsonFileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create the directory if needed
    pub fn init(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.base_path)?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Unsupported(format!(
                "document name '{}'",
                name
            )));
        }
        Ok(self.base_path.join(format!("{}.json", name)))
    }

    fn read_file(path: &Path) -> Value {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return empty_document(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return empty_document();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            empty_document()
        })
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, name: &str) -> Value {
        let name = normalize(name);
        if let Some(doc) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return doc.clone();
        }

        // Rejected names are never cached
        let path = match self.path_for(&name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Refusing to read document: {}", e);
                return empty_document();
            }
        };
        let doc = Self::read_file(&path);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, doc.clone());
        doc
    }

    fn set(&self, name: &str, document: Value) -> Result<(), StorageError> {
        let name = normalize(name);
        let path = self.path_for(&name)?;
        let content = serde_json::to_string_pretty(&document)?;

        // Cache lock held until the rename lands
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        std::fs::create_dir_all(&self.base_path)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        cache.insert(name, document);
        Ok(())
    }
}

/// In-memory store for tests and `plugins` dry runs
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, name: &str) -> Value {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(name))
            .cloned()
            .unwrap_or_else(empty_document)
    }

    fn set(&self, name: &str, document: Value) -> Result<(), StorageError> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(name), document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.get("admin"), json!({}));
    }

    #[test]
    fn documents_survive_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("config"));
        store.set("Groups", json!({ "ops": ["#ops"] })).unwrap();

        assert!(dir.path().join("config/groups.json").exists());
        assert!(!dir.path().join("config/groups.json.tmp").exists());

        let reopened = JsonFileStore::new(dir.path().join("config"));
        assert_eq!(reopened.get("groups"), json!({ "ops": ["#ops"] }));
    }

    #[test]
    fn unparsable_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("banned.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.get("banned"), json!({}));
    }

    #[test]
    fn path_like_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.set("../escape", json!({})).is_err());
        assert_eq!(store.get("../escape"), json!({}));
    }

    #[test]
    fn rejected_names_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        for i in 0..10 {
            assert_eq!(store.get(&format!("../junk{}", i)), json!({}));
        }
        assert!(store.cache.read().unwrap().is_empty());

        store.get("admin");
        assert_eq!(store.cache.read().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_is_case_insensitive() {
        let store = MemoryStore::new();
        store.set("Perm", json!({ "mods": [] })).unwrap();
        assert_eq!(store.get("perm"), json!({ "mods": [] }));
        assert_eq!(store.get("other"), json!({}));
    }
}
