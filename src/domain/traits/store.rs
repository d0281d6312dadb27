use crate::application::errors::StorageError;

/// Named JSON documents (admins, bans, groups, plugin data).
///
/// Plugin scripts call this from inside the sandbox, on blocking threads.
pub trait ConfigStore: Send + Sync {
    /// Read a document. A missing or unreadable document is an empty object.
    fn get(&self, name: &str) -> serde_json::Value;

    /// Replace a document and persist it
    fn set(&self, name: &str, document: serde_json::Value) -> Result<(), StorageError>;
}
