use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use tally_core::{ConfigPath, ConfigStore, StoreResult};

/// [`ConfigStore`] kept in process memory.
///
/// Applies the same path rules as [`FileConfigStore`](super::FileConfigStore)
/// so tests catch invalid keys.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    documents: Mutex<HashMap<ConfigPath, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read_json(&self, path: &ConfigPath) -> StoreResult<Option<Value>> {
        path.relative_path()?;
        Ok(self.documents.lock().get(path).cloned())
    }

    async fn save_json(&self, path: &ConfigPath, value: &Value) -> StoreResult<()> {
        path.relative_path()?;
        self.documents.lock().insert(path.clone(), value.clone());
        Ok(())
    }
}
