//! The persisted-configuration collaborator.
//!
//! Configuration is a JSON document per `(guild_id, module_key)`, addressed
//! by a [`ConfigPath`]. Backends implement [`ConfigStore`]; the framework
//! layers locking on top.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Logical address of a module's config blob within a guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    guild_id: String,
    module_key: String,
}

impl ConfigPath {
    pub fn new(guild_id: impl Into<String>, module_key: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            module_key: module_key.into(),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn module_key(&self) -> &str {
        &self.module_key
    }

    /// Relative file location, `guilds/<guild_id>/<module_key>.json`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidPath`] if either component is empty, is `.` or
    /// `..`, or contains a path separator or NUL.
    pub fn relative_path(&self) -> StoreResult<PathBuf> {
        for component in [&self.guild_id, &self.module_key] {
            let invalid = component.is_empty()
                || component == "."
                || component == ".."
                || component.contains(['/', '\\', '\0']);
            if invalid {
                return Err(StoreError::InvalidPath(component.clone()));
            }
        }
        Ok(PathBuf::from("guilds")
            .join(&self.guild_id)
            .join(format!("{}.json", self.module_key)))
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guilds/{}/{}", self.guild_id, self.module_key)
    }
}

/// JSON-blob key/value storage.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// Returns the stored document, or `None` if nothing was saved yet.
    async fn read_json(&self, path: &ConfigPath) -> StoreResult<Option<Value>>;

    /// Replaces the stored document.
    async fn save_json(&self, path: &ConfigPath, value: &Value) -> StoreResult<()>;
}

/// A shared store trait object.
pub type BoxedConfigStore = Arc<dyn ConfigStore>;
