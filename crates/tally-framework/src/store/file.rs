use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use tally_core::{ConfigPath, ConfigStore, StoreError, StoreResult};

/// [`ConfigStore`] backed by JSON files under a base directory.
///
/// Documents live at `<base_dir>/guilds/<guild_id>/<module_key>.json`.
/// Saves go through a sibling `.tmp` file and a rename, so a crash mid-write
/// leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    base_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &ConfigPath) -> StoreResult<PathBuf> {
        Ok(self.base_dir.join(path.relative_path()?))
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn read_json(&self, path: &ConfigPath) -> StoreResult<Option<Value>> {
        let file = self.resolve(path)?;
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save_json(&self, path: &ConfigPath, value: &Value) -> StoreResult<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &file).await?;

        debug!(path = %file.display(), bytes = bytes.len(), "Config document saved");
        Ok(())
    }
}
