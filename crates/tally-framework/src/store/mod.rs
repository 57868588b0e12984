//! Locked access to per-guild module configuration.
//!
//! [`ConfigRepository`] wraps a [`ConfigStore`] backend and serializes
//! read-modify-write cycles per [`ConfigPath`]. Every `(guild, module)` blob
//! has its own async mutex, so unrelated modules never wait on each other,
//! while two handlers mutating the same blob cannot lose each other's
//! updates.
//!
//! # Example
//!
//! ```rust,ignore
//! let repo = ConfigRepository::new(Arc::new(FileConfigStore::new("./bot_data")));
//! let path = ConfigPath::new(guild_id, "expenses");
//!
//! repo.update(&path, |blob| {
//!     blob["currency"] = json!("EUR");
//! })
//! .await?;
//! ```
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`FileConfigStore`] | `<base_dir>/guilds/<guild>/<module>.json` on disk |
//! | [`MemoryConfigStore`] | Tests and ephemeral deployments |

mod file;
mod memory;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use tally_core::{BoxedConfigStore, ConfigPath, StoreError, StoreResult};

/// Exclusive access to one config blob. Released on drop.
pub type ConfigGuard = OwnedMutexGuard<()>;

/// Config store with per-blob locking.
pub struct ConfigRepository {
    store: BoxedConfigStore,
    locks: Mutex<HashMap<ConfigPath, Arc<AsyncMutex<()>>>>,
}

impl ConfigRepository {
    pub fn new(store: BoxedConfigStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// A repository over a fresh [`MemoryConfigStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryConfigStore::new()))
    }

    /// Returns the underlying backend.
    pub fn store(&self) -> &BoxedConfigStore {
        &self.store
    }

    /// Waits for exclusive access to the blob at `path`.
    ///
    /// [`load`](Self::load) and [`save`](Self::save) do not lock on their
    /// own; hold this guard around a load→mutate→save sequence. Do not call
    /// [`update`](Self::update) for the same path while holding it.
    pub async fn lock(&self, path: &ConfigPath) -> ConfigGuard {
        let lock = {
            let mut locks = self.locks.lock();
            // Only the map holds an idle entry; holders and waiters keep a clone.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(path.clone()).or_default())
        };
        trace!(path = %path, "Waiting for config lock");
        lock.lock_owned().await
    }

    /// Reads the blob, returning an empty object if nothing was saved yet.
    pub async fn load(&self, path: &ConfigPath) -> StoreResult<Value> {
        Ok(self
            .store
            .read_json(path)
            .await?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Reads the blob and deserializes it, falling back to `T::default()`
    /// when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] if the stored document has the wrong shape.
    pub async fn load_typed<T>(&self, path: &ConfigPath) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.store.read_json(path).await? {
            None => Ok(T::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Replaces the blob.
    pub async fn save(&self, path: &ConfigPath, value: &Value) -> StoreResult<()> {
        self.store.save_json(path, value).await
    }

    /// Runs one locked read-modify-write cycle and returns the closure's value.
    ///
    /// The blob is saved even if `f` leaves it unchanged.
    pub async fn update<F, R>(&self, path: &ConfigPath, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Value) -> R + Send,
        R: Send,
    {
        let _guard = self.lock(path).await;
        let mut blob = self.load(path).await?;
        let out = f(&mut blob);
        self.save(path, &blob).await?;
        Ok(out)
    }
}

impl std::fmt::Debug for ConfigRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRepository")
            .field("locked_paths", &self.locks.lock().len())
            .finish_non_exhaustive()
    }
}
