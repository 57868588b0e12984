//! Idempotent panel upsert.
//!
//! A panel is a long-lived chat message rendered from a module's config.
//! Its location is stored inside the module's config blob as
//! `{ "channelId": ..., "messageId": ... }` under a caller-chosen key.
//! [`PanelSync::upsert`] edits that message when it still exists and
//! creates a new one otherwise, so repeated calls keep exactly one live
//! panel per key.
//!
//! The whole load, render, platform call and save sequence holds the
//! `(guild, module)` config lock. Concurrent upserts for the same panel
//! therefore run one after the other; the second edits what the first
//! created.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use tally_core::{BoxedPlatform, ConfigPath, MessageRef, PlatformResult, Response};

use crate::error::PanelResult;
use crate::store::ConfigRepository;

/// Where a panel lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelTarget {
    pub guild_id: String,
    /// Channel new panels are created in.
    pub channel_id: String,
}

impl PanelTarget {
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// What [`PanelSync::upsert`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelOutcome {
    /// The stored message was edited in place.
    Edited(MessageRef),
    /// A new message was created and its location saved.
    Created(MessageRef),
}

impl PanelOutcome {
    pub fn message(&self) -> &MessageRef {
        match self {
            Self::Edited(message) | Self::Created(message) => message,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Keeps panel messages in sync with module config.
#[derive(Clone)]
pub struct PanelSync {
    platform: BoxedPlatform,
    repository: Arc<ConfigRepository>,
}

impl PanelSync {
    pub fn new(platform: BoxedPlatform, repository: Arc<ConfigRepository>) -> Self {
        Self {
            platform,
            repository,
        }
    }

    /// Renders the panel from the current module blob and publishes it.
    ///
    /// If a location is stored under `store_key`, the message is fetched and
    /// edited. When nothing is stored, or fetching or editing fails for any
    /// reason, a new message is sent to `target.channel_id` and its location
    /// replaces the stored one.
    ///
    /// # Errors
    ///
    /// Store failures, and platform failures while creating the new message.
    pub async fn upsert<F>(
        &self,
        target: &PanelTarget,
        module_key: &str,
        store_key: &str,
        render: F,
    ) -> PanelResult<PanelOutcome>
    where
        F: FnOnce(&Value) -> Response + Send,
    {
        let path = ConfigPath::new(&target.guild_id, module_key);
        let _guard = self.repository.lock(&path).await;

        let mut blob = self.repository.load(&path).await?;
        let response = render(&blob);

        if let Some(existing) = stored_location(&blob, store_key) {
            match self.edit_existing(&existing, &response).await {
                Ok(()) => {
                    debug!(path = %path, store_key, message = %existing.message_id, "Panel edited");
                    return Ok(PanelOutcome::Edited(existing));
                }
                Err(e) => {
                    warn!(
                        path = %path,
                        store_key,
                        message = %existing.message_id,
                        error = %e,
                        "Stored panel unavailable, creating a new one"
                    );
                }
            }
        }

        let created = self
            .platform
            .send_message(&target.channel_id, &response)
            .await?;
        match blob.as_object_mut() {
            Some(map) => {
                map.insert(store_key.to_string(), json!(created));
            }
            None => {
                warn!(path = %path, "Config blob is not an object, replacing it");
                let mut map = Map::new();
                map.insert(store_key.to_string(), json!(created));
                blob = Value::Object(map);
            }
        }
        self.repository.save(&path, &blob).await?;

        info!(
            path = %path,
            store_key,
            channel = %created.channel_id,
            message = %created.message_id,
            "Panel created"
        );
        Ok(PanelOutcome::Created(created))
    }

    /// The stored panel location, if any.
    pub async fn location(
        &self,
        guild_id: &str,
        module_key: &str,
        store_key: &str,
    ) -> PanelResult<Option<MessageRef>> {
        let blob = self
            .repository
            .load(&ConfigPath::new(guild_id, module_key))
            .await?;
        Ok(stored_location(&blob, store_key))
    }

    /// Removes the stored location so the next upsert creates a fresh panel.
    ///
    /// The message itself is left alone. Returns the removed location.
    pub async fn forget(
        &self,
        guild_id: &str,
        module_key: &str,
        store_key: &str,
    ) -> PanelResult<Option<MessageRef>> {
        let removed = self
            .repository
            .update(&ConfigPath::new(guild_id, module_key), |blob| {
                blob.as_object_mut().and_then(|map| map.remove(store_key))
            })
            .await?;
        Ok(removed.and_then(|value| serde_json::from_value(value).ok()))
    }

    async fn edit_existing(&self, existing: &MessageRef, response: &Response) -> PlatformResult<()> {
        let message = self
            .platform
            .fetch_message(&existing.channel_id, &existing.message_id)
            .await?;
        self.platform.edit_message(&message, response).await
    }
}

impl std::fmt::Debug for PanelSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelSync")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

fn stored_location(blob: &Value, store_key: &str) -> Option<MessageRef> {
    let value = blob.get(store_key)?;
    match serde_json::from_value(value.clone()) {
        Ok(location) => Some(location),
        Err(e) => {
            warn!(store_key, error = %e, "Ignoring malformed panel location");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::testing::{PlatformCall, RecordingPlatform};
    use std::time::Duration;

    fn setup() -> (PanelSync, Arc<RecordingPlatform>, Arc<ConfigRepository>) {
        let platform = Arc::new(RecordingPlatform::new());
        let repository = Arc::new(ConfigRepository::in_memory());
        let sync = PanelSync::new(platform.clone(), Arc::clone(&repository));
        (sync, platform, repository)
    }

    fn render_goal(blob: &Value) -> Response {
        let goal = blob["goal"].as_u64().unwrap_or(0);
        Response::text(format!("Goal: {goal}"))
    }

    #[tokio::test]
    async fn test_second_upsert_edits() {
        let (sync, platform, repository) = setup();
        let target = PanelTarget::new("g1", "c-sales");

        let first = sync.upsert(&target, "sales", "panel", render_goal).await.unwrap();
        assert!(first.is_created());

        repository
            .update(&ConfigPath::new("g1", "sales"), |blob| blob["goal"] = json!(500))
            .await
            .unwrap();
        let second = sync.upsert(&target, "sales", "panel", render_goal).await.unwrap();

        assert_eq!(second, PanelOutcome::Edited(first.message().clone()));
        let live = platform.live_messages();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].1.content.as_deref(), Some("Goal: 500"));
    }

    #[tokio::test]
    async fn test_location_is_stored_in_camel_case() {
        let (sync, _, repository) = setup();
        let target = PanelTarget::new("g1", "c-sales");
        sync.upsert(&target, "sales", "panel", render_goal).await.unwrap();

        let blob = repository.load(&ConfigPath::new("g1", "sales")).await.unwrap();
        assert_eq!(blob["panel"]["channelId"], json!("c-sales"));
        assert!(blob["panel"]["messageId"].is_string());
    }

    #[tokio::test]
    async fn test_deleted_panel_is_recreated() {
        let (sync, platform, _) = setup();
        let target = PanelTarget::new("g1", "c-kpi");

        let first = sync.upsert(&target, "kpi", "board", render_goal).await.unwrap();
        platform.delete_message(first.message());
        let second = sync.upsert(&target, "kpi", "board", render_goal).await.unwrap();

        assert!(second.is_created());
        assert_ne!(second.message(), first.message());
        assert_eq!(platform.live_messages().len(), 1);
        assert_eq!(
            sync.location("g1", "kpi", "board").await.unwrap().as_ref(),
            Some(second.message())
        );
    }

    #[tokio::test]
    async fn test_any_edit_failure_recreates() {
        let (sync, platform, _) = setup();
        let target = PanelTarget::new("g1", "c-kpi");
        let first = sync.upsert(&target, "kpi", "board", render_goal).await.unwrap();

        // The fetch is rejected even though the message still exists.
        platform.fail_next("gateway timeout");
        let second = sync.upsert(&target, "kpi", "board", render_goal).await.unwrap();
        assert!(second.is_created());
        assert_ne!(second.message(), first.message());
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let (sync, platform, _) = setup();
        let target = PanelTarget::new("g1", "c-kpi");

        platform.fail_next("missing permissions");
        let err = sync
            .upsert(&target, "kpi", "board", render_goal)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::PanelError::Platform(_)));
        assert!(sync.location("g1", "kpi", "board").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_upserts_leave_one_panel() {
        let (sync, platform, _) = setup();
        platform.set_latency(Duration::from_millis(5));
        let target = PanelTarget::new("g1", "c-att");

        // Both start from a stale stored location.
        let stale = sync.upsert(&target, "attendance", "panel", render_goal).await.unwrap();
        platform.delete_message(stale.message());

        let (a, b) = tokio::join!(
            sync.upsert(&target, "attendance", "panel", render_goal),
            sync.upsert(&target, "attendance", "panel", render_goal),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.message(), b.message());
        assert_eq!(platform.live_messages().len(), 1);
        assert_eq!(platform.count(PlatformCall::SendMessage), 2);
    }

    #[tokio::test]
    async fn test_forget_clears_location() {
        let (sync, _, _) = setup();
        let target = PanelTarget::new("g1", "c-sales");
        let created = sync.upsert(&target, "sales", "panel", render_goal).await.unwrap();

        let removed = sync.forget("g1", "sales", "panel").await.unwrap();
        assert_eq!(removed.as_ref(), Some(created.message()));
        assert!(sync.location("g1", "sales", "panel").await.unwrap().is_none());

        let again = sync.upsert(&target, "sales", "panel", render_goal).await.unwrap();
        assert!(again.is_created());
    }
}
