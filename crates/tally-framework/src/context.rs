//! Per-interaction context handed to routers and handlers.
//!
//! An [`InteractionContext`] bundles the inbound [`Interaction`] with the
//! collaborators a handler needs: the [`Platform`](tally_core::Platform) to
//! answer through, the locked [`ConfigRepository`] and the dispatch
//! settings. It is created once per event by the runtime and shared as an
//! `Arc` along the whole dispatch chain.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use tally_core::{
    BoxedPlatform, ConfigPath, Identifier, Interaction, MessageRef, PlatformResult, Response,
    ResponseState,
};

use crate::panel::PanelSync;
use crate::store::ConfigRepository;

/// Tunables that shape how failures and slow handlers are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Handlers running longer than this are logged at `WARN`.
    pub slow_handler_threshold: Duration,
    /// Ephemeral text sent when a handler fails.
    pub failure_message: String,
    /// Ephemeral text sent when no module claims an interaction.
    pub not_found_message: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            slow_handler_threshold: Duration::from_secs(2),
            failure_message: "Something went wrong. Please try again later.".to_string(),
            not_found_message: "This action is no longer available.".to_string(),
        }
    }
}

/// The context for handling one interaction.
pub struct InteractionContext {
    interaction: Interaction,
    platform: BoxedPlatform,
    repository: Arc<ConfigRepository>,
    settings: Arc<DispatchSettings>,
}

impl InteractionContext {
    /// Creates a context with default [`DispatchSettings`].
    pub fn new(
        interaction: Interaction,
        platform: BoxedPlatform,
        repository: Arc<ConfigRepository>,
    ) -> Self {
        Self {
            interaction,
            platform,
            repository,
            settings: Arc::new(DispatchSettings::default()),
        }
    }

    pub fn with_settings(mut self, settings: Arc<DispatchSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn platform(&self) -> &BoxedPlatform {
        &self.platform
    }

    pub fn repository(&self) -> &Arc<ConfigRepository> {
        &self.repository
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn custom_id(&self) -> &str {
        self.interaction.custom_id()
    }

    pub fn identifier(&self) -> Identifier {
        self.interaction.identifier()
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.interaction.guild_id()
    }

    pub fn response_state(&self) -> ResponseState {
        self.interaction.response_state()
    }

    /// Returns `true` once the user has been answered or acknowledged,
    /// including a follow-up sent after the deadline.
    pub fn has_responded(&self) -> bool {
        self.interaction.has_responded()
    }

    /// Config location of `module_key` in this interaction's guild.
    ///
    /// `None` for interactions outside a guild (direct messages).
    pub fn config_path(&self, module_key: &str) -> Option<ConfigPath> {
        self.guild_id().map(|guild| ConfigPath::new(guild, module_key))
    }

    /// Panel sync bound to this context's platform and repository.
    pub fn panels(&self) -> PanelSync {
        PanelSync::new(Arc::clone(&self.platform), Arc::clone(&self.repository))
    }

    // ─── Response primitives ──────────────────────────────────────────────────

    pub async fn reply(&self, response: &Response) -> PlatformResult<()> {
        self.interaction.reply(self.platform.as_ref(), response).await
    }

    pub async fn defer(&self, ephemeral: bool) -> PlatformResult<()> {
        self.interaction.defer(self.platform.as_ref(), ephemeral).await
    }

    pub async fn edit_reply(&self, response: &Response) -> PlatformResult<()> {
        self.interaction
            .edit_reply(self.platform.as_ref(), response)
            .await
    }

    pub async fn update(&self, response: &Response) -> PlatformResult<()> {
        self.interaction.update(self.platform.as_ref(), response).await
    }

    pub async fn show_modal(&self, modal: &Value) -> PlatformResult<()> {
        self.interaction
            .show_modal(self.platform.as_ref(), modal)
            .await
    }

    pub async fn follow_up(&self, response: &Response) -> PlatformResult<MessageRef> {
        self.interaction
            .follow_up(self.platform.as_ref(), response)
            .await
    }

    /// Answers through whichever primitive the current state allows.
    ///
    /// | State | Primitive |
    /// |-------|-----------|
    /// | `Replied` | `follow_up` |
    /// | `Deferred` | `edit_reply` |
    /// | `None`, deadline passed | `follow_up` |
    /// | `None` | `reply` |
    pub async fn safe_reply(&self, response: &Response) -> PlatformResult<()> {
        let state = self.response_state();
        trace!(interaction = %self.interaction.id(), state = %state, "safe_reply");
        match state {
            ResponseState::Replied => self.follow_up(response).await.map(drop),
            ResponseState::Deferred => self.edit_reply(response).await,
            ResponseState::None if self.interaction.is_expired() => {
                self.follow_up(response).await.map(drop)
            }
            ResponseState::None => self.reply(response).await,
        }
    }
}

impl std::fmt::Debug for InteractionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionContext")
            .field("interaction", &self.interaction)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
