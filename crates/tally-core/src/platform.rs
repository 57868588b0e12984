//! The chat-platform collaborator.
//!
//! The SDK itself is out of scope; this module only describes the response
//! primitives the dispatch core selects between and the message operations
//! panel sync needs. Adapters implement [`Platform`] on top of their SDK.
//!
//! Handlers should not call the interaction primitives directly: go through
//! [`Interaction`](crate::Interaction), which validates the response-state
//! transition first.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlatformResult;
use crate::interaction::Interaction;

/// Outbound message content.
///
/// `body` carries the platform-specific components and embeds untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    /// Visible only to the interacting user.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain-text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }
}

/// Location of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageRef {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// Response and message primitives provided by the chat platform.
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Sends the primary response to an interaction.
    async fn reply(&self, interaction: &Interaction, response: &Response) -> PlatformResult<()>;

    /// Acknowledges an interaction without content.
    async fn defer(&self, interaction: &Interaction, ephemeral: bool) -> PlatformResult<()>;

    /// Replaces the deferred or previously sent primary response.
    async fn edit_reply(&self, interaction: &Interaction, response: &Response)
    -> PlatformResult<()>;

    /// Edits the message a component is attached to, as the primary response.
    async fn update(&self, interaction: &Interaction, response: &Response) -> PlatformResult<()>;

    /// Sends an additional message tied to the interaction.
    async fn follow_up(
        &self,
        interaction: &Interaction,
        response: &Response,
    ) -> PlatformResult<MessageRef>;

    /// Opens a form as the primary response.
    async fn show_modal(&self, interaction: &Interaction, modal: &Value) -> PlatformResult<()>;

    /// Resolves a message, failing with `MessageNotFound`/`ChannelNotFound`
    /// when it is gone.
    async fn fetch_message(&self, channel_id: &str, message_id: &str)
    -> PlatformResult<MessageRef>;

    /// Edits an existing message in place.
    async fn edit_message(&self, message: &MessageRef, response: &Response) -> PlatformResult<()>;

    /// Posts a new message to a channel.
    async fn send_message(&self, channel_id: &str, response: &Response)
    -> PlatformResult<MessageRef>;
}

/// A shared platform trait object.
pub type BoxedPlatform = Arc<dyn Platform>;
