//! In-memory [`Platform`] double for tests.
//!
//! [`RecordingPlatform`] records every primitive call, keeps a map of live
//! messages so panel edits and deletions can be observed, and can be told
//! to fail the next call or to add latency to each call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{PlatformError, PlatformResult};
use crate::interaction::Interaction;
use crate::platform::{MessageRef, Platform, Response};

/// Primitive recorded by [`RecordingPlatform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformCall {
    Reply,
    Defer,
    EditReply,
    Update,
    FollowUp,
    ShowModal,
    FetchMessage,
    EditMessage,
    SendMessage,
}

/// One recorded call with the text content it carried, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub call: PlatformCall,
    pub content: Option<String>,
    pub ephemeral: bool,
}

#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<RecordedCall>>,
    messages: Mutex<BTreeMap<MessageRef, Response>>,
    next_id: AtomicU64,
    fail_next: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next primitive call fail with [`PlatformError::Request`].
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    /// Sleeps for `latency` inside every call, creating suspension points.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().iter().map(|c| c.call).collect()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: PlatformCall) -> usize {
        self.calls.lock().iter().filter(|c| c.call == call).count()
    }

    /// Messages that currently exist, ordered by channel then creation.
    pub fn live_messages(&self) -> Vec<(MessageRef, Response)> {
        self.messages
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Simulates a user or moderator deleting a message.
    pub fn delete_message(&self, message: &MessageRef) {
        self.messages.lock().remove(message);
    }

    async fn record(&self, call: PlatformCall, response: Option<&Response>) -> PlatformResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().push(RecordedCall {
            call,
            content: response.and_then(|r| r.content.clone()),
            ephemeral: response.is_some_and(|r| r.ephemeral),
        });
        match self.fail_next.lock().take() {
            Some(reason) => Err(PlatformError::Request(reason)),
            None => Ok(()),
        }
    }

    fn allocate(&self, channel_id: &str) -> MessageRef {
        // Zero-padded so ids sort in creation order.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        MessageRef::new(channel_id, format!("msg-{id:06}"))
    }

    fn lookup(&self, channel_id: &str, message_id: &str) -> PlatformResult<MessageRef> {
        let target = MessageRef::new(channel_id, message_id);
        if self.messages.lock().contains_key(&target) {
            Ok(target)
        } else {
            Err(PlatformError::MessageNotFound {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
            })
        }
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn reply(&self, _interaction: &Interaction, response: &Response) -> PlatformResult<()> {
        self.record(PlatformCall::Reply, Some(response)).await
    }

    async fn defer(&self, _interaction: &Interaction, ephemeral: bool) -> PlatformResult<()> {
        self.record(PlatformCall::Defer, None).await?;
        if let Some(last) = self.calls.lock().last_mut() {
            last.ephemeral = ephemeral;
        }
        Ok(())
    }

    async fn edit_reply(
        &self,
        _interaction: &Interaction,
        response: &Response,
    ) -> PlatformResult<()> {
        self.record(PlatformCall::EditReply, Some(response)).await
    }

    async fn update(&self, _interaction: &Interaction, response: &Response) -> PlatformResult<()> {
        self.record(PlatformCall::Update, Some(response)).await
    }

    async fn follow_up(
        &self,
        interaction: &Interaction,
        response: &Response,
    ) -> PlatformResult<MessageRef> {
        self.record(PlatformCall::FollowUp, Some(response)).await?;
        let message = self.allocate(&interaction.origin().channel_id);
        self.messages.lock().insert(message.clone(), response.clone());
        Ok(message)
    }

    async fn show_modal(&self, _interaction: &Interaction, _modal: &Value) -> PlatformResult<()> {
        self.record(PlatformCall::ShowModal, None).await
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> PlatformResult<MessageRef> {
        self.record(PlatformCall::FetchMessage, None).await?;
        self.lookup(channel_id, message_id)
    }

    async fn edit_message(&self, message: &MessageRef, response: &Response) -> PlatformResult<()> {
        self.record(PlatformCall::EditMessage, Some(response)).await?;
        let mut messages = self.messages.lock();
        match messages.get_mut(message) {
            Some(existing) => {
                *existing = response.clone();
                Ok(())
            }
            None => Err(PlatformError::MessageNotFound {
                channel_id: message.channel_id.clone(),
                message_id: message.message_id.clone(),
            }),
        }
    }

    async fn send_message(
        &self,
        channel_id: &str,
        response: &Response,
    ) -> PlatformResult<MessageRef> {
        self.record(PlatformCall::SendMessage, Some(response)).await?;
        let message = self.allocate(channel_id);
        self.messages.lock().insert(message.clone(), response.clone());
        Ok(message)
    }
}
