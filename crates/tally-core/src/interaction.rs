//! Inbound UI events and their response-state machine.
//!
//! An [`Interaction`] is one click, menu selection, form submission or
//! command. The platform allows exactly one *primary* response per
//! interaction, tracked by [`ResponseState`]:
//!
//! ```text
//!            defer()              edit_reply()
//!   None ───────────────▶ Deferred ───────────▶ Replied
//!     │                                            ▲
//!     └──── reply() / update() / show_modal() ─────┘
//! ```
//!
//! Once `Replied`, only [`follow_up`](Interaction::follow_up) is legal. The
//! response methods on `Interaction` check the transition before calling
//! the [`Platform`], so an illegal primary response is rejected locally with
//! a [`ResponseError`] instead of reaching the platform.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::error::{PlatformResult, ResponseError};
use crate::identifier::Identifier;
use crate::platform::{MessageRef, Platform, Response};

/// Default acknowledgment deadline imposed by the platform.
pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(3);

/// Kind of UI event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Button,
    Select,
    Modal,
    Command,
}

impl InteractionKind {
    /// Returns the lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Select => "select",
            Self::Modal => "modal",
            Self::Command => "command",
        }
    }

    /// Returns `true` for kinds that originate from a message component.
    pub fn is_component(&self) -> bool {
        matches!(self, Self::Button | Self::Select)
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which response primitive is legal next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResponseState {
    #[default]
    None,
    Deferred,
    Replied,
}

impl ResponseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deferred => "deferred",
            Self::Replied => "replied",
        }
    }

    /// Returns `true` once any primary response has been sent.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an interaction came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub user_id: String,
    pub channel_id: String,
    /// `None` for direct messages.
    pub guild_id: Option<String>,
}

impl Origin {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }
}

#[derive(Debug, Default)]
struct ResponseCell {
    state: ResponseState,
    /// A primary response has been handed to the platform and not resolved.
    primary_in_flight: bool,
    /// A follow-up answered the user after the deadline expired.
    late_answer: bool,
}

/// A single inbound UI event.
#[derive(Debug)]
pub struct Interaction {
    id: String,
    custom_id: String,
    kind: InteractionKind,
    origin: Origin,
    payload: Value,
    received_at: Instant,
    ack_deadline: Duration,
    state: Mutex<ResponseCell>,
}

impl Interaction {
    /// Creates an interaction received now, with no payload.
    pub fn new(
        id: impl Into<String>,
        kind: InteractionKind,
        custom_id: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            id: id.into(),
            custom_id: custom_id.into(),
            kind,
            origin,
            payload: Value::Null,
            received_at: Instant::now(),
            ack_deadline: DEFAULT_ACK_DEADLINE,
            state: Mutex::new(ResponseCell::default()),
        }
    }

    /// Attaches the component values or form fields.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Overrides the acknowledgment deadline.
    pub fn with_ack_deadline(mut self, deadline: Duration) -> Self {
        self.ack_deadline = deadline;
        self
    }

    /// Overrides the receive instant (used when replaying queued events).
    pub fn with_received_at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }

    /// Platform-assigned interaction id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw routing identifier.
    pub fn custom_id(&self) -> &str {
        &self.custom_id
    }

    /// The routing identifier split into fields.
    pub fn identifier(&self) -> Identifier {
        Identifier::parse(&self.custom_id)
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.origin.guild_id.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Time since the interaction was received.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn ack_deadline(&self) -> Duration {
        self.ack_deadline
    }

    pub fn response_state(&self) -> ResponseState {
        self.state.lock().state
    }

    /// Returns `true` once the user has been answered or acknowledged.
    ///
    /// Besides any primary response this covers a follow-up sent after the
    /// deadline expired, which leaves the state at [`ResponseState::None`].
    pub fn has_responded(&self) -> bool {
        let cell = self.state.lock();
        cell.state.is_acknowledged() || cell.late_answer
    }

    /// Returns `true` if the deadline passed while still unacknowledged.
    ///
    /// An expired interaction can no longer use the primary response path.
    pub fn is_expired(&self) -> bool {
        self.response_state() == ResponseState::None && self.elapsed() > self.ack_deadline
    }

    // ─── Response primitives ──────────────────────────────────────────────────

    /// Sends the primary response. Legal only from [`ResponseState::None`].
    pub async fn reply(&self, platform: &dyn Platform, response: &Response) -> PlatformResult<()> {
        let pending = self.begin_primary()?;
        platform.reply(self, response).await?;
        pending.complete(ResponseState::Replied);
        Ok(())
    }

    /// Acknowledges now and answers later with [`edit_reply`](Self::edit_reply).
    pub async fn defer(&self, platform: &dyn Platform, ephemeral: bool) -> PlatformResult<()> {
        let pending = self.begin_primary()?;
        platform.defer(self, ephemeral).await?;
        pending.complete(ResponseState::Deferred);
        Ok(())
    }

    /// Replaces the deferred or sent primary response.
    pub async fn edit_reply(
        &self,
        platform: &dyn Platform,
        response: &Response,
    ) -> PlatformResult<()> {
        if !self.response_state().is_acknowledged() {
            return Err(ResponseError::NotAcknowledged.into());
        }
        platform.edit_reply(self, response).await?;
        self.transition(ResponseState::Replied);
        Ok(())
    }

    /// Edits the message the component is attached to, as the primary response.
    pub async fn update(&self, platform: &dyn Platform, response: &Response) -> PlatformResult<()> {
        if !self.kind.is_component() {
            return Err(ResponseError::Unsupported {
                primitive: "update",
                kind: self.kind.as_str(),
            }
            .into());
        }
        let pending = self.begin_primary()?;
        platform.update(self, response).await?;
        pending.complete(ResponseState::Replied);
        Ok(())
    }

    /// Opens a form. Must be the primary response, so it cannot follow `defer`.
    pub async fn show_modal(&self, platform: &dyn Platform, modal: &Value) -> PlatformResult<()> {
        if self.kind == InteractionKind::Modal {
            return Err(ResponseError::Unsupported {
                primitive: "show_modal",
                kind: self.kind.as_str(),
            }
            .into());
        }
        let pending = self.begin_primary()?;
        platform.show_modal(self, modal).await?;
        pending.complete(ResponseState::Replied);
        Ok(())
    }

    /// Sends an additional message after acknowledgment, or after the
    /// deadline made the primary path unusable.
    pub async fn follow_up(
        &self,
        platform: &dyn Platform,
        response: &Response,
    ) -> PlatformResult<MessageRef> {
        if !self.response_state().is_acknowledged() && !self.is_expired() {
            return Err(ResponseError::NotAcknowledged.into());
        }
        let message = platform.follow_up(self, response).await?;
        let mut cell = self.state.lock();
        if !cell.state.is_acknowledged() {
            cell.late_answer = true;
        }
        Ok(message)
    }

    /// Reserves the primary response slot until the returned guard resolves.
    ///
    /// The check and the reservation happen under one lock, so two
    /// concurrent primary responses cannot both reach the platform.
    fn begin_primary(&self) -> Result<PendingPrimary<'_>, ResponseError> {
        let mut cell = self.state.lock();
        if cell.state.is_acknowledged() {
            return Err(ResponseError::AlreadyAcknowledged { state: cell.state });
        }
        if cell.primary_in_flight {
            return Err(ResponseError::InFlight);
        }
        if self.elapsed() > self.ack_deadline {
            return Err(ResponseError::Expired);
        }
        cell.primary_in_flight = true;
        Ok(PendingPrimary { interaction: self })
    }

    fn transition(&self, next: ResponseState) {
        let mut cell = self.state.lock();
        trace!(
            interaction = %self.id,
            from = %cell.state,
            to = %next,
            "Response state transition"
        );
        // State never moves backwards.
        cell.state = cell.state.max(next);
    }
}

/// Held while a primary response is in flight.
///
/// Dropping it without [`complete`](Self::complete), on a platform error or
/// a cancelled future, frees the slot and leaves the state unchanged.
struct PendingPrimary<'a> {
    interaction: &'a Interaction,
}

impl PendingPrimary<'_> {
    fn complete(self, next: ResponseState) {
        self.interaction.transition(next);
    }
}

impl Drop for PendingPrimary<'_> {
    fn drop(&mut self) {
        self.interaction.state.lock().primary_in_flight = false;
    }
}
