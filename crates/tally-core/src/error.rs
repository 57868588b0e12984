//! Unified error types for the Tally core.
//!
//! Framework-level errors (panel sync, dispatch) are defined in
//! `tally-framework`.

use thiserror::Error;

use crate::interaction::ResponseState;

// =============================================================================
// Identifier Errors
// =============================================================================

/// Errors raised while building a routing identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The serialized identifier exceeds the platform limit.
    #[error("identifier is {len} bytes long, limit is {max}")]
    TooLong {
        /// Length of the rejected identifier.
        len: usize,
        /// The platform limit.
        max: usize,
    },

    /// A non-trailing field contains the separator character.
    #[error("identifier field '{field}' contains the ':' separator: {value:?}")]
    SeparatorInField {
        /// Which field was rejected.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

// =============================================================================
// Response Errors
// =============================================================================

/// Illegal use of a response primitive for the current response state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// A primary response was attempted after the interaction was acknowledged.
    #[error("interaction already acknowledged (state: {state})")]
    AlreadyAcknowledged {
        /// State at the time of the attempt.
        state: ResponseState,
    },

    /// `edit_reply` or `follow_up` was attempted before any acknowledgment.
    #[error("interaction has not been acknowledged yet")]
    NotAcknowledged,

    /// Another primary response is being sent and has not resolved yet.
    #[error("another primary response is already in flight")]
    InFlight,

    /// The acknowledgment deadline passed without a primary response.
    #[error("acknowledgment deadline elapsed without a response")]
    Expired,

    /// `update` was attempted on an interaction without an attached message.
    #[error("'{primitive}' is not available for {kind} interactions")]
    Unsupported {
        /// The primitive that was attempted.
        primitive: &'static str,
        /// The interaction kind.
        kind: &'static str,
    },
}

// =============================================================================
// Platform Errors
// =============================================================================

/// Errors returned by the chat-platform collaborator.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The response primitive is not legal for the interaction's state.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The referenced message no longer exists.
    #[error("message {message_id} not found in channel {channel_id}")]
    MessageNotFound {
        /// Channel that was searched.
        channel_id: String,
        /// The missing message.
        message_id: String,
    },

    /// The referenced channel no longer exists or is not accessible.
    #[error("channel {0} not found")]
    ChannelNotFound(String),

    /// The platform rejected the request.
    #[error("platform request failed: {0}")]
    Request(String),
}

impl PlatformError {
    /// Returns `true` when the error means the target message or channel is gone.
    pub fn is_missing_target(&self) -> bool {
        matches!(
            self,
            Self::MessageNotFound { .. } | Self::ChannelNotFound(_)
        )
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by the persisted configuration collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The guild or module key cannot be mapped to a storage location.
    #[error("invalid config path component {0:?}")]
    InvalidPath(String),

    /// The stored document is not valid JSON.
    #[error("corrupt config document at {path}: {reason}")]
    Corrupt {
        /// The logical path of the document.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for identifier operations.
pub type IdentifierResult<T> = Result<T, IdentifierError>;

/// Result type for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Result type for config store operations.
pub type StoreResult<T> = Result<T, StoreError>;
