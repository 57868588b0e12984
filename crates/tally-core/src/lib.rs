//! # Tally Core
//!
//! Foundation types for the Tally interaction dispatch core.
//!
//! This crate has no dispatch logic of its own. It defines the contracts
//! every other layer is built on:
//!
//! - **Identifiers**: the bounded `module:feature:action[:extra]` routing
//!   string ([`Identifier`], [`PrefixMatch`])
//! - **Interactions**: inbound UI events and their response-state machine
//!   ([`Interaction`], [`ResponseState`])
//! - **Platform**: the response and message primitives of the chat platform
//!   ([`Platform`], [`Response`], [`MessageRef`])
//! - **Store**: the per-guild, per-module JSON config collaborator
//!   ([`ConfigStore`], [`ConfigPath`])
//!
//! ```text
//! ┌──────────┐   Interaction   ┌─────────────┐   Response   ┌──────────┐
//! │ Platform │────────────────▶│  Dispatch   │─────────────▶│ Platform │
//! │  events  │                 │ (framework) │              │   API    │
//! └──────────┘                 └──────┬──────┘              └──────────┘
//!                                     │ JSON blobs
//!                                     ▼
//!                               ┌─────────────┐
//!                               │ ConfigStore │
//!                               └─────────────┘
//! ```

pub mod error;
pub mod identifier;
pub mod interaction;
pub mod platform;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{
    IdentifierError, IdentifierResult, PlatformError, PlatformResult, ResponseError, StoreError,
    StoreResult,
};
pub use identifier::{Identifier, MAX_IDENTIFIER_LEN, PrefixMatch, match_prefix};
pub use interaction::{DEFAULT_ACK_DEADLINE, Interaction, InteractionKind, Origin, ResponseState};
pub use platform::{BoxedPlatform, MessageRef, Platform, Response};
pub use store::{BoxedConfigStore, ConfigPath, ConfigStore};
