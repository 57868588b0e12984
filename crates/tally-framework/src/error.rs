//! Error types for the Tally framework.

use thiserror::Error;

use tally_core::{PlatformError, StoreError};

/// An error escaped a module's entry point during dispatch.
///
/// Handlers wrapped in [`HandlerBase`](crate::handler::HandlerBase) never
/// produce this; it only comes from raw module handlers and router closures.
#[derive(Debug, Error)]
#[error("module '{module}' failed while handling '{custom_id}'")]
pub struct DispatchError {
    /// The module whose entry point failed.
    pub module: String,
    /// The identifier being dispatched.
    pub custom_id: String,
    #[source]
    pub source: anyhow::Error,
}

/// Errors raised by [`PanelSync`](crate::panel::PanelSync).
#[derive(Debug, Clone, Error)]
pub enum PanelError {
    /// Loading or saving the panel location failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Creating the panel message failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for panel operations.
pub type PanelResult<T> = Result<T, PanelError>;
