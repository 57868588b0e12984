//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No [`Platform`](tally_core::Platform) was given to the builder.
    #[error("No platform configured")]
    MissingPlatform,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
