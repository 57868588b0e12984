//! Configuration module for the Tally runtime.
//!
//! Layered loading of logging, storage and dispatch settings from files,
//! environment variables and programmatic overrides, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
    StorageBackend, StorageConfig, TallyConfig,
};
pub use validation::validate_config;
