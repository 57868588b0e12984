//! Tally Runtime - root dispatch, configuration and logging.
//!
//! This crate provides:
//! - Root dispatch with the not-found and failure fallbacks (`TallyRuntime`)
//! - Concurrent serving of an interaction stream with graceful shutdown
//! - Layered configuration loading (`ConfigLoader`)
//! - Logging configuration (`LoggingBuilder`)
//!
//! ```ignore
//! use tally_runtime::TallyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TallyRuntime::builder()
//!         .platform(MyPlatform::connect().await?)
//!         .build()?;
//!
//!     runtime.serve(my_platform_events()).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, TallyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, TallyRuntime};

// Re-export tracing for use by module crates
pub use tracing;
pub use tracing_subscriber;

/// The commonly used logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
