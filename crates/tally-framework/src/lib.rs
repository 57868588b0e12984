//! # Tally Framework
//!
//! Interaction dispatch on top of the core types.
//!
//! This layer provides:
//! - [`InteractionRouter`]: per-module, first-match pattern routing
//! - [`ModuleRegistry`]: prefix routing across modules, built once from the
//!   compile-time [`MODULES`] list
//! - [`HandlerBase`]: auto-defer, error containment and timing around every
//!   feature handler
//! - [`PanelSync`]: idempotent upsert of config-backed panel messages
//! - [`ConfigRepository`]: per-`(guild, module)` locked config access with
//!   file and in-memory backends

pub mod context;
pub mod error;
pub mod flow;
pub mod handler;
pub mod module;
pub mod panel;
pub mod registry;
pub mod router;
pub mod store;

#[doc(hidden)]
pub use linkme as __linkme;

pub use async_trait::async_trait;

pub use context::{DispatchSettings, InteractionContext};
pub use error::{DispatchError, DispatchResult, PanelError, PanelResult};
pub use flow::Flow;
pub use handler::{BoxFuture, HandlerBase, InteractionHandler, report_failure};
pub use module::{MODULES, ModuleDef, ModuleDescriptor, ModuleEntry};
pub use panel::{PanelOutcome, PanelSync, PanelTarget};
pub use registry::{ModuleRecord, ModuleRegistry};
pub use router::{InteractionRouter, PredicateFn, RouteFn, RoutePattern};
pub use store::{ConfigGuard, ConfigRepository, FileConfigStore, MemoryConfigStore};
