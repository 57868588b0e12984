//! # Tally
//!
//! Interaction dispatch and panel sync for chat-platform business bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌──────────────────────┐
//! │   Runtime   │────▶│ ModuleRegistry │────▶│ Module "sales"       │──▶ router ──▶ handler
//! │ (root + fb) │     │ (prefix match) │────▶│ Module "expenses"    │──▶ router ──▶ handler
//! └─────────────┘     └────────────────┘────▶│ Module ...           │
//!                                            └──────────────────────┘
//! ```
//!
//! - **Runtime**: builds the registry, sends the not-found and failure fallbacks
//! - **Modules**: own identifier prefixes; registered at link time with `define_module!`
//! - **Routers**: first-match pattern tables inside a module
//! - **Handlers**: feature code run through `HandlerBase` (auto-defer, error containment)
//! - **Panels**: config-backed messages kept in sync by `PanelSync`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tally::prelude::*;
//!
//! struct SaveGoal;
//!
//! #[async_trait]
//! impl InteractionHandler for SaveGoal {
//!     async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
//!         ctx.edit_reply(&Response::text("Goal saved")).await?;
//!         Ok(())
//!     }
//! }
//!
//! fn sales() -> ModuleDef {
//!     ModuleDef::new()
//!         .prefix("sales")
//!         .router(InteractionRouter::new().on_handler("sales:goal:save", SaveGoal))
//! }
//!
//! define_module!(SALES, "sales", sales);
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `testing`: the recording platform double

pub use tally_core as core;
pub use tally_framework as framework;
pub use tally_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use tally_runtime::TallyRuntime;

    // Module system
    pub use tally_framework::{ModuleDef, ModuleDescriptor, define_module};

    // Routing and handlers
    pub use tally_framework::{
        Flow, HandlerBase, InteractionContext, InteractionHandler, InteractionRouter,
        RoutePattern,
    };

    // Panels and config
    pub use tally_framework::{ConfigRepository, PanelOutcome, PanelSync, PanelTarget};

    // Core types
    pub use tally_core::{
        ConfigPath, Identifier, Interaction, InteractionKind, MessageRef, Origin, Platform,
        Response, ResponseState,
    };

    pub use std::sync::Arc;
    pub use tally_framework::async_trait;
}
