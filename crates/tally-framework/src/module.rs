//! Module definitions and the compile-time module list.
//!
//! A feature module describes itself with a [`ModuleDef`]: the identifier
//! prefixes it owns, a dispatch priority and an entry point, either an
//! [`InteractionRouter`] or a single handler closure. Module crates
//! contribute a [`ModuleDescriptor`] to the [`MODULES`] distributed slice
//! with [`define_module!`](crate::define_module); the registry reads that
//! slice once at startup.
//!
//! ```rust,ignore
//! fn expenses() -> ModuleDef {
//!     ModuleDef::new()
//!         .prefix("expenses")
//!         .priority(10)
//!         .router(expenses_router())
//! }
//!
//! tally_framework::define_module!(EXPENSES, "expenses", expenses);
//! ```

use std::future::Future;
use std::sync::Arc;

use linkme::distributed_slice;

use crate::context::InteractionContext;
use crate::flow::Flow;
use crate::handler::BoxFuture;
use crate::router::{InteractionRouter, RouteFn};

/// How a module receives the interactions its prefixes matched.
#[derive(Clone)]
pub enum ModuleEntry {
    Router(InteractionRouter),
    Handler(RouteFn),
}

impl ModuleEntry {
    /// Runs the entry point.
    pub async fn call(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<Flow> {
        match self {
            Self::Router(router) => router.dispatch(ctx).await,
            Self::Handler(handler) => handler(ctx).await,
        }
    }
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Router(router) => f.debug_tuple("Router").field(router).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// What a module contributes to the registry.
#[derive(Debug, Clone, Default)]
pub struct ModuleDef {
    /// Identifier prefixes owned by the module, without separator.
    pub prefixes: Vec<String>,
    pub entry: Option<ModuleEntry>,
    /// Lower runs first. Ties keep registration order.
    pub priority: i32,
}

impl ModuleDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn router(mut self, router: InteractionRouter) -> Self {
        self.entry = Some(ModuleEntry::Router(router));
        self
    }

    /// Uses a single closure as the entry point instead of a router.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<InteractionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow>> + Send + 'static,
    {
        let handler: RouteFn = Arc::new(
            move |ctx: Arc<InteractionContext>| -> BoxFuture<'static, anyhow::Result<Flow>> {
                Box::pin(handler(ctx))
            },
        );
        self.entry = Some(ModuleEntry::Handler(handler));
        self
    }
}

/// A statically registered module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub build: fn() -> ModuleDef,
}

/// Every module linked into the binary.
#[distributed_slice]
pub static MODULES: [ModuleDescriptor];

/// Adds a module to [`MODULES`].
///
/// `define_module!(STATIC_NAME, "module-name", build_fn)` where `build_fn`
/// is a `fn() -> ModuleDef`.
#[macro_export]
macro_rules! define_module {
    ($static_name:ident, $name:expr, $build:path) => {
        #[$crate::__linkme::distributed_slice($crate::module::MODULES)]
        #[linkme(crate = $crate::__linkme)]
        static $static_name: $crate::module::ModuleDescriptor = $crate::module::ModuleDescriptor {
            name: $name,
            build: $build,
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;

    #[tokio::test]
    async fn test_handler_entry_is_called() {
        let def = ModuleDef::new()
            .prefix("attendance")
            .handler(|_ctx| async move { Ok::<_, anyhow::Error>(Flow::Handled) });

        let (ctx, _) = context("attendance:clock:in");
        let entry = def.entry.unwrap();
        assert_eq!(entry.call(ctx).await.unwrap(), Flow::Handled);
    }

    #[tokio::test]
    async fn test_router_entry_dispatches() {
        let router = InteractionRouter::new().on("attendance:clock:*", |_ctx| async move {
            Ok::<_, anyhow::Error>(Flow::HandledStop)
        });
        let def = ModuleDef::new().prefix("attendance").router(router);

        let entry = def.entry.unwrap();
        let (ctx, _) = context("attendance:clock:out");
        assert_eq!(entry.call(ctx).await.unwrap(), Flow::HandledStop);
        let (ctx, _) = context("attendance:report:week");
        assert_eq!(entry.call(ctx).await.unwrap(), Flow::NotHandled);
    }

    #[test]
    fn test_builder_defaults() {
        let def = ModuleDef::new().prefix("kpi").prefix("kpi_legacy");
        assert_eq!(def.prefixes, vec!["kpi", "kpi_legacy"]);
        assert_eq!(def.priority, 0);
        assert!(def.entry.is_none());
    }
}
