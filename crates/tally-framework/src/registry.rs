//! The top-level module table.
//!
//! [`ModuleRegistry`] is built once at startup and not mutated afterwards.
//! Each inbound interaction is offered to modules in priority order; within
//! a module, prefixes are tried in declaration order. A prefix `p` owns an
//! identifier equal to `p`, starting with `p:`, or starting with the legacy
//! `p_` form.
//!
//! Dispatch stops as soon as a module returns [`Flow::HandledStop`] or the
//! interaction has been answered, whichever comes first. A module returning
//! [`Flow::Handled`] without answering lets the next matching module run,
//! so modules with overlapping prefixes can both see the event.
//!
//! The result of [`ModuleRegistry::dispatch`] reports whether the user got
//! a response, not whether a module matched. A module that matched but
//! stayed silent leaves the answer to the caller's fallback.

use std::sync::Arc;

use tracing::{Instrument, debug, debug_span, info, warn};

use tally_core::identifier::SEPARATOR;
use tally_core::{PrefixMatch, match_prefix};

use crate::context::InteractionContext;
use crate::error::{DispatchError, DispatchResult};
use crate::flow::Flow;
use crate::module::{MODULES, ModuleDef, ModuleDescriptor, ModuleEntry};

/// One registered module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    name: String,
    priority: i32,
    prefixes: Vec<String>,
    entry: ModuleEntry,
}

impl ModuleRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// The first of this module's prefixes owning `custom_id`.
    pub fn match_identifier(&self, custom_id: &str) -> Option<(&str, PrefixMatch)> {
        self.prefixes
            .iter()
            .find_map(|prefix| match_prefix(custom_id, prefix).map(|m| (prefix.as_str(), m)))
    }
}

/// Ordered set of feature modules.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: Vec<ModuleRecord>,
    initialized: bool,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds one module.
    ///
    /// Invalid definitions are skipped with a warning and `false` is
    /// returned. A module is invalid when it has no prefixes, a prefix is
    /// empty or contains `:`, or it has no entry point.
    pub fn register_module(&mut self, name: impl Into<String>, def: ModuleDef) -> bool {
        let name = name.into();

        if def.prefixes.is_empty() {
            warn!(module = %name, "Skipping module without prefixes");
            return false;
        }
        if let Some(bad) = def.prefixes.iter().find(|p| p.is_empty() || p.contains(SEPARATOR)) {
            warn!(module = %name, prefix = %bad, "Skipping module with invalid prefix");
            return false;
        }
        let Some(entry) = def.entry else {
            warn!(module = %name, "Skipping module without router or handler");
            return false;
        };
        if self.find(&name).is_some() {
            warn!(module = %name, "Duplicate module name, both will be dispatched");
        }

        info!(
            module = %name,
            priority = def.priority,
            prefixes = ?def.prefixes,
            "Module registered"
        );

        // Insert after every record that does not sort after this one, so
        // equal priorities keep registration order.
        let at = self
            .records
            .partition_point(|record| record.priority <= def.priority);
        self.records.insert(
            at,
            ModuleRecord {
                name,
                priority: def.priority,
                prefixes: def.prefixes,
                entry,
            },
        );
        true
    }

    /// Builds and registers every descriptor.
    ///
    /// Runs once: later calls are no-ops. Returns the number of modules
    /// registered by this call.
    pub fn load_modules(&mut self, descriptors: &[ModuleDescriptor]) -> usize {
        if self.initialized {
            debug!("Modules already loaded, skipping");
            return 0;
        }
        self.initialized = true;

        let loaded = descriptors
            .iter()
            .filter(|descriptor| self.register_module(descriptor.name, (descriptor.build)()))
            .count();
        info!(
            loaded,
            skipped = descriptors.len() - loaded,
            "Module registry initialized"
        );
        loaded
    }

    /// Loads the modules linked in through [`define_module!`](crate::define_module).
    ///
    /// Link order is unspecified, so descriptors are taken in name order
    /// before priorities apply.
    pub fn load_static(&mut self) -> usize {
        let mut descriptors: Vec<ModuleDescriptor> = MODULES.iter().copied().collect();
        descriptors.sort_by_key(|descriptor| descriptor.name);
        self.load_modules(&descriptors)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn module_count(&self) -> usize {
        self.records.len()
    }

    /// Module names in dispatch order.
    pub fn module_names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ModuleRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Offers the interaction to matching modules in order.
    ///
    /// Each module runs at most once, on its first matching prefix. Returns
    /// `true` if the interaction was acknowledged or answered by the time
    /// dispatch stopped.
    ///
    /// # Errors
    ///
    /// An error escaping a module's entry point stops dispatch and is
    /// returned as [`DispatchError`].
    pub async fn dispatch(&self, ctx: Arc<InteractionContext>) -> DispatchResult<bool> {
        let span = debug_span!(
            "dispatch",
            custom_id = %ctx.custom_id(),
            kind = %ctx.interaction().kind()
        );

        async move {
            for record in &self.records {
                let Some((prefix, matched)) = record.match_identifier(ctx.custom_id()) else {
                    continue;
                };
                if matched == PrefixMatch::Legacy {
                    debug!(module = %record.name, prefix, "Matched legacy '_' identifier");
                }

                let flow = record
                    .entry
                    .call(Arc::clone(&ctx))
                    .await
                    .map_err(|source| DispatchError {
                        module: record.name.clone(),
                        custom_id: ctx.custom_id().to_string(),
                        source,
                    })?;

                let answered = ctx.has_responded();
                if flow.should_stop() || answered {
                    debug!(module = %record.name, ?flow, answered, "Dispatch stopped");
                    break;
                }
            }

            let answered = ctx.has_responded();
            if !answered {
                debug!("No module answered the interaction");
            }
            Ok(answered)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{context, context_with};
    use crate::handler::InteractionHandler;
    use crate::router::InteractionRouter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tally_core::testing::PlatformCall;
    use tally_core::{Interaction, InteractionKind, Origin, Response, ResponseState};

    fn counting_module(prefix: &str, hits: &Arc<AtomicUsize>, flow: Flow) -> ModuleDef {
        let hits = Arc::clone(hits);
        ModuleDef::new().prefix(prefix).handler(move |_ctx| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(flow)
            }
        })
    }

    fn replying_module(prefix: &str, hits: &Arc<AtomicUsize>) -> ModuleDef {
        let hits = Arc::clone(hits);
        ModuleDef::new().prefix(prefix).handler(move |ctx| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                ctx.reply(&Response::text("ok")).await?;
                // Under-reports on purpose; the answered state must still stop dispatch.
                Ok::<_, anyhow::Error>(Flow::Handled)
            }
        })
    }

    #[tokio::test]
    async fn test_routes_to_owning_module_only() {
        let alpha = Arc::new(AtomicUsize::new(0));
        let beta = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("alpha", replying_module("a", &alpha));
        registry.register_module("beta", replying_module("b", &beta));

        let (ctx, _) = context("a:x:y");
        assert!(registry.dispatch(ctx).await.unwrap());
        assert_eq!(alpha.load(Ordering::SeqCst), 1);
        assert_eq!(beta.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_unhandled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("alpha", counting_module("a", &hits, Flow::HandledStop));

        let (ctx, platform) = context("unknown:x");
        assert!(!registry.dispatch(ctx).await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_requires_separator() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("sales", replying_module("sales", &hits));

        for id in ["sales", "sales:deal:open", "sales_deal_open"] {
            let (ctx, _) = context(id);
            assert!(registry.dispatch(ctx).await.unwrap(), "{id} should match");
        }
        let (ctx, _) = context("salesforce:sync:run");
        assert!(!registry.dispatch(ctx).await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_handled_continues_to_overlapping_module() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("audit", counting_module("kpi", &first, Flow::Handled));
        registry.register_module("kpi", replying_module("kpi", &second));

        let (ctx, _) = context("kpi:view:open");
        assert!(registry.dispatch(ctx).await.unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_silent_match_reports_unanswered() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("sales", counting_module("sales", &first, Flow::HandledStop));
        registry.register_module("sales-extra", counting_module("sales", &second, Flow::Handled));

        let (ctx, platform) = context("sales:deal:open");
        assert!(!registry.dispatch(ctx).await.unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        // HandledStop still ends the chain.
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_answered_state_stops_dispatch() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("kpi", replying_module("kpi", &first));
        registry.register_module("kpi-extra", replying_module("kpi", &second));

        let (ctx, platform) = context("kpi:view:open");
        assert!(registry.dispatch(ctx).await.unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(platform.count(PlatformCall::Reply), 1);
    }

    #[tokio::test]
    async fn test_module_runs_once_for_multiple_matching_prefixes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        let def = counting_module("expenses", &hits, Flow::Handled).prefix("expenses");
        registry.register_module("expenses", def);

        let (ctx, _) = context("expenses:entry:new");
        registry.dispatch(ctx).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_priority_orders_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module("late", counting_module("z", &hits, Flow::Handled).priority(10));
        registry.register_module("early", counting_module("y", &hits, Flow::Handled).priority(-5));
        registry.register_module("middle-a", counting_module("x", &hits, Flow::Handled));
        registry.register_module("middle-b", counting_module("w", &hits, Flow::Handled));

        assert_eq!(
            registry.module_names(),
            vec!["early", "middle-a", "middle-b", "late"]
        );
    }

    #[test]
    fn test_invalid_modules_are_skipped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();

        let no_prefix = ModuleDef::new().router(InteractionRouter::new());
        assert!(!registry.register_module("no-prefix", no_prefix));
        assert!(!registry.register_module("no-entry", ModuleDef::new().prefix("kpi")));
        let colon = counting_module("kpi:view", &hits, Flow::Handled);
        assert!(!registry.register_module("colon", colon));
        let empty = counting_module("", &hits, Flow::Handled);
        assert!(!registry.register_module("empty", empty));
        let valid = counting_module("kpi", &hits, Flow::Handled);
        assert!(registry.register_module("kpi", valid));

        assert_eq!(registry.module_names(), vec!["kpi"]);
    }

    fn build_alpha() -> ModuleDef {
        ModuleDef::new()
            .prefix("a")
            .handler(|_ctx| async move { Ok::<_, anyhow::Error>(Flow::HandledStop) })
    }

    fn build_broken() -> ModuleDef {
        ModuleDef::new()
    }

    #[test]
    fn test_load_modules_is_idempotent() {
        let descriptors = [
            ModuleDescriptor {
                name: "alpha",
                build: build_alpha,
            },
            ModuleDescriptor {
                name: "broken",
                build: build_broken,
            },
        ];
        let mut registry = ModuleRegistry::new();

        assert_eq!(registry.load_modules(&descriptors), 1);
        assert!(registry.is_initialized());
        assert_eq!(registry.load_modules(&descriptors), 0);
        assert_eq!(registry.module_count(), 1);
    }

    crate::define_module!(LINKED_ALPHA, "linked-alpha", build_alpha);

    #[test]
    fn test_load_static_reads_linked_modules() {
        let mut registry = ModuleRegistry::new();
        registry.load_static();
        let linked = registry.find("linked-alpha").unwrap();
        assert_eq!(linked.prefixes(), ["a".to_string()]);
    }

    #[tokio::test]
    async fn test_entry_error_propagates() {
        let later = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_module(
            "ledger",
            ModuleDef::new().prefix("ledger").handler(|_ctx| async move {
                Err::<Flow, _>(anyhow::anyhow!("ledger offline"))
            }),
        );
        registry.register_module("ledger-mirror", counting_module("ledger", &later, Flow::Handled));

        let (ctx, _) = context("ledger:sync:run");
        let err = registry.dispatch(ctx).await.unwrap_err();
        assert_eq!(err.module, "ledger");
        assert_eq!(err.custom_id, "ledger:sync:run");
        assert_eq!(err.source.to_string(), "ledger offline");
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    struct SlowReport;

    #[async_trait]
    impl InteractionHandler for SlowReport {
        fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
            false
        }

        async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            ctx.safe_reply(&Response::text("report ready")).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_late_answer_goes_through_follow_up() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(
            "reports",
            ModuleDef::new()
                .prefix("reports")
                .router(InteractionRouter::new().on_handler("reports:*", SlowReport)),
        );

        let (ctx, platform) = context_with(
            Interaction::new(
                "ix-slow",
                InteractionKind::Button,
                "reports:weekly:build",
                Origin::new("u1", "c1").in_guild("g1"),
            )
            .with_ack_deadline(Duration::from_millis(10)),
        );

        assert!(registry.dispatch(Arc::clone(&ctx)).await.unwrap());
        assert_eq!(platform.calls(), vec![PlatformCall::FollowUp]);
        assert_eq!(ctx.response_state(), ResponseState::None);
    }

    #[tokio::test]
    async fn test_late_answer_stops_overlapping_modules() {
        let mut registry = ModuleRegistry::new();
        for name in ["kpi", "kpi-mirror"] {
            registry.register_module(
                name,
                ModuleDef::new()
                    .prefix("kpi")
                    .router(InteractionRouter::new().on_handler("kpi:*", SlowReport)),
            );
        }

        let (ctx, platform) = context_with(
            Interaction::new(
                "ix-late",
                InteractionKind::Button,
                "kpi:weekly:build",
                Origin::new("u1", "c1").in_guild("g1"),
            )
            .with_ack_deadline(Duration::from_millis(10)),
        );

        assert!(registry.dispatch(Arc::clone(&ctx)).await.unwrap());
        assert_eq!(platform.count(PlatformCall::FollowUp), 1);
        assert!(ctx.has_responded());
    }
}
