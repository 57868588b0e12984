//! Root dispatch and runtime orchestration.
//!
//! [`TallyRuntime`] owns the module registry, the config repository, the
//! platform handle and the dispatch settings. It is the root of the
//! dispatch chain: [`handle`](TallyRuntime::handle) wraps an inbound
//! interaction in a context, offers it to the registry and applies the
//! root fallbacks.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tally_runtime::TallyRuntime;
//!
//! let runtime = TallyRuntime::builder()
//!     .config_file("config/tally.toml")
//!     .platform(MyPlatform::connect().await?)
//!     .build()?;
//!
//! // Runs until the stream ends or Ctrl+C.
//! runtime.serve(platform_events).await;
//! ```

use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tally_core::{BoxedConfigStore, BoxedPlatform, Interaction, Platform, Response};
use tally_framework::{
    ConfigRepository, DispatchSettings, FileConfigStore, InteractionContext, MemoryConfigStore,
    ModuleDef, ModuleRegistry, PanelSync, report_failure,
};

use crate::config::{ConfigLoader, StorageBackend, TallyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The root of the interaction dispatch chain.
pub struct TallyRuntime {
    config: TallyConfig,
    registry: Arc<ModuleRegistry>,
    platform: BoxedPlatform,
    repository: Arc<ConfigRepository>,
    settings: Arc<DispatchSettings>,
    shutdown: CancellationToken,
}

impl TallyRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn repository(&self) -> &Arc<ConfigRepository> {
        &self.repository
    }

    /// Panel sync outside of any interaction, e.g. after a scheduled job.
    pub fn panels(&self) -> PanelSync {
        PanelSync::new(Arc::clone(&self.platform), Arc::clone(&self.repository))
    }

    /// Token that stops [`serve`](Self::serve) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops [`serve`](Self::serve) after in-flight interactions finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Dispatches one interaction and applies the root fallbacks.
    ///
    /// When no module answers the interaction, including a module that
    /// matched but stayed silent, the not-found message is sent once. When an
    /// error escapes a module, it is logged under a correlation id and the
    /// failure message is sent. Both are ephemeral and go through
    /// `safe_reply`. Returns `true` if a module answered the interaction.
    pub async fn handle(&self, interaction: Interaction) -> bool {
        let interaction = interaction.with_ack_deadline(self.config.dispatch.ack_deadline());
        let ctx = Arc::new(
            InteractionContext::new(
                interaction,
                Arc::clone(&self.platform),
                Arc::clone(&self.repository),
            )
            .with_settings(Arc::clone(&self.settings)),
        );

        match self.registry.dispatch(Arc::clone(&ctx)).await {
            Ok(true) => true,
            Ok(false) => {
                info!(
                    custom_id = ctx.custom_id(),
                    kind = %ctx.interaction().kind(),
                    "No module answered interaction"
                );
                let notice = Response::text(self.settings.not_found_message.clone()).ephemeral(true);
                if let Err(e) = ctx.safe_reply(&notice).await {
                    warn!(custom_id = ctx.custom_id(), error = %e, "Could not deliver not-found notice");
                }
                false
            }
            Err(e) => {
                let module = e.module.clone();
                report_failure(&ctx, &module, &anyhow::Error::new(e)).await;
                false
            }
        }
    }

    /// Processes interactions from `events` concurrently.
    ///
    /// Returns when the stream ends, Ctrl+C is received, or the
    /// [`shutdown_token`](Self::shutdown_token) is cancelled. Interactions
    /// already being handled are allowed to finish.
    pub async fn serve<S>(&self, events: S)
    where
        S: Stream<Item = Interaction>,
    {
        let token = &self.shutdown;
        let limit = self.config.dispatch.max_concurrency;
        info!(
            modules = self.registry.module_count(),
            max_concurrency = limit,
            "Tally runtime is now serving. Press Ctrl+C to stop."
        );

        let processing = async {
            events
                .take_until(token.cancelled())
                .for_each_concurrent(limit, |interaction| async move {
                    self.handle(interaction).await;
                })
                .await;
            token.cancel();
        };

        let stop_on_signal = async {
            tokio::select! {
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Received Ctrl+C, shutting down"),
                        Err(e) => {
                            warn!(error = %e, "Failed to listen for Ctrl+C");
                            token.cancelled().await;
                        }
                    }
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        };

        tokio::join!(processing, stop_on_signal);
        info!("Tally runtime stopped");
    }
}

impl std::fmt::Debug for TallyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyRuntime")
            .field("modules", &self.registry.module_names())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`TallyRuntime`].
///
/// Configuration is loaded through [`ConfigLoader`] unless one is given with
/// [`config`](Self::config). Modules linked in with `define_module!` are
/// loaded automatically; [`module`](Self::module) adds more.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<TallyConfig>,
    platform: Option<BoxedPlatform>,
    store: Option<BoxedConfigStore>,
    modules: Vec<(String, ModuleDef)>,
    load_static: bool,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            platform: None,
            store: None,
            modules: Vec::new(),
            load_static: true,
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: TallyConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn platform<P: Platform>(self, platform: P) -> Self {
        self.platform_arc(Arc::new(platform))
    }

    pub fn platform_arc(mut self, platform: BoxedPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Overrides the store selected by `storage.backend`.
    pub fn store(mut self, store: BoxedConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers a module in addition to the linked ones.
    pub fn module(mut self, name: impl Into<String>, def: ModuleDef) -> Self {
        self.modules.push((name.into(), def));
        self
    }

    /// Skips the modules linked in with `define_module!`.
    pub fn without_static_modules(mut self) -> Self {
        self.load_static = false;
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<TallyRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let platform = self.platform.ok_or(RuntimeError::MissingPlatform)?;
        let store: BoxedConfigStore = match self.store {
            Some(store) => store,
            None => match config.storage.backend {
                StorageBackend::File => Arc::new(FileConfigStore::new(&config.storage.base_dir)),
                StorageBackend::Memory => Arc::new(MemoryConfigStore::new()),
            },
        };

        let mut registry = ModuleRegistry::new();
        for (name, def) in self.modules {
            registry.register_module(name, def);
        }
        if self.load_static {
            registry.load_static();
        }
        debug!(modules = ?registry.module_names(), "Dispatch order");

        info!(
            log_level = %config.logging.level,
            storage = ?config.storage.backend,
            modules = registry.module_count(),
            "Runtime initialized from configuration"
        );

        Ok(TallyRuntime {
            settings: Arc::new(config.dispatch.to_settings()),
            registry: Arc::new(registry),
            platform,
            repository: Arc::new(ConfigRepository::new(store)),
            shutdown: CancellationToken::new(),
            config,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tally_core::testing::{PlatformCall, RecordingPlatform};
    use tally_core::{InteractionKind, Origin};
    use tally_framework::{Flow, InteractionRouter};

    fn button(custom_id: &str) -> Interaction {
        Interaction::new(
            "ix-1",
            InteractionKind::Button,
            custom_id,
            Origin::new("u1", "c1").in_guild("g1"),
        )
    }

    fn runtime_with(def: ModuleDef) -> (TallyRuntime, Arc<RecordingPlatform>) {
        let platform = Arc::new(RecordingPlatform::new());
        let mut config = TallyConfig::default();
        config.storage.backend = StorageBackend::Memory;
        let runtime = TallyRuntime::builder()
            .config(config)
            .platform_arc(platform.clone())
            .module("sales", def)
            .without_static_modules()
            .without_logging()
            .build()
            .unwrap();
        (runtime, platform)
    }

    fn replying(hits: &Arc<AtomicUsize>) -> ModuleDef {
        let hits = Arc::clone(hits);
        ModuleDef::new().prefix("sales").handler(move |ctx| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                ctx.reply(&Response::text("ok")).await?;
                Ok::<_, anyhow::Error>(Flow::HandledStop)
            }
        })
    }

    #[test]
    fn test_build_requires_platform() {
        let err = TallyRuntime::builder()
            .config(TallyConfig::default())
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingPlatform));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = TallyConfig::default();
        config.dispatch.max_concurrency = 0;
        let err = TallyRuntime::builder()
            .config(config)
            .platform(RecordingPlatform::new())
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_identifier_gets_one_not_found_reply() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (runtime, platform) = runtime_with(replying(&hits));

        assert!(!runtime.handle(button("unknown:x")).await);

        let recorded = platform.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].call, PlatformCall::Reply);
        assert_eq!(
            recorded[0].content.as_deref(),
            Some(runtime.config().dispatch.not_found_message.as_str())
        );
        assert!(recorded[0].ephemeral);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handled_interaction_has_no_fallback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (runtime, platform) = runtime_with(replying(&hits));

        assert!(runtime.handle(button("sales:deal:open")).await);
        assert_eq!(platform.calls(), vec![PlatformCall::Reply]);
    }

    #[tokio::test]
    async fn test_silent_module_gets_one_not_found_reply() {
        let router = InteractionRouter::new().on("sales:*", |_ctx| async move {
            Ok::<_, anyhow::Error>(Flow::NotHandled)
        });
        let (runtime, platform) = runtime_with(ModuleDef::new().prefix("sales").router(router));

        assert!(!runtime.handle(button("sales:deal:open")).await);

        let recorded = platform.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].call, PlatformCall::Reply);
        assert_eq!(
            recorded[0].content.as_deref(),
            Some(runtime.config().dispatch.not_found_message.as_str())
        );
    }

    #[tokio::test]
    async fn test_escaped_error_gets_failure_reply() {
        let def = ModuleDef::new().prefix("sales").handler(|_ctx| async move {
            Err::<Flow, _>(anyhow::anyhow!("pipeline unavailable"))
        });
        let (runtime, platform) = runtime_with(def);

        assert!(!runtime.handle(button("sales:deal:open")).await);
        let recorded = platform.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].content.as_deref(),
            Some(runtime.config().dispatch.failure_message.as_str())
        );
    }

    #[tokio::test]
    async fn test_router_module_through_runtime() {
        let router = InteractionRouter::new()
            .name("sales")
            .on("sales:panel:*", |ctx| async move {
                ctx.update(&Response::text("refreshed")).await?;
                Ok::<_, anyhow::Error>(Flow::HandledStop)
            });
        let (runtime, platform) = runtime_with(ModuleDef::new().prefix("sales").router(router));

        assert!(runtime.handle(button("sales:panel:refresh")).await);
        assert_eq!(platform.calls(), vec![PlatformCall::Update]);
        // A sales identifier without a route is still unhandled.
        assert!(!runtime.handle(button("sales:archive:open")).await);
    }

    #[tokio::test]
    async fn test_serve_drains_stream() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (runtime, platform) = runtime_with(replying(&hits));

        let events = futures::stream::iter(vec![
            button("sales:deal:1"),
            button("sales:deal:2"),
            button("unknown:x"),
        ]);
        runtime.serve(events).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(platform.count(PlatformCall::Reply), 3);
        assert!(runtime.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_stops_serve() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (runtime, _) = runtime_with(replying(&hits));
        let token = runtime.shutdown_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let served = tokio::time::timeout(
            Duration::from_secs(5),
            runtime.serve(futures::stream::pending::<Interaction>()),
        )
        .await;
        assert!(served.is_ok());
    }
}
