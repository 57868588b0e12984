//! Per-module routing of identifiers to handlers.
//!
//! An [`InteractionRouter`] holds an ordered list of `(pattern, handler)`
//! pairs. Dispatch runs the first pair whose pattern matches the
//! interaction's `custom_id`; registration order is the only tie-break.
//!
//! ```rust,ignore
//! let router = InteractionRouter::new()
//!     .name("expenses")
//!     .on("expenses:entry:new", |ctx| async move {
//!         ctx.show_modal(&expense_form()).await?;
//!         Ok(Flow::HandledStop)
//!     })
//!     .on("expenses:report:*", |ctx| async move { report(ctx).await })
//!     .on_handler(Regex::new(r"^expenses:entry:\d+$")?, EditEntry);
//! ```
//!
//! # Tower Service Integration
//!
//! `InteractionRouter` implements `tower::Service<Arc<InteractionContext>>`,
//! so tower middleware can wrap a module's router:
//!
//! ```rust,ignore
//! let service = ServiceBuilder::new()
//!     .concurrency_limit(8)
//!     .service(router);
//! ```

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use regex::Regex;
use tower::{BoxError, Service};
use tracing::{debug, trace};

use crate::context::InteractionContext;
use crate::flow::Flow;
use crate::handler::{BoxFuture, HandlerBase, InteractionHandler};

/// A type-erased matching predicate.
pub type PredicateFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A type-erased route handler.
pub type RouteFn =
    Arc<dyn Fn(Arc<InteractionContext>) -> BoxFuture<'static, anyhow::Result<Flow>> + Send + Sync>;

/// How a route decides whether it owns an identifier.
#[derive(Clone)]
pub enum RoutePattern {
    /// Whole-string equality.
    Exact(String),
    /// Identifier starts with this string. Written `"p:*"` in string form.
    Prefix(String),
    Regex(Regex),
    Predicate(PredicateFn),
}

impl RoutePattern {
    /// A pattern backed by an arbitrary closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, custom_id: &str) -> bool {
        match self {
            Self::Exact(exact) => custom_id == exact,
            Self::Prefix(prefix) => custom_id.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(custom_id),
            Self::Predicate(f) => f(custom_id),
        }
    }
}

impl From<&str> for RoutePattern {
    /// `"p:*"` becomes a prefix match on `"p:"`; anything else is exact.
    fn from(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with(':') => Self::Prefix(prefix.to_string()),
            _ => Self::Exact(pattern.to_string()),
        }
    }
}

impl From<String> for RoutePattern {
    fn from(pattern: String) -> Self {
        Self::from(pattern.as_str())
    }
}

impl From<Regex> for RoutePattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl std::fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(s) => f.debug_tuple("Exact").field(s).finish(),
            Self::Prefix(s) => f.debug_tuple("Prefix").field(s).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Clone)]
struct Route {
    pattern: RoutePattern,
    handler: RouteFn,
}

/// Implements `Clone` to support `Arc::make_mut` for copy-on-write semantics.
#[derive(Clone, Default)]
struct RouterInner {
    name: Option<String>,
    routes: Vec<Route>,
}

/// Ordered pattern table for one module.
///
/// Cheap to clone: routes live behind an `Arc`.
#[derive(Clone, Default)]
pub struct InteractionRouter {
    inner: Arc<RouterInner>,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut RouterInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets a name for this router (useful for debugging).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Appends a route served by an async closure.
    ///
    /// The closure's errors propagate out of [`dispatch`](Self::dispatch).
    pub fn on<P, F, Fut>(mut self, pattern: P, handler: F) -> Self
    where
        P: Into<RoutePattern>,
        F: Fn(Arc<InteractionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow>> + Send + 'static,
    {
        let handler: RouteFn = Arc::new(
            move |ctx: Arc<InteractionContext>| -> BoxFuture<'static, anyhow::Result<Flow>> {
                Box::pin(handler(ctx))
            },
        );
        self.inner_mut().routes.push(Route {
            pattern: pattern.into(),
            handler,
        });
        self
    }

    /// Appends a route served by an [`InteractionHandler`] run through
    /// [`HandlerBase`].
    pub fn on_handler<P, H>(self, pattern: P, handler: H) -> Self
    where
        P: Into<RoutePattern>,
        H: InteractionHandler,
    {
        let base = Arc::new(HandlerBase::new(handler));
        self.on(pattern, move |ctx| {
            let base = Arc::clone(&base);
            async move { Ok(base.execute(ctx).await) }
        })
    }

    pub fn route_count(&self) -> usize {
        self.inner.routes.len()
    }

    /// Runs the first route matching the interaction's identifier.
    ///
    /// Returns [`Flow::NotHandled`] without side effects when nothing
    /// matches. A matched route that reports `NotHandled` is raised to
    /// [`Flow::Handled`], since a handler did run.
    pub async fn dispatch(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<Flow> {
        let router = self.get_name().unwrap_or("unnamed");
        let custom_id = ctx.custom_id();

        let Some((index, route)) = self
            .inner
            .routes
            .iter()
            .enumerate()
            .find(|(_, route)| route.pattern.matches(custom_id))
        else {
            trace!(router, custom_id, "No route matched");
            return Ok(Flow::NotHandled);
        };

        debug!(router, custom_id, route = index, pattern = ?route.pattern, "Route matched");
        let flow = (route.handler)(Arc::clone(&ctx)).await?;
        Ok(flow.max(Flow::Handled))
    }
}

impl std::fmt::Debug for InteractionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionRouter")
            .field("name", &self.inner.name)
            .field(
                "patterns",
                &self.inner.routes.iter().map(|r| &r.pattern).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation for InteractionRouter
// ============================================================================

impl Service<Arc<InteractionContext>> for InteractionRouter {
    type Response = Flow;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<InteractionContext>) -> Self::Future {
        let router = self.clone();

        Box::pin(async move { router.dispatch(ctx).await.map_err(BoxError::from) })
    }
}
