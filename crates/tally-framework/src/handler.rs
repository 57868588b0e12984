//! Handler execution with auto-defer and error containment.
//!
//! Feature handlers implement [`InteractionHandler`] and are run through
//! [`HandlerBase`], which applies the same lifecycle to every one of them:
//!
//! 1. Defer the interaction right away, unless the handler opts out or
//!    something already answered it.
//! 2. Run [`InteractionHandler::handle`].
//! 3. If it fails, log the error under a fresh correlation id and send the
//!    generic ephemeral failure message through
//!    [`safe_reply`](InteractionContext::safe_reply). This is the only place
//!    a handler failure is reported to the user.
//! 4. Log how long it took, at `WARN` past the slow-handler threshold.
//!
//! # Example
//!
//! ```rust,ignore
//! struct OpenExpenseForm;
//!
//! #[async_trait]
//! impl InteractionHandler for OpenExpenseForm {
//!     // Modals must be the primary response, so never defer first.
//!     fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
//!         false
//!     }
//!
//!     async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
//!         ctx.show_modal(&expense_form()).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, warn};
use uuid::Uuid;

use tally_core::{Response, ResponseState};

use crate::context::InteractionContext;
use crate::flow::Flow;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A feature handler for one kind of interaction.
#[async_trait]
pub trait InteractionHandler: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether [`HandlerBase`] should defer before calling
    /// [`handle`](Self::handle).
    ///
    /// Handlers that open a modal or use `update` must return `false`: both
    /// have to be the primary response.
    fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
        true
    }

    /// Whether the automatic defer is ephemeral.
    fn defer_ephemeral(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()>;
}

/// Runs an [`InteractionHandler`] with the shared lifecycle.
pub struct HandlerBase<H> {
    inner: H,
}

impl<H: InteractionHandler> HandlerBase<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Executes the handler. Never fails: errors are contained here.
    ///
    /// Returns [`Flow::HandledStop`] once the interaction has been answered,
    /// late follow-ups included, or a failure was reported.
    /// [`Flow::Handled`] otherwise.
    pub async fn execute(&self, ctx: Arc<InteractionContext>) -> Flow {
        let name = self.inner.name();
        let started = Instant::now();

        if ctx.response_state() == ResponseState::None && self.inner.should_auto_defer(&ctx) {
            if let Err(e) = ctx.defer(self.inner.defer_ephemeral()).await {
                // The handler can still answer through a follow-up.
                warn!(handler = name, custom_id = ctx.custom_id(), error = %e, "Auto-defer failed");
            }
        }

        let flow = match self.inner.handle(Arc::clone(&ctx)).await {
            Ok(()) if ctx.has_responded() => Flow::HandledStop,
            Ok(()) => Flow::Handled,
            Err(e) => {
                report_failure(&ctx, name, &e).await;
                Flow::HandledStop
            }
        };

        let elapsed = started.elapsed();
        let threshold = ctx.settings().slow_handler_threshold;
        if elapsed > threshold {
            warn!(
                handler = name,
                custom_id = ctx.custom_id(),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "Slow interaction handler"
            );
        } else {
            debug!(
                handler = name,
                custom_id = ctx.custom_id(),
                elapsed_ms = elapsed.as_millis() as u64,
                ?flow,
                "Handler finished"
            );
        }

        flow
    }
}

impl<H: InteractionHandler> std::fmt::Debug for HandlerBase<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBase")
            .field("handler", &self.inner.name())
            .finish()
    }
}

/// Logs `error` and tells the user something went wrong.
///
/// The correlation id is only written to the log, never shown to the user.
/// Delivery failures of the notice itself are logged and swallowed.
pub async fn report_failure(
    ctx: &InteractionContext,
    handler: &str,
    error: &anyhow::Error,
) -> Uuid {
    let correlation_id = Uuid::new_v4();
    error!(
        %correlation_id,
        handler,
        custom_id = ctx.custom_id(),
        state = %ctx.response_state(),
        error = ?error,
        "Interaction failed"
    );

    let notice = Response::text(ctx.settings().failure_message.clone()).ephemeral(true);
    if let Err(e) = ctx.safe_reply(&notice).await {
        warn!(%correlation_id, error = %e, "Could not deliver failure notice");
    }
    correlation_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{context, context_with};
    use anyhow::bail;
    use std::time::Duration;
    use tally_core::{Interaction, InteractionKind, Origin};
    use serde_json::json;
    use tally_core::testing::{PlatformCall, RecordedCall};

    struct Confirm;

    #[async_trait]
    impl InteractionHandler for Confirm {
        async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            ctx.edit_reply(&Response::text("saved")).await?;
            Ok(())
        }
    }

    struct OpenForm;

    #[async_trait]
    impl InteractionHandler for OpenForm {
        fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
            false
        }

        async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            ctx.show_modal(&json!({ "title": "New expense" })).await?;
            Ok(())
        }
    }

    struct Broken {
        defer: bool,
    }

    #[async_trait]
    impl InteractionHandler for Broken {
        fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
            self.defer
        }

        async fn handle(&self, _ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            bail!("ledger unavailable")
        }
    }

    struct Silent;

    #[async_trait]
    impl InteractionHandler for Silent {
        fn should_auto_defer(&self, _ctx: &InteractionContext) -> bool {
            false
        }

        async fn handle(&self, _ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_auto_defer_then_edit() {
        let (ctx, platform) = context("expenses:entry:save");
        let flow = HandlerBase::new(Confirm).execute(Arc::clone(&ctx)).await;

        assert_eq!(flow, Flow::HandledStop);
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::Defer, PlatformCall::EditReply]
        );
        assert_eq!(ctx.response_state(), ResponseState::Replied);
    }

    #[tokio::test]
    async fn test_modal_handler_skips_defer() {
        let (ctx, platform) = context("expenses:entry:new");
        let flow = HandlerBase::new(OpenForm).execute(ctx).await;

        assert_eq!(flow, Flow::HandledStop);
        assert_eq!(platform.calls(), vec![PlatformCall::ShowModal]);
    }

    #[tokio::test]
    async fn test_error_after_defer_edits_failure_notice() {
        let (ctx, platform) = context("expenses:entry:save");
        let flow = HandlerBase::new(Broken { defer: true })
            .execute(Arc::clone(&ctx))
            .await;

        assert_eq!(flow, Flow::HandledStop);
        let recorded = platform.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(
            recorded[1],
            RecordedCall {
                call: PlatformCall::EditReply,
                content: Some(ctx.settings().failure_message.clone()),
                ephemeral: true,
            }
        );
    }

    #[tokio::test]
    async fn test_error_without_defer_replies_once() {
        let (ctx, platform) = context("expenses:entry:new");
        HandlerBase::new(Broken { defer: false })
            .execute(Arc::clone(&ctx))
            .await;

        assert_eq!(platform.calls(), vec![PlatformCall::Reply]);
        assert!(platform.recorded()[0].ephemeral);
        assert_eq!(ctx.response_state(), ResponseState::Replied);
    }

    #[tokio::test]
    async fn test_unanswered_handler_is_handled_not_stop() {
        let (ctx, platform) = context("kpi:view:refresh");
        let flow = HandlerBase::new(Silent).execute(ctx).await;

        assert_eq!(flow, Flow::Handled);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_defer_still_runs_handler() {
        let (ctx, platform) = context("expenses:entry:save");
        platform.fail_next("rate limited");
        let flow = HandlerBase::new(Broken { defer: true })
            .execute(Arc::clone(&ctx))
            .await;

        // Defer failed, so the failure notice is the primary reply.
        assert_eq!(flow, Flow::HandledStop);
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::Defer, PlatformCall::Reply]
        );
    }

    struct Notice;

    #[async_trait]
    impl InteractionHandler for Notice {
        async fn handle(&self, ctx: Arc<InteractionContext>) -> anyhow::Result<()> {
            ctx.safe_reply(&Response::text("saved")).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_late_follow_up_counts_as_answer() {
        let (ctx, platform) = context_with(
            Interaction::new(
                "ix-expired",
                InteractionKind::Button,
                "expenses:entry:save",
                Origin::new("u1", "c1").in_guild("g1"),
            )
            .with_ack_deadline(Duration::ZERO),
        );
        std::thread::sleep(Duration::from_millis(2));

        let flow = HandlerBase::new(Notice).execute(Arc::clone(&ctx)).await;

        // The auto-defer is rejected locally; the answer goes out as a follow-up.
        assert_eq!(flow, Flow::HandledStop);
        assert_eq!(platform.calls(), vec![PlatformCall::FollowUp]);
        assert_eq!(ctx.response_state(), ResponseState::None);
    }

    #[tokio::test]
    async fn test_report_failure_returns_distinct_ids() {
        let (ctx, _) = context("expenses:entry:save");
        let err = anyhow::anyhow!("boom");
        let first = report_failure(&ctx, "test", &err).await;
        let second = report_failure(&ctx, "test", &err).await;
        assert_ne!(first, second);
    }
}
