//! Dispatch outcome threaded through routers and the module registry.

/// What a handler, router or module did with an interaction.
///
/// The registry stops at the first [`HandledStop`](Flow::HandledStop).
/// [`Handled`](Flow::Handled) records that something ran but lets later
/// modules with overlapping prefixes see the event too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flow {
    /// Nothing claimed the interaction.
    #[default]
    NotHandled,
    /// A handler ran without claiming exclusivity.
    Handled,
    /// A handler answered; no other module may run.
    HandledStop,
}

impl Flow {
    /// Returns `true` unless this is [`Flow::NotHandled`].
    pub fn is_handled(self) -> bool {
        !matches!(self, Self::NotHandled)
    }

    /// Returns `true` for [`Flow::HandledStop`].
    pub fn should_stop(self) -> bool {
        matches!(self, Self::HandledStop)
    }
}
