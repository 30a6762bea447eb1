use std::future::Future;

use crate::frame::DetectionEvent;

/// What the lookup/notify side did with a detection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// A record matched the payload and its owner was notified.
    Notified,
    /// No record matched; nothing was sent.
    Unmatched,
    /// Lookup or delivery failed. The scan loop only logs this.
    Failed(String),
}

impl HandoffOutcome {
    pub fn is_notified(&self) -> bool {
        matches!(self, HandoffOutcome::Notified)
    }
}

/// Receiver of detection events, called once per successful decode.
///
/// Implementations must not fail the caller: every error is folded into
/// [`HandoffOutcome::Failed`].
pub trait DetectionHandler: Send + Sync + 'static {
    fn on_detection(&self, event: &DetectionEvent) -> impl Future<Output = HandoffOutcome> + Send;
}
