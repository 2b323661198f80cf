// ── Out-of-band re-announcement requests ──
//
// Requests coalesce to the strongest pending one; the poll loop takes it
// exactly once.

use tokio::sync::Mutex;

/// Pending refresh, ordered by strength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefreshRequest {
    #[default]
    Idle,
    /// Re-publish every device registration.
    Publish,
    /// Re-publish and re-subscribe every command topic.
    PublishAndSubscribe,
}

#[derive(Debug, Default)]
pub struct RefreshSchedule {
    pending: Mutex<RefreshRequest>,
}

impl RefreshSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request; a subscribing request dominates.
    pub async fn schedule(&self, subscribe: bool) {
        let request = if subscribe {
            RefreshRequest::PublishAndSubscribe
        } else {
            RefreshRequest::Publish
        };
        let mut pending = self.pending.lock().await;
        *pending = (*pending).max(request);
    }

    /// Take the pending request, leaving `Idle` behind.
    pub async fn take(&self) -> RefreshRequest {
        std::mem::take(&mut *self.pending.lock().await)
    }
}
