//! Push-notification side-effect boundary.
//!
//! APNs/FCM delivery is not implemented here, only the interface the
//! broadcaster dispatches through. Invocation is fire-and-forget — a
//! failure here must never block or influence the live stream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::Update;

#[async_trait]
pub trait NotificationHook: Send + Sync {
    async fn notify(&self, update: &Update) -> anyhow::Result<()>;
}

/// Ships with the crate; does nothing. A real deployment wires an
/// APNs/FCM-backed implementation in its place.
pub struct NoopNotificationHook;

#[async_trait]
impl NotificationHook for NoopNotificationHook {
    async fn notify(&self, _update: &Update) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Spawns the hook as a detached task and swallows any error, logging it
/// instead. Callers should call this rather than `.await`ing `notify`
/// directly so a slow or failing hook can never stall the poller.
pub fn dispatch(hook: Arc<dyn NotificationHook>, update: Update) {
    tokio::spawn(async move {
        if let Err(e) = hook.notify(&update).await {
            warn!("Notification hook failed for fixture {}: {}", update.fixture_id, e);
        }
    });
}

/// Whether an update kind warrants a notification dispatch at all:
/// `kind ∈ {Goal, RedCard, MatchFinished}`.
pub fn should_notify(kind: crate::model::UpdateKind) -> bool {
    use crate::model::UpdateKind;
    matches!(kind, UpdateKind::Goal | UpdateKind::RedCard | UpdateKind::MatchFinished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpdateKind;

    #[test]
    fn only_goal_red_card_and_match_finished_notify() {
        assert!(should_notify(UpdateKind::Goal));
        assert!(should_notify(UpdateKind::RedCard));
        assert!(should_notify(UpdateKind::MatchFinished));
        assert!(!should_notify(UpdateKind::YellowCard));
        assert!(!should_notify(UpdateKind::TimeUpdate));
        assert!(!should_notify(UpdateKind::StatusUpdate));
    }
}
