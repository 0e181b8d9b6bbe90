// The one path every violation takes, whether the synchronous pipeline or the
// AI worker found it: recall, count, audit, notify.

use super::admin_notifier::AdminNotifier;
use super::chat_backend::ChatBackend;
use super::moderation_models::{Violation, ViolationRecord};
use super::violation_stats::ViolationStats;
use std::sync::Arc;

pub struct ViolationHandler {
    backend: Arc<dyn ChatBackend>,
    stats: Arc<ViolationStats>,
    notifier: Arc<AdminNotifier>,
}

impl ViolationHandler {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        stats: Arc<ViolationStats>,
        notifier: Arc<AdminNotifier>,
    ) -> Self {
        Self {
            backend,
            stats,
            notifier,
        }
    }

    /// A failed recall is still recorded and reported, marked as such.
    pub async fn handle(
        &self,
        user_id: u64,
        group_id: u64,
        message_id: i64,
        violation: Violation,
    ) -> ViolationRecord {
        let recalled = match self.backend.delete_message(message_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(message_id, group_id, "Failed to recall message: {}", e);
                false
            }
        };

        let total = self.stats.record(user_id);

        tracing::warn!(
            target: "audit",
            user_id,
            group_id,
            message_id,
            violation_type = %violation.kind,
            reason = %violation.reason,
            recalled,
            total,
            "Violation"
        );

        let action = violation.kind.action(recalled);
        self.notifier
            .notify_violation(user_id, group_id, &action)
            .await;

        ViolationRecord {
            user_id,
            group_id,
            message_id,
            violation_type: violation.kind,
            reason: violation.reason,
            recalled,
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &Arc<ViolationStats> {
        &self.stats
    }
}
