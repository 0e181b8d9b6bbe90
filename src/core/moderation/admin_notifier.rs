// Operator notifications, delivered by private message to every configured admin.
// Delivery is best-effort: a failed send is logged and the rest still go out.

use super::chat_backend::ChatBackend;
use crate::core::config::{ConfigError, ConfigStore, PolicyConfig};
use crate::core::policy::cached_section::CachedSection;
use std::sync::Arc;

fn parse_admins(config: &PolicyConfig) -> Vec<u64> {
    config.admins.clone()
}

pub struct AdminNotifier {
    backend: Arc<dyn ChatBackend>,
    section: CachedSection<Vec<u64>>,
}

impl AdminNotifier {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<ConfigStore>) -> Self {
        Self {
            backend,
            section: CachedSection::new("admins", store, parse_admins),
        }
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.section.current().contains(&user_id)
    }

    pub fn admins(&self) -> Vec<u64> {
        self.section.current().to_vec()
    }

    pub fn add_admin(&self, admin_id: u64) -> Result<(), ConfigError> {
        self.section.update(|config| {
            if !config.admins.contains(&admin_id) {
                config.admins.push(admin_id);
            }
        })?;
        Ok(())
    }

    pub fn remove_admin(&self, admin_id: u64) -> Result<(), ConfigError> {
        self.section
            .update(|config| config.admins.retain(|id| *id != admin_id))?;
        Ok(())
    }

    /// Tell every admin that `user_id` had a message acted on in `group_id`.
    /// Returns how many admins were reached.
    pub async fn notify_violation(&self, user_id: u64, group_id: u64, action: &str) -> usize {
        let text = format!(
            "User {} had a message {} in group {}",
            user_id, action, group_id
        );
        self.broadcast(&text).await
    }

    pub async fn send_ranking(&self, ranking: &str) -> usize {
        if self.section.current().is_empty() {
            tracing::warn!("No admins configured, ranking not sent");
            return 0;
        }
        self.broadcast(ranking).await
    }

    async fn broadcast(&self, text: &str) -> usize {
        let admins = self.section.current();
        let mut delivered = 0;
        for admin_id in admins.iter() {
            match self.backend.send_private_message(*admin_id, text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(admin_id, "Failed to notify admin: {}", e);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::config_store::test_support::store_with;
    use crate::core::moderation::chat_backend::test_support::MockBackend;

    fn notifier(admins: &[u64]) -> (AdminNotifier, Arc<MockBackend>, Arc<ConfigStore>) {
        let config = PolicyConfig {
            admins: admins.to_vec(),
            ..Default::default()
        };
        let (store, _) = store_with(config);
        let backend = Arc::new(MockBackend::new());
        let notifier = AdminNotifier::new(backend.clone(), Arc::clone(&store));
        (notifier, backend, store)
    }

    #[tokio::test]
    async fn test_notify_reaches_every_admin() {
        let (notifier, backend, _) = notifier(&[10, 20]);
        let delivered = notifier.notify_violation(1, 2, "recalled after AI review").await;

        assert_eq!(delivered, 2);
        let sent = backend.private_messages.lock().clone();
        assert_eq!(
            sent,
            vec![
                (10, "User 1 had a message recalled after AI review in group 2".to_string()),
                (20, "User 1 had a message recalled after AI review in group 2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ranking_without_admins_is_skipped() {
        let (notifier, backend, _) = notifier(&[]);
        assert_eq!(notifier.send_ranking("board").await, 0);
        assert!(backend.private_messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_admin_list_changes_are_saved() {
        let (notifier, _, store) = notifier(&[1]);
        notifier.add_admin(2).unwrap();
        notifier.add_admin(2).unwrap();
        notifier.remove_admin(1).unwrap();

        assert_eq!(notifier.admins(), vec![2]);
        assert!(notifier.is_admin(2));
        assert!(!notifier.is_admin(1));
        assert_eq!(store.get().config.admins, vec![2]);
    }
}
