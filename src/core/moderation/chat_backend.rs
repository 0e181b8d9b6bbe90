// Chat backend port - everything the moderation core asks of the chat platform.
//
// Implemented in infra by the OneBot HTTP client; tests use in-memory mocks.

use super::moderation_models::{InboundEvent, RawMessage};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Chat backend request failed: {0}")]
    Http(String),

    #[error("Chat backend rejected {action}: {detail}")]
    Rejected { action: &'static str, detail: String },

    #[error("Unexpected chat backend response: {0}")]
    Decode(String),
}

// ============================================================================
// BACKEND TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Recall a message.
    async fn delete_message(&self, message_id: i64) -> Result<(), AdapterError>;

    async fn send_private_message(&self, user_id: u64, text: &str) -> Result<(), AdapterError>;

    async fn send_group_message(&self, group_id: u64, text: &str) -> Result<(), AdapterError>;

    /// Bodies of the messages bundled in a forward, in order.
    async fn get_forward_messages(&self, forward_id: &str) -> Result<Vec<RawMessage>, AdapterError>;

    /// Group card or nickname of a member, if the backend knows one.
    async fn get_member_name(
        &self,
        group_id: u64,
        user_id: u64,
    ) -> Result<Option<String>, AdapterError>;

    /// Most recent messages of a group, newest last as the backend returns them.
    async fn get_group_messages(
        &self,
        group_id: u64,
        count: u32,
    ) -> Result<Vec<InboundEvent>, AdapterError>;
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

/// Recording backend used by the moderation tests.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use dashmap::DashMap;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct MockBackend {
        pub deleted: Mutex<Vec<i64>>,
        pub private_messages: Mutex<Vec<(u64, String)>>,
        pub group_messages: Mutex<Vec<(u64, String)>>,
        pub forwards: DashMap<String, Vec<RawMessage>>,
        pub names: DashMap<(u64, u64), String>,
        pub fail_delete: bool,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_delete() -> Self {
            Self {
                fail_delete: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn delete_message(&self, message_id: i64) -> Result<(), AdapterError> {
            if self.fail_delete {
                return Err(AdapterError::Rejected {
                    action: "delete_msg",
                    detail: "retcode 100".to_string(),
                });
            }
            self.deleted.lock().push(message_id);
            Ok(())
        }

        async fn send_private_message(&self, user_id: u64, text: &str) -> Result<(), AdapterError> {
            self.private_messages.lock().push((user_id, text.to_string()));
            Ok(())
        }

        async fn send_group_message(&self, group_id: u64, text: &str) -> Result<(), AdapterError> {
            self.group_messages.lock().push((group_id, text.to_string()));
            Ok(())
        }

        async fn get_forward_messages(
            &self,
            forward_id: &str,
        ) -> Result<Vec<RawMessage>, AdapterError> {
            self.forwards
                .get(forward_id)
                .map(|messages| messages.clone())
                .ok_or_else(|| AdapterError::Decode(format!("unknown forward {}", forward_id)))
        }

        async fn get_member_name(
            &self,
            group_id: u64,
            user_id: u64,
        ) -> Result<Option<String>, AdapterError> {
            Ok(self.names.get(&(group_id, user_id)).map(|n| n.clone()))
        }

        async fn get_group_messages(
            &self,
            _group_id: u64,
            _count: u32,
        ) -> Result<Vec<InboundEvent>, AdapterError> {
            Ok(Vec::new())
        }
    }
}
