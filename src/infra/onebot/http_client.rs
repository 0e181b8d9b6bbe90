use crate::core::moderation::{AdapterError, ChatBackend, InboundEvent, RawMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const FORWARD_TIMEOUT: Duration = Duration::from_secs(100);
const MAX_CACHED_NAMES: usize = 5_000;

/// Standard OneBot v11 response wrapper.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    retcode: Option<i64>,
    data: Option<T>,
    #[serde(default)]
    wording: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn is_ok(&self) -> bool {
        self.retcode == Some(0) || self.status.as_deref() == Some("ok")
    }

    fn into_result(self, action: &'static str) -> Result<Option<T>, AdapterError> {
        if self.is_ok() {
            return Ok(self.data);
        }
        let detail = self
            .wording
            .or(self.message)
            .unwrap_or_else(|| format!("retcode {:?}, status {:?}", self.retcode, self.status));
        Err(AdapterError::Rejected { action, detail })
    }
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct MemberInfo {
    #[serde(default)]
    card: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

/// OneBot v11 HTTP API client (NapCat, LLOneBot, go-cqhttp...).
pub struct OneBotHttpClient {
    client: Client,
    base_url: String,
    names: DashMap<(u64, u64), String>,
}

impl OneBotHttpClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        if !token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| AdapterError::Http(e.to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            names: DashMap::new(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &'static str,
        body: Value,
        timeout: Duration,
    ) -> Result<Option<T>, AdapterError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, action))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdapterError::Rejected {
                action,
                detail: format!("HTTP {} - {}", status, text),
            });
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("{}: {}", action, e)))?;
        envelope.into_result(action)
    }

    fn cache_name(&self, group_id: u64, user_id: u64, name: &str) {
        self.names.insert((group_id, user_id), name.to_string());
        if self.names.len() > MAX_CACHED_NAMES {
            // The iterator's shard guard must be gone before `remove`.
            let first_key = self.names.iter().next().map(|entry| *entry.key());
            if let Some(first_key) = first_key {
                self.names.remove(&first_key);
            }
        }
    }
}

#[async_trait]
impl ChatBackend for OneBotHttpClient {
    async fn delete_message(&self, message_id: i64) -> Result<(), AdapterError> {
        self.call::<Value>("delete_msg", json!({ "message_id": message_id }), REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn send_private_message(&self, user_id: u64, text: &str) -> Result<(), AdapterError> {
        self.call::<Value>(
            "send_private_msg",
            json!({ "user_id": user_id, "message": text }),
            REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn send_group_message(&self, group_id: u64, text: &str) -> Result<(), AdapterError> {
        self.call::<Value>(
            "send_group_msg",
            json!({ "group_id": group_id, "message": text }),
            REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn get_forward_messages(&self, forward_id: &str) -> Result<Vec<RawMessage>, AdapterError> {
        let list: Option<MessageList> = self
            .call("get_forward_msg", json!({ "id": forward_id }), FORWARD_TIMEOUT)
            .await?;
        Ok(list
            .unwrap_or_default()
            .messages
            .iter()
            .map(forward_node_body)
            .collect())
    }

    async fn get_member_name(
        &self,
        group_id: u64,
        user_id: u64,
    ) -> Result<Option<String>, AdapterError> {
        if let Some(name) = self.names.get(&(group_id, user_id)) {
            return Ok(Some(name.clone()));
        }

        let info: Option<MemberInfo> = self
            .call(
                "get_group_member_info",
                json!({ "group_id": group_id, "user_id": user_id }),
                REQUEST_TIMEOUT,
            )
            .await?;

        let name = info.and_then(|info| {
            [info.card, info.nickname]
                .into_iter()
                .flatten()
                .map(|n| n.trim().to_string())
                .find(|n| !n.is_empty())
        });
        if let Some(name) = &name {
            self.cache_name(group_id, user_id, name);
        }
        Ok(name)
    }

    async fn get_group_messages(
        &self,
        group_id: u64,
        count: u32,
    ) -> Result<Vec<InboundEvent>, AdapterError> {
        let list: Option<MessageList> = self
            .call(
                "get_group_msg_history",
                json!({ "group_id": group_id, "count": count }),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(parse_history(group_id, list.unwrap_or_default().messages))
    }
}

/// Body of one forward node: `content` (newer implementations) or `message`.
fn forward_node_body(node: &Value) -> RawMessage {
    let body = node.get("content").or_else(|| node.get("message"));
    body.and_then(|b| serde_json::from_value(b.clone()).ok())
        .unwrap_or_default()
}

/// History entries as events of `group_id`; entries that don't decode are skipped.
fn parse_history(group_id: u64, messages: Vec<Value>) -> Vec<InboundEvent> {
    messages
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<InboundEvent>(value) {
            Ok(mut event) => {
                event.group_id = Some(group_id);
                Some(event)
            }
            Err(e) => {
                tracing::debug!(group_id, "Skipping undecodable history entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_by_retcode_or_status() {
        let ok: ApiEnvelope<Value> = serde_json::from_str(r#"{"retcode": 0}"#).unwrap();
        assert!(ok.into_result("delete_msg").is_ok());

        let ok: ApiEnvelope<Value> =
            serde_json::from_str(r#"{"status": "ok", "data": {"x": 1}}"#).unwrap();
        assert_eq!(ok.into_result("x").unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn test_envelope_without_data_decodes_any_payload_type() {
        #[derive(Debug, Deserialize)]
        struct Receipt {
            #[allow(dead_code)]
            message_id: i64,
        }

        let ok: ApiEnvelope<Receipt> = serde_json::from_str(r#"{"retcode": 0}"#).unwrap();
        assert!(ok.into_result("send_group_msg").unwrap().is_none());

        let ok: ApiEnvelope<Receipt> =
            serde_json::from_str(r#"{"status": "ok", "data": {"message_id": 9}}"#).unwrap();
        assert!(ok.into_result("send_group_msg").unwrap().is_some());
    }

    #[test]
    fn test_envelope_failure_carries_wording() {
        let failed: ApiEnvelope<Value> = serde_json::from_str(
            r#"{"status": "failed", "retcode": 1200, "wording": "message not found"}"#,
        )
        .unwrap();
        match failed.into_result("delete_msg") {
            Err(AdapterError::Rejected { action, detail }) => {
                assert_eq!(action, "delete_msg");
                assert_eq!(detail, "message not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_forward_nodes_accept_both_shapes() {
        let nodes = json!([
            {"content": [{"type": "text", "data": {"text": "a"}}]},
            {"message": "b"},
            {"sender": {}}
        ]);
        let bodies: Vec<RawMessage> = nodes.as_array().unwrap().iter().map(forward_node_body).collect();
        assert_eq!(bodies[0].segments()[0].field("text").as_deref(), Some("a"));
        assert_eq!(bodies[1], RawMessage::Text("b".to_string()));
        assert!(bodies[2].is_empty());
    }

    #[test]
    fn test_history_is_tagged_with_group() {
        let messages = vec![
            json!({"message_id": 1, "user_id": 5, "time": 100, "message": "hi",
                   "sender": {"nickname": "n", "card": ""}}),
            json!("garbage"),
        ];
        let events = parse_history(42, messages);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].group_id, Some(42));
        assert_eq!(events[0].sender_name().as_deref(), Some("n"));
    }
}
