use super::{compare_message_ids, ChannelHandle, ChatChannel, Embed, IncomingMessage, MessageHandle};
use crate::config::DiscordConfig;
use crate::error::ChannelError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const MAX_POLL_BATCH_SIZE: u32 = 50;
/// Discord rejects empty embed field names/values
const ZERO_WIDTH_SPACE: &str = "\u{200b}";

/// Discord REST v10 client authenticated as a bot
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    auth_header: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("DiscordBot (vpswatch-agent, 1.0)")
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            auth_header: format!("Bot {}", config.bot_token.expose()),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header.as_str())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Option<Value>, ChannelError> {
        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChannelError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(map_status(status, body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))
    }
}

pub(crate) fn map_status(status: StatusCode, body: String) -> ChannelError {
    match status {
        StatusCode::FORBIDDEN => ChannelError::Permission(body),
        StatusCode::NOT_FOUND => ChannelError::NotFound(body),
        _ => ChannelError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

/// Discord JSON for an embed, with empty texts replaced by a zero-width space
pub(crate) fn embed_payload(embed: &Embed) -> Value {
    let mut value = json!(embed);
    if let Some(fields) = value.get_mut("fields").and_then(Value::as_array_mut) {
        for field in fields {
            for key in ["name", "value"] {
                if field.get(key).and_then(Value::as_str) == Some("") {
                    field[key] = json!(ZERO_WIDTH_SPACE);
                }
            }
        }
    }
    json!({ "embeds": [value] })
}

pub(crate) fn parse_messages(channel_id: u64, value: &Value) -> Result<Vec<IncomingMessage>, ChannelError> {
    let items = value
        .as_array()
        .ok_or_else(|| ChannelError::InvalidResponse("messages response must be a JSON array".to_string()))?;

    let mut messages: Vec<IncomingMessage> = items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?.to_string();
            Some(IncomingMessage {
                id,
                channel_id,
                content: item
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                author_is_bot: item
                    .pointer("/author/bot")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        })
        .collect();
    messages.sort_by(|left, right| compare_message_ids(&left.id, &right.id));
    Ok(messages)
}

fn message_id(value: Option<Value>) -> Result<String, ChannelError> {
    value
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChannelError::InvalidResponse("message response did not include an id".to_string()))
}

#[async_trait]
impl ChatChannel for DiscordClient {
    async fn lookup_channel(&self, channel_id: u64) -> Result<ChannelHandle, ChannelError> {
        let value = self
            .execute(self.request(Method::GET, &format!("/channels/{channel_id}")))
            .await?;
        let name = value
            .as_ref()
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ChannelHandle { id: channel_id, name })
    }

    async fn send(&self, channel: &ChannelHandle, embed: &Embed) -> Result<MessageHandle, ChannelError> {
        let request = self
            .request(Method::POST, &format!("/channels/{}/messages", channel.id))
            .json(&embed_payload(embed));
        let message_id = message_id(self.execute(request).await?)?;
        debug!("Discord message {} created in {}", message_id, channel.id);
        Ok(MessageHandle {
            channel_id: channel.id,
            message_id,
        })
    }

    async fn edit(&self, message: &MessageHandle, embed: &Embed) -> Result<(), ChannelError> {
        let request = self
            .request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", message.channel_id, message.message_id),
            )
            .json(&embed_payload(embed));
        self.execute(request).await?;
        Ok(())
    }

    async fn delete(&self, message: &MessageHandle) -> Result<(), ChannelError> {
        let request = self.request(
            Method::DELETE,
            &format!("/channels/{}/messages/{}", message.channel_id, message.message_id),
        );
        self.execute(request).await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel: &ChannelHandle,
        after: Option<&str>,
    ) -> Result<Vec<IncomingMessage>, ChannelError> {
        let mut query = vec![("limit", MAX_POLL_BATCH_SIZE.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        let request = self
            .request(Method::GET, &format!("/channels/{}/messages", channel.id))
            .query(&query);
        let value = self.execute(request).await?.unwrap_or(Value::Array(Vec::new()));
        parse_messages(channel.id, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::COLOR_BLUE;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "Missing Permissions".into()),
            ChannelError::Permission(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "Unknown Message".into()),
            ChannelError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            ChannelError::Http { status: 429, .. }
        ));
    }

    #[test]
    fn test_embed_payload_fills_empty_fields() {
        let embed = Embed::new("Server Notification", COLOR_BLUE)
            .field("CPU Usage", "", false)
            .field("", "[          ] 0.00%", false);
        let payload = embed_payload(&embed);

        let fields = &payload["embeds"][0]["fields"];
        assert_eq!(fields[0]["value"], ZERO_WIDTH_SPACE);
        assert_eq!(fields[1]["name"], ZERO_WIDTH_SPACE);
        assert_eq!(fields[1]["value"], "[          ] 0.00%");
        assert_eq!(payload["embeds"][0]["title"], "Server Notification");
    }

    #[test]
    fn test_parse_messages_sorted_oldest_first() {
        let body = json!([
            {"id": "1002", "content": "!status", "author": {"id": "1", "bot": false}},
            {"id": "999", "content": "hello", "author": {"id": "2"}},
            {"id": "1001", "content": "beep", "author": {"id": "3", "bot": true}},
            {"content": "no id"}
        ]);
        let messages = parse_messages(77, &body).unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["999", "1001", "1002"]);
        assert!(messages[1].author_is_bot);
        assert!(!messages[0].author_is_bot);
        assert_eq!(messages[2].channel_id, 77);
    }

    #[test]
    fn test_parse_messages_rejects_non_array() {
        assert!(matches!(
            parse_messages(1, &json!({"message": "oops"})),
            Err(ChannelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_message_id_extraction() {
        assert_eq!(message_id(Some(json!({"id": "55"}))).unwrap(), "55");
        assert!(message_id(None).is_err());
    }
}
