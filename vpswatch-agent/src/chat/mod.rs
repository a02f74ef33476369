//! Chat platform abstraction
//!
//! Rich content is modeled on Discord embeds; `DiscordClient` is the
//! production implementation over the REST API.

mod discord;

pub use discord::DiscordClient;

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::Serialize;

pub const COLOR_BLUE: u32 = 0x3498db;
pub const COLOR_RED: u32 = 0xe74c3c;

/// A resolved channel the bot can post to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: Option<String>,
}

impl ChannelHandle {
    pub fn new(id: u64) -> Self {
        Self { id, name: None }
    }
}

/// A message the bot created and may edit or delete later
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

/// Rendered alert payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    /// All visible text, for logs and assertions
    pub fn text(&self) -> String {
        let mut parts = vec![self.title.clone()];
        parts.extend(self.description.clone());
        for field in &self.fields {
            parts.push(field.name.clone());
            parts.push(field.value.clone());
        }
        parts.extend(self.footer.as_ref().map(|f| f.text.clone()));
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }
}

/// A user message read back from a command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: u64,
    pub content: String,
    pub author_is_bot: bool,
}

impl IncomingMessage {
    pub fn handle(&self) -> MessageHandle {
        MessageHandle {
            channel_id: self.channel_id,
            message_id: self.id.clone(),
        }
    }
}

#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn lookup_channel(&self, channel_id: u64) -> Result<ChannelHandle, ChannelError>;

    async fn send(&self, channel: &ChannelHandle, embed: &Embed) -> Result<MessageHandle, ChannelError>;

    async fn edit(&self, message: &MessageHandle, embed: &Embed) -> Result<(), ChannelError>;

    async fn delete(&self, message: &MessageHandle) -> Result<(), ChannelError>;

    /// Messages newer than `after`, oldest first
    async fn recent_messages(
        &self,
        channel: &ChannelHandle,
        after: Option<&str>,
    ) -> Result<Vec<IncomingMessage>, ChannelError>;
}

/// Order Discord snowflake ids numerically (longer id is newer)
pub fn compare_message_ids(left: &str, right: &str) -> std::cmp::Ordering {
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}
