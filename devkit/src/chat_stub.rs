/*!
Faux canal Discord pour tests sans réseau

Enregistre chaque appel (envoi, édition, suppression) et garde la liste des
messages vivants par canal. Permet aussi de simuler des messages utilisateur
(`!status`) et des erreurs de permission.
*/

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vpswatch_agent::chat::{
    compare_message_ids, ChannelHandle, ChatChannel, Embed, IncomingMessage, MessageHandle,
};
use vpswatch_agent::error::ChannelError;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatRecord {
    Sent { handle: MessageHandle, embed: Embed },
    Edited { handle: MessageHandle, embed: Embed },
    Deleted { handle: MessageHandle },
}

/// Type d'erreur injectée sur les suppressions / éditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Permission,
    NotFound,
    Http,
}

impl FailureKind {
    fn to_error(self, what: &str) -> ChannelError {
        match self {
            FailureKind::Permission => ChannelError::Permission(format!("[MOCK] {what}")),
            FailureKind::NotFound => ChannelError::NotFound(format!("[MOCK] {what}")),
            FailureKind::Http => ChannelError::Http {
                status: 500,
                body: format!("[MOCK] {what}"),
            },
        }
    }
}

#[derive(Default)]
struct ChatState {
    records: Vec<ChatRecord>,
    /// id message -> (canal, contenu courant)
    live: BTreeMap<String, (u64, Embed)>,
    inbox: Vec<IncomingMessage>,
    send_failure: Option<FailureKind>,
    edit_failure: Option<FailureKind>,
    delete_failure: Option<FailureKind>,
    missing_channels: Vec<u64>,
}

/// Mock Discord qui implémente `ChatChannel`
#[derive(Clone)]
pub struct MockChatChannel {
    state: Arc<Mutex<ChatState>>,
    next_id: Arc<AtomicU64>,
    send_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockChatChannel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChatState::default())),
            next_id: Arc::new(AtomicU64::new(1000)),
            send_delay: Arc::new(Mutex::new(None)),
        }
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Ralentit les envois (pour élargir les fenêtres de concurrence)
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_sends(&self, kind: Option<FailureKind>) {
        self.state.lock().unwrap().send_failure = kind;
    }

    pub fn fail_edits(&self, kind: Option<FailureKind>) {
        self.state.lock().unwrap().edit_failure = kind;
    }

    pub fn fail_deletes(&self, kind: Option<FailureKind>) {
        self.state.lock().unwrap().delete_failure = kind;
    }

    /// Le canal n'existe pas pour `lookup_channel`
    pub fn remove_channel(&self, channel_id: u64) {
        self.state.lock().unwrap().missing_channels.push(channel_id);
    }

    /// Simule un message utilisateur (ou bot) dans un canal
    pub fn simulate_incoming(&self, channel_id: u64, content: &str, author_is_bot: bool) -> IncomingMessage {
        let message = IncomingMessage {
            id: self.allocate_id(),
            channel_id,
            content: content.to_string(),
            author_is_bot,
        };
        self.state.lock().unwrap().inbox.push(message.clone());
        log::info!("📨 [MOCK] Simulated incoming in {}: {}", channel_id, content);
        message
    }

    pub fn records(&self) -> Vec<ChatRecord> {
        self.state.lock().unwrap().records.clone()
    }

    /// Contenus envoyés (créations) dans un canal
    pub fn sent_to(&self, channel_id: u64) -> Vec<Embed> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                ChatRecord::Sent { handle, embed } if handle.channel_id == channel_id => Some(embed),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageHandle, Embed)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                ChatRecord::Edited { handle, embed } => Some((handle, embed)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                ChatRecord::Deleted { handle } => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Messages du bot encore présents dans un canal
    pub fn live_messages(&self, channel_id: u64) -> Vec<(String, Embed)> {
        self.state
            .lock()
            .unwrap()
            .live
            .iter()
            .filter(|(_, (channel, _))| *channel == channel_id)
            .map(|(id, (_, embed))| (id.clone(), embed.clone()))
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.records.clear();
        state.live.clear();
        state.inbox.clear();
    }
}

impl Default for MockChatChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatChannel for MockChatChannel {
    async fn lookup_channel(&self, channel_id: u64) -> Result<ChannelHandle, ChannelError> {
        if self.state.lock().unwrap().missing_channels.contains(&channel_id) {
            return Err(ChannelError::NotFound(format!("[MOCK] channel {channel_id}")));
        }
        Ok(ChannelHandle {
            id: channel_id,
            name: Some(format!("mock-{channel_id}")),
        })
    }

    async fn send(&self, channel: &ChannelHandle, embed: &Embed) -> Result<MessageHandle, ChannelError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.send_failure {
            return Err(kind.to_error("send"));
        }
        let handle = MessageHandle {
            channel_id: channel.id,
            message_id: self.allocate_id(),
        };
        state
            .live
            .insert(handle.message_id.clone(), (channel.id, embed.clone()));
        state.records.push(ChatRecord::Sent {
            handle: handle.clone(),
            embed: embed.clone(),
        });
        log::info!("📤 [MOCK] Sent '{}' to {}", embed.title, channel.id);
        Ok(handle)
    }

    async fn edit(&self, message: &MessageHandle, embed: &Embed) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.edit_failure {
            return Err(kind.to_error("edit"));
        }
        match state.live.get_mut(&message.message_id) {
            Some((_, current)) => *current = embed.clone(),
            None => return Err(ChannelError::NotFound(format!("[MOCK] message {}", message.message_id))),
        }
        state.records.push(ChatRecord::Edited {
            handle: message.clone(),
            embed: embed.clone(),
        });
        log::info!("✏️ [MOCK] Edited {}", message.message_id);
        Ok(())
    }

    async fn delete(&self, message: &MessageHandle) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.delete_failure {
            return Err(kind.to_error("delete"));
        }
        state.live.remove(&message.message_id);
        state.inbox.retain(|m| m.id != message.message_id);
        state.records.push(ChatRecord::Deleted {
            handle: message.clone(),
        });
        log::info!("🗑️ [MOCK] Deleted {}", message.message_id);
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel: &ChannelHandle,
        after: Option<&str>,
    ) -> Result<Vec<IncomingMessage>, ChannelError> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<IncomingMessage> = state
            .inbox
            .iter()
            .filter(|m| m.channel_id == channel.id)
            .filter(|m| match after {
                Some(after) => compare_message_ids(&m.id, after).is_gt(),
                None => true,
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| compare_message_ids(&a.id, &b.id));
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpswatch_agent::chat::COLOR_BLUE;

    #[tokio::test]
    async fn test_mock_send_edit_delete() {
        let chat = MockChatChannel::new();
        let channel = chat.lookup_channel(1).await.unwrap();
        let embed = Embed::new("first", COLOR_BLUE);

        let handle = chat.send(&channel, &embed).await.unwrap();
        assert_eq!(chat.live_messages(1).len(), 1);

        chat.edit(&handle, &Embed::new("second", COLOR_BLUE)).await.unwrap();
        assert_eq!(chat.live_messages(1)[0].1.title, "second");
        assert_eq!(chat.edits().len(), 1);

        chat.delete(&handle).await.unwrap();
        assert!(chat.live_messages(1).is_empty());
        assert!(chat.edit(&handle, &embed).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_incoming_after_cursor() {
        let chat = MockChatChannel::new();
        let channel = ChannelHandle::new(9);
        let first = chat.simulate_incoming(9, "hello", false);
        chat.simulate_incoming(10, "elsewhere", false);
        let second = chat.simulate_incoming(9, "!status", false);

        let all = chat.recent_messages(&channel, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let newer = chat.recent_messages(&channel, Some(&first.id)).await.unwrap();
        assert_eq!(newer, vec![second]);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let chat = MockChatChannel::new();
        chat.fail_deletes(Some(FailureKind::Permission));
        let handle = MessageHandle {
            channel_id: 1,
            message_id: "1".to_string(),
        };
        assert!(matches!(chat.delete(&handle).await, Err(ChannelError::Permission(_))));

        chat.remove_channel(5);
        assert!(matches!(chat.lookup_channel(5).await, Err(ChannelError::NotFound(_))));
    }
}
