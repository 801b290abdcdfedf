//! In-memory transport adapter.
//!
//! Backs the `serve --transport memory` path and the test suite: a shared
//! network with per-identity inboxes, DM conversations keyed by inbox pairs,
//! chronological per-conversation history, and a broadcast channel behind
//! `stream()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::{
    Conversation, DeliveryStatus, MessageQuery, MessageStream, SignerMaterial, SortDirection,
    TransportClient, TransportFactory, TransportMessage,
};
use crate::config::TransportEnv;
use crate::error::{Error, Result};
use crate::protocol::codec::EncodedContent;

const LIVE_CHANNEL_CAPACITY: usize = 64;

/// Shared in-process network. Clone handles point at the same state.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    /// identifier (address) -> inbox id
    identities: HashMap<String, String>,
    /// inbox id -> installation ids, oldest first
    installations: HashMap<String, Vec<String>>,
    conversations: HashMap<(String, String), Arc<ConversationState>>,
    clients_created: usize,
    next_installation: u64,
    fail_next_create: bool,
}

struct ConversationState {
    inbox_a: String,
    inbox_b: String,
    messages: Mutex<Vec<TransportMessage>>,
    next_message: AtomicU64,
    live: broadcast::Sender<TransportMessage>,
}

impl ConversationState {
    fn new(inbox_a: String, inbox_b: String) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inbox_a,
            inbox_b,
            messages: Mutex::new(Vec::new()),
            next_message: AtomicU64::new(1),
            live,
        }
    }
}

fn conversation_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Address-style identifier for a signer on this network.
pub fn identifier_for(signer: &SignerMaterial) -> String {
    format!("0x{}", signer.identity())
}

fn inbox_id_for(signer: &SignerMaterial) -> String {
    format!("inbox-{}", &signer.identity()[..12])
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many transport clients have been created so far.
    pub fn clients_created(&self) -> usize {
        self.state.lock().unwrap().clients_created
    }

    /// Make the next `create_client` call fail once. Exercises the
    /// multiplexer's clean-retry behavior.
    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    /// Installation ids currently registered for an inbox.
    pub fn installations(&self, inbox_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .installations
            .get(inbox_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransportFactory for MemoryNetwork {
    async fn create_client(
        &self,
        signer: &SignerMaterial,
        _protocol_env: &str,
        _transport_env: TransportEnv,
    ) -> Result<Arc<dyn TransportClient>> {
        let identifier = identifier_for(signer);
        let inbox_id = inbox_id_for(signer);
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_next_create {
                state.fail_next_create = false;
                return Err(Error::Transport("simulated registration failure".into()));
            }
            state.identities.insert(identifier.clone(), inbox_id.clone());
            let installation = format!("inst-{}", state.next_installation);
            state.next_installation += 1;
            state
                .installations
                .entry(inbox_id.clone())
                .or_default()
                .push(installation);
            state.clients_created += 1;
        }
        tracing::debug!(inbox_id = %inbox_id, "memory transport client created");
        Ok(Arc::new(MemoryClient {
            network: self.clone(),
            inbox_id,
        }))
    }

    async fn revoke_installations(
        &self,
        signer: &SignerMaterial,
        _transport_env: TransportEnv,
        inbox_ids: &[String],
    ) -> Result<()> {
        let own_inbox = inbox_id_for(signer);
        let mut state = self.state.lock().unwrap();
        // Ownership of every id is checked before anything is removed, so a
        // rejected batch leaves the network untouched.
        if let Some(foreign) = inbox_ids.iter().find(|id| **id != own_inbox) {
            return Err(Error::Transport(format!(
                "signer does not own inbox {foreign}"
            )));
        }
        for inbox_id in inbox_ids {
            state.installations.remove(inbox_id);
        }
        Ok(())
    }
}

struct MemoryClient {
    network: MemoryNetwork,
    inbox_id: String,
}

impl MemoryClient {
    fn conversation(&self, peer_inbox: &str) -> Option<Arc<ConversationState>> {
        let key = conversation_key(&self.inbox_id, peer_inbox);
        self.network
            .state
            .lock()
            .unwrap()
            .conversations
            .get(&key)
            .cloned()
    }
}

#[async_trait]
impl TransportClient for MemoryClient {
    fn inbox_id(&self) -> String {
        self.inbox_id.clone()
    }

    async fn can_message(&self, identifiers: &[String]) -> Result<HashMap<String, bool>> {
        let state = self.network.state.lock().unwrap();
        Ok(identifiers
            .iter()
            .map(|id| (id.clone(), state.identities.contains_key(id)))
            .collect())
    }

    async fn list_dms(&self) -> Result<Vec<Arc<dyn Conversation>>> {
        let state = self.network.state.lock().unwrap();
        Ok(state
            .conversations
            .values()
            .filter(|c| c.inbox_a == self.inbox_id || c.inbox_b == self.inbox_id)
            .map(|c| {
                Arc::new(MemoryConversation {
                    state: c.clone(),
                    self_inbox: self.inbox_id.clone(),
                }) as Arc<dyn Conversation>
            })
            .collect())
    }

    async fn inbox_id_by_identifier(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self
            .network
            .state
            .lock()
            .unwrap()
            .identities
            .get(identifier)
            .cloned())
    }

    async fn dm_by_inbox_id(&self, inbox_id: &str) -> Result<Option<Arc<dyn Conversation>>> {
        Ok(self.conversation(inbox_id).map(|state| {
            Arc::new(MemoryConversation {
                state,
                self_inbox: self.inbox_id.clone(),
            }) as Arc<dyn Conversation>
        }))
    }

    async fn new_dm_with_identifier(&self, identifier: &str) -> Result<Arc<dyn Conversation>> {
        let mut state = self.network.state.lock().unwrap();
        let peer_inbox = state
            .identities
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("unknown identifier {identifier}")))?;
        let key = conversation_key(&self.inbox_id, &peer_inbox);
        let conversation = state
            .conversations
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ConversationState::new(key.0.clone(), key.1.clone())))
            .clone();
        Ok(Arc::new(MemoryConversation {
            state: conversation,
            self_inbox: self.inbox_id.clone(),
        }))
    }

    async fn revoke_all_other_installations(&self) -> Result<()> {
        let mut state = self.network.state.lock().unwrap();
        if let Some(installations) = state.installations.get_mut(&self.inbox_id) {
            if let Some(latest) = installations.pop() {
                installations.clear();
                installations.push(latest);
            }
        }
        Ok(())
    }
}

struct MemoryConversation {
    state: Arc<ConversationState>,
    self_inbox: String,
}

#[async_trait]
impl Conversation for MemoryConversation {
    fn peer_inbox_id(&self) -> String {
        if self.state.inbox_a == self.self_inbox {
            self.state.inbox_b.clone()
        } else {
            self.state.inbox_a.clone()
        }
    }

    async fn send(&self, content: EncodedContent) -> Result<String> {
        let seq = self.state.next_message.fetch_add(1, Ordering::SeqCst);
        let message = TransportMessage {
            id: format!("msg-{seq}"),
            sender_inbox_id: self.self_inbox.clone(),
            recipient_inbox_id: self.peer_inbox_id(),
            sent_at: Utc::now(),
            delivery_status: DeliveryStatus::Published,
            content_type: content.content_type,
            content: content.content,
            fallback: content.fallback,
        };
        self.state.messages.lock().unwrap().push(message.clone());
        // No receiver means nobody is streaming; history still has it.
        let _ = self.state.live.send(message.clone());
        Ok(message.id)
    }

    async fn messages(&self, query: &MessageQuery) -> Result<Vec<TransportMessage>> {
        let mut messages: Vec<TransportMessage> = self
            .state
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| query.sent_after.map_or(true, |t| m.sent_at > t))
            .filter(|m| query.sent_before.map_or(true, |t| m.sent_at < t))
            .filter(|m| query.delivery_status.map_or(true, |s| m.delivery_status == s))
            .filter(|m| {
                query
                    .content_types
                    .as_ref()
                    .map_or(true, |types| types.contains(&m.content_type))
            })
            .cloned()
            .collect();
        if query.direction == Some(SortDirection::Descending) {
            messages.reverse();
        }
        if let Some(limit) = query.limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    async fn stream(&self) -> Result<MessageStream> {
        let receiver = self.state.live.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }
}
