//! Capability contract for the underlying encrypted transport.
//!
//! Key exchange, encryption, delivery, and installation lifecycle all live in
//! the external transport. This crate consumes it only through these traits;
//! environment-specific adapters are selected by configuration, not by
//! subclassing.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio_stream::Stream;

use crate::config::TransportEnv;
use crate::error::Result;
use crate::protocol::codec::{ContentTypeId, EncodedContent};

pub mod memory;

/// Signer credentials handed to the transport for session creation.
///
/// The key itself never appears in logs or cache keys; identity is a sha256
/// fingerprint of the normalized material.
#[derive(Clone)]
pub struct SignerMaterial {
    private_key: String,
}

impl SignerMaterial {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
        }
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Stable identity fingerprint: same signer, same string.
    pub fn identity(&self) -> String {
        let normalized = self
            .private_key
            .trim()
            .trim_start_matches("0x")
            .to_ascii_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        let mut hex = String::with_capacity(40);
        for byte in digest.iter().take(20) {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }
}

impl std::fmt::Debug for SignerMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerMaterial")
            .field("identity", &self.identity())
            .finish()
    }
}

/// A message as delivered by the transport, before protocol-level decoding.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub id: String,
    pub sender_inbox_id: String,
    pub recipient_inbox_id: String,
    pub sent_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub content_type: ContentTypeId,
    pub content: Vec<u8>,
    pub fallback: Option<String>,
}

/// Delivery state the transport reports for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Unpublished,
    Published,
    Failed,
}

/// Sort direction for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Options forwarded to `conversation.messages`.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub limit: Option<usize>,
    pub direction: Option<SortDirection>,
    pub sent_after: Option<DateTime<Utc>>,
    pub sent_before: Option<DateTime<Utc>>,
    /// Restrict history to these content-type tags.
    pub content_types: Option<Vec<ContentTypeId>>,
    pub delivery_status: Option<DeliveryStatus>,
}

pub type MessageStream = Pin<Box<dyn Stream<Item = TransportMessage> + Send>>;

/// One direct-message conversation with a counterparty.
#[async_trait]
pub trait Conversation: Send + Sync {
    fn peer_inbox_id(&self) -> String;

    /// Send encoded content; returns the transport-assigned message id.
    async fn send(&self, content: EncodedContent) -> Result<String>;

    /// Message history in chronological order unless the query says otherwise.
    async fn messages(&self, query: &MessageQuery) -> Result<Vec<TransportMessage>>;

    /// Live stream of messages arriving in this conversation.
    async fn stream(&self) -> Result<MessageStream>;
}

/// An authenticated transport session for one signer in one environment pair.
#[async_trait]
pub trait TransportClient: Send + Sync {
    fn inbox_id(&self) -> String;

    async fn can_message(&self, identifiers: &[String]) -> Result<HashMap<String, bool>>;

    async fn list_dms(&self) -> Result<Vec<Arc<dyn Conversation>>>;

    async fn inbox_id_by_identifier(&self, identifier: &str) -> Result<Option<String>>;

    async fn dm_by_inbox_id(&self, inbox_id: &str) -> Result<Option<Arc<dyn Conversation>>>;

    async fn new_dm_with_identifier(&self, identifier: &str) -> Result<Arc<dyn Conversation>>;

    async fn revoke_all_other_installations(&self) -> Result<()>;
}

/// Creates transport clients and performs signer-only operations.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_client(
        &self,
        signer: &SignerMaterial,
        protocol_env: &str,
        transport_env: TransportEnv,
    ) -> Result<Arc<dyn TransportClient>>;

    /// Revoke installations by inbox id without an active client session.
    async fn revoke_installations(
        &self,
        signer: &SignerMaterial,
        transport_env: TransportEnv,
        inbox_ids: &[String],
    ) -> Result<()>;
}
