//! Buckets decoded transport messages into per-exchange threads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::codec::ContentCodec;
use crate::protocol::envelope::MessageEnvelope;
use crate::protocol::thread_id::ThreadIdentifier;
use crate::transport::TransportMessage;

/// A transport message that passed authority, decode, and schema checks.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedMessage {
    pub authority_id: String,
    pub sender: String,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub data: MessageEnvelope,
}

/// Computed view over one counterparty's history. Never persisted; rebuilt
/// from transport history on every call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub thread_id: ThreadIdentifier,
    pub counterparty: String,
    pub messages: Vec<DecoratedMessage>,
}

/// Correlates raw transport messages into threads for one protocol
/// environment.
pub struct ThreadCorrelator {
    codec: ContentCodec,
}

impl ThreadCorrelator {
    pub fn new(protocol_env: impl Into<String>) -> Self {
        Self {
            codec: ContentCodec::new(protocol_env),
        }
    }

    pub fn codec(&self) -> &ContentCodec {
        &self.codec
    }

    /// Decode and authority-check one transport message.
    ///
    /// Returns `None` for foreign-authority traffic and for messages that fail
    /// decode or schema validation. One corrupt message must not break the
    /// rest of history, so drops are silent apart from a debug log.
    pub fn decorate(&self, message: &TransportMessage) -> Option<DecoratedMessage> {
        if !self.codec.is_ours(&message.content_type) {
            return None;
        }
        match self.codec.decode(&message.content) {
            Ok(envelope) => Some(DecoratedMessage {
                authority_id: message.content_type.authority_id.clone(),
                sender: message.sender_inbox_id.clone(),
                recipient: message.recipient_inbox_id.clone(),
                timestamp: message.sent_at,
                data: envelope,
            }),
            Err(e) => {
                tracing::debug!(message_id = %message.id, error = %e, "dropping undecodable message");
                None
            }
        }
    }

    /// Build all threads from one counterparty's history.
    ///
    /// Buckets are created lazily in first-sight order; within a bucket the
    /// transport's chronological order is preserved verbatim. Empty history
    /// yields an empty list.
    pub fn build_threads(&self, counterparty: &str, messages: &[TransportMessage]) -> Vec<Thread> {
        let mut threads: Vec<Thread> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for raw in messages {
            let Some(decorated) = self.decorate(raw) else {
                continue;
            };
            let key = decorated.data.thread_id.bucket_key();
            let slot = *index.entry(key).or_insert_with(|| {
                threads.push(Thread {
                    thread_id: decorated.data.thread_id.clone(),
                    counterparty: counterparty.to_string(),
                    messages: Vec::new(),
                });
                threads.len() - 1
            });
            threads[slot].messages.push(decorated);
        }
        threads
    }

    /// Find the thread matching `thread_id` field-wise. `None` is a normal,
    /// non-exceptional result.
    pub fn get_thread(
        &self,
        thread_id: &ThreadIdentifier,
        counterparty: &str,
        messages: &[TransportMessage],
    ) -> Option<Thread> {
        self.build_threads(counterparty, messages)
            .into_iter()
            .find(|t| t.thread_id.matches(thread_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::ContentTypeId;
    use crate::transport::DeliveryStatus;

    fn raw(envelope: &MessageEnvelope, codec: &ContentCodec, seq: i64) -> TransportMessage {
        let encoded = codec.encode(envelope).unwrap();
        TransportMessage {
            id: format!("msg-{seq}"),
            sender_inbox_id: "inbox-peer".into(),
            recipient_inbox_id: "inbox-self".into(),
            sent_at: DateTime::from_timestamp_millis(1_700_000_000_000 + seq).unwrap(),
            delivery_status: DeliveryStatus::Published,
            content_type: encoded.content_type,
            content: encoded.content,
            fallback: encoded.fallback,
        }
    }

    #[test]
    fn test_ten_messages_two_threads_preserve_arrival_order() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let correlator = ThreadCorrelator::new("mainnet-0xabc");
        let thread_a = ThreadIdentifier::new("27", "8", "4");
        let thread_b = ThreadIdentifier::new("28", "8", "4");

        let mut history = Vec::new();
        for i in 0..10 {
            let id = if i % 2 == 0 { &thread_a } else { &thread_b };
            history.push(raw(
                &MessageEnvelope::string(id.clone(), format!("m{i}")),
                &codec,
                i,
            ));
        }

        let threads = correlator.build_threads("0xpeer", &history);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, thread_a);
        assert_eq!(threads[1].thread_id, thread_b);
        for thread in &threads {
            assert_eq!(thread.messages.len(), 5);
            for pair in thread.messages.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
    }

    #[test]
    fn test_get_thread_returns_exact_match_only() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let correlator = ThreadCorrelator::new("mainnet-0xabc");
        let wanted = ThreadIdentifier::new("27", "8", "4");
        let other = ThreadIdentifier::new("28", "8", "4");

        let history = vec![
            raw(&MessageEnvelope::string(wanted.clone(), "hi"), &codec, 0),
            raw(&MessageEnvelope::string(other, "other"), &codec, 1),
        ];

        let thread = correlator.get_thread(&wanted, "0xpeer", &history).unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(
            thread.messages[0].data,
            MessageEnvelope::string(wanted.clone(), "hi")
        );

        let missing = ThreadIdentifier::new("99", "8", "4");
        assert!(correlator.get_thread(&missing, "0xpeer", &history).is_none());
    }

    #[test]
    fn test_foreign_authority_excluded_without_error() {
        let ours = ContentCodec::new("mainnet-0xabc");
        let theirs = ContentCodec::new("testnet-0xdef");
        let correlator = ThreadCorrelator::new("mainnet-0xabc");
        let id = ThreadIdentifier::new("27", "8", "4");

        let history = vec![
            raw(&MessageEnvelope::string(id.clone(), "ours"), &ours, 0),
            raw(&MessageEnvelope::string(id.clone(), "theirs"), &theirs, 1),
        ];

        let threads = correlator.build_threads("0xpeer", &history);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].messages.len(), 1);
    }

    #[test]
    fn test_corrupt_message_dropped_silently() {
        let codec = ContentCodec::new("mainnet-0xabc");
        let correlator = ThreadCorrelator::new("mainnet-0xabc");
        let id = ThreadIdentifier::new("27", "8", "4");

        let good = raw(&MessageEnvelope::string(id.clone(), "ok"), &codec, 0);
        let corrupt = TransportMessage {
            id: "msg-bad".into(),
            sender_inbox_id: "inbox-peer".into(),
            recipient_inbox_id: "inbox-self".into(),
            sent_at: Utc::now(),
            delivery_status: DeliveryStatus::Published,
            content_type: ContentTypeId::dispute_message("mainnet-0xabc"),
            content: b"not json at all".to_vec(),
            fallback: None,
        };

        let threads = correlator.build_threads("0xpeer", &[corrupt, good]);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].messages.len(), 1);
    }

    #[test]
    fn test_empty_history_yields_empty_list() {
        let correlator = ThreadCorrelator::new("mainnet-0xabc");
        assert!(correlator.build_threads("0xpeer", &[]).is_empty());
    }
}
