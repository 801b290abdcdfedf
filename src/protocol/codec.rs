//! Wire codec binding envelopes to one protocol deployment.
//!
//! The content-type authority is `"<product>-<deployment>-<contract>"`, so a
//! message sent under a different deployment or contract address is never
//! mistaken for this protocol's traffic even on the same transport account.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::envelope::{MessageContent, MessageEnvelope};
use super::schema::SchemaRegistry;
use super::PRODUCT_AUTHORITY;
use crate::error::{Error, Result};

/// Transport-level content type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeId {
    pub authority_id: String,
    pub type_id: String,
    pub version_major: u32,
    pub version_minor: u32,
}

impl ContentTypeId {
    pub fn dispute_message(protocol_env: &str) -> Self {
        Self {
            authority_id: authority_for(protocol_env),
            type_id: "dispute-message".to_string(),
            version_major: 1,
            version_minor: 0,
        }
    }
}

impl std::fmt::Display for ContentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}:{}.{}",
            self.authority_id, self.type_id, self.version_major, self.version_minor
        )
    }
}

/// Compute the authority string for a protocol environment.
pub fn authority_for(protocol_env: &str) -> String {
    format!("{PRODUCT_AUTHORITY}-{protocol_env}")
}

/// Encoded payload handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedContent {
    pub content_type: ContentTypeId,
    pub parameters: HashMap<String, String>,
    /// Plain-text summary for renderers without structured-content support.
    pub fallback: Option<String>,
    pub content: Vec<u8>,
}

/// Encodes and decodes envelopes for one protocol environment.
pub struct ContentCodec {
    protocol_env: String,
    authority: String,
    registry: SchemaRegistry,
}

impl ContentCodec {
    pub fn new(protocol_env: impl Into<String>) -> Self {
        let protocol_env = protocol_env.into();
        let authority = authority_for(&protocol_env);
        Self {
            protocol_env,
            authority,
            registry: SchemaRegistry::new(),
        }
    }

    pub fn protocol_env(&self) -> &str {
        &self.protocol_env
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Strictly validate and encode an envelope as UTF-8 JSON.
    pub fn encode(&self, envelope: &MessageEnvelope) -> Result<EncodedContent> {
        self.registry.validate_envelope(envelope)?;
        let content = serde_json::to_vec(envelope)?;
        Ok(EncodedContent {
            content_type: ContentTypeId::dispute_message(&self.protocol_env),
            parameters: HashMap::new(),
            fallback: Some(fallback_text(envelope)),
            content,
        })
    }

    /// Decode transport bytes back into a validated envelope.
    ///
    /// Non-JSON fails immediately; JSON that parses is re-validated against
    /// the registry for its declared version. A matching content-type tag is
    /// necessary but not sufficient for acceptance.
    pub fn decode(&self, bytes: &[u8]) -> Result<MessageEnvelope> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::Decode(format!("payload is not JSON: {e}")))?;
        self.registry.validate(&raw)?;
        let envelope: MessageEnvelope = serde_json::from_value(raw)
            .map_err(|e| Error::Decode(format!("payload shape mismatch: {e}")))?;
        Ok(envelope)
    }

    /// Whether a transport message's tag belongs to this deployment.
    pub fn is_ours(&self, content_type: &ContentTypeId) -> bool {
        content_type.authority_id == self.authority
    }
}

/// Plain-text summary shown by renderers that cannot display structured
/// content.
fn fallback_text(envelope: &MessageEnvelope) -> String {
    match &envelope.content {
        MessageContent::String(s) => format!("New message: {}", s.value),
        MessageContent::File(f) => format!(
            "File attachment: {} ({})",
            f.value.file_name, f.value.file_type
        ),
        MessageContent::Proposal(p) => format!("Settlement proposal: {}", p.value.title),
        MessageContent::CounterProposal(p) => format!("Counter proposal: {}", p.value.title),
        MessageContent::AcceptProposal(a) => format!("Proposal accepted: {}", a.value.title),
        MessageContent::EscalateDispute(e) => format!("Dispute escalated: {}", e.value.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::envelope::{
        AcceptProposalDetails, EscalateDisputeDetails, FileDetails, ProposalDetails, ProposalItem,
        ResolverInfo,
    };
    use crate::protocol::thread_id::ThreadIdentifier;

    fn thread() -> ThreadIdentifier {
        ThreadIdentifier::new("27", "8", "4")
    }

    fn item() -> ProposalItem {
        ProposalItem {
            kind: "refund".into(),
            percentage_amount: "50".into(),
            signature: "0xsig".into(),
        }
    }

    fn proposal_details() -> ProposalDetails {
        ProposalDetails {
            title: "Settlement".into(),
            description: "Partial refund".into(),
            dispute_context: vec!["item damaged".into()],
            proposals: vec![item()],
        }
    }

    fn all_kinds() -> Vec<MessageEnvelope> {
        vec![
            MessageEnvelope::string(thread(), "hi"),
            MessageEnvelope::file(
                thread(),
                FileDetails {
                    file_name: "receipt.png".into(),
                    file_type: "image/png".into(),
                    file_size: 2048,
                    encoded_content: "data:image/png;base64,iVBORw0KGgo=".into(),
                },
            ),
            MessageEnvelope::proposal(thread(), proposal_details()),
            MessageEnvelope::counter_proposal(thread(), proposal_details()),
            MessageEnvelope::accept_proposal(
                thread(),
                AcceptProposalDetails {
                    title: "Accepted".into(),
                    proposal: item(),
                    icon: "check".into(),
                    heading: "Proposal accepted".into(),
                    body: "The buyer accepted a 50% refund.".into(),
                },
            ),
            MessageEnvelope::escalate_dispute(
                thread(),
                EscalateDisputeDetails {
                    title: "Escalated".into(),
                    description: "No agreement reached.".into(),
                    dispute_resolver_info: vec![ResolverInfo {
                        label: "Resolver".into(),
                        value: "resolver.example".into(),
                    }],
                    icon: "gavel".into(),
                    heading: "Dispute escalated".into(),
                    body: "An external resolver will decide.".into(),
                },
            ),
        ]
    }

    #[test]
    fn test_round_trip_all_six_kinds() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        for envelope in all_kinds() {
            let encoded = codec.encode(&envelope).unwrap();
            let decoded = codec.decode(&encoded.content).unwrap();
            assert_eq!(decoded, envelope, "round trip for {}", envelope.content.kind());
        }
    }

    #[test]
    fn test_authority_binds_deployment_and_contract() {
        let a = ContentCodec::new("mainnet-0xabc123");
        let b = ContentCodec::new("testnet-0xabc123");
        let c = ContentCodec::new("mainnet-0xdef456");
        assert_ne!(a.authority(), b.authority());
        assert_ne!(a.authority(), c.authority());
        assert_eq!(a.authority(), "commerce-dispute-mainnet-0xabc123");
    }

    #[test]
    fn test_foreign_authority_is_not_ours() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        let ours = ContentTypeId::dispute_message("mainnet-0xabc123");
        let foreign = ContentTypeId::dispute_message("testnet-0xabc123");
        assert!(codec.is_ours(&ours));
        assert!(!codec.is_ours(&foreign));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        let err = codec.decode(b"\xff\xfenot json").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_revalidates_schema() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        // Parses as JSON but fails the registry: empty string value.
        let bytes = serde_json::to_vec(&serde_json::json!({
            "threadId": {"exchangeId": "27", "buyerId": "8", "sellerId": "4"},
            "contentType": "STRING",
            "version": "0.0.1",
            "content": {"value": ""},
        }))
        .unwrap();
        let err = codec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_encode_fails_fast_on_invalid_envelope() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        let mut details = proposal_details();
        details.proposals[0].percentage_amount = "50.5".into();
        let err = codec
            .encode(&MessageEnvelope::proposal(thread(), details))
            .unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_fallback_text_per_kind() {
        let codec = ContentCodec::new("mainnet-0xabc123");
        let encoded = codec.encode(&MessageEnvelope::string(thread(), "hi")).unwrap();
        assert_eq!(encoded.fallback.as_deref(), Some("New message: hi"));
        assert!(encoded.parameters.is_empty());
    }
}
