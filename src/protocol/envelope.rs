//! Typed message envelopes exchanged between dispute parties.
//!
//! The wire format is camelCase JSON with `contentType` selecting one of a
//! closed set of content variants:
//!
//! ```json
//! {
//!   "threadId": {"exchangeId": "27", "buyerId": "8", "sellerId": "4"},
//!   "contentType": "STRING",
//!   "version": "0.0.1",
//!   "content": {"value": "hi"}
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::thread_id::ThreadIdentifier;
use super::PROTOCOL_VERSION;

/// Versioned, schema-validated message payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub thread_id: ThreadIdentifier,
    #[serde(flatten)]
    pub content: MessageContent,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Closed catalog of content kinds. Adding a kind means adding a variant here
/// and one validator entry in the schema registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "contentType", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContent {
    String(StringValue),
    File(FileValue),
    Proposal(ProposalValue),
    CounterProposal(ProposalValue),
    AcceptProposal(AcceptProposalValue),
    EscalateDispute(EscalateDisputeValue),
}

impl MessageContent {
    /// Wire tag for this kind, as it appears in `contentType`.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::String(_) => "STRING",
            MessageContent::File(_) => "FILE",
            MessageContent::Proposal(_) => "PROPOSAL",
            MessageContent::CounterProposal(_) => "COUNTER_PROPOSAL",
            MessageContent::AcceptProposal(_) => "ACCEPT_PROPOSAL",
            MessageContent::EscalateDispute(_) => "ESCALATE_DISPUTE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StringValue {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileValue {
    pub value: FileDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub file_name: String,
    /// MIME type, restricted by the schema registry to an allow-list.
    pub file_type: String,
    pub file_size: u64,
    /// Data URL carrying the file body.
    pub encoded_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalValue {
    pub value: ProposalDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDetails {
    pub title: String,
    pub description: String,
    pub dispute_context: Vec<String>,
    pub proposals: Vec<ProposalItem>,
}

/// One concrete settlement offer inside a proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalItem {
    #[serde(rename = "type")]
    pub kind: String,
    /// Whole-percent share as a string, e.g. "50". Validated against
    /// `^[1-9][0-9]*$` by the registry.
    pub percentage_amount: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptProposalValue {
    pub value: AcceptProposalDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptProposalDetails {
    pub title: String,
    pub proposal: ProposalItem,
    pub icon: String,
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalateDisputeValue {
    pub value: EscalateDisputeDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EscalateDisputeDetails {
    pub title: String,
    pub description: String,
    pub dispute_resolver_info: Vec<ResolverInfo>,
    pub icon: String,
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverInfo {
    pub label: String,
    pub value: String,
}

impl MessageEnvelope {
    /// New envelope at the current protocol version, unstamped.
    pub fn new(thread_id: ThreadIdentifier, content: MessageContent) -> Self {
        Self {
            thread_id,
            content,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: None,
            metadata: None,
        }
    }

    /// Plain text message.
    pub fn string(thread_id: ThreadIdentifier, value: impl Into<String>) -> Self {
        Self::new(
            thread_id,
            MessageContent::String(StringValue { value: value.into() }),
        )
    }

    /// File attachment message.
    pub fn file(thread_id: ThreadIdentifier, details: FileDetails) -> Self {
        Self::new(thread_id, MessageContent::File(FileValue { value: details }))
    }

    /// Initial settlement proposal.
    pub fn proposal(thread_id: ThreadIdentifier, details: ProposalDetails) -> Self {
        Self::new(
            thread_id,
            MessageContent::Proposal(ProposalValue { value: details }),
        )
    }

    /// Counter to a previous proposal. Same shape, different tag.
    pub fn counter_proposal(thread_id: ThreadIdentifier, details: ProposalDetails) -> Self {
        Self::new(
            thread_id,
            MessageContent::CounterProposal(ProposalValue { value: details }),
        )
    }

    /// Acceptance of one concrete proposal item.
    pub fn accept_proposal(thread_id: ThreadIdentifier, details: AcceptProposalDetails) -> Self {
        Self::new(
            thread_id,
            MessageContent::AcceptProposal(AcceptProposalValue { value: details }),
        )
    }

    /// Escalation to an external dispute resolver.
    pub fn escalate_dispute(thread_id: ThreadIdentifier, details: EscalateDisputeDetails) -> Self {
        Self::new(
            thread_id,
            MessageContent::EscalateDispute(EscalateDisputeValue { value: details }),
        )
    }

    /// Stamp the envelope with a creation time (unix ms).
    pub fn with_timestamp(mut self, unix_ms: i64) -> Self {
        self.timestamp = Some(unix_ms);
        self
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
