//! Thread identifiers correlating messages to one exchange dispute.

use serde::{Deserialize, Serialize};

/// Identifies one dispute thread: the exchange plus both parties.
///
/// Equality of two identifiers for correlation purposes goes through
/// [`ThreadIdentifier::matches`], not `==`: an identifier with any empty
/// field is invalid and matches nothing, including an identical invalid
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadIdentifier {
    pub exchange_id: String,
    pub buyer_id: String,
    pub seller_id: String,
}

impl ThreadIdentifier {
    pub fn new(
        exchange_id: impl Into<String>,
        buyer_id: impl Into<String>,
        seller_id: impl Into<String>,
    ) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
        }
    }

    /// All three fields non-empty.
    pub fn is_valid(&self) -> bool {
        !self.exchange_id.is_empty() && !self.buyer_id.is_empty() && !self.seller_id.is_empty()
    }

    /// Exact, case-sensitive, field-wise match between two valid identifiers.
    pub fn matches(&self, other: &ThreadIdentifier) -> bool {
        self.is_valid() && other.is_valid() && self == other
    }

    /// Correlation bucket key. Never part of the wire format.
    pub fn bucket_key(&self) -> String {
        format!("{}-{}-{}", self.exchange_id, self.buyer_id, self.seller_id)
    }
}

impl std::fmt::Display for ThreadIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exchange={} buyer={} seller={}",
            self.exchange_id, self.buyer_id, self.seller_id
        )
    }
}
