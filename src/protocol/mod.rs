//! Dispute chat protocol: envelope schema, validation, and the wire codec.

pub mod codec;
pub mod envelope;
pub mod schema;
pub mod thread_id;

pub use codec::{ContentCodec, ContentTypeId, EncodedContent};
pub use envelope::{MessageContent, MessageEnvelope};
pub use schema::{SchemaError, SchemaRegistry, SchemaViolation};
pub use thread_id::ThreadIdentifier;

/// Content-type authority prefix shared by every deployment of this product.
pub const PRODUCT_AUTHORITY: &str = "commerce-dispute";

/// The only envelope schema version this build understands.
pub const PROTOCOL_VERSION: &str = "0.0.1";
