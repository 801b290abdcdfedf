//! Commerce dispute chat protocol over an XMTP-style encrypted transport.
//!
//! The transport itself (key exchange, encryption, delivery) is external and
//! consumed through the capability traits in [`transport`]; this crate owns
//! the envelope schema and codec, thread correlation, the session
//! multiplexer, and the tool dispatch facade.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod threads;
pub mod tools;
pub mod transport;

pub use config::{Environments, ProtocolConfig, TransportEnv};
pub use error::{Error, Result};
pub use protocol::{ContentCodec, MessageContent, MessageEnvelope, SchemaRegistry, ThreadIdentifier};
pub use session::{SessionKey, SessionMultiplexer};
pub use threads::{CancelToken, DecoratedMessage, Thread, ThreadCorrelator, ThreadMonitor};
pub use tools::{ToolResponse, ToolRouter};
pub use transport::SignerMaterial;
