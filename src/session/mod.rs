//! Session multiplexer: at most one transport client per
//! (signer, protocol environment, transport environment).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::TransportEnv;
use crate::error::Result;
use crate::transport::{SignerMaterial, TransportClient, TransportFactory};

/// Cache key for one transport session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub identity: String,
    pub protocol_env: String,
    pub transport_env: TransportEnv,
}

impl SessionKey {
    pub fn new(signer: &SignerMaterial, protocol_env: &str, transport_env: TransportEnv) -> Self {
        Self {
            identity: signer.identity(),
            protocol_env: protocol_env.to_string(),
            transport_env,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.identity, self.protocol_env, self.transport_env
        )
    }
}

type SessionSlot = Arc<Mutex<Option<Arc<dyn TransportClient>>>>;

/// Owns the client cache for the process lifetime. No eviction, no TTL:
/// session setup is idempotent and expensive enough to amortize.
///
/// Concurrent first-creation for one key is serialized through a per-key
/// async lock, so exactly one transport session is created; a failed creation
/// leaves the slot empty and the next call retries cleanly.
pub struct SessionMultiplexer {
    factory: Arc<dyn TransportFactory>,
    sessions: Mutex<HashMap<SessionKey, SessionSlot>>,
}

impl SessionMultiplexer {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        self.factory.clone()
    }

    pub async fn get_or_create(
        &self,
        signer: &SignerMaterial,
        protocol_env: &str,
        transport_env: TransportEnv,
    ) -> Result<Arc<dyn TransportClient>> {
        let key = SessionKey::new(signer, protocol_env, transport_env);

        // The outer lock only guards the map; creation happens under the
        // per-key lock so unrelated keys never wait on each other.
        let slot = {
            let mut sessions = self.sessions.lock().await;
            sessions.entry(key.clone()).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        tracing::info!(session = %key, "creating transport session");
        let client = self
            .factory
            .create_client(signer, protocol_env, transport_env)
            .await?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Number of cached sessions. Diagnostic only.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        let mut count = 0;
        for slot in sessions.values() {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}
