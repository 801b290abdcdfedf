//! Tool dispatch facade.
//!
//! Each tool call resolves its parameters, obtains a client through the
//! session multiplexer when one is required, invokes exactly one domain
//! operation, and converts every domain error into a `{success, data?,
//! error?, message?}` outcome. Nothing crosses the tool boundary unconverted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{Environments, TransportEnv};
use crate::error::{Error, Result};
use crate::protocol::envelope::MessageEnvelope;
use crate::protocol::thread_id::ThreadIdentifier;
use crate::session::SessionMultiplexer;
use crate::threads::{self, ThreadCorrelator};
use crate::transport::{MessageQuery, SignerMaterial, SortDirection, TransportClient, TransportFactory};

pub const TOOL_NAMES: &[&str] = &[
    "get_xmtp_environments",
    "initialize_xmtp_client",
    "revoke_all_other_installations",
    "revoke_installations",
    "get_xmtp_threads",
    "get_xmtp_thread",
    "send_xmtp_message",
];

/// Result payload serialized into the tool response text.
#[derive(Debug, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Wire shape of every tool response.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
}

impl ToolResponse {
    /// Response for a request that never reached dispatch.
    pub fn invalid_request(message: &str) -> Self {
        Self::from_outcome(&ToolOutcome {
            success: false,
            data: None,
            error: Some("ConfigurationError".to_string()),
            message: Some(format!("invalid request: {message}")),
        })
    }

    fn from_outcome(outcome: &ToolOutcome) -> Self {
        let text = serde_json::to_string(outcome)
            .unwrap_or_else(|_| r#"{"success":false,"error":"InternalError"}"#.to_string());
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientParams {
    private_key: String,
    config_id: String,
    transport_env: TransportEnv,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsRequest {
    #[serde(flatten)]
    client: ClientParams,
    counterparties: Vec<String>,
    #[serde(default)]
    options: Option<QueryOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadRequest {
    #[serde(flatten)]
    client: ClientParams,
    thread_id: ThreadIdentifier,
    counterparty: String,
    #[serde(default)]
    options: Option<QueryOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    #[serde(flatten)]
    client: ClientParams,
    message_object: Value,
    recipient: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeInstallationsRequest {
    private_key: String,
    transport_env: TransportEnv,
    inbox_ids: Vec<String>,
}

/// History query options as supplied by tool callers. Timestamps are unix ms.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryOptions {
    limit: Option<usize>,
    direction: Option<String>,
    sent_after: Option<i64>,
    sent_before: Option<i64>,
}

impl QueryOptions {
    fn into_query(self) -> Result<MessageQuery> {
        let direction = match self.direction.as_deref() {
            None => None,
            Some("ascending") => Some(SortDirection::Ascending),
            Some("descending") => Some(SortDirection::Descending),
            Some(other) => {
                return Err(Error::Config(format!(
                    "direction must be 'ascending' or 'descending', got '{other}'"
                )))
            }
        };
        let parse_ts = |ms: i64, field: &str| {
            chrono::DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| Error::Config(format!("{field} is out of range")))
        };
        Ok(MessageQuery {
            limit: self.limit,
            direction,
            sent_after: self.sent_after.map(|ms| parse_ts(ms, "sentAfter")).transpose()?,
            sent_before: self.sent_before.map(|ms| parse_ts(ms, "sentBefore")).transpose()?,
            ..MessageQuery::default()
        })
    }
}

/// Boundary between external tool callers and the domain operations.
pub struct ToolRouter {
    environments: Environments,
    sessions: SessionMultiplexer,
}

impl ToolRouter {
    pub fn new(environments: Environments, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            environments,
            sessions: SessionMultiplexer::new(factory),
        }
    }

    /// Handle one tool call. Never returns an error: every failure becomes a
    /// `success:false` outcome.
    pub async fn handle_tool_call(&self, name: &str, arguments: Value) -> ToolResponse {
        let outcome = match self.dispatch(name, arguments).await {
            Ok((data, message)) => ToolOutcome {
                success: true,
                data,
                error: None,
                message,
            },
            Err(e) if e.is_not_found() => ToolOutcome {
                success: false,
                data: None,
                error: None,
                message: Some(e.to_string()),
            },
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                ToolOutcome {
                    success: false,
                    data: None,
                    error: Some(error_kind(&e).to_string()),
                    message: Some(e.to_string()),
                }
            }
        };
        ToolResponse::from_outcome(&outcome)
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<(Option<Value>, Option<String>)> {
        match name {
            "get_xmtp_environments" => self.environments_tool(),
            "initialize_xmtp_client" => self.initialize(decode(arguments)?).await,
            "revoke_all_other_installations" => {
                self.revoke_all_other(decode(arguments)?).await
            }
            "revoke_installations" => self.revoke_installations(decode(arguments)?).await,
            "get_xmtp_threads" => self.threads(decode(arguments)?).await,
            "get_xmtp_thread" => self.thread(decode(arguments)?).await,
            "send_xmtp_message" => self.send(decode(arguments)?).await,
            other => Err(Error::Config(format!("unknown tool '{other}'"))),
        }
    }

    fn environments_tool(&self) -> Result<(Option<Value>, Option<String>)> {
        let configs: Vec<Value> = self
            .environments
            .configs
            .iter()
            .map(|c| {
                json!({
                    "configId": c.config_id,
                    "deployment": c.deployment,
                    "contractAddress": c.contract_address,
                    "protocolEnv": c.protocol_env(),
                })
            })
            .collect();
        let transport_envs: Vec<&str> = TransportEnv::all().iter().map(|e| e.as_str()).collect();
        Ok((
            Some(json!({ "configs": configs, "transportEnvs": transport_envs })),
            None,
        ))
    }

    async fn initialize(&self, params: ClientParams) -> Result<(Option<Value>, Option<String>)> {
        let (client, protocol_env) = self.client_for(&params).await?;
        Ok((
            Some(json!({ "inboxId": client.inbox_id(), "protocolEnv": protocol_env })),
            Some("Client initialized".to_string()),
        ))
    }

    async fn revoke_all_other(
        &self,
        params: ClientParams,
    ) -> Result<(Option<Value>, Option<String>)> {
        let (client, _) = self.client_for(&params).await?;
        client.revoke_all_other_installations().await?;
        Ok((None, Some("All other installations revoked".to_string())))
    }

    async fn revoke_installations(
        &self,
        request: RevokeInstallationsRequest,
    ) -> Result<(Option<Value>, Option<String>)> {
        if request.inbox_ids.is_empty() {
            return Err(Error::Config("inboxIds must be non-empty".to_string()));
        }
        let signer = signer_from(&request.private_key)?;
        self.sessions
            .factory()
            .revoke_installations(&signer, request.transport_env, &request.inbox_ids)
            .await?;
        Ok((
            Some(json!({ "revoked": request.inbox_ids })),
            Some("Installations revoked".to_string()),
        ))
    }

    async fn threads(&self, request: ThreadsRequest) -> Result<(Option<Value>, Option<String>)> {
        let (client, protocol_env) = self.client_for(&request.client).await?;
        let query = request.options.unwrap_or_default().into_query()?;
        let correlator = ThreadCorrelator::new(&protocol_env);
        let found =
            threads::list_threads(client.as_ref(), &correlator, &request.counterparties, &query)
                .await?;
        Ok((Some(json!({ "threads": found })), None))
    }

    async fn thread(&self, request: ThreadRequest) -> Result<(Option<Value>, Option<String>)> {
        let (client, protocol_env) = self.client_for(&request.client).await?;
        let query = request.options.unwrap_or_default().into_query()?;
        let correlator = ThreadCorrelator::new(&protocol_env);
        let found = threads::get_thread(
            client.as_ref(),
            &correlator,
            &request.thread_id,
            &request.counterparty,
            &query,
        )
        .await?;
        Ok((Some(json!({ "thread": found })), None))
    }

    async fn send(&self, request: SendRequest) -> Result<(Option<Value>, Option<String>)> {
        let (client, protocol_env) = self.client_for(&request.client).await?;
        let correlator = ThreadCorrelator::new(&protocol_env);

        // Validate the raw payload first so callers get field-qualified
        // violations rather than a deserializer complaint.
        correlator.codec().registry().validate(&request.message_object)?;
        let envelope: MessageEnvelope = serde_json::from_value(request.message_object)
            .map_err(|e| Error::Decode(format!("message object shape mismatch: {e}")))?;

        let message_id =
            threads::send_message(client.as_ref(), &correlator, &envelope, &request.recipient)
                .await?;
        Ok((
            Some(json!({ "messageId": message_id })),
            Some("Message sent".to_string()),
        ))
    }

    async fn client_for(
        &self,
        params: &ClientParams,
    ) -> Result<(Arc<dyn TransportClient>, String)> {
        let config = self.environments.resolve(&params.config_id)?;
        let protocol_env = config.protocol_env();
        let signer = signer_from(&params.private_key)?;
        let client = self
            .sessions
            .get_or_create(&signer, &protocol_env, params.transport_env)
            .await?;
        Ok((client, protocol_env))
    }
}

fn signer_from(private_key: &str) -> Result<SignerMaterial> {
    if private_key.trim().is_empty() {
        return Err(Error::Config("privateKey must be non-empty".to_string()));
    }
    Ok(SignerMaterial::new(private_key))
}

fn decode<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| Error::Config(format!("invalid parameters: {e}")))
}

fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::Schema(_) => "SchemaValidationError",
        Error::Decode(_) => "DecodeError",
        Error::NotFound(_) => "NotFoundError",
        Error::Transport(_) => "TransportError",
        Error::Config(_) => "ConfigurationError",
        Error::Io(_) | Error::Json(_) => "InternalError",
    }
}
