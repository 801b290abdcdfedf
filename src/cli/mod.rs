//! Command-line interface.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Environments;
use crate::error::{Error, Result};
use crate::tools::{ToolRouter, TOOL_NAMES};
use crate::transport::memory::MemoryNetwork;
use crate::transport::TransportFactory;

#[derive(Parser)]
#[command(name = "xmtp-dispute-mcp", version, about = "Commerce dispute chat over an XMTP-style transport")]
pub struct Commands {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tool server: line-delimited JSON tool calls on stdin,
    /// responses on stdout.
    Serve {
        /// Transport adapter to use. Only "memory" ships in this build;
        /// network adapters are provided by deployment-specific builds.
        #[arg(long, default_value = "memory")]
        transport: String,
    },
    /// Print the configured protocol environments.
    Environments,
}

/// One line of stdin: `{"name": "...", "arguments": {...}}`.
#[derive(Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { transport } => serve(&transport).await,
            Command::Environments => environments(),
        }
    }
}

fn factory_for(transport: &str) -> Result<Arc<dyn TransportFactory>> {
    match transport {
        "memory" => Ok(Arc::new(MemoryNetwork::new())),
        other => Err(Error::Config(format!(
            "transport adapter '{other}' is not available in this build"
        ))),
    }
}

async fn serve(transport: &str) -> Result<()> {
    let environments = Environments::load_or_default()?;
    let router = ToolRouter::new(environments, factory_for(transport)?);
    tracing::info!(transport, tools = TOOL_NAMES.len(), "tool server listening on stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => router.handle_tool_call(&call.name, call.arguments).await,
            // Malformed request line; answer through the same envelope.
            Err(e) => crate::tools::ToolResponse::invalid_request(&e.to_string()),
        };
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }
    tracing::info!("stdin closed, shutting down");
    Ok(())
}

fn environments() -> Result<()> {
    let environments = Environments::load_or_default()?;
    for config in &environments.configs {
        println!(
            "{}  deployment={}  contract={}  protocolEnv={}",
            config.config_id,
            config.deployment,
            config.contract_address,
            config.protocol_env()
        );
    }
    Ok(())
}
