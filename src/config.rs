//! Protocol and transport environment configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transport-level environment the underlying messaging network runs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportEnv {
    Local,
    Dev,
    Production,
}

impl TransportEnv {
    pub fn all() -> [TransportEnv; 3] {
        [TransportEnv::Local, TransportEnv::Dev, TransportEnv::Production]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportEnv::Local => "local",
            TransportEnv::Dev => "dev",
            TransportEnv::Production => "production",
        }
    }
}

impl std::fmt::Display for TransportEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportEnv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(TransportEnv::Local),
            "dev" => Ok(TransportEnv::Dev),
            "production" => Ok(TransportEnv::Production),
            other => Err(Error::Config(format!("unknown transport env '{other}'"))),
        }
    }
}

/// One protocol deployment: a named contract instance on one network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfig {
    pub config_id: String,
    pub deployment: String,
    pub contract_address: String,
}

impl ProtocolConfig {
    /// Environment string that scopes the content-type authority:
    /// `"<deployment>-<contract_address>"`.
    pub fn protocol_env(&self) -> String {
        format!("{}-{}", self.deployment, self.contract_address)
    }
}

/// The set of protocol deployments this process can talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environments {
    #[serde(default)]
    pub configs: Vec<ProtocolConfig>,
}

impl Default for Environments {
    fn default() -> Self {
        Self {
            configs: vec![
                ProtocolConfig {
                    config_id: "dispute-mainnet".to_string(),
                    deployment: "mainnet".to_string(),
                    contract_address: "0x8464135c8f25da09e49bc8782676a84730c318bc".to_string(),
                },
                ProtocolConfig {
                    config_id: "dispute-testnet".to_string(),
                    deployment: "testnet".to_string(),
                    contract_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
                },
            ],
        }
    }
}

impl Environments {
    /// Load from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let environments: Environments = serde_json::from_str(&content)?;
        environments.validate()?;
        tracing::debug!("Loaded environments from {}", path.display());
        Ok(environments)
    }

    /// Load from the settings file if present, otherwise built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = get_environments_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No environments file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        for config in &self.configs {
            if config.config_id.is_empty()
                || config.deployment.is_empty()
                || config.contract_address.is_empty()
            {
                return Err(Error::Config(
                    "protocol config fields must be non-empty".to_string(),
                ));
            }
        }
        for (i, config) in self.configs.iter().enumerate() {
            if self.configs[..i].iter().any(|c| c.config_id == config.config_id) {
                return Err(Error::Config(format!(
                    "duplicate configId '{}'",
                    config.config_id
                )));
            }
        }
        Ok(())
    }

    /// Resolve a configId to its deployment.
    pub fn resolve(&self, config_id: &str) -> Result<&ProtocolConfig> {
        self.configs
            .iter()
            .find(|c| c.config_id == config_id)
            .ok_or_else(|| Error::Config(format!("unknown configId '{config_id}'")))
    }
}

/// Application home directory (~/.xmtp-dispute-mcp).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    Ok(home.home_dir().join(".xmtp-dispute-mcp"))
}

fn get_environments_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("environments.json"))
}
