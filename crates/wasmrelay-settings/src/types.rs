//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};
use wasmrelay_logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings for a relay process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// The Tendermint node to talk to.
    pub node: NodeSettings,
    /// Chain id used for config digests.
    pub chain_id: String,
    /// Logging output.
    pub logging: LoggingSettings,
    /// How long callers wait for a single RPC response, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            chain_id: "localwasm".to_string(),
            logging: LoggingSettings::default(),
            request_timeout_ms: 30_000,
        }
    }
}

/// A single Tendermint RPC endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSettings {
    /// Operator-facing node name.
    pub name: Option<String>,
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:26657/websocket`.
    pub tendermint_url: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: Some("primary".to_string()),
            tendermint_url: Some("ws://127.0.0.1:26657/websocket".to_string()),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl NodeSettings {
    /// Collect every problem with this node entry.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self.name.as_deref() {
            None => problems.push("node.name: required for all nodes".to_string()),
            Some("") => problems.push("node.name: must not be empty".to_string()),
            Some(_) => {}
        }
        match self.tendermint_url.as_deref() {
            None => problems.push("node.tendermintUrl: required for all nodes".to_string()),
            Some(raw) => match url::Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => {}
                Ok(parsed) => problems.push(format!(
                    "node.tendermintUrl: unsupported scheme '{}', expected ws or wss",
                    parsed.scheme()
                )),
                Err(e) => problems.push(format!("node.tendermintUrl: {e}")),
            },
        }
        problems
    }
}

impl RelaySettings {
    /// Validate the whole tree, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = self.node.problems();
        if self.chain_id.len() > 255 {
            problems.push(format!(
                "chainId: {} bytes, at most 255 allowed",
                self.chain_id.len()
            ));
        }
        if self.request_timeout_ms == 0 {
            problems.push("requestTimeoutMs: must be positive".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems))
        }
    }

    /// The configured WebSocket endpoint.
    pub fn tendermint_url(&self) -> Result<&str> {
        self.node
            .tendermint_url
            .as_deref()
            .ok_or_else(|| SettingsError::Invalid(vec!["node.tendermintUrl: required".into()]))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
