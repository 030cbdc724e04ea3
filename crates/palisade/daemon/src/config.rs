//! Configuration for the palisade daemon.

use crate::error::{DaemonError, DaemonResult};
use palisade_engine::{EngineConfig, EvaluatorConfig};
use palisade_types::ActionCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub rules: RulesConfig,
}

impl DaemonConfig {
    /// Load from a JSON file, or fall back to defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> DaemonResult<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    DaemonError::Config(format!("{}: {}", path.display(), e))
                })
            }
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().expect("static addr"),
            enable_cors: true,
        }
    }
}

/// Evaluation deadlines and default-deny exemptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Per-rule predicate budget in milliseconds.
    #[serde(default = "default_rule_deadline_ms")]
    pub rule_deadline_ms: u64,

    /// Budget for a whole evaluation in milliseconds. Absent means
    /// unbounded.
    #[serde(default = "default_overall_deadline_ms")]
    pub overall_deadline_ms: Option<u64>,

    /// Action categories permitted even when no rule matches them.
    #[serde(default)]
    pub no_rule_required: BTreeSet<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rule_deadline_ms: default_rule_deadline_ms(),
            overall_deadline_ms: default_overall_deadline_ms(),
            no_rule_required: BTreeSet::new(),
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            no_rule_required: self
                .no_rule_required
                .iter()
                .map(|c| ActionCategory::new(c.clone()))
                .collect(),
            evaluator: EvaluatorConfig {
                rule_deadline: Duration::from_millis(self.rule_deadline_ms),
                overall_deadline: self.overall_deadline_ms.map(Duration::from_millis),
            },
        }
    }
}

/// Where ledger records are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// Crc-framed append-only file. The signing key lives next to it unless
    /// `key_path` points elsewhere.
    File {
        path: PathBuf,

        #[serde(default)]
        key_path: Option<PathBuf>,
    },
}

/// Initial rule document loaded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_rule_deadline_ms() -> u64 {
    250
}

fn default_overall_deadline_ms() -> Option<u64> {
    Some(2_000)
}
