//! Server setup and lifecycle management.

use crate::api::{create_router, AppState};
use crate::config::{DaemonConfig, LedgerConfig};
use crate::error::{DaemonError, DaemonResult};
use palisade_engine::DecisionEngine;
use palisade_ledger::{
    AuditLedger, Ed25519Signer, FileRecordStore, InMemoryRecordStore, RecordStore, Signer,
};
use palisade_rules::{RuleRegistry, RuleSetDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Palisade gate server.
pub struct Server {
    config: DaemonConfig,
}

impl Server {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    /// Wire the registry, engine, and ledger from configuration.
    ///
    /// Also used by the one-shot CLI paths, which need the same stack
    /// without the listener.
    pub fn build_state(&self) -> DaemonResult<AppState> {
        let registry = Arc::new(RuleRegistry::new());

        if let Some(path) = &self.config.rules.path {
            let raw = std::fs::read_to_string(path)?;
            let document: RuleSetDocument = serde_json::from_str(&raw)
                .map_err(|e| DaemonError::Config(format!("{}: {}", path.display(), e)))?;
            let snapshot = registry.load(document)?;
            tracing::info!(
                version = snapshot.version(),
                rules = snapshot.len(),
                "initial rule set loaded"
            );
        }

        let engine = Arc::new(DecisionEngine::new(
            Arc::clone(&registry),
            self.config.engine.engine_config(),
        ));

        let (signer, store): (Arc<dyn Signer>, Arc<dyn RecordStore>) = match &self.config.ledger
        {
            LedgerConfig::Memory => (
                Arc::new(Ed25519Signer::generate()),
                Arc::new(InMemoryRecordStore::new()),
            ),
            LedgerConfig::File { path, key_path } => {
                let key_path = key_path
                    .clone()
                    .unwrap_or_else(|| default_key_path(path));
                (
                    Arc::new(Ed25519Signer::from_bytes(load_or_create_key(&key_path)?)),
                    Arc::new(FileRecordStore::open(path)?),
                )
            }
        };
        let ledger = AuditLedger::open(signer, store)?;

        Ok(AppState::new(engine, registry, ledger))
    }

    /// Run the server.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = self.build_state()?;

        // Logging-only consumer of publish events; evaluation never reads
        // this stream.
        let mut events = state.registry.subscribe();
        tokio::spawn(async move {
            while let Ok(change) = events.recv().await {
                tracing::info!(
                    version = change.version,
                    content_hash = %change.content_hash,
                    rules = change.rule_count,
                    "rule set published"
                );
            }
        });

        let app = create_router(state, self.config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("palisade gate listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("palisade gate shutting down");
        Ok(())
    }
}

fn default_key_path(ledger_path: &Path) -> PathBuf {
    ledger_path.with_extension("key")
}

/// Read the signing key, or create one on first start so records from
/// earlier runs stay verifiable.
fn load_or_create_key(path: &Path) -> DaemonResult<[u8; 32]> {
    use rand::RngCore;

    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let decoded = parse_hex_key(raw.trim())
            .ok_or_else(|| DaemonError::Config(format!("{}: malformed key", path.display())))?;
        return Ok(decoded);
    }

    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    let hex: String = key.iter().map(|byte| format!("{:02x}", byte)).collect();
    std::fs::write(path, hex)?;
    tracing::info!(path = %path.display(), "generated new ledger signing key");
    Ok(key)
}

fn parse_hex_key(raw: &str) -> Option<[u8; 32]> {
    if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut key = [0u8; 32];
    for (i, chunk) in raw.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        key[i] = ((hi << 4) | lo) as u8;
    }
    Some(key)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
