//! Palisade Daemon - front-end for the compliance gate
//!
//! `palisaded serve` hosts the REST surface. `decide` and `verify` run the
//! same stack once, without a listener, and report through exit codes so
//! shell pipelines can gate on the verdict.

use clap::{Parser, Subcommand};
use palisade_daemon::config::DaemonConfig;
use palisade_daemon::error::DaemonResult;
use palisade_daemon::server::Server;
use palisade_engine::RawAction;
use palisade_ledger::VerificationResult;
use palisade_types::CorrelationId;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Palisade Daemon CLI
#[derive(Parser)]
#[command(name = "palisaded")]
#[command(about = "Palisade - runtime compliance gate with an auditable decision ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PALISADE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "PALISADE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "PALISADE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gate server
    Serve {
        /// Listen address override
        #[arg(short, long, env = "PALISADE_LISTEN_ADDR")]
        listen: Option<SocketAddr>,
    },
    /// Evaluate one action document, seal it into the ledger, and exit with
    /// the verdict
    Decide {
        /// Path to the action JSON document; `-` reads stdin
        #[arg(default_value = "-")]
        input: String,

        /// Correlation id recorded with the decision
        #[arg(long)]
        correlation_id: Option<String>,
    },
    /// Recompute the ledger hash chain over a range
    Verify {
        #[arg(long, default_value_t = 0)]
        from: u64,

        /// Defaults to the end of the ledger
        #[arg(long)]
        to: Option<u64>,
    },
}

// Verdicts exit through Verdict::exit_code (0 permit, 2 block,
// 3 indeterminate); malformed input is 1, a broken chain is 4.
const EXIT_MALFORMED: i32 = 1;
const EXIT_BROKEN_CHAIN: i32 = 4;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_MALFORMED
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> DaemonResult<i32> {
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { listen } => {
            if let Some(addr) = listen {
                config.server.listen_addr = addr;
            }

            println!(
                "palisade compliance gate\n  version:   {}\n  listening: {}\n",
                env!("CARGO_PKG_VERSION"),
                config.server.listen_addr
            );

            Server::new(config).run().await?;
            Ok(0)
        }
        Command::Decide {
            input,
            correlation_id,
        } => decide_once(config, &input, correlation_id).await,
        Command::Verify { from, to } => verify_chain(config, from, to).await,
    }
}

/// One-shot decision over the same stack the server runs, minus the
/// listener.
async fn decide_once(
    config: DaemonConfig,
    input: &str,
    correlation_id: Option<String>,
) -> DaemonResult<i32> {
    let raw = match read_document(input) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("cannot read action document: {err}");
            return Ok(EXIT_MALFORMED);
        }
    };
    let action: RawAction = match serde_json::from_str(&raw) {
        Ok(action) => action,
        Err(err) => {
            eprintln!("malformed action document: {err}");
            return Ok(EXIT_MALFORMED);
        }
    };

    let state = Server::new(config).build_state()?;
    let correlation_id = correlation_id
        .map(CorrelationId::new)
        .unwrap_or_else(CorrelationId::generate);

    let decision = match state.engine.decide(correlation_id, action).await {
        Ok(decision) => decision,
        Err(err) => {
            eprintln!("malformed action: {err}");
            return Ok(EXIT_MALFORMED);
        }
    };
    let record = state.ledger.append(decision).await?;

    let report = serde_json::json!({
        "correlation_id": record.decision.correlation_id,
        "verdict": record.decision.verdict,
        "matched_rules": record.decision.matched_rule_ids(),
        "warnings": record.decision.warnings,
        "ledger_sequence": record.seq,
        "ruleset_version": record.decision.ruleset_version,
    });
    println!("{report:#}");

    Ok(record.decision.verdict.exit_code())
}

async fn verify_chain(config: DaemonConfig, from: u64, to: Option<u64>) -> DaemonResult<i32> {
    let state = Server::new(config).build_state()?;
    let to = to.unwrap_or_else(|| state.ledger.len());

    match state.ledger.verify(from, to)? {
        VerificationResult::Intact => {
            println!("INTACT {from}..{to}");
            Ok(0)
        }
        VerificationResult::BrokenAt(seq) => {
            println!("BROKEN_AT {seq}");
            Ok(EXIT_BROKEN_CHAIN)
        }
    }
}

fn read_document(input: &str) -> std::io::Result<String> {
    use std::io::Read;

    if input == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        Ok(raw)
    } else {
        std::fs::read_to_string(input)
    }
}
