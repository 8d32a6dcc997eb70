//! # wasmrelay
//!
//! Operator binary: talks to a Tendermint node through `wasmrelay-rpc` and
//! inspects reports and config digests offline with `wasmrelay-core`.

#![deny(unsafe_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use wasmrelay_core::report::{fee_rate_from_report, timestamp_from_report};
use wasmrelay_core::{ConfigDigester, ContractConfig, ReportCodec, WasmReportCodec};
use wasmrelay_rpc::{BroadcastMode, ClientConfig, TendermintClient};
use wasmrelay_settings::RelaySettings;

/// Relay toolbox for `CosmWasm` oracle contracts.
#[derive(Parser, Debug)]
#[command(name = "wasmrelay", about = "Query, broadcast, watch and inspect oracle reports")]
struct Cli {
    /// Settings file (defaults to `~/.wasmrelay/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Tendermint WebSocket endpoint (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Per-call timeout in milliseconds (overrides settings).
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for the next block and print its height.
    Height,
    /// Query contract state with a JSON message.
    Query {
        /// Contract address.
        contract: String,
        /// Query message, e.g. `{"latest_round_data":{}}`.
        msg: String,
    },
    /// Search transactions and print the raw result.
    TxSearch {
        /// Event query, e.g. `tx.height=5`.
        query: String,
        /// Page number.
        #[arg(long, default_value = "1")]
        page: String,
        /// Results per page.
        #[arg(long, default_value = "30")]
        per_page: String,
    },
    /// Broadcast a hex-encoded signed transaction.
    Broadcast {
        /// Transaction bytes in hex.
        tx: String,
        /// `sync`, `async` or `commit`.
        #[arg(long, default_value = "sync")]
        mode: BroadcastMode,
    },
    /// Print contract events until Ctrl-C.
    Watch {
        /// Contract address.
        contract: String,
        /// Job id for the subscription.
        #[arg(long, default_value = "watch")]
        job_id: String,
    },
    /// Decode a hex-encoded report.
    Report {
        #[command(subcommand)]
        field: ReportField,
    },
    /// Compute the config digest of a contract config JSON file.
    Digest {
        /// Path to the config JSON.
        config: PathBuf,
        /// Contract address.
        #[arg(long)]
        contract: String,
        /// Chain id (overrides settings).
        #[arg(long)]
        chain_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ReportField {
    /// Median observation.
    Median {
        /// Report bytes in hex.
        report: String,
    },
    /// Fee conversion rate.
    FeeRate {
        /// Report bytes in hex.
        report: String,
    },
    /// Round timestamp.
    Timestamp {
        /// Report bytes in hex.
        report: String,
    },
}

fn load_settings(cli: &Cli) -> Result<RelaySettings> {
    let mut settings = match &cli.settings {
        Some(path) => wasmrelay_settings::load_settings_from_path(path),
        None => wasmrelay_settings::load_settings(),
    }
    .context("Failed to load settings")?;
    if let Some(url) = &cli.url {
        settings.node.tendermint_url = Some(url.clone());
    }
    if let Some(ms) = cli.timeout_ms {
        settings.request_timeout_ms = ms;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn decode_hex(label: &str, raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim().trim_start_matches("0x");
    hex::decode(trimmed).with_context(|| format!("{label} is not valid hex"))
}

/// Run `fut` under the configured per-call timeout.
async fn within<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T, wasmrelay_rpc::ClientError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(outcome) => outcome.with_context(|| format!("{what} failed")),
        Err(_) => bail!("{what} timed out after {}ms", limit.as_millis()),
    }
}

fn print_bytes(bytes: &[u8]) {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => println!("{value:#}"),
        Err(_) => println!("{}", String::from_utf8_lossy(bytes)),
    }
}

fn inspect_report(field: &ReportField) -> Result<()> {
    match field {
        ReportField::Median { report } => {
            let bytes = decode_hex("report", report)?;
            let median = WasmReportCodec.median_from_report(&bytes)?;
            println!("{median}");
        }
        ReportField::FeeRate { report } => {
            let bytes = decode_hex("report", report)?;
            println!("{}", fee_rate_from_report(&bytes)?);
        }
        ReportField::Timestamp { report } => {
            let bytes = decode_hex("report", report)?;
            println!("{}", timestamp_from_report(&bytes)?);
        }
    }
    Ok(())
}

fn compute_digest(
    settings: &RelaySettings,
    config: &Path,
    contract: &str,
    chain_id: Option<&str>,
) -> Result<()> {
    let raw = std::fs::read_to_string(config)
        .with_context(|| format!("Failed to read {}", config.display()))?;
    let parsed: ContractConfig =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", config.display()))?;
    let chain_id = chain_id.unwrap_or(&settings.chain_id);
    let digest = ConfigDigester::new(chain_id, contract).config_digest(&parsed)?;
    println!("{digest}");
    Ok(())
}

/// Run one subcommand. The client only dials for commands that need the node.
async fn run(
    client: &TendermintClient,
    settings: &RelaySettings,
    command: Command,
    limit: Duration,
) -> Result<()> {
    match command {
        Command::Height => {
            within(limit, "head tracker start", client.start_head_tracker()).await?;
            let mut tracker = client.watch_heights();
            let height = within(limit, "waiting for a block", tracker.wait_for_height(1)).await?;
            println!("{height}");
        }
        Command::Query { contract, msg } => {
            let msg: Value = serde_json::from_str(&msg).context("Query message is not JSON")?;
            let bytes = within(
                limit,
                "contract query",
                client.query_contract_state(&contract, &msg),
            )
            .await?;
            print_bytes(&bytes);
        }
        Command::TxSearch {
            query,
            page,
            per_page,
        } => {
            let params = vec![
                Value::from(query),
                Value::from(false),
                Value::from(page),
                Value::from(per_page),
            ];
            let bytes = within(limit, "tx search", client.search_txs(params)).await?;
            print_bytes(&bytes);
        }
        Command::Broadcast { tx, mode } => {
            let tx = decode_hex("transaction", &tx)?;
            let result = within(limit, "broadcast", client.broadcast(&tx, mode)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Watch { contract, job_id } => {
            let mut events =
                within(limit, "subscribe", client.subscribe_contract(&job_id, &contract)).await?;
            info!(job_id, contract, "watching, press Ctrl-C to stop");
            loop {
                tokio::select! {
                    batch = events.recv() => {
                        let Some(batch) = batch else { break };
                        for event in batch {
                            println!("{}", serde_json::to_string(&event)?);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            if let Err(e) = within(limit, "unsubscribe", client.unsubscribe(&job_id)).await {
                warn!(error = %e, "unsubscribe failed");
            }
        }
        Command::Report { field } => inspect_report(&field)?,
        Command::Digest {
            config,
            contract,
            chain_id,
        } => compute_digest(settings, &config, &contract, chain_id.as_deref())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    wasmrelay_logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let url = settings.tendermint_url()?.to_string();
    let limit = Duration::from_millis(settings.request_timeout_ms);
    let client = TendermintClient::new(ClientConfig::new(url));
    let outcome = run(&client, &settings, cli.command, limit).await;
    client.close().await;
    outcome
}
