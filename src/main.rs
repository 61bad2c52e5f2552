//! Binary entry point for provgraph.
//!
//! Ingests batch files into the configured backend and runs contract
//! queries, printing JSON envelopes on stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use provgraph::config::ProvGraphConfig;
use provgraph::models::{Digest, IngestBatch};
use provgraph::observability::{self, ObservabilityConfig};
use provgraph::services::{BackendFactory, Operation, QueryResponse, QueryService};
use provgraph::storage::{GraphStore, IngestSummary};
use provgraph::{CancellationSignal, Error, QueryContext};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// provgraph - a provenance graph for software supply-chain artifacts.
#[derive(Parser)]
#[command(name = "provgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PROVGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more JSON batch files.
    Ingest {
        /// Batch files, applied in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run a contract query.
    Query {
        /// artifacts, packages, builders, attestations, metadata,
        /// identities or vulnerabilities.
        operation: String,
    },

    /// Show the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match ProvGraphConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init(ObservabilityConfig::from_settings(
        &config.observability,
        cli.verbose,
    )) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let signal = CancellationSignal::new();
    let handler_signal = signal.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_signal.cancel()) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let result = match cli.command {
        Commands::Ingest { files } => cmd_ingest(&config, &files, &signal),
        Commands::Query { operation } => cmd_query(&config, &operation, &signal).await,
        Commands::Config => cmd_config(&config),
    };

    if let Some(rendered) = observability.render_metrics() {
        tracing::debug!(metrics = %rendered, "Final metrics snapshot");
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn open_store(config: &ProvGraphConfig) -> provgraph::Result<Arc<dyn GraphStore>> {
    BackendFactory::from_config(config)
}

/// Applies each batch file in order; stops at the first failure.
fn cmd_ingest(
    config: &ProvGraphConfig,
    files: &[PathBuf],
    signal: &CancellationSignal,
) -> provgraph::Result<bool> {
    let store = open_store(config)?;
    let mut total = IngestSummary::default();

    for file in files {
        let ctx = QueryContext::new().with_signal(signal.clone());
        let summary = ingest_file(store.as_ref(), &ctx, file)?;
        total.add(&summary);
    }

    print_json(&total)?;
    Ok(true)
}

fn ingest_file(
    store: &dyn GraphStore,
    ctx: &QueryContext,
    path: &Path,
) -> provgraph::Result<IngestSummary> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
    let digest = Digest::sha256(&bytes);
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
    let batch = IngestBatch::from_json(&text)?;

    tracing::info!(
        file = %path.display(),
        digest = %digest,
        records = batch.len(),
        request_id = %ctx.request_id(),
        "Ingesting batch file"
    );
    store.ingest(ctx, &batch)
}

async fn cmd_query(
    config: &ProvGraphConfig,
    operation: &str,
    signal: &CancellationSignal,
) -> provgraph::Result<bool> {
    let Some(op) = Operation::parse(operation) else {
        return Err(Error::InvalidInput(format!(
            "unknown query '{operation}' (expected one of: {})",
            Operation::ALL.map(|op| op.as_str()).join(", ")
        )));
    };

    let response = match open_store(config) {
        Ok(store) => {
            let service = QueryService::new(store)
                .with_default_timeout(config.query.timeout())
                .with_max_depth(config.query.max_depth());
            let ctx = service.context().with_signal(signal.clone());
            service.execute_async(op, &ctx).await
        },
        Err(e) => QueryResponse::error(&e, Some(op.as_str())),
    };

    print_json(&response)?;
    Ok(response.is_ok())
}

fn cmd_config(config: &ProvGraphConfig) -> provgraph::Result<bool> {
    let rendered = toml::to_string_pretty(config).map_err(|e| Error::OperationFailed {
        operation: "render_config".to_string(),
        cause: e.to_string(),
    })?;
    print!("{rendered}");
    Ok(true)
}

fn print_json<T: serde::Serialize>(value: &T) -> provgraph::Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "render_output".to_string(),
        cause: e.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}
