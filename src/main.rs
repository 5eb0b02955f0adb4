//! Command-line interface for exchange-loadtest
//!
//! # Usage Examples
//!
//! ## Run a Swarm
//! ```bash
//! # 50 clients for 30 seconds against a local exchange
//! exchange-loadtest run \
//!   --host 127.0.0.1 --port 12345 \
//!   --clients 50 --duration 30s
//!
//! # Create-heavy mix, 1000 requests per client, markdown report
//! exchange-loadtest run \
//!   --clients 8 --mix 3:1 \
//!   --max-requests 1000 \
//!   --output markdown
//!
//! # Settings from a YAML file, JSON report written alongside
//! exchange-loadtest run --config swarm.yaml --report-file report.json
//! ```
//!
//! ## Inspect Payloads
//! ```bash
//! # Five framed sample requests, exactly as they go on the wire
//! exchange-loadtest generate --count 5 --framed
//!
//! # Transaction documents with correlated query/cancel ids as JSON lines
//! exchange-loadtest generate --kind transaction --trans-ids correlated --format json
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=loadtest_swarm=debug`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use exchange_loadtest::generate::{run_generate, GenerateArgs};
use loadtest_swarm::{format_json, format_markdown, format_table, run_swarm, OutputFormat, RunArgs};

#[derive(Parser)]
#[command(name = "exchange-loadtest")]
#[command(about = "Synthetic load generator for the XML-over-TCP exchange server")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a swarm of virtual clients against an exchange server
    Run(RunArgs),

    /// Print generated request payloads without connecting
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_load(args).await,
        Commands::Generate(args) => run_generate(args).await,
    }
}

async fn run_load(args: RunArgs) -> anyhow::Result<()> {
    let config = args.to_config()?;
    let outcome = run_swarm(config).await?;

    let rendered = match args.output {
        OutputFormat::Table => format_table(&outcome.report),
        OutputFormat::Markdown => format_markdown(&outcome.report),
        OutputFormat::Json => format_json(&outcome.report)?,
    };
    println!("{rendered}");

    if let Some(path) = &args.report_file {
        let json = format_json(&outcome.report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report file: {path:?}"))?;
        tracing::info!("Report written to {:?}", path);
    }

    if outcome.all_failed_to_start() {
        anyhow::bail!(
            "All {} clients failed to connect to the exchange",
            outcome.report.clients
        );
    }
    Ok(())
}
