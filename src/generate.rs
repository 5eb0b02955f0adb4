//! Generate command handler.
//!
//! Prints synthesized payloads without connecting anywhere, so the request
//! grammar and the effect of a seed can be inspected offline.

use anyhow::Context;
use clap::{Args, ValueEnum};
use exchange_types::{Payload, RequestKind, Renderer, XmlRenderer};
use exchange_wire::encode;
use loadtest_generator::{PayloadGenerator, RequestMix, TransIdMode};
use loadtest_swarm::cli::TransIdChoice;
use serde::Serialize;
use std::path::PathBuf;

/// Request kind for CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindChoice {
    Create,
    Transaction,
}

impl From<KindChoice> for RequestKind {
    fn from(choice: KindChoice) -> Self {
        match choice {
            KindChoice::Create => RequestKind::Create,
            KindChoice::Transaction => RequestKind::Transaction,
        }
    }
}

/// Output format for generated payloads.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum GenerateFormat {
    /// Rendered request documents
    #[default]
    Xml,
    /// One JSON object per line with the structured payload and its XML
    Json,
}

/// Arguments for the generate command.
#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Number of payloads to generate
    #[arg(long, short = 'n', default_value = "5")]
    pub count: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Only generate this kind (default: pick by --mix)
    #[arg(long)]
    pub kind: Option<KindChoice>,

    /// Request weights as CREATE:TRANSACTION
    #[arg(long, default_value = "1:3")]
    pub mix: RequestMix,

    /// How query/cancel ids relate to order ids
    #[arg(long, default_value = "independent")]
    pub trans_ids: TransIdChoice,

    /// Prefix each document with its wire length line
    #[arg(long)]
    pub framed: bool,

    /// Leave out the XML declaration
    #[arg(long)]
    pub no_declaration: bool,

    /// Output format
    #[arg(long, default_value = "xml")]
    pub format: GenerateFormat,

    /// Write to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct GeneratedLine<'a> {
    index: usize,
    kind: RequestKind,
    payload: &'a Payload,
    xml: &'a str,
}

/// Produce the generate command's output text.
pub fn generate_samples(args: &GenerateArgs) -> anyhow::Result<String> {
    let mode: TransIdMode = args.trans_ids.into();
    let mut generator = PayloadGenerator::new(args.seed).with_trans_id_mode(mode);
    let renderer = XmlRenderer {
        declaration: !args.no_declaration,
    };

    let mut output = String::new();
    for index in 0..args.count {
        let kind = match args.kind {
            Some(kind) => kind.into(),
            None => generator.choose_kind(&args.mix),
        };
        let payload = generator
            .generate(kind)
            .with_context(|| format!("Failed to generate payload {index}"))?;
        let xml = renderer
            .render(&payload)
            .with_context(|| format!("Failed to render payload {index}"))?;

        match args.format {
            GenerateFormat::Xml => {
                if args.framed {
                    output.push_str(&String::from_utf8_lossy(&encode(&xml)));
                } else {
                    output.push_str(&xml);
                }
                output.push('\n');
            }
            GenerateFormat::Json => {
                let line = GeneratedLine {
                    index,
                    kind,
                    payload: &payload,
                    xml: &xml,
                };
                output.push_str(&serde_json::to_string(&line)?);
                output.push('\n');
            }
        }
    }
    Ok(output)
}

/// Run the generate command.
pub async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    tracing::info!(
        "Generating {} payloads with seed {} ({})",
        args.count,
        args.seed,
        args.mix
    );
    let output = generate_samples(&args)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write output file: {path:?}"))?;
            tracing::info!("Wrote payloads to {:?}", path);
        }
        None => print!("{output}"),
    }
    Ok(())
}
