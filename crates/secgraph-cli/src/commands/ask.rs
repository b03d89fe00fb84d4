//! Ask command - Answer a single question

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use secgraph_core::{format_envelope, validate_question};

use super::{build_pipeline, load_config, print_info};
use crate::GlobalOptions;

/// Arguments for the ask command
#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question to process
    #[arg(long, short = 'q')]
    question: String,

    /// Disable the generative fallback; only pattern-matched questions run
    #[arg(long)]
    no_generative: bool,

    /// Output format: text (default), json
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output width for text formatting
    #[arg(long, default_value = "80")]
    width: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Execute the ask command
pub async fn execute(args: AskArgs, global: GlobalOptions) -> Result<()> {
    if let Err(message) = validate_question(&args.question) {
        anyhow::bail!("Invalid question: {}", message);
    }

    let config = load_config(&global)?;
    let pipeline = build_pipeline(&config).await?;

    print_info("Processing...", global.quiet);
    let envelope = pipeline
        .router
        .process(&args.question, !args.no_generative)
        .await;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&envelope)
                .context("Failed to serialize the result")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            if !global.quiet {
                println!("Question: {}", args.question);
            }
            println!("Result:\n{}", format_envelope(&envelope, args.width));
        }
    }

    if !envelope.success {
        std::process::exit(1);
    }

    Ok(())
}
