//! Chat command - Interactive question-and-answer loop

use std::io::Write;

use anyhow::Result;
use clap::Args;
use secgraph_core::{format_envelope, validate_question};

use super::{build_pipeline, load_config, Pipeline};
use crate::GlobalOptions;

/// Arguments for the chat command
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Disable the generative fallback; only pattern-matched questions run
    #[arg(long)]
    no_generative: bool,

    /// Output width for text formatting
    #[arg(long, default_value = "80")]
    width: usize,
}

/// Execute the chat command
pub async fn execute(args: ChatArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let pipeline = build_pipeline(&config).await?;

    println!("SEC Knowledge Graph Chat System");
    println!("Type 'quit' or 'exit' to end the session");
    println!("Type 'health' to check system status");
    println!("{}", "-".repeat(50));

    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush()?;

        let Some(question) = read_line()? else {
            // stdin closed
            println!("\nGoodbye!");
            break;
        };

        match question.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "health" => {
                print_health(&pipeline).await;
                continue;
            }
            _ => {}
        }

        if let Err(message) = validate_question(&question) {
            println!("Invalid question: {}", message);
            continue;
        }

        println!("\nProcessing...");
        let envelope = pipeline.router.process(&question, !args.no_generative).await;
        println!("\nResult:\n{}", format_envelope(&envelope, args.width));
    }

    Ok(())
}

/// Read one trimmed line from stdin; `None` on end of input.
///
/// Locks stdin only for the duration of the read, so the session future
/// stays `Send` across the processing awaits.
fn read_line() -> std::io::Result<Option<String>> {
    let mut buffer = String::new();
    let bytes = std::io::stdin().read_line(&mut buffer)?;
    if bytes == 0 {
        Ok(None)
    } else {
        Ok(Some(buffer.trim().to_string()))
    }
}

async fn print_health(pipeline: &Pipeline) {
    let status = pipeline.monitor.check().await;
    println!("\nSystem Health Check:");
    for (name, subsystem) in status.subsystems() {
        println!("  {}: {}", name, subsystem.state);
    }
    println!("  overall: {}", status.overall());
}
