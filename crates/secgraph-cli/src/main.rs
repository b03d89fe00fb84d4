//! secgraph CLI - Natural-language questions over the SEC knowledge graph
//!
//! Routes questions about SEC filing entities (companies, investment
//! managers, filings) onto a Neo4j knowledge graph, with LLM-driven Cypher
//! generation as the fallback for unrecognized question shapes.
//!
//! # Usage
//!
//! ```bash
//! # Ask a single question
//! secgraph ask -q "What investment firms are in San Francisco?"
//!
//! # Interactive session
//! secgraph chat
//!
//! # Check connectivity to Neo4j and the model endpoint
//! secgraph doctor
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// secgraph - SEC knowledge graph question answering
#[derive(Parser, Debug)]
#[command(name = "secgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "SECGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Neo4j Bolt URI
    #[arg(long, global = true, env = "NEO4J_URI")]
    graph_uri: Option<String>,

    /// Neo4j username
    #[arg(long, global = true, env = "NEO4J_USERNAME")]
    graph_user: Option<String>,

    /// Neo4j password
    #[arg(long, global = true, env = "NEO4J_PASSWORD", hide_env_values = true)]
    graph_password: Option<String>,

    /// Neo4j database name
    #[arg(long, global = true, env = "NEO4J_DATABASE")]
    graph_database: Option<String>,

    /// Chat model used for query generation
    #[arg(long, global = true, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// Model endpoint base URL
    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    fn to_config_overrides(&self) -> secgraph_config::ConfigOverrides {
        secgraph_config::ConfigOverrides {
            graph_uri: self.graph_uri.clone(),
            graph_username: self.graph_user.clone(),
            graph_password: self.graph_password.clone(),
            graph_database: self.graph_database.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question and print the answer
    Ask(commands::ask::AskArgs),

    /// Interactive question-and-answer session
    Chat(commands::chat::ChatArgs),

    /// Check connectivity to Neo4j and the model endpoint
    Doctor(commands::doctor::DoctorArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Ask(args) => commands::ask::execute(args, cli.global).await,
        Commands::Chat(args) => commands::chat::execute(args, cli.global).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.global).await,
    }
}
