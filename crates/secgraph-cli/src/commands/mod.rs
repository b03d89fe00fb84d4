//! CLI command implementations

pub mod ask;
pub mod chat;
pub mod doctor;

use std::sync::Arc;

use anyhow::{Context, Result};
use secgraph_config::{ConfigLoader, SecgraphConfig};
use secgraph_core::{
    HealthMonitor, ModelConfig, ModelSynthesizer, Neo4jConfig, Neo4jStore, QueryRouter,
    RouterDefaults,
};

use crate::GlobalOptions;

/// Load configuration with optional config file override.
pub fn load_config(global: &GlobalOptions) -> Result<SecgraphConfig> {
    let mut loader = ConfigLoader::new();

    // An explicit config file skips the global/local search order but
    // still takes CLI and env overrides on top
    let mut config = if let Some(ref config_path) = global.config {
        loader
            .load_file(config_path)
            .context("Failed to load config file")?
    } else {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        loader
            .load(&cwd, None)
            .context("Failed to load configuration")?
    };

    config.apply_overrides(&global.to_config_overrides());
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// The wired-up question pipeline shared by the commands.
pub struct Pipeline {
    pub router: QueryRouter,
    pub monitor: HealthMonitor,
}

/// Connect to the graph store, build the synthesizer, and wire the router.
pub async fn build_pipeline(config: &SecgraphConfig) -> Result<Pipeline> {
    let store = Neo4jStore::connect(to_neo4j_config(config))
        .await
        .context("Failed to connect to Neo4j")?;
    let synthesizer = ModelSynthesizer::new(to_model_config(config))
        .context("Failed to build the model client")?;

    let store: Arc<Neo4jStore> = Arc::new(store);
    let synthesizer: Arc<ModelSynthesizer> = Arc::new(synthesizer);

    let router = QueryRouter::new(
        store.clone(),
        synthesizer.clone(),
        to_router_defaults(config),
    );
    let monitor = HealthMonitor::new(store, synthesizer);

    Ok(Pipeline { router, monitor })
}

/// Translate the config crate's graph section into the core's store config.
fn to_neo4j_config(config: &SecgraphConfig) -> Neo4jConfig {
    let mut neo4j = Neo4jConfig::new(
        config.graph.uri.clone(),
        config.graph.username.clone(),
        config.graph.password.clone(),
    )
    .database(config.graph.database.clone())
    .timeout_secs(config.graph.timeout_secs);
    neo4j.max_results = config.query.max_results;
    neo4j.description_chunk_limit = config.query.description_chunk_limit;
    neo4j.fulltext_index = config.query.fulltext_index.clone();
    neo4j
}

/// Translate the config crate's model section into the core's model config.
///
/// The API key is resolved from the configured environment variable here,
/// at client build time; it never lives in a config file.
fn to_model_config(config: &SecgraphConfig) -> ModelConfig {
    ModelConfig {
        base_url: config.model.base_url.clone(),
        api_key: config.resolve_api_key(),
        model: config.model.model.clone(),
        temperature: config.model.temperature,
        timeout_secs: config.model.timeout_secs,
    }
}

fn to_router_defaults(config: &SecgraphConfig) -> RouterDefaults {
    RouterDefaults {
        max_results: config.query.max_results,
        fulltext_limit: config.query.fulltext_limit,
        spatial_radius_meters: config.query.spatial_radius_meters,
        analytical_limit: config.query.analytical_limit,
        fulltext_index: config.query.fulltext_index.clone(),
    }
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
