//! Doctor command - Connectivity check for Neo4j and the model endpoint

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use secgraph_core::{
    ComponentHealth, HealthMonitor, HealthStatus, ModelSynthesizer, Neo4jStore, SubsystemHealth,
    Synthesizer,
};

use super::{load_config, to_model_config, to_neo4j_config};
use crate::GlobalOptions;

/// Arguments for the doctor command
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON for CI/CD integration
    #[arg(long)]
    json: bool,
}

/// Execute the doctor command
pub async fn execute(args: DoctorArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;

    let synthesizer: Arc<ModelSynthesizer> = Arc::new(
        ModelSynthesizer::new(to_model_config(&config))
            .context("Failed to build the model client")?,
    );

    // A store that cannot connect is itself the failed probe; the model
    // endpoint still gets checked on its own
    let status = match Neo4jStore::connect(to_neo4j_config(&config)).await {
        Ok(store) => {
            HealthMonitor::new(Arc::new(store), synthesizer.clone())
                .check()
                .await
        }
        Err(err) => HealthStatus {
            graph_store: SubsystemHealth::unhealthy(err.to_string()),
            synthesizer: match synthesizer.probe().await {
                Ok(()) => SubsystemHealth::healthy(),
                Err(probe_err) => SubsystemHealth::unhealthy(probe_err.to_string()),
            },
        },
    };

    let overall = status.overall();

    if args.json {
        let report = serde_json::json!({
            "graph_store": status.graph_store,
            "synthesizer": status.synthesizer,
            "overall": overall,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("System Health Check:");
        for (name, subsystem) in status.subsystems() {
            match subsystem.detail {
                Some(ref detail) if !global.quiet => {
                    println!("  {}: {} ({})", name, subsystem.state, detail);
                }
                _ => println!("  {}: {}", name, subsystem.state),
            }
        }
        println!("  overall: {}", overall);
    }

    if overall != ComponentHealth::Healthy {
        std::process::exit(1);
    }

    Ok(())
}
