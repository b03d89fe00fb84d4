//! Subsystem health probing
//!
//! Probes the graph store and the synthesizer concurrently, each under its
//! own short timeout, and reduces the outcomes to a per-subsystem status.
//! Probe failures become `Unhealthy` entries, never errors: a health check
//! that cannot itself fail is the point.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::store::GraphStore;
use crate::synthesizer::Synthesizer;

/// Default per-probe timeout in seconds
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Binary health state of one subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentHealth {
    Healthy,
    Unhealthy,
}

impl fmt::Display for ComponentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentHealth::Healthy => write!(f, "healthy"),
            ComponentHealth::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Probe outcome for one subsystem
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    pub state: ComponentHealth,
    /// Failure detail when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SubsystemHealth {
    pub fn healthy() -> Self {
        Self {
            state: ComponentHealth::Healthy,
            detail: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            state: ComponentHealth::Unhealthy,
            detail: Some(detail.into()),
        }
    }
}

/// Snapshot of subsystem health from one probe pass
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub graph_store: SubsystemHealth,
    pub synthesizer: SubsystemHealth,
}

impl HealthStatus {
    /// Healthy iff every subsystem probe passed. Computed, never stored.
    pub fn overall(&self) -> ComponentHealth {
        if self.graph_store.state == ComponentHealth::Healthy
            && self.synthesizer.state == ComponentHealth::Healthy
        {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Unhealthy
        }
    }

    /// Subsystem name/state pairs in display order
    pub fn subsystems(&self) -> [(&'static str, &SubsystemHealth); 2] {
        [
            ("graph_store", &self.graph_store),
            ("synthesizer", &self.synthesizer),
        ]
    }
}

/// Probes the router's collaborators and reports their health
pub struct HealthMonitor {
    store: Arc<dyn GraphStore>,
    synthesizer: Arc<dyn Synthesizer>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn GraphStore>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            store,
            synthesizer,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Probe both subsystems and return a fresh status
    pub async fn check(&self) -> HealthStatus {
        debug!("Running health probes");
        let (store_result, synthesizer_result) = tokio::join!(
            bounded_probe(self.store.probe(), self.probe_timeout),
            bounded_probe(self.synthesizer.probe(), self.probe_timeout),
        );

        HealthStatus {
            graph_store: to_subsystem("graph_store", store_result),
            synthesizer: to_subsystem("synthesizer", synthesizer_result),
        }
    }
}

async fn bounded_probe(
    probe: impl std::future::Future<Output = Result<()>>,
    timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Connection(format!(
            "Probe timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

fn to_subsystem(name: &str, result: Result<()>) -> SubsystemHealth {
    match result {
        Ok(()) => SubsystemHealth::healthy(),
        Err(err) => {
            warn!(subsystem = name, error = %err, "Health probe failed");
            SubsystemHealth::unhealthy(err.to_string())
        }
    }
}
