//! secgraph-core - Question routing for the SEC knowledge graph
//!
//! Translates natural-language questions about SEC filing entities into
//! Cypher and runs them against Neo4j. Recognized question shapes go
//! through deterministic query templates; everything else falls back to
//! LLM-driven Cypher synthesis. Every question resolves to the same
//! envelope shape regardless of path.
//!
//! # Architecture
//!
//! - [`QueryRouter`] - classifies questions and dispatches to a handler;
//!   the error boundary for the whole pipeline
//! - [`GraphStore`] / [`Neo4jStore`] - parametrized read-only queries over
//!   the Bolt connection
//! - [`Synthesizer`] / [`ModelSynthesizer`] - Cypher generation through an
//!   OpenAI-compatible endpoint, with a runtime-replaceable prompt template
//! - [`format_envelope`] - terminal rendering of the result envelope
//! - [`HealthMonitor`] - concurrent bounded probes of both collaborators
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use secgraph_core::{
//!     ModelConfig, ModelSynthesizer, Neo4jConfig, Neo4jStore, QueryRouter, RouterDefaults,
//! };
//!
//! # async fn run() -> secgraph_core::Result<()> {
//! let store = Neo4jStore::connect(Neo4jConfig::new(
//!     "bolt://localhost:7687",
//!     "neo4j",
//!     "password",
//! ))
//! .await?;
//! let synthesizer = ModelSynthesizer::new(ModelConfig::openai("sk-..."))?;
//!
//! let router = QueryRouter::new(
//!     Arc::new(store),
//!     Arc::new(synthesizer),
//!     RouterDefaults::default(),
//! );
//! let envelope = router
//!     .process("What investment firms are in San Francisco?", true)
//!     .await;
//! println!("{}", secgraph_core::format_envelope(&envelope, 80));
//! # Ok(())
//! # }
//! ```

mod envelope;
mod error;
mod format;
mod health;
mod router;
mod store;
mod synthesizer;

pub use envelope::{
    validate_question, FieldValue, GraphQuery, ParamValue, Record, ResultEnvelope,
};
pub use error::{QueryError, Result};
pub use format::format_envelope;
pub use health::{ComponentHealth, HealthMonitor, HealthStatus, SubsystemHealth};
pub use router::{classify, QueryIntent, QueryRouter, RouterDefaults};
pub use store::{EntityKind, GraphStore, Neo4jConfig, Neo4jStore};
pub use synthesizer::{ModelConfig, ModelSynthesizer, Synthesizer};
