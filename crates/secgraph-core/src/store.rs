//! Neo4j-backed graph store
//!
//! Owns the Bolt connection and exposes the read-only query operations the
//! router dispatches to. Every user-supplied value is bound as a named query
//! parameter; the only text ever interpolated into a query is the closed set
//! of entity labels and the configured result cap.

use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::envelope::{FieldValue, GraphQuery, ParamValue, Record};
use crate::error::{QueryError, Result};

/// Entity families the store can query by location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Investment managers (Form 13F filers)
    Manager,
    /// Public companies (Form 10-K filers)
    Company,
}

impl EntityKind {
    /// Node label in the graph. Cypher cannot bind labels as parameters,
    /// so this closed set is the one piece of text spliced into queries.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Manager => "Manager",
            EntityKind::Company => "Company",
        }
    }

    /// Property carrying the entity's display name
    pub fn name_property(&self) -> &'static str {
        match self {
            EntityKind::Manager => "managerName",
            EntityKind::Company => "companyName",
        }
    }
}

/// Configuration for connecting to Neo4j
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Bolt URI (e.g., "bolt://localhost:7687")
    pub uri: String,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Target database name
    pub database: String,
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
    /// Result cap applied to every query that does not carry its own limit
    pub max_results: i64,
    /// Number of filing chunks returned for a company description
    pub description_chunk_limit: i64,
    /// Full-text index over entity names
    pub fulltext_index: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_secs: 8,
            max_results: 50,
            description_chunk_limit: 5,
            fulltext_index: "fullTextCompanyNames".to_string(),
        }
    }
}

impl Neo4jConfig {
    /// Create config with connection details
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Set the target database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the per-operation timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Read-only query operations against the SEC knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a parametrized query and collect its rows as flat records
    async fn execute(&self, query: GraphQuery) -> Result<Vec<Record>>;

    /// Relevance-ranked lookup against a named full-text index
    async fn full_text_search(&self, index: &str, text: &str, limit: i64) -> Result<Vec<Record>>;

    /// Entities of the given kind within a radius of a city's address point
    async fn spatial_query(
        &self,
        origin_city: &str,
        radius_meters: f64,
        kind: EntityKind,
    ) -> Result<Vec<Record>>;

    /// Form 10-K business description chunks for a company matched by name
    async fn company_description(&self, company_name: &str) -> Result<Vec<Record>>;

    /// Minimal connectivity check
    async fn probe(&self) -> Result<()>;
}

/// Neo4j client wrapping a single Bolt connection pool
pub struct Neo4jStore {
    graph: Graph,
    op_timeout: Duration,
    max_results: i64,
    description_chunk_limit: i64,
    fulltext_index: String,
}

impl Neo4jStore {
    /// Connect to Neo4j and verify the session with a probe query
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        info!("Connecting to Neo4j at {}", config.uri);

        let graph_config = neo4rs::ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .db(config.database.as_str())
            .build()
            .map_err(|e| QueryError::Connection(format!("Invalid Neo4j configuration: {}", e)))?;

        let graph = Graph::connect(graph_config)
            .await
            .map_err(|e| QueryError::Connection(format!("Failed to connect to Neo4j: {}", e)))?;

        let store = Self {
            graph,
            op_timeout: Duration::from_secs(config.timeout_secs),
            max_results: config.max_results,
            description_chunk_limit: config.description_chunk_limit,
            fulltext_index: config.fulltext_index,
        };

        // Fail construction early rather than on the first question
        store.probe().await?;
        info!("Successfully connected to Neo4j");

        Ok(store)
    }

    /// Dispatch a query, collect its rows, and bound the whole round trip.
    ///
    /// Transient dispatch failures get one retry. Every operation here is a
    /// read, so a second attempt cannot duplicate side effects.
    async fn run_collect(&self, q: Query) -> Result<Vec<Record>> {
        let fetch = async {
            let mut stream = match self.graph.execute(q.clone()).await {
                Ok(stream) => stream,
                Err(first) if is_transient(&first) => {
                    warn!(error = %first, "Graph query dispatch failed, retrying once");
                    self.graph.execute(q).await?
                }
                Err(first) => return Err(first.into()),
            };

            let mut records = Vec::new();
            while let Some(row) = stream.next().await? {
                records.push(flatten_row(&row)?);
            }
            Ok::<_, QueryError>(records)
        };

        match tokio::time::timeout(self.op_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Connection(format!(
                "Graph operation timed out after {}s",
                self.op_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn execute(&self, query_spec: GraphQuery) -> Result<Vec<Record>> {
        let capped = apply_result_cap(&query_spec.text, self.max_results);
        debug!(query = %capped, "Executing graph query");

        let mut q = query(&capped);
        for (name, value) in &query_spec.params {
            q = match value {
                ParamValue::Text(v) => q.param(name.as_str(), v.clone()),
                ParamValue::Int(v) => q.param(name.as_str(), *v),
                ParamValue::Float(v) => q.param(name.as_str(), *v),
            };
        }

        self.run_collect(q).await
    }

    async fn full_text_search(&self, index: &str, text: &str, limit: i64) -> Result<Vec<Record>> {
        require_positive_limit(limit)?;
        debug!(index, text, limit, "Running full-text search");

        let q = query(
            r#"
            CALL db.index.fulltext.queryNodes($index, $text)
            YIELD node, score
            RETURN coalesce(node.companyName, node.managerName) AS name, score
            ORDER BY score DESC
            LIMIT $limit
            "#,
        )
        .param("index", index.to_string())
        .param("text", text.to_string())
        .param("limit", limit);

        self.run_collect(q).await
    }

    async fn spatial_query(
        &self,
        origin_city: &str,
        radius_meters: f64,
        kind: EntityKind,
    ) -> Result<Vec<Record>> {
        require_positive_radius(radius_meters)?;

        // Resolve the origin first so "no address in that city" is
        // distinguishable from "nothing within the radius".
        let resolve = query(
            "MATCH (address:Address) WHERE address.city = $city RETURN count(address) AS matches",
        )
        .param("city", origin_city.to_string());

        let rows = self.run_collect(resolve).await?;
        let matches = rows
            .first()
            .and_then(|record| match record.get("matches") {
                Some(FieldValue::Int(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        if matches == 0 {
            return Err(QueryError::UnknownLocation(origin_city.to_string()));
        }

        debug!(
            city = origin_city,
            radius_meters,
            kind = kind.label(),
            "Running spatial query"
        );

        let text = format!(
            r#"
            MATCH (origin:Address {{city: $city}})
            MATCH (entity:{label})-[:LOCATED_AT]->(location:Address)
            WHERE point.distance(origin.location, location.location) < $radius
            RETURN entity.{name} AS name,
                   point.distance(origin.location, location.location) AS distanceMeters
            ORDER BY distanceMeters
            LIMIT $limit
            "#,
            label = kind.label(),
            name = kind.name_property(),
        );

        let q = query(&text)
            .param("city", origin_city.to_string())
            .param("radius", radius_meters)
            .param("limit", self.max_results);

        self.run_collect(q).await
    }

    async fn company_description(&self, company_name: &str) -> Result<Vec<Record>> {
        debug!(company = company_name, "Looking up company description");

        let q = query(
            r#"
            CALL db.index.fulltext.queryNodes($index, $name)
            YIELD node, score
            WITH node AS com
            MATCH (com)-[:FILED]->(f:Form), (f)-[s:SECTION]->(c:Chunk)
            WHERE s.f10kItem = 'item1'
            RETURN c.text AS text
            LIMIT $limit
            "#,
        )
        .param("index", self.fulltext_index.clone())
        .param("name", company_name.to_string())
        .param("limit", self.description_chunk_limit);

        self.run_collect(q).await
    }

    async fn probe(&self) -> Result<()> {
        let rows = self.run_collect(query("RETURN 1 AS ok")).await?;
        if rows.is_empty() {
            return Err(QueryError::Connection(
                "Probe query returned no rows".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a dispatch failure is worth a second attempt.
///
/// Transport failures and server errors Neo4j itself classifies as
/// transient can succeed on retry; everything else (bad Cypher, auth,
/// protocol violations) will fail identically the second time.
fn is_transient(err: &neo4rs::Error) -> bool {
    match err {
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => true,
        neo4rs::Error::Neo4j(server) => {
            matches!(server.kind(), neo4rs::Neo4jErrorKind::Transient)
        }
        _ => false,
    }
}

static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s").unwrap());

/// Append the configured result cap to a query that carries no limit.
///
/// Heuristic: a LIMIT keyword anywhere in the text counts as a limit, which
/// can be fooled by the word inside a string literal. The failure mode is an
/// uncapped read-only query, accepted for simplicity.
fn apply_result_cap(text: &str, cap: i64) -> String {
    let trimmed = text.trim().trim_end_matches(';').trim_end();
    if LIMIT_CLAUSE.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("{}\nLIMIT {}", trimmed, cap)
    }
}

fn require_positive_limit(limit: i64) -> Result<()> {
    if limit <= 0 {
        return Err(QueryError::InvalidArgument(format!(
            "Result limit must be positive, got {}",
            limit
        )));
    }
    Ok(())
}

fn require_positive_radius(radius_meters: f64) -> Result<()> {
    if !radius_meters.is_finite() || radius_meters <= 0.0 {
        return Err(QueryError::InvalidArgument(format!(
            "Search radius must be positive, got {}",
            radius_meters
        )));
    }
    Ok(())
}

/// Decode one row into a flat record.
///
/// Compound column values (nodes, lists, maps) flatten to their JSON text.
fn flatten_row(row: &neo4rs::Row) -> Result<Record> {
    let value = row
        .to::<serde_json::Value>()
        .map_err(|e| QueryError::Connection(format!("Failed to decode result row: {}", e)))?;
    Ok(record_from_value(value))
}

fn record_from_value(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from(value)))
            .collect(),
        other => {
            let mut record = Record::new();
            record.insert("value".to_string(), FieldValue::from(other));
            record
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Neo4jConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.database, "neo4j");
        assert_eq!(config.timeout_secs, 8);
        assert_eq!(config.max_results, 50);
        assert_eq!(config.fulltext_index, "fullTextCompanyNames");
    }

    #[test]
    fn test_config_builder() {
        let config = Neo4jConfig::new("bolt://graph:7687", "reader", "pw")
            .database("filings")
            .timeout_secs(5);
        assert_eq!(config.uri, "bolt://graph:7687");
        assert_eq!(config.username, "reader");
        assert_eq!(config.database, "filings");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_entity_kind_vocabulary() {
        assert_eq!(EntityKind::Manager.label(), "Manager");
        assert_eq!(EntityKind::Manager.name_property(), "managerName");
        assert_eq!(EntityKind::Company.label(), "Company");
        assert_eq!(EntityKind::Company.name_property(), "companyName");
    }

    #[test]
    fn test_retry_gate_accepts_transport_failures_only() {
        let io_failure = neo4rs::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert!(is_transient(&io_failure));
        assert!(is_transient(&neo4rs::Error::ConnectionError));

        assert!(!is_transient(&neo4rs::Error::UnexpectedMessage(
            "FAILURE during RUN".to_string()
        )));
        assert!(!is_transient(&neo4rs::Error::AuthenticationError(
            "unauthorized".to_string()
        )));
    }

    #[test]
    fn test_result_cap_appended_when_missing() {
        let capped = apply_result_cap("MATCH (n:Company) RETURN n.companyName AS name", 50);
        assert!(capped.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_result_cap_respects_existing_limit() {
        let text = "MATCH (n:Company) RETURN n.companyName AS name LIMIT 10";
        assert_eq!(apply_result_cap(text, 50), text);

        let parametrized = "MATCH (n) RETURN n.name AS name LIMIT $limit";
        assert_eq!(apply_result_cap(parametrized, 50), parametrized);
    }

    #[test]
    fn test_result_cap_strips_trailing_semicolon() {
        let capped = apply_result_cap("MATCH (n) RETURN n.name AS name;", 25);
        assert_eq!(capped, "MATCH (n) RETURN n.name AS name\nLIMIT 25");
    }

    #[test]
    fn test_positive_limit_validation() {
        assert!(require_positive_limit(1).is_ok());
        assert!(matches!(
            require_positive_limit(0),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            require_positive_limit(-3),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_positive_radius_validation() {
        assert!(require_positive_radius(10_000.0).is_ok());
        assert!(matches!(
            require_positive_radius(0.0),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            require_positive_radius(f64::NAN),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_record_from_object_value() {
        let record = record_from_value(serde_json::json!({
            "managerName": "Acme Capital",
            "distanceMeters": 4821.5,
        }));
        assert_eq!(
            record.get("managerName"),
            Some(&FieldValue::Text("Acme Capital".into()))
        );
        assert_eq!(
            record.get("distanceMeters"),
            Some(&FieldValue::Float(4821.5))
        );
    }

    #[test]
    fn test_record_from_scalar_value() {
        let record = record_from_value(serde_json::json!(42));
        assert_eq!(record.get("value"), Some(&FieldValue::Int(42)));
    }
}
