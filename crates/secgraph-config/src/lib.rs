//! secgraph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.secgraph/config.toml`
//! - Local config: `.secgraph/config.toml` (in working directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.
//! Credentials never live in the config file itself: `[model]` names the
//! environment variable carrying the API key, and the CLI resolves it when
//! building the client.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Root configuration for secgraph.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecgraphConfig {
    /// Neo4j connection settings
    pub graph: GraphSettings,

    /// Model endpoint settings for query generation
    pub model: ModelSettings,

    /// Result caps and defaults per query family
    pub query: QuerySettings,
}

/// Neo4j connection settings.
///
/// # Example TOML
///
/// ```toml
/// [graph]
/// uri = "bolt://localhost:7687"
/// username = "neo4j"
/// database = "neo4j"
/// timeout_secs = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Bolt URI
    pub uri: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication.
    /// Usually supplied via `NEO4J_PASSWORD` rather than the file.
    pub password: String,

    /// Target database name
    pub database: String,

    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_secs: 8,
        }
    }
}

/// Model endpoint settings for Cypher generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Environment variable name containing the API key
    pub api_key_env: String,

    /// Chat model used for query generation
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4-turbo".to_string(),
            temperature: 0.0,
            timeout_secs: 20,
        }
    }
}

/// Result caps and defaults per query family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Result cap applied to queries without their own limit
    pub max_results: i64,

    /// Result cap for full-text searches
    pub fulltext_limit: i64,

    /// Radius used when a spatial question names no distance
    pub spatial_radius_meters: f64,

    /// Filing chunks returned for a company description
    pub description_chunk_limit: i64,

    /// Result cap for analytical aggregations
    pub analytical_limit: i64,

    /// Full-text index over entity names
    pub fulltext_index: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_results: 50,
            fulltext_limit: 10,
            spatial_radius_meters: 10_000.0,
            description_chunk_limit: 5,
            analytical_limit: 10,
            fulltext_index: "fullTextCompanyNames".to_string(),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override Neo4j URI
    pub graph_uri: Option<String>,

    /// Override Neo4j username
    pub graph_username: Option<String>,

    /// Override Neo4j password
    pub graph_password: Option<String>,

    /// Override Neo4j database name
    pub graph_database: Option<String>,

    /// Override generation model
    pub model: Option<String>,

    /// Override model endpoint base URL
    pub base_url: Option<String>,
}

impl SecgraphConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref uri) = overrides.graph_uri {
            self.graph.uri = uri.clone();
        }
        if let Some(ref username) = overrides.graph_username {
            self.graph.username = username.clone();
        }
        if let Some(ref password) = overrides.graph_password {
            self.graph.password = password.clone();
        }
        if let Some(ref database) = overrides.graph_database {
            self.graph.database = database.clone();
        }
        if let Some(ref model) = overrides.model {
            self.model.model = model.clone();
        }
        if let Some(ref base_url) = overrides.base_url {
            self.model.base_url = base_url.clone();
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.uri.is_empty() {
            return Err(ConfigError::invalid_value("graph.uri", "must not be empty"));
        }
        if self.graph.username.is_empty() {
            return Err(ConfigError::invalid_value(
                "graph.username",
                "must not be empty",
            ));
        }
        if self.graph.password.is_empty() {
            return Err(ConfigError::invalid_value(
                "graph.password",
                "must not be empty (set NEO4J_PASSWORD or --graph-password)",
            ));
        }
        if self.graph.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "graph.timeout_secs",
                "must be positive",
            ));
        }
        if self.model.base_url.is_empty() {
            return Err(ConfigError::invalid_value(
                "model.base_url",
                "must not be empty",
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "model.timeout_secs",
                "must be positive",
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::invalid_value(
                "model.temperature",
                "must be between 0.0 and 2.0",
            ));
        }
        for (field, value) in [
            ("query.max_results", self.query.max_results),
            ("query.fulltext_limit", self.query.fulltext_limit),
            (
                "query.description_chunk_limit",
                self.query.description_chunk_limit,
            ),
            ("query.analytical_limit", self.query.analytical_limit),
        ] {
            if value <= 0 {
                return Err(ConfigError::invalid_value(field, "must be positive"));
            }
        }
        if self.query.spatial_radius_meters <= 0.0 {
            return Err(ConfigError::invalid_value(
                "query.spatial_radius_meters",
                "must be positive",
            ));
        }
        if self.query.fulltext_index.is_empty() {
            return Err(ConfigError::invalid_value(
                "query.fulltext_index",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Resolve the model API key from the configured environment variable.
    ///
    /// Returns `None` when the variable is unset; local endpoints often
    /// need no key, so absence is not an error here.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid_config() -> SecgraphConfig {
        let mut config = SecgraphConfig::default();
        config.graph.password = "pw".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = SecgraphConfig::default();
        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.graph.database, "neo4j");
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.model.model, "gpt-4-turbo");
        assert_eq!(config.query.max_results, 50);
        assert_eq!(config.query.fulltext_limit, 10);
        assert_eq!(config.query.spatial_radius_meters, 10_000.0);
        assert_eq!(config.query.fulltext_index, "fullTextCompanyNames");
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = SecgraphConfig::default();
        let overrides = ConfigOverrides {
            graph_uri: Some("bolt://graph:7687".to_string()),
            graph_password: Some("pw".to_string()),
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.password, "pw");
        assert_eq!(config.model.model, "gpt-4o");
        // Untouched fields keep their values
        assert_eq!(config.graph.username, "neo4j");
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_password() {
        let config = SecgraphConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("graph.password"));
    }

    #[test]
    fn test_validate_rejects_nonpositive_limits() {
        let mut config = valid_config();
        config.query.fulltext_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("query.fulltext_limit"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = valid_config();
        config.model.temperature = 2.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.temperature"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.graph.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("graph.timeout_secs"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = SecgraphConfig::default();
        config.graph.uri = "bolt://graph:7687".to_string();
        config.model.model = "gpt-4o".to_string();
        config.query.fulltext_limit = 25;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SecgraphConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.graph.uri, "bolt://graph:7687");
        assert_eq!(parsed.model.model, "gpt-4o");
        assert_eq!(parsed.query.fulltext_limit, 25);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: SecgraphConfig = toml::from_str(
            r#"
            [graph]
            uri = "bolt://graph:7687"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.graph.uri, "bolt://graph:7687");
        assert_eq!(parsed.graph.database, "neo4j");
        assert_eq!(parsed.query.max_results, 50);
    }
}
