//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.secgraph/config.toml`
//! 2. Local config: `.secgraph/config.toml` (in working directory)
//! 3. CLI overrides
//!
//! Later sources override earlier ones, field by field.

use crate::error::ConfigError;
use crate::{ConfigOverrides, GraphSettings, ModelSettings, QuerySettings, SecgraphConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name, used for both global and local config.
const CONFIG_DIR: &str = ".secgraph";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.secgraph`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<SecgraphConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.secgraph`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a working directory.
    pub fn local_config_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        working_dir: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SecgraphConfig, ConfigError> {
        let mut config = SecgraphConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(working_dir)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load a config from an explicit file path, ignoring the search order.
    pub fn load_file(&self, path: &Path) -> Result<SecgraphConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        load_config_file(path)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<SecgraphConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a working directory.
    pub fn load_local(&self, working_dir: &Path) -> Result<Option<SecgraphConfig>, ConfigError> {
        let local_path = self.local_config_path(working_dir);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<SecgraphConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Overlay fields still at their default keep the base value, so a partial
/// config file only overrides what it actually sets.
fn merge_configs(base: SecgraphConfig, overlay: SecgraphConfig) -> SecgraphConfig {
    SecgraphConfig {
        graph: merge_graph(base.graph, overlay.graph),
        model: merge_model(base.model, overlay.model),
        query: merge_query(base.query, overlay.query),
    }
}

fn merge_graph(base: GraphSettings, overlay: GraphSettings) -> GraphSettings {
    let defaults = GraphSettings::default();
    GraphSettings {
        uri: pick(base.uri, overlay.uri, &defaults.uri),
        username: pick(base.username, overlay.username, &defaults.username),
        password: pick(base.password, overlay.password, &defaults.password),
        database: pick(base.database, overlay.database, &defaults.database),
        timeout_secs: if overlay.timeout_secs != defaults.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
    }
}

fn merge_model(base: ModelSettings, overlay: ModelSettings) -> ModelSettings {
    let defaults = ModelSettings::default();
    ModelSettings {
        base_url: pick(base.base_url, overlay.base_url, &defaults.base_url),
        api_key_env: pick(base.api_key_env, overlay.api_key_env, &defaults.api_key_env),
        model: pick(base.model, overlay.model, &defaults.model),
        temperature: if overlay.temperature != defaults.temperature {
            overlay.temperature
        } else {
            base.temperature
        },
        timeout_secs: if overlay.timeout_secs != defaults.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
    }
}

fn merge_query(base: QuerySettings, overlay: QuerySettings) -> QuerySettings {
    let defaults = QuerySettings::default();
    QuerySettings {
        max_results: if overlay.max_results != defaults.max_results {
            overlay.max_results
        } else {
            base.max_results
        },
        fulltext_limit: if overlay.fulltext_limit != defaults.fulltext_limit {
            overlay.fulltext_limit
        } else {
            base.fulltext_limit
        },
        spatial_radius_meters: if overlay.spatial_radius_meters != defaults.spatial_radius_meters {
            overlay.spatial_radius_meters
        } else {
            base.spatial_radius_meters
        },
        description_chunk_limit: if overlay.description_chunk_limit
            != defaults.description_chunk_limit
        {
            overlay.description_chunk_limit
        } else {
            base.description_chunk_limit
        },
        analytical_limit: if overlay.analytical_limit != defaults.analytical_limit {
            overlay.analytical_limit
        } else {
            base.analytical_limit
        },
        fulltext_index: pick(
            base.fulltext_index,
            overlay.fulltext_index,
            &defaults.fulltext_index,
        ),
    }
}

/// Overlay string wins when it differs from the field's default.
fn pick(base: String, overlay: String, default: &str) -> String {
    if overlay != default {
        overlay
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_local_config(content: &str, dir: &Path) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn create_global_config(content: &str, global_dir: &Path) {
        std::fs::create_dir_all(global_dir).unwrap();
        std::fs::write(global_dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.model.model, "gpt-4-turbo");
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_local_config(
            r#"
            [graph]
            uri = "bolt://local:7687"

            [query]
            fulltext_limit = 25
            "#,
            temp.path(),
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.graph.uri, "bolt://local:7687");
        assert_eq!(config.query.fulltext_limit, 25);
        // Unset fields keep defaults
        assert_eq!(config.query.max_results, 50);
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        create_global_config(
            r#"
            [graph]
            uri = "bolt://global:7687"

            [model]
            model = "gpt-4o"
            "#,
            &global_dir,
        );

        create_local_config(
            r#"
            [graph]
            uri = "bolt://local:7687"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        // Local override takes effect
        assert_eq!(config.graph.uri, "bolt://local:7687");
        // Global value survives where local is silent
        assert_eq!(config.model.model, "gpt-4o");
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();

        create_local_config(
            r#"
            [graph]
            uri = "bolt://local:7687"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let overrides = ConfigOverrides {
            graph_uri: Some("bolt://cli:7687".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.graph.uri, "bolt://cli:7687");
        assert_eq!(config.model.model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_file_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
            [graph]
            database = "filings"
            "#,
        )
        .unwrap();

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let config = loader.load_file(&path).unwrap();

        assert_eq!(config.graph.database, "filings");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        create_local_config("graph = not valid toml", temp.path());

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();

        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        create_global_config(
            r#"
            [model]
            model = "gpt-4o"
            "#,
            &global_dir,
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);

        let _ = loader.load_global().unwrap();
        assert!(loader.global_config.is_some());

        loader.clear_cache();
        assert!(loader.global_config.is_none());
    }
}
