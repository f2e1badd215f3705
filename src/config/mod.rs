use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::discovery::{Endpoint, DEFAULT_CONCURRENCY};

/// Port the API listens on when the config does not set one
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default Nomad request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Environment variable naming the config file
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Errors for loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("No config file given (set CONFIG_FILE or pass --config)")]
    MissingConfigPath,
}

/// The complete configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nomad: NomadConfig,

    /// Operator-configured endpoints, merged below discovered ones
    #[serde(default)]
    pub standard_urls: Vec<StandardUrl>,

    #[serde(default)]
    pub server_config: ServerConfig,
}

/// Nomad agent connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NomadConfig {
    /// Agent address, e.g. "http://nomad.internal:4646"
    #[serde(default = "default_nomad_address")]
    pub address: String,

    /// ACL token sent as X-Nomad-Token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Allocations fetched concurrently per extraction
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl NomadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: default_nomad_address(),
            token: None,
            namespace: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn default_nomad_address() -> String {
    "http://127.0.0.1:4646".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// A statically configured directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardUrl {
    pub service: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl From<&StandardUrl> for Endpoint {
    fn from(entry: &StandardUrl) -> Self {
        Endpoint::configured(&entry.service, &entry.url, entry.icon.clone())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,
    /// 0 means "use the default port"
    #[serde(default)]
    pub port: u16,
}

impl Config {
    /// Configured endpoints in file order
    pub fn static_endpoints(&self) -> Vec<Endpoint> {
        self.standard_urls.iter().map(Endpoint::from).collect()
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse config from YAML string and fill in defaults
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if config.server_config.port == 0 {
        warn!(
            "No port specified in server config, using default port {}",
            DEFAULT_SERVER_PORT
        );
        config.server_config.port = DEFAULT_SERVER_PORT;
    }

    if config.standard_urls.is_empty() {
        warn!("No standard URLs found in config");
    }

    Ok(config)
}

/// Pick the config path: explicit argument first, then the environment value
pub fn resolve_config_path(
    explicit: Option<&Path>,
    from_env: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| {
            from_env
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .ok_or(ConfigError::MissingConfigPath)
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load and parse a config file from disk
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Load the config named by `explicit` or the CONFIG_FILE environment variable
pub fn load_from_environment(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let from_env = std::env::var(CONFIG_FILE_ENV).ok();
    let path = resolve_config_path(explicit, from_env.as_deref())?;
    load_config_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
nomad:
  address: http://nomad.internal:4646
  token: secret
  timeout_secs: 3
  concurrency: 2
standard_urls:
  - service: grafana
    url: https://grafana.example.com
    icon: mdi:chart-line
  - service: nas
    url: http://nas.lan
server_config:
  host: 0.0.0.0
  port: 9090
"#;

        let config = parse_config(yaml).unwrap();
        assert_eq!(config.nomad.address, "http://nomad.internal:4646");
        assert_eq!(config.nomad.token.as_deref(), Some("secret"));
        assert_eq!(config.nomad.timeout(), Duration::from_secs(3));
        assert_eq!(config.nomad.concurrency, 2);
        assert_eq!(config.standard_urls.len(), 2);
        assert_eq!(config.standard_urls[0].icon.as_deref(), Some("mdi:chart-line"));
        assert!(config.standard_urls[1].icon.is_none());
        assert_eq!(config.server_config.host, "0.0.0.0");
        assert_eq!(config.server_config.port, 9090);
    }

    #[test]
    fn test_defaults() {
        let config = parse_config("nomad:\n  address: http://nomad:4646\n").unwrap();
        assert_eq!(config.server_config.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.nomad.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.nomad.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.nomad.namespace.is_none());
        assert!(config.standard_urls.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_config("standard_urls: [ {service: a");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_static_endpoints_keep_order() {
        let config = parse_config(
            "standard_urls:\n  - service: b\n    url: http://b\n  - service: a\n    url: http://a\n    icon: x\n",
        )
        .unwrap();

        let endpoints = config.static_endpoints();
        assert_eq!(endpoints[0].service, "b");
        assert_eq!(endpoints[1].icon.as_deref(), Some("x"));
        assert!(endpoints.iter().all(|e| !e.fetched));
    }

    #[test]
    fn test_resolve_config_path() {
        let explicit = Path::new("/etc/molecule.yaml");
        assert_eq!(
            resolve_config_path(Some(explicit), Some("/other.yaml")).unwrap(),
            PathBuf::from("/etc/molecule.yaml")
        );
        assert_eq!(
            resolve_config_path(None, Some("/other.yaml")).unwrap(),
            PathBuf::from("/other.yaml")
        );
        assert!(matches!(
            resolve_config_path(None, Some("")),
            Err(ConfigError::MissingConfigPath)
        ));
        assert!(matches!(
            resolve_config_path(None, None),
            Err(ConfigError::MissingConfigPath)
        ));
    }

    #[test]
    fn test_load_config_file() {
        let file = create_temp_file("standard_urls:\n  - service: nas\n    url: http://nas.lan\n");
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.standard_urls[0].service, "nas");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
