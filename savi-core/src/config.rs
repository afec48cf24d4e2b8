// Server configuration: defaults, file, environment

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Instance-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// `text` or `json`
    pub log_format: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub enable_cors: bool,
    /// Upper bound on request bodies, in bytes
    pub max_request_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5000,
            enable_cors: true,
            max_request_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Media directories and the URL prefixes they are served under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub data_dir: PathBuf,
    pub gallery_prefix: String,
    pub posters_prefix: String,
    pub uploads_prefix: String,
    /// Overrides `<data_dir>/gallery`
    pub gallery_path: Option<PathBuf>,
    /// Overrides `<data_dir>/posters`
    pub posters_path: Option<PathBuf>,
    /// Overrides `<data_dir>/uploads`
    pub uploads_path: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            gallery_prefix: "gallery".to_string(),
            posters_prefix: "posters".to_string(),
            uploads_prefix: "uploads".to_string(),
            gallery_path: None,
            posters_path: None,
            uploads_path: None,
        }
    }
}

impl AssetsConfig {
    pub fn gallery_dir(&self) -> PathBuf {
        self.gallery_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("gallery"))
    }

    pub fn posters_dir(&self) -> PathBuf {
        self.posters_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("posters"))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.uploads_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaviConfig {
    pub instance: InstanceConfig,
    pub network: NetworkConfig,
    pub assets: AssetsConfig,
}

impl SaviConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from a string, detecting the format
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<SaviConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<SaviConfig>(content) {
            return Ok(config);
        }

        // YAML accepts almost any scalar, so only take it when it is a mapping
        match serde_yaml::from_str::<serde_yaml::Value>(content) {
            Ok(serde_yaml::Value::Mapping(_)) => serde_yaml::from_str::<SaviConfig>(content)
                .map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::Parse("Unknown format".to_string())),
        }
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `SAVI_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("SAVI_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.network.bind_port = p;
            }
        }

        if let Ok(host) = std::env::var("SAVI_HOST") {
            self.network.bind_address = host;
        }

        if let Ok(data_dir) = std::env::var("SAVI_DATA_DIR") {
            self.assets.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(log_level) = std::env::var("SAVI_LOG_LEVEL") {
            self.instance.log_level = log_level;
        }

        if let Ok(log_format) = std::env::var("SAVI_LOG_FORMAT") {
            self.instance.log_format = log_format;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.bind_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.bind_port == 0 {
            return Err(ConfigError::Validation(
                "network.bind_port cannot be 0".to_string(),
            ));
        }

        if self.network.max_request_size == 0 {
            return Err(ConfigError::Validation(
                "network.max_request_size must be > 0".to_string(),
            ));
        }

        if !matches!(self.instance.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "instance.log_format must be \"text\" or \"json\", got {:?}",
                self.instance.log_format
            )));
        }

        let prefixes = [
            ("assets.gallery_prefix", &self.assets.gallery_prefix),
            ("assets.posters_prefix", &self.assets.posters_prefix),
            ("assets.uploads_prefix", &self.assets.uploads_prefix),
        ];
        for (name, prefix) in prefixes {
            if prefix.is_empty() || prefix.contains('/') || prefix.contains("..") {
                return Err(ConfigError::Validation(format!(
                    "{} must be a single non-empty path segment, got {:?}",
                    name, prefix
                )));
            }
        }
        for (i, (name, prefix)) in prefixes.iter().enumerate() {
            if prefixes[i + 1..].iter().any(|(_, other)| other == prefix) {
                return Err(ConfigError::Validation(format!(
                    "{} duplicates another asset prefix: {:?}",
                    name, prefix
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
