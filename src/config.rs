//! Configuration for ovd-modules
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/ovd-modules/config.toml)
//! - User configuration (~/.config/ovd-modules/config.toml)
//! - Project configuration (./ovd-modules.toml)
//! - Environment variables (`OVD_MODULES_*`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, ErrorContext, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP settings for directory listing fetches
    pub http: HttpConfig,

    /// Session manager administration service settings
    pub admin: AdminConfig,

    /// Session purge settings
    pub sessions: SessionsConfig,

    /// Slave server role CLI settings
    pub role: RoleConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout: u64,

    /// Validate TLS certificates of listing servers
    pub validate_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            validate_certs: true,
        }
    }
}

/// Administration service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// URL scheme of the service
    pub scheme: String,

    /// Service path on the session manager host
    pub endpoint_path: String,

    /// Namespace of the service operations, also used for `SOAPAction`
    pub namespace: String,

    /// Host used when the module does not set one
    pub default_host: String,

    /// Login used when the module does not set one
    pub default_user: String,

    /// Password used when the module does not set one
    pub default_password: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Session managers usually run with self-signed certificates
    pub validate_certs: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            endpoint_path: "/ovd/service/admin".to_string(),
            namespace: "urn:ovd".to_string(),
            default_host: "127.0.0.1".to_string(),
            default_user: "admin".to_string(),
            default_password: "admin".to_string(),
            timeout: 30,
            validate_certs: false,
        }
    }
}

/// Session purge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Delay between two session listings while purging
    pub poll_interval_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl SessionsConfig {
    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Slave server role CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Role management executable
    pub command: String,

    /// Seconds before a role command is abandoned
    pub timeout: Option<u64>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            command: "ovd-slaveserver-role".to_string(),
            timeout: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when no environment filter is set
    pub level: String,

    /// Emit JSON log lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from the standard locations
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "Loading configuration file");
                config = config.merge_from_file(&path)?;
            } else if config_path == Some(&path) {
                return Err(Error::FileNotFound(path));
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = vec![PathBuf::from("/etc/ovd-modules/config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ovd-modules").join("config.toml"));
        }

        paths.push(PathBuf::from("./ovd-modules.toml"));

        paths
    }

    /// Parse a configuration file and layer it over this one
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => toml::from_str(&content).or_else(|_| {
                serde_yaml::from_str(&content).map_err(|e| {
                    Error::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })
            })?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; values that differ from the
    /// defaults in `other` win.
    fn merge(&self, other: Config) -> Config {
        let defaults = Config::default();

        macro_rules! pick {
            ($($field:ident).+) => {
                if other.$($field).+ != defaults.$($field).+ {
                    other.$($field).+.clone()
                } else {
                    self.$($field).+.clone()
                }
            };
        }

        Config {
            http: HttpConfig {
                timeout: pick!(http.timeout),
                validate_certs: pick!(http.validate_certs),
            },
            admin: AdminConfig {
                scheme: pick!(admin.scheme),
                endpoint_path: pick!(admin.endpoint_path),
                namespace: pick!(admin.namespace),
                default_host: pick!(admin.default_host),
                default_user: pick!(admin.default_user),
                default_password: pick!(admin.default_password),
                timeout: pick!(admin.timeout),
                validate_certs: pick!(admin.validate_certs),
            },
            sessions: SessionsConfig {
                poll_interval_ms: pick!(sessions.poll_interval_ms),
            },
            role: RoleConfig {
                command: pick!(role.command),
                timeout: pick!(role.timeout),
            },
            logging: LoggingConfig {
                level: pick!(logging.level),
                json: pick!(logging.json),
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // OVD_MODULES_HTTP_TIMEOUT
        if let Ok(timeout) = std::env::var("OVD_MODULES_HTTP_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.http.timeout = n;
            }
        }

        // OVD_MODULES_ADMIN_HOST
        if let Ok(host) = std::env::var("OVD_MODULES_ADMIN_HOST") {
            self.admin.default_host = host;
        }

        // OVD_MODULES_ADMIN_USER
        if let Ok(user) = std::env::var("OVD_MODULES_ADMIN_USER") {
            self.admin.default_user = user;
        }

        // OVD_MODULES_ADMIN_PASSWORD
        if let Ok(password) = std::env::var("OVD_MODULES_ADMIN_PASSWORD") {
            self.admin.default_password = password;
        }

        // OVD_MODULES_POLL_INTERVAL_MS
        if let Ok(interval) = std::env::var("OVD_MODULES_POLL_INTERVAL_MS") {
            if let Ok(n) = interval.parse() {
                self.sessions.poll_interval_ms = n;
            }
        }

        // OVD_MODULES_ROLE_COMMAND
        if let Ok(command) = std::env::var("OVD_MODULES_ROLE_COMMAND") {
            self.role.command = command;
        }

        // OVD_MODULES_LOG_JSON
        if std::env::var("OVD_MODULES_LOG_JSON").is_ok() {
            self.logging.json = true;
        }
    }
}
