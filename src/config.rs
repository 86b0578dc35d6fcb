//! Configuration loaded from `claimboard.toml`.
//!
//! Layered file → environment → CLI. A missing file means defaults; a file
//! without `[[navigation]]` entries uses the built-in catalog.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 3142
//! host = "127.0.0.1"
//! dev_mode = false
//!
//! [store]
//! db_path = ".claimboard/claimboard.db"
//! feed_capacity = 256
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! file = ".claimboard/logs/claimboard.log"
//!
//! [[navigation]]
//! id = "dept-board"
//! label = "Department board"
//! path = "/offices/:officeId/departments/:departmentId/board"
//! roles = ["owner", "org_admin", "office_admin", "dept_manager", "member"]
//! contexts = ["department"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::access::NavEntry;
use crate::access::nav::default_catalog;
use crate::server::ServerConfig;

pub const CONFIG_FILE: &str = "claimboard.toml";

pub const ENV_PORT: &str = "CLAIMBOARD_PORT";
pub const ENV_DB: &str = "CLAIMBOARD_DB";
pub const ENV_LOG: &str = "CLAIMBOARD_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_port() -> u16 {
    3142
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Live feed buffer per subscriber before it lags.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".claimboard/claimboard.db")
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `claimboard=debug,tower_http=warn`.
    #[serde(default = "default_level")]
    pub level: String,
    /// `compact`, or `json` (alias `jsonl`).
    #[serde(default = "default_format")]
    pub format: String,
    /// Daily-rolling log file; console only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "compact".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

pub const LOG_FORMATS: &[&str] = &["compact", "json", "jsonl"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub navigation: Vec<NavEntry>,
}

impl ClaimboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse claimboard.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize claimboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `CLAIMBOARD_*` environment overrides.
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; returns warnings for values that could
    /// not be used.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(port) = lookup(ENV_PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warnings.push(format!("Ignoring {ENV_PORT}='{port}': not a port number")),
            }
        }
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.store.db_path = PathBuf::from(db);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        warnings
    }

    /// Configured navigation, or the built-in catalog when none is declared.
    pub fn catalog(&self) -> Vec<NavEntry> {
        if self.navigation.is_empty() {
            default_catalog()
        } else {
            self.navigation.clone()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.store.db_path.clone(),
            feed_capacity: self.store.feed_capacity,
            dev_mode: self.server.dev_mode,
            catalog: self.catalog(),
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !LOG_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            warnings.push(format!(
                "Unknown logging format '{}': expected one of {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            ));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            warnings.push(format!("Invalid logging level '{}': {}", self.logging.level, e));
        }
        if self.store.feed_capacity == 0 {
            warnings.push("store.feed_capacity is 0; using 1".to_string());
        }

        let mut seen = HashSet::new();
        for entry in &self.navigation {
            if !seen.insert(entry.id.as_str()) {
                warnings.push(format!("Duplicate navigation id '{}'", entry.id));
            }
            for placeholder in entry.unknown_placeholders() {
                warnings.push(format!(
                    "Navigation '{}' uses unknown placeholder '{}'",
                    entry.id, placeholder
                ));
            }
            if entry.roles.is_empty() {
                warnings.push(format!("Navigation '{}' lists no roles and is never shown", entry.id));
            }
            if entry.contexts.is_empty() {
                warnings.push(format!(
                    "Navigation '{}' lists no contexts and is never shown",
                    entry.id
                ));
            }
        }

        warnings
    }
}
