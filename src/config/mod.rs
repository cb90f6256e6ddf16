//! Configuration management for sitegrid
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{Node, NodeCategory};
use crate::scheduler::cron;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Defaults applied to sites created from the definition catalog
    pub sites: SiteDefaults,

    /// Node event channel settings
    pub events: EventConfig,

    /// Static node list for the in-memory node catalog
    pub nodes: Vec<Node>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

/// Catalog reconciliation defaults for newly created sites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteDefaults {
    /// Cron expression for new sites
    pub cron: String,

    /// Node category new sites route to
    pub node_type: NodeCategory,

    /// Whether new sites start enabled
    pub enabled: bool,

    /// Path of the site-definition catalog
    pub catalog_path: PathBuf,
}

/// Node event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Undelivered events buffered per subscriber
    pub channel_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/sites.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for SiteDefaults {
    fn default() -> Self {
        Self {
            cron: cron::DEFAULT_CRON.to_string(),
            node_type: NodeCategory::DOMESTIC,
            enabled: false,
            catalog_path: PathBuf::from("sites.toml"),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let sqlite_path = std::env::var("SITEGRID_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let log_level =
            std::env::var("SITEGRID_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("SITEGRID_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        let cron = std::env::var("SITEGRID_DEFAULT_CRON").unwrap_or(defaults.sites.cron);

        let node_type = match std::env::var("SITEGRID_DEFAULT_NODE_TYPE") {
            Ok(v) => NodeCategory(
                v.parse::<i8>()
                    .with_context(|| format!("Invalid SITEGRID_DEFAULT_NODE_TYPE: {v}"))?,
            ),
            Err(_) => defaults.sites.node_type,
        };

        let enabled = std::env::var("SITEGRID_DEFAULT_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(defaults.sites.enabled);

        let catalog_path = std::env::var("SITEGRID_CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.sites.catalog_path);

        let channel_capacity = std::env::var("SITEGRID_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.events.channel_capacity);

        Ok(Self {
            database: DatabaseConfig { sqlite_path },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
            sites: SiteDefaults {
                cron,
                node_type,
                enabled,
                catalog_path,
            },
            events: EventConfig { channel_capacity },
            nodes: Vec::new(),
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        cron::validate(&self.sites.cron).context("sites.cron is not a valid cron expression")?;

        if self.events.channel_capacity == 0 {
            anyhow::bail!("events.channel_capacity must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "logging.format must be 'text' or 'json', got '{}'",
                self.logging.format
            );
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                anyhow::bail!("node id {} is listed more than once", node.id);
            }
        }

        Ok(())
    }
}
