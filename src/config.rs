//! Configuration file parsing
//!
//! Parses TOML configuration files for the NVMe-oF target.

use crate::transport::{AddressFamily, TransportId, TransportType};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Target configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target settings
    pub target: TargetSettings,

    /// Listener configurations
    #[serde(default)]
    pub listener: Vec<ListenerConfig>,
}

/// Target settings
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    /// Maximum queue depth per queue pair
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: u16,

    /// Maximum queue pairs per controller
    #[serde(default = "default_max_qpairs_per_ctrlr")]
    pub max_qpairs_per_ctrlr: u16,

    /// Maximum in-capsule data size in bytes
    #[serde(default = "default_in_capsule_data_size")]
    pub in_capsule_data_size: u32,

    /// Maximum I/O size in bytes
    #[serde(default = "default_max_io_size")]
    pub max_io_size: u32,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_queue_depth() -> u16 {
    128
}

fn default_max_qpairs_per_ctrlr() -> u16 {
    64
}

fn default_in_capsule_data_size() -> u32 {
    4096
}

fn default_max_io_size() -> u32 {
    131072
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Transport type (tcp, rdma, fc)
    pub trtype: String,

    /// Address family (ipv4, ipv6, ib, fc)
    pub adrfam: String,

    /// Fabric address
    pub traddr: String,

    /// Transport service id (port)
    pub trsvcid: String,
}

impl ListenerConfig {
    /// Resolve into a transport identifier
    pub fn to_trid(&self) -> Result<TransportId, ConfigError> {
        let trtype = TransportType::parse(&self.trtype).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown transport type: {}", self.trtype))
        })?;
        let adrfam = AddressFamily::parse(&self.adrfam).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown address family: {}", self.adrfam))
        })?;
        Ok(TransportId::new(
            trtype,
            adrfam,
            self.traddr.clone(),
            self.trsvcid.clone(),
        ))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        // Check for duplicate listeners; trtype/adrfam strings must resolve
        let mut seen = std::collections::HashSet::new();
        for listener in &self.listener {
            let trid = listener.to_trid()?;
            if !seen.insert(trid.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate listener: {}",
                    trid
                )));
            }
        }
        Ok(())
    }
}
