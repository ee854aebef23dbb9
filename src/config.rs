//! Layered configuration for proc-attrib-exporter.
//!
//! Precedence: CLI flags > config file > defaults. Config files are loaded
//! from an explicit `--config` path or from a set of default locations, with
//! the parser chosen by file extension (YAML default, JSON, TOML).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::Args;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9316;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TOPOLOGY_PATH: &str = "./topology.yaml";

/// Effective exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind: Option<String>,
    pub port: Option<u16>,

    // Attribution
    pub topology: Option<PathBuf>,
    pub scan_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,
    pub enable_cpu: Option<bool>,
    pub enable_memory: Option<bool>,

    // Logging
    pub log_level: Option<String>,
    pub enable_file_logging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    // TLS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            topology: Some(PathBuf::from(DEFAULT_TOPOLOGY_PATH)),
            scan_interval_secs: Some(DEFAULT_SCAN_INTERVAL_SECS),
            parallelism: None,
            enable_health: Some(true),
            enable_telemetry: Some(true),
            enable_cpu: Some(true),
            enable_memory: Some(true),
            log_level: Some("info".into()),
            enable_file_logging: Some(false),
            log_file: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<()> {
    // Metrics flags: at least one must be true
    let enable_cpu = cfg.enable_cpu.unwrap_or(true);
    let enable_memory = cfg.enable_memory.unwrap_or(true);
    if !(enable_cpu || enable_memory) {
        bail!("At least one of enable_cpu/enable_memory must be true");
    }

    if let Some(interval) = cfg.scan_interval_secs {
        if interval == 0 {
            bail!("scan_interval_secs must be at least 1");
        }
    }

    // TLS cert and key only make sense together
    if cfg.tls_cert.is_some() != cfg.tls_key.is_some() {
        bail!("tls_cert and tls_key must both be configured to enable TLS");
    }

    Ok(())
}

/// Loads configuration from a file path or the default search locations.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        // Try default locations
        let defaults = [
            "/etc/proc-attrib-exporter/config.yaml",
            "/etc/proc-attrib-exporter/config.yml",
            "/etc/proc-attrib-exporter/config.json",
            "./proc-attrib-exporter.yaml",
            "./proc-attrib-exporter.yml",
            "./proc-attrib-exporter.json",
        ];

        match defaults.iter().find(|p| Path::new(p).exists()) {
            Some(found) => PathBuf::from(found),
            None => return Ok(Config::default()),
        }
    };

    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
///
/// Precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override values the user supplied on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(topology) = &args.topology {
        config.topology = Some(topology.clone());
    }
    if let Some(interval) = args.scan_interval {
        config.scan_interval_secs = Some(interval);
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert = Some(cert.clone());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key = Some(key.clone());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}
