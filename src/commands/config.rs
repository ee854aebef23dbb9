//! Config command implementation.
//!
//! Generates configuration files in the supported formats.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: &ConfigFormat,
    commented: bool,
) -> Result<()> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("proc-attrib-exporter.yaml"),
    };

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(&config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# proc-attrib-exporter Configuration
# ==================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9316                   # HTTP port
#
# Attribution
# -----------
# topology: "./topology.yaml"  # Topology file (processes, pages, frames)
# scan_interval_secs: 10       # Seconds between measurement batches
# parallelism: null            # Parallel measurement threads (null = auto)
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable internal exporter metrics
# enable_cpu: true             # Export CPU metrics
# enable_memory: true          # Export memory metrics
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
# enable_file_logging: false   # Enable file logging
# log_file: null               # Log file path (null = stderr)
#
# TLS
# ---
# tls_cert: null               # TLS certificate file (PEM)
# tls_key: null                # TLS private key file (PEM)
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_yaml_still_parses() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let commented = add_config_comments(yaml);
        let parsed: Config = serde_yaml::from_str(&commented).unwrap();
        assert_eq!(parsed.port, Config::default().port);
    }
}
