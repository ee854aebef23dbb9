//! CLI arguments and subcommands for proc-attrib-exporter.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "proc-attrib-exporter",
    about = "Prometheus exporter attributing per-process CPU and memory usage to pages",
    long_about = "Prometheus exporter attributing per-process CPU and memory usage to pages.\n\n\
                  Maintains a coordination graph of processes, frames, and pages described by a \
                  topology file, samples per-process CPU time and private memory from /proc, and \
                  exports both the raw process values and the per-page estimates.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Topology file describing processes, pages, and frames
    #[arg(short = 't', long)]
    pub topology: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Seconds between measurement batches
    #[arg(long)]
    pub scan_interval: Option<u64>,

    /// Disable /health endpoint + health metrics
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal exporter telemetry metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Parallel measurement threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// TLS certificate file (PEM); requires --tls-key
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key file (PEM); requires --tls-cert
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check /proc filesystem access
        #[arg(long)]
        proc: bool,

        /// Check the topology file
        #[arg(long)]
        topology: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Load the topology file and print the resulting graph
    Topology {
        /// Show per-process frame details
        #[arg(long)]
        verbose: bool,
    },

    /// Run measurement cycles in the foreground and print the results
    Test {
        /// Number of measurement cycles
        #[arg(short = 'n', long, default_value_t = 2)]
        iterations: usize,

        /// Show detailed per-process information
        #[arg(long)]
        verbose: bool,

        /// Seconds to sleep between cycles
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
    },

    /// Generate a synthetic topology file
    Generate {
        /// Output file path
        #[arg(short = 'o', long, default_value = "topology.yaml")]
        output: PathBuf,

        /// Number of processes to generate
        #[arg(long, default_value_t = 4)]
        processes: usize,

        /// Number of pages to generate
        #[arg(long, default_value_t = 3)]
        pages: usize,

        /// Maximum frames per page
        #[arg(long, default_value_t = 2)]
        max_frames_per_page: usize,
    },
}
