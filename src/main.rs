// proc-attrib-exporter - version 0.1.0
// Prometheus exporter attributing per-process CPU and memory usage to pages
mod cli;
mod collector;
mod commands;
mod config;
mod distributor;
mod graph;
mod handlers;
mod health_stats;
mod measurement;
mod metrics;
mod state;
mod topology;

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use prometheus::{Gauge, Registry};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{
    net::TcpListener,
    signal,
    sync::{Mutex, Notify, RwLock},
    time::interval,
};
use tracing::{debug, error, info, Level};

use crate::cli::{Args, Commands, ConfigFormat, LogLevel};
use crate::collector::Collector;
use crate::config::{
    resolve_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
    DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_TOPOLOGY_PATH,
};
use crate::distributor::MeasurementDistributor;
use crate::health_stats::{HealthObserver, HealthStats};
use crate::metrics::AttributionMetrics;
use crate::state::{AppState, CycleStatus, SharedState};
use crate::topology::Topology;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = resolve_config(&args)?;
        setup_logging(&config, &args);

        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }

        return match command {
            Commands::Check {
                proc,
                topology,
                all,
            } => commands::command_check(*proc, *topology, *all, &config),
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), format, *commented),
            Commands::Topology { verbose } => commands::command_topology(&config, *verbose),
            Commands::Test {
                iterations,
                verbose,
                interval_secs,
            } => commands::command_test(*iterations, *verbose, *interval_secs, &config),
            Commands::Generate {
                output,
                processes,
                pages,
                max_frames_per_page,
            } => commands::command_generate(
                output.clone(),
                *processes,
                *pages,
                *max_frames_per_page,
            ),
        };
    }

    // Load configuration for main server mode
    let config = resolve_config(&args)?;

    // Validate config before starting the exporter
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    // Setup logging subsystem first to enable proper logging
    setup_logging(&config, &args);

    info!("Starting proc-attrib-exporter");

    // Determine bind ip and port from effective config
    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Configure parallel measurement thread pool if specified
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    // Build the coordination graph from the topology file
    let topology_path = config
        .topology
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOPOLOGY_PATH));
    let topology = Topology::load(&topology_path)?;
    let graph = topology.build_graph()?;
    info!(
        "Coordination graph ready: {} processes, {} pages, {} frames",
        graph.process_count(),
        graph.page_count(),
        graph.frame_count()
    );

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    // Create and register all metric sets
    let metrics = AttributionMetrics::new(&registry)?;
    let scrape_duration = Gauge::new(
        "proc_attrib_scrape_duration_seconds",
        "Time spent serving /metrics request",
    )?;
    let processes_total = Gauge::new(
        "proc_attrib_processes_total",
        "Number of processes in the coordination graph",
    )?;
    let pages_total = Gauge::new(
        "proc_attrib_pages_total",
        "Number of pages in the coordination graph",
    )?;
    let cycle_duration = Gauge::new(
        "proc_attrib_cycle_duration_seconds",
        "Time spent running the last measurement cycle",
    )?;
    let cycle_success = Gauge::new(
        "proc_attrib_cycle_success",
        "Whether the last measurement cycle succeeded (1) or failed (0)",
    )?;
    let cycle_running = Gauge::new(
        "proc_attrib_cycle_running",
        "Whether a measurement cycle is currently in progress (1) or idle (0)",
    )?;

    if config.enable_telemetry.unwrap_or(true) {
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(processes_total.clone()))?;
        registry.register(Box::new(pages_total.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(cycle_success.clone()))?;
        registry.register(Box::new(cycle_running.clone()))?;
    }

    debug!("All metrics registered successfully");

    // Wire the health observer into the distributor's completion broadcast
    let health_stats = Arc::new(HealthStats::new());
    let mut distributor = MeasurementDistributor::new();
    distributor.add_observer(Box::new(HealthObserver::new(health_stats.clone())));

    // Create shared application state
    let state = Arc::new(AppState {
        registry,
        metrics,
        scrape_duration,
        processes_total,
        pages_total,
        cycle_duration,
        cycle_success,
        cycle_running,
        graph: RwLock::new(graph),
        distributor: Mutex::new(distributor),
        collector: Collector::new(),
        cycle_status: RwLock::new(CycleStatus::default()),
        config: Arc::new(config.clone()),
        health_stats: health_stats.clone(),
        cycle_ready: Arc::new(Notify::new()),
    });

    // Run an initial measurement cycle before starting the server
    info!("Running initial measurement cycle");
    if let Err(e) = run_measurement_cycle(&state).await {
        error!("Initial measurement cycle failed: {}", e);
    } else {
        info!("Initial measurement cycle completed successfully");
    }

    // Start background measurement task
    let bg_state = state.clone();
    let period = Duration::from_secs(
        state
            .config
            .scan_interval_secs
            .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
    );

    let background_task = tokio::spawn(async move {
        let mut int = interval(period);
        debug!(
            "Background measurement task started with {}s interval",
            period.as_secs()
        );

        loop {
            int.tick().await;
            debug!("Starting scheduled measurement cycle");
            if let Err(e) = run_measurement_cycle(&bg_state).await {
                error!("Scheduled measurement cycle failed: {}", e);
            } else {
                debug!("Scheduled measurement cycle completed");
            }
        }
    });

    // Configure HTTP server routes and start listening
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new().route("/metrics", get(handlers::metrics_handler));

    // Conditionally add health endpoint
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(handlers::health_handler));
    }

    let app = app.with_state(state.clone());

    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            info!("proc-attrib-exporter listening on https://{}", addr);

            let server = axum_server::bind_rustls(addr, tls).serve(app.into_make_service());
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                        return Err(e.into());
                    }
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, exiting...");
                }
            }
        }
        _ => {
            let listener = TcpListener::bind(addr).await?;
            info!("proc-attrib-exporter listening on http://{}", addr);

            let server = axum::serve(listener, app).into_future();
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                        return Err(e.into());
                    }
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, exiting...");
                }
            }
        }
    }

    // Cleanup: cancel background task before exit
    background_task.abort();
    let _ = background_task.await;

    info!("proc-attrib-exporter stopped gracefully");
    Ok(())
}

/// Collects one measurement batch and distributes it over the graph.
async fn run_measurement_cycle(state: &SharedState) -> Result<()> {
    let start = Instant::now();

    {
        let mut status = state.cycle_status.write().await;
        status.in_progress = true;
    }
    state.cycle_running.set(1.0);

    let pids = state.graph.read().await.pids();
    let batch = state.collector.collect_batch(&pids);
    let measured = batch.len();

    {
        let mut distributor = state.distributor.lock().await;
        let mut graph = state.graph.write().await;
        distributor.distribute(&mut graph, &batch);
    }

    let duration = start.elapsed().as_secs_f64();
    let success = measured > 0 || pids.is_empty();

    {
        let mut status = state.cycle_status.write().await;
        status.in_progress = false;
        status.success = success;
        status.duration_seconds = duration;
        status.last_completed = Some(Instant::now());
    }
    state.cycle_running.set(0.0);
    state.health_stats.record_cycle(measured as u64, duration);
    state.cycle_ready.notify_waiters();

    if success {
        debug!(
            "Measurement cycle completed: {} of {} processes measured in {:.3}s",
            measured,
            pids.len(),
            duration
        );
        Ok(())
    } else {
        Err(anyhow!("no process in the topology could be measured"))
    }
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Shows configuration in requested format.
fn show_config(config: &Config, format: &ConfigFormat) -> Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config, args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR, // Off not fully supported, use ERROR as minimal
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    if config.enable_file_logging.unwrap_or(false) {
        if let Some(path) = &config.log_file {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    let subscriber = tracing_subscriber::fmt()
                        .with_max_level(log_level)
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file))
                        .finish();
                    tracing::subscriber::set_global_default(subscriber)
                        .expect("Failed to set tracing subscriber");
                    info!("Logging initialized with level: {:?}", args.log_level);
                    return;
                }
                Err(e) => {
                    eprintln!("Failed to open log file {}: {}", path.display(), e);
                }
            }
        }
    }

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}
