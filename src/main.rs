//! adaptlb - a resource-adaptive Layer 4 TCP load balancer
//!
//! Usage:
//!     adaptlb <listen_port> <config>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use adaptlb::balance::Balancer;
use adaptlb::config::{load_config, Config, LogFormat};
use adaptlb::frontend::Listener;
use adaptlb::metrics::{MetricsCollector, MetricsServer};
use adaptlb::monitor::ResourceMonitor;

/// A resource-adaptive Layer 4 TCP load balancer.
#[derive(Parser, Debug)]
#[command(name = "adaptlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TCP port to listen on
    listen_port: u16,

    /// Path to the YAML configuration file
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    init_logging(cli.log_level.as_deref(), &config);

    if cli.validate {
        info!("configuration is valid");
        println!("Configuration is valid.");
        println!("  Service: {}", config.service_name);
        println!("  Sticky connections: {}", config.sticky_connections);
        println!("  Nodes: {}", config.nodes.len());
        for node in &config.nodes {
            println!(
                "    - {} (agent port {}, max connections {})",
                node.address, node.resource_monitor_agent_port, node.max_connections
            );
        }
        return Ok(());
    }

    info!(
        service = %config.service_name,
        config_path = %cli.config.display(),
        listen_port = cli.listen_port,
        nodes = config.nodes.len(),
        sticky = config.sticky_connections,
        "adaptlb starting"
    );

    run(cli.listen_port, config)
}

/// Wire up tracing from the CLI override and the config's global block.
/// `RUST_LOG` beats both when set.
fn init_logging(cli_level: Option<&str>, config: &Config) {
    let level = cli_level.unwrap_or(&config.global.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.global.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Run the load balancer on a multi-threaded runtime.
fn run(listen_port: u16, config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(listen_port, config))
}

/// Async entry point: wire up the balancer, pollers, metrics, and
/// listener, then wait for Ctrl+C.
async fn run_async(listen_port: u16, config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let metrics = MetricsCollector::new();

    let balancer = Arc::new(Balancer::new(&config).context("failed to build node pool")?);

    let monitor = ResourceMonitor::new(
        Arc::clone(&balancer),
        config.rma_query_interval,
        metrics.clone(),
    );
    let poller_handles = monitor.spawn(&shutdown_tx);

    if config.global.metrics.enabled {
        let server = MetricsServer::new(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            metrics.clone(),
        );
        tokio::spawn(server.run(shutdown_tx.subscribe()));
    }

    let listener = Listener::bind(
        listen_port,
        Arc::clone(&balancer),
        metrics,
        config.global.connect_timeout,
    )
    .await
    .with_context(|| format!("failed to bind listen port {}", listen_port))?;

    let accept_task = tokio::spawn(listener.run(shutdown_tx.subscribe()));

    info!("adaptlb is running, press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(());
    let _ = accept_task.await;
    for handle in poller_handles {
        let _ = handle.await;
    }

    info!("adaptlb shut down");
    Ok(())
}
