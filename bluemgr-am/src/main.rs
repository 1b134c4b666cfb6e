//! bluemgr-am (Audio Manager) - Bluetooth audio manager service
//!
//! Starts the priority arbitration loop and the HTTP API.

use anyhow::{Context, Result};
use bluemgr_am::api::{self, AppState};
use bluemgr_am::arbitrator::{Arbitrator, ArbitratorConfig};
use bluemgr_am::configurator::SinkConfigurator;
use bluemgr_am::executor::{CommandRunner, ProcessRunner};
use bluemgr_am::manager::AudioManager;
use bluemgr_am::retry::{Sleeper, TokioSleeper};
use bluemgr_common::config::{ConfigResolver, TomlConfig};
use bluemgr_common::events::EventBus;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments; each overrides the config file
#[derive(Parser, Debug)]
#[command(name = "bluemgr-am")]
#[command(about = "Bluetooth audio manager service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "BLUEMGR_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(long, env = "BLUEMGR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Disable the priority arbitration loop
    #[arg(long)]
    no_arbitration: bool,
}

impl Args {
    fn apply(&self, config: &mut TomlConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind.to_string();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.no_arbitration {
            config.arbitration.enabled = false;
        }
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "bluemgr_am={level},bluemgr_common={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone());
    let mut config = resolver.load().context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging.level);

    info!(
        "Starting bluemgr Audio Manager (bluemgr-am) v{} [{}] built {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TARGET")
    );
    match resolver.locate() {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let runner: Arc<dyn CommandRunner> =
        Arc::new(ProcessRunner::new(Duration::from_secs(config.commands.timeout_secs)));
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let events = EventBus::default();

    let manager = Arc::new(AudioManager::new(runner, sleeper, &config, events.clone()));
    manager.ensure_modules().await;

    let arbitrator = if config.arbitration.enabled {
        let audio = manager.subsystems().audio.clone();
        let arbitrator = Arbitrator::new(
            audio.clone(),
            SinkConfigurator::new(audio),
            ArbitratorConfig::from(&config.arbitration),
            events.clone(),
        );
        Some(Arc::new(arbitrator).spawn())
    } else {
        info!("Priority arbitration disabled");
        None
    };

    let bind: IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;
    let addr = SocketAddr::new(bind, config.port);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let state = AppState { manager, events };
    let served = api::serve(addr, state, shutdown).await;

    if let Some(handle) = arbitrator {
        handle.stop().await;
    }

    served.context("HTTP server failed")?;
    info!("bluemgr-am stopped");
    Ok(())
}
