//! ConfigTool agent binary
//!
//! Loads `config.yml`, connects to the server and runs until `quit` on stdin
//! or Ctrl-C.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use configtool_agent::config::{self, AgentConfig, ConfigError};
use configtool_agent::connection::{ConnectionSettings, ConnectionSupervisor, Outbound};
use configtool_agent::files::FileStore;
use configtool_agent::host::{ControlThread, PipeHost};
use configtool_agent::router::{RequestRouter, RouterSettings};
use configtool_agent::telemetry::{
    spawn_producer, ConsoleBuffer, ConsoleCapture, ConsoleSource, EconomyTracker,
    MetricsCollector, PerformanceTracker,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Pause between closing and reopening on the `reconnect` command
const RECONNECT_COMMAND_DELAY: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "configtool-agent", version, about)]
struct Args {
    /// Path to config.yml (created with defaults if missing)
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to prepare {path}: {source}")]
    DataRoot { path: PathBuf, source: io::Error },

    #[error("Failed to start control thread: {0}")]
    ControlThread(io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let console = ConsoleBuffer::new(config::ConsoleModule::default().buffer_size);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ConsoleCapture::new(console.clone()))
        .init();

    match run(&args.config, console).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[agent] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &Path, console: ConsoleBuffer) -> Result<(), StartupError> {
    let config = config::load(config_path)?;
    console.set_capacity(config.modules.console.buffer_size);

    std::fs::create_dir_all(&config.data_root).map_err(|source| StartupError::DataRoot {
        path: config.data_root.clone(),
        source,
    })?;
    info!("[agent] Publishing {} as plugins/", config.data_root.display());

    let files = FileStore::new(&config.data_root, config.files.max_file_size);
    let mut router = RequestRouter::new(files, RouterSettings::from_config(&config));
    match &config.console.command_pipe {
        Some(pipe) => {
            let control = ControlThread::spawn(PipeHost::new(pipe))
                .map_err(StartupError::ControlThread)?;
            router = router.with_control(control);
            info!("[agent] Console commands go to {}", pipe.display());
        }
        None => warn!("[agent] No console.command-pipe configured; host commands are unavailable"),
    }

    let supervisor = ConnectionSupervisor::new(ConnectionSettings::from_config(&config), router);
    supervisor.connect();

    let cancel = CancellationToken::new();
    let producers = spawn_producers(&config, &console, supervisor.outbound(), &cancel);
    info!("[agent] ConfigTool agent enabled");

    operator_console(config_path, &supervisor).await;

    info!("[agent] Shutting down");
    cancel.cancel();
    for producer in producers {
        let _ = producer.await;
    }
    supervisor.disconnect().await;
    info!("[agent] ConfigTool agent disabled");
    Ok(())
}

fn spawn_producers(
    config: &AgentConfig,
    console: &ConsoleBuffer,
    outbound: Outbound,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let modules = &config.modules;
    let mut producers = Vec::new();

    if modules.dashboard.enabled {
        producers.push(spawn_producer(
            MetricsCollector::new(&config.data_root),
            Duration::from_secs(modules.dashboard.metrics_interval_seconds),
            outbound.clone(),
            cancel.clone(),
        ));
    }
    if modules.console.enabled {
        producers.push(spawn_producer(
            ConsoleSource::new(console.clone()),
            Duration::from_secs(modules.console.flush_interval_seconds),
            outbound.clone(),
            cancel.clone(),
        ));
    }
    if modules.analytics.tracks_players() {
        info!("[agent] No player event feed available, player tracking disabled");
    }
    if modules.economy.enabled {
        let tracker = EconomyTracker::new(None);
        if tracker.has_provider() {
            producers.push(spawn_producer(
                tracker,
                Duration::from_secs(modules.economy.snapshot_interval_seconds),
                outbound.clone(),
                cancel.clone(),
            ));
        } else {
            info!("[agent] No economy provider available, economy snapshots disabled");
        }
    }
    if modules.performance.enabled {
        producers.push(spawn_producer(
            PerformanceTracker::new(),
            Duration::from_secs(modules.performance.sample_interval_seconds),
            outbound,
            cancel.clone(),
        ));
    }

    producers
}

/// Operator commands on stdin until `quit` or Ctrl-C.
async fn operator_console(config_path: &Path, supervisor: &ConnectionSupervisor) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Detached from a terminal; keep running until Ctrl-C
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("[agent] stdin: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };

                match line.trim().to_lowercase().as_str() {
                    "" => {}
                    "status" => match supervisor.last_error() {
                        Some(e) => info!("[agent] Status: {} (last error: {})", supervisor.state(), e),
                        None => info!("[agent] Status: {}", supervisor.state()),
                    },
                    "reconnect" => {
                        info!("[agent] Reconnecting...");
                        supervisor.disconnect().await;
                        tokio::time::sleep(RECONNECT_COMMAND_DELAY).await;
                        supervisor.connect();
                    }
                    "reload" => match config::load(config_path) {
                        Ok(config) => {
                            supervisor.update_endpoint(config.server_url, config.token);
                            info!("[agent] Config reloaded; endpoint applies from the next connection");
                        }
                        Err(e) => warn!("[agent] Reload failed: {}", e),
                    },
                    "quit" | "exit" | "stop" => break,
                    _ => info!("[agent] Usage: status | reconnect | reload | quit"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_producer_without_a_feed() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AgentConfig {
            data_root: dir.path().to_path_buf(),
            ..AgentConfig::default()
        };
        config.modules.dashboard.enabled = false;
        config.modules.console.enabled = false;
        config.modules.performance.enabled = false;
        assert!(config.modules.analytics.tracks_players());
        config.modules.economy.enabled = true;

        let router = RequestRouter::new(
            FileStore::new(dir.path(), configtool_agent::files::DEFAULT_MAX_FILE_SIZE),
            RouterSettings::from_config(&config),
        );
        let supervisor =
            ConnectionSupervisor::new(ConnectionSettings::from_config(&config), router);
        let cancel = CancellationToken::new();

        let producers = spawn_producers(
            &config,
            &ConsoleBuffer::new(10),
            supervisor.outbound(),
            &cancel,
        );
        assert!(producers.is_empty());

        config.modules.performance.enabled = true;
        let producers = spawn_producers(
            &config,
            &ConsoleBuffer::new(10),
            supervisor.outbound(),
            &cancel,
        );
        assert_eq!(producers.len(), 1);
        cancel.cancel();
        for producer in producers {
            producer.await.unwrap();
        }
    }
}
