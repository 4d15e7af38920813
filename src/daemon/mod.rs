pub mod analyzer;
pub mod orchestrator;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

use crate::daemon::analyzer::{AnalysisRunner, DiveCli};
use crate::daemon::orchestrator::Orchestrator;
use crate::daemon::registry::JobRegistry;
use crate::models::DaemonConfig;
use crate::server::{self, AppState};
use crate::storage::history::FsHistoryStore;
use crate::storage::HistoryStore;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

fn read_config_file(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DaemonConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Load the DaemonConfig, first match wins:
///   1. `config_path` (must exist when given)
///   2. `$DIVE_IN_CONFIG_DIR/config.json`
///   3. platform config dir `dive-in/config.json`
///   4. `{data_dir}/config.json`
///   5. `DaemonConfig::default()`
pub fn load_config(config_path: Option<&Path>) -> Result<DaemonConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return read_config_file(path);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var("DIVE_IN_CONFIG_DIR") {
        let path = PathBuf::from(config_dir).join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("dive-in").join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    let path = resolve_data_dir(None).join("config.json");
    if path.exists() {
        return read_config_file(&path);
    }

    tracing::info!("No config file found, using defaults");
    Ok(DaemonConfig::default())
}

/// Resolve the data directory: explicit override, then `$DIVE_IN_DATA_DIR`,
/// then the platform data dir (`~/.local/share/dive-in` on Linux).
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("DIVE_IN_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dive-in")
}

/// Data dir for a loaded config: CLI override, then config, then default.
pub fn effective_data_dir(config: &DaemonConfig, override_dir: Option<&Path>) -> PathBuf {
    match (override_dir, config.data_dir.as_deref()) {
        (Some(dir), _) => dir.to_path_buf(),
        (None, Some(dir)) => dir.to_path_buf(),
        (None, None) => resolve_data_dir(None),
    }
}

pub async fn create_data_dirs(data_dir: &Path, history_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(history_dir)
        .await
        .context("Failed to create history directory")?;
    tracing::info!("Data directories ensured at: {}", data_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log to stderr, and to `{data_dir}/dive-in.log` when it can be opened.
///
/// The returned guard flushes the file writer and must outlive the server.
pub fn init_tracing(data_dir: &Path) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = data_dir.join("dive-in.log");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);

            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            if result.is_ok() {
                tracing::info!("Logging to stderr and {}", log_path.display());
            }
            Some(guard)
        }
        Err(e) => {
            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();
            if result.is_ok() {
                tracing::warn!(
                    "Could not open log file {}: {}. Logging to stderr only.",
                    log_path.display(),
                    e
                );
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Wire the registry, history store, runner and orchestrator into server state.
pub fn build_state(
    config: Arc<DaemonConfig>,
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn AnalysisRunner>,
) -> Arc<AppState> {
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(JobRegistry::new()),
        Arc::clone(&history),
        runner,
        config.analysis_timeout(),
    ));

    Arc::new(AppState {
        orchestrator,
        history,
        config,
        start_time: Instant::now(),
    })
}

/// Command-line overrides for `serve`.
#[derive(Debug, Default, Clone)]
pub struct ServeOptions {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket_path: Option<PathBuf>,
}

/// Run the backend in the foreground until Ctrl+C or SIGTERM.
pub async fn start_daemon(options: ServeOptions) -> Result<()> {
    let mut config = load_config(options.config_path.as_deref())?;

    if let Some(h) = options.host {
        config.host = h;
    }
    if let Some(p) = options.port {
        config.port = p;
    }
    if options.socket_path.is_some() {
        config.socket_path = options.socket_path;
    }

    let data_dir = effective_data_dir(&config, options.data_dir.as_deref());
    let history_dir = config.history_dir_in(&data_dir);
    config.data_dir = Some(data_dir.clone());
    config.history_dir = Some(history_dir.clone());

    create_data_dirs(&data_dir, &history_dir).await?;
    let _log_guard = init_tracing(&data_dir);

    let config = Arc::new(config);
    let history: Arc<dyn HistoryStore> = Arc::new(FsHistoryStore::new(
        history_dir.clone(),
        config.history_max_entries,
    ));
    let runner: Arc<dyn AnalysisRunner> = Arc::new(DiveCli::new(config.dive_path.clone()));
    if !runner.is_available() {
        tracing::warn!(
            "Analysis tool '{}' not found; analyses will fail until it is installed",
            config.dive_path
        );
    }

    let state = build_state(Arc::clone(&config), history, runner);
    let router = server::create_router(state);

    tracing::info!("History directory: {}", history_dir.display());

    if let Some(socket_path) = config.socket_path.clone() {
        return serve_unix(router, &socket_path).await;
    }

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server stopped")?;

    tracing::info!("Server exited cleanly.");
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(router: axum::Router, socket_path: &Path) -> Result<()> {
    // A socket left by a previous run would make bind fail.
    match std::fs::remove_file(socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to remove stale socket {}", socket_path.display())
            })
        }
    }
    let listener = tokio::net::UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;
    tracing::info!("Listening on unix:{}", socket_path.display());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server stopped")?;

    let _ = std::fs::remove_file(socket_path);
    tracing::info!("Server exited cleanly.");
    Ok(())
}

#[cfg(not(unix))]
async fn serve_unix(_router: axum::Router, socket_path: &Path) -> Result<()> {
    Err(anyhow::anyhow!(
        "Unix domain sockets are not supported on this platform: {}",
        socket_path.display()
    ))
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl+C signal");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM signal");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C signal");
    }
}
