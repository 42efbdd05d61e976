use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ip_whitelist_auth::config::LogFormat;
use ip_whitelist_auth::store::{SqliteStore, Store};
use ip_whitelist_auth::{AppState, Config, SharedSettings, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration is loaded first so LOG_FORMAT applies to every line;
    // a configuration error is still reported once logging is up.
    let config = Config::from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or(LogFormat::Text);
    init_tracing(log_format);

    info!(
        "Starting IP Whitelist Auth v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        database = %config.database_path,
        create_unknown_user = config.create_unknown_user,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let store = SqliteStore::open(&config.database_path).await.map_err(|e| {
        error!("Failed to open database {}: {e}", config.database_path);
        exitcode::UNAVAILABLE
    })?;
    let store: Arc<dyn Store> = Arc::new(store);

    let settings = SharedSettings::load(config.settings_source.clone())
        .await
        .map_err(|e| {
            error!("Invalid AUTH_IP_WHITELIST settings: {e}");
            exitcode::CONFIG
        })?;
    info!(
        allowed_hosts = ?settings.current().await.allowed_whitelisted_hosts(),
        "Whitelist settings loaded"
    );

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let admin_enabled = config.admin_auth_enabled();
    let state = AppState::new(store, settings, config);
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health                  - Health check");
    info!("  GET  /ready                   - Readiness check");
    info!("  POST /api/token               - Obtain token pair (password or IP)");
    info!("  POST /api/token/refresh       - Refresh access token");
    info!("  GET  /api/whoami              - Identify bearer");
    if admin_enabled {
        info!("  *    /admin/whitelist[/{{id}}]  - Manage whitelist entries");
        info!("  *    /admin/users             - Manage users");
        info!("  POST /admin/settings/reload   - Reload AUTH_IP_WHITELIST");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
