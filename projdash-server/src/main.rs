//! projdash-server - projdash backend server
//!
//! REST API over the merged project inventory plus an SSE refresh stream.

use projdash_core::{Config, Database};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("projdash_server=info".parse()?)
                .add_directive("projdash_core=info".parse()?),
        )
        .init();

    info!("projdash-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Data directory: {:?}", config.data_dir);
    info!("Scanning projects under {:?}", config.scan.dev_root);

    // Check for existing server
    let pid_file = config.pid_file();
    if pid_file.exists() {
        let pid_str = std::fs::read_to_string(&pid_file)?;
        let pid: i32 = pid_str.trim().parse()?;

        // Check if process is still running
        if process_exists(pid) {
            anyhow::bail!("Server already running with PID {}", pid);
        }

        info!("Cleaning up stale PID file from previous crash");
        let _ = std::fs::remove_file(&pid_file);
    }

    let db = Arc::new(Database::open_path(&config.database_path())?);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, db)?);
    match state.orchestrator.enricher_name() {
        Some(name) => info!("LLM enrichment enabled ({})", name),
        None => info!("LLM enrichment disabled"),
    }

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    std::fs::write(&pid_file, std::process::id().to_string())?;
    info!("Listening on http://{}", addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    remove_pid_file(&pid_file);
    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove PID file {:?}: {}", path, e);
    }
}

/// Check if a process exists by PID
fn process_exists(pid: i32) -> bool {
    // On Unix, sending signal 0 checks if process exists
    unsafe { libc::kill(pid, 0) == 0 }
}
