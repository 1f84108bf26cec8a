use stderrlog::Timestamp;
use tokio::signal;

use shortmesh_dispatch::config::Config;
use shortmesh_dispatch::pool::{self, Pool};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("FATAL ERROR: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    stderrlog::new()
        .verbosity(log::Level::Info)
        .timestamp(Timestamp::Millisecond)
        .show_module_names(true)
        .init()
        .unwrap();

    log::info!("=== Shortmesh Dispatch Worker Starting ===");

    match dotenvy::dotenv() {
        Ok(_) => log::info!("environment loaded from .env file"),
        Err(_) => log::info!("no .env file found, using system environment"),
    }

    let config = Config::load()?;

    if !pool::is_enabled(&config) {
        log::info!("WORKER_ENABLED is false, exiting without starting workers");
        return Ok(());
    }

    let mut pool = Pool::new(config);
    pool.start().await;

    shutdown_signal().await;

    pool.stop().await;
    log::info!("worker process shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            log::info!("received terminate signal, shutting down gracefully");
        },
    }
}
