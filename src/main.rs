use std::net::SocketAddr;
use std::sync::Arc;

use http_file_service::logger::init_logger;
use http_file_service::prelude::*;
use http_file_service::Config;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    info!("Starting HTTP file service");

    let config = Config::load()?;
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(
        "Serving {} under {} (auto index: {}, precompressed: {})",
        config.files.root.display(),
        config.server.mount_path,
        config.files.auto_index,
        config.files.serve_compressed_files
    );

    let service: Arc<dyn HttpService> = Arc::new(HttpFileService::from_config(&config.files));
    let server = FileServer::new(addr, service).with_mount_path(&config.server.mount_path);

    if let Err(e) = server.run_until(wait_for_shutdown()).await {
        error!("Error during shutdown: {}", e);
        return Err(e.into());
    }
    info!("Shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
