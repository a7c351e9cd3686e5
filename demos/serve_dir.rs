//! Serves two directories as one site: files in the first directory shadow
//! files with the same path in the second.
//!
//! ```text
//! cargo run --example serve_dir -- ./site ./fallback 127.0.0.1:8080
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use http_file_service::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("http_file_service=debug,serve_dir=debug")
        .with_file(true)
        .with_line_number(true)
        .init();

    let mut args = std::env::args().skip(1);
    let primary = args.next().unwrap_or_else(|| "./site".to_string());
    let fallback = args.next().unwrap_or_else(|| "./fallback".to_string());
    let addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()?;

    let site = HttpFileService::builder(FileSystemVfs::new(&primary))
        .serve_compressed_files(true)
        .build();
    let fallback = HttpFileService::builder(FileSystemVfs::new(&fallback))
        .auto_index(true)
        .build();
    let service: Arc<dyn HttpService> = Arc::new(site.or_else(fallback));
    info!("Composed service: {}", service.name());

    let server = FileServer::new(addr, service);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C signal");
        })
        .await?;

    Ok(())
}
