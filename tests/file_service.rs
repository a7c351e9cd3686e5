use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use http_file_service::prelude::*;
use rust_embed::RustEmbed;
use tempfile::TempDir;
use tokio::test;

#[derive(RustEmbed)]
#[folder = "tests/fixtures/embedded/"]
struct Fixtures;

fn write(dir: &Path, name: &str, data: &[u8]) {
    let path = dir.join(name.trim_start_matches('/'));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
}

async fn text(service: &impl HttpService, path: &str) -> String {
    match service.serve(&ServiceRequest::new(path)).await.unwrap() {
        Resolution::Serve(file) => String::from_utf8(file.bytes().await.unwrap().to_vec()).unwrap(),
        other => panic!("expected {path} to be served, got {other:?}"),
    }
}

#[test]
async fn rewritten_file_is_never_served_stale() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"0123456789");
    let service = HttpFileService::for_file_system(dir.path());

    assert_eq!(text(&service, "/a.txt").await, "0123456789");
    assert_eq!(text(&service, "/a.txt").await, "0123456789");
    let stats = service.cache_stats().await;
    assert_eq!((stats.misses, stats.hits), (1, 1));

    write(dir.path(), "a.txt", b"abcdefghijklmnopqrst");
    assert_eq!(text(&service, "/a.txt").await, "abcdefghijklmnopqrst");
    let stats = service.cache_stats().await;
    assert_eq!((stats.misses, stats.hits), (2, 1));
    assert_eq!(stats.entry_count, 1);
}

#[test]
async fn same_length_rewrite_is_detected_by_mtime() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"before");
    let service = HttpFileService::for_file_system(dir.path());
    assert_eq!(text(&service, "/a.txt").await, "before");

    write(dir.path(), "a.txt", b"after!");
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(dir.path().join("a.txt"))
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert_eq!(text(&service, "/a.txt").await, "after!");
}

#[test]
async fn deleted_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "gone.txt", b"here");
    let service = HttpFileService::for_file_system(dir.path());
    assert_eq!(text(&service, "/gone.txt").await, "here");

    fs::remove_file(dir.path().join("gone.txt")).unwrap();
    let resolution = service.serve(&ServiceRequest::new("/gone.txt")).await.unwrap();
    assert!(resolution.is_not_found());
    assert_eq!(service.cache_stats().await.entry_count, 0);
}

#[test]
async fn entry_size_limit_is_inclusive() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "fits.bin", &[7u8; 16]);
    write(dir.path(), "big.bin", &[7u8; 17]);
    let service = HttpFileService::builder(FileSystemVfs::new(dir.path()))
        .max_cache_entry_size(16)
        .build();

    let fits = service.serve(&ServiceRequest::new("/fits.bin")).await.unwrap();
    assert!(fits.served().unwrap().is_aggregated());
    let big = service.serve(&ServiceRequest::new("/big.bin")).await.unwrap();
    let big = big.served().unwrap();
    assert!(!big.is_aggregated());
    assert_eq!(big.bytes().await.unwrap().len(), 17);

    let stats = service.cache_stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.bypassed, 1);
}

#[test]
async fn directory_index_and_redirect() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "docs/index.html", b"<h1>docs</h1>");
    let service = HttpFileService::for_file_system(dir.path());

    match service.serve(&ServiceRequest::new("/docs")).await.unwrap() {
        Resolution::Redirect(location) => assert_eq!(location, "/docs/"),
        other => panic!("expected a redirect, got {other:?}"),
    }
    assert_eq!(text(&service, "/docs/").await, "<h1>docs</h1>");
}

#[test]
async fn auto_index_lists_directories() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "pub/a b.txt", b"a");
    write(dir.path(), "pub/nested/c.txt", b"c");
    let service = HttpFileService::builder(FileSystemVfs::new(dir.path()))
        .auto_index(true)
        .build();

    let html = text(&service, "/pub/").await;
    assert!(html.contains("Directory listing: /pub/"));
    assert!(html.contains("2 file(s) total"));
    assert!(html.contains("href=\"a%20b.txt\""));
    assert!(html.contains("href=\"nested/\""));
    assert!(html.contains("href=\"../\""));
}

#[test]
async fn precompressed_variant_is_preferred() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.js", b"plain");
    write(dir.path(), "app.js.gz", b"gzip");
    write(dir.path(), "app.js.br", b"brotli");
    let service = HttpFileService::builder(FileSystemVfs::new(dir.path()))
        .serve_compressed_files(true)
        .build();

    let req = ServiceRequest::new("/app.js").with_accept_encoding("gzip, deflate, br");
    let resolution = service.serve(&req).await.unwrap();
    let file = resolution.served().unwrap();
    assert_eq!(file.content_encoding(), Some(ContentEncoding::Brotli));
    assert_eq!(&file.bytes().await.unwrap()[..], b"brotli");
    assert_eq!(file.headers()["content-encoding"], "br");
    assert_eq!(file.headers()["vary"], "accept-encoding");
}

#[test]
async fn composed_services_fall_through_in_order() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "shared.txt", b"first");
    write(second.path(), "shared.txt", b"second");
    write(second.path(), "only-second.txt", b"second only");

    let service = HttpFileService::for_file_system(first.path())
        .or_else(HttpFileService::for_file_system(second.path()));

    assert_eq!(text(&service, "/shared.txt").await, "first");
    assert_eq!(text(&service, "/only-second.txt").await, "second only");
    assert!(service
        .serve(&ServiceRequest::new("/missing.txt"))
        .await
        .unwrap()
        .is_not_found());
}

#[test]
async fn shutdown_releases_every_buffer() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "b.txt", b"b");
    let pool = BufferPool::default();
    let service = HttpFileService::builder(FileSystemVfs::new(dir.path()))
        .buffer_pool(pool.clone())
        .build();

    text(&service, "/a.txt").await;
    text(&service, "/b.txt").await;
    assert_eq!(pool.leased(), 2);

    service.shutdown().await;
    assert_eq!(pool.leased(), 0);
    assert_eq!(service.cache_stats().await.entry_count, 0);
}

#[test]
async fn embedded_resources_are_served() {
    let service = HttpFileService::builder(EmbeddedVfs::<Fixtures>::new("/"))
        .serve_compressed_files(true)
        .build();

    assert_eq!(text(&service, "/hello.txt").await, "Hello, embedded!\n");
    match service.serve(&ServiceRequest::new("/docs")).await.unwrap() {
        Resolution::Redirect(location) => assert_eq!(location, "/docs/"),
        other => panic!("expected a redirect, got {other:?}"),
    }

    let req = ServiceRequest::new("/site.css").with_accept_encoding("gzip");
    let resolution = service.serve(&req).await.unwrap();
    let file = resolution.served().unwrap();
    assert_eq!(file.content_encoding(), Some(ContentEncoding::Gzip));
    assert_eq!(file.content_type(), "text/css; charset=utf-8");
    assert_eq!(&file.bytes().await.unwrap()[..], b"gz-bytes");
}
