use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, ALLOW, CONTENT_LENGTH, DATE, ETAG, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, LOCATION, VARY,
};
use hyper::http::request::Parts;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

use crate::error::{FileServiceError, Result};
use crate::file::headers::parse_http_date;
use crate::file::{Resolution, ServedFile};
use crate::logger::log_request;
use crate::service::{HttpService, ServiceRequest};
use crate::utils::{decode_path, strip_mount};

/// Serves an [`HttpService`] over HTTP/1.1 with hyper.
#[derive(Clone)]
pub struct FileServer {
    addr: SocketAddr,
    service: Arc<dyn HttpService>,
    mount_path: Arc<str>,
}

impl FileServer {
    pub fn new(addr: SocketAddr, service: Arc<dyn HttpService>) -> Self {
        info!("Creating file server for {} on {}", service.name(), addr);
        Self {
            addr,
            service,
            mount_path: Arc::from("/"),
        }
    }

    /// Serves the service below `mount_path` instead of at the root.
    pub fn with_mount_path(mut self, mount_path: &str) -> Self {
        self.mount_path = Arc::from(mount_path);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn service(&self) -> &Arc<dyn HttpService> {
        &self.service
    }

    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` completes, then shuts the service down.
    #[tracing::instrument(skip(self, shutdown), fields(addr = %self.addr))]
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let service = self.service.clone();
        let mount_path = self.mount_path.clone();

        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            debug!("New connection from: {}", remote_addr);

            let service = service.clone();
            let mount_path = mount_path.clone();

            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let service = service.clone();
                    let mount_path = mount_path.clone();
                    async move {
                        Ok::<_, Infallible>(
                            Self::handle_request(req, service.as_ref(), &mount_path).await,
                        )
                    }
                }))
            }
        });

        let server = Server::try_bind(&self.addr)
            .map_err(|e| FileServiceError::Server(format!("Failed to bind {}: {}", self.addr, e)))?
            .serve(make_svc)
            .with_graceful_shutdown(shutdown);
        info!("File server is ready to accept connections");

        let result = server.await;
        self.service.shutdown().await;

        if let Err(e) = result {
            error!("Server error: {}", e);
            return Err(FileServiceError::Server(e.to_string()));
        }
        info!("File server stopped");
        Ok(())
    }

    /// Answers one request without a network round trip.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        Self::handle_request(req, self.service.as_ref(), &self.mount_path).await
    }

    #[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    async fn handle_request(
        req: Request<Body>,
        service: &dyn HttpService,
        mount_path: &str,
    ) -> Response<Body> {
        let started = Instant::now();
        let (parts, _body) = req.into_parts();
        let response = Self::respond(&parts, service, mount_path).await;
        log_request(&parts.method, parts.uri.path(), response.status(), started.elapsed());
        response
    }

    async fn respond(parts: &Parts, service: &dyn HttpService, mount_path: &str) -> Response<Body> {
        if parts.method != Method::GET && parts.method != Method::HEAD {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let raw_path = parts.uri.path();
        let decoded = match decode_path(raw_path) {
            Ok(decoded) => decoded,
            Err(e) => return error_response(&e),
        };
        let mapped = match strip_mount(mount_path, &decoded) {
            Some(mapped) => mapped.to_string(),
            None => return status_response(StatusCode::NOT_FOUND),
        };

        let mut request = ServiceRequest::mapped(raw_path, decoded.as_str(), mapped);
        if let Some(accept) = parts
            .headers
            .get(ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok())
        {
            request = request.with_accept_encoding(accept);
        }

        match service.serve(&request).await {
            Ok(Resolution::Serve(file)) => file_response(parts, file).await,
            Ok(Resolution::Redirect(location)) => match HeaderValue::from_str(&location) {
                Ok(location) => {
                    let mut response = status_response(StatusCode::TEMPORARY_REDIRECT);
                    response.headers_mut().insert(LOCATION, location);
                    response
                }
                Err(e) => {
                    error!("Invalid redirect location {:?}: {}", location, e);
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            Ok(Resolution::NotFound) => status_response(StatusCode::NOT_FOUND),
            Err(e) => error_response(&e),
        }
    }
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("addr", &self.addr)
            .field("service", &self.service.name())
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

async fn file_response(parts: &Parts, file: ServedFile) -> Response<Body> {
    let headers = file.headers();

    if is_not_modified(&parts.headers, &headers) {
        debug!("{} not modified", file.path());
        let mut response = status_response(StatusCode::NOT_MODIFIED);
        for name in [ETAG, LAST_MODIFIED, DATE, VARY] {
            if let Some(value) = headers.get(&name) {
                response.headers_mut().insert(name, value.clone());
            }
        }
        return response;
    }

    // A streamed body may not match the size seen at lookup, so GET only
    // promises a length for content already in memory.
    let length = match file.content_length() {
        Some(length) => Some(length),
        None if parts.method == Method::HEAD => file.attributes().map(|attrs| attrs.length()),
        None => None,
    };
    let body = if parts.method == Method::HEAD {
        Body::empty()
    } else {
        match file.into_body().await {
            Ok(body) => body,
            Err(e) => return error_response(&e),
        }
    };

    let mut response = Response::new(body);
    *response.headers_mut() = headers;
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

/// `if-none-match` wins over `if-modified-since` when both are present.
fn is_not_modified(request: &HeaderMap, file: &HeaderMap) -> bool {
    if let Some(if_none_match) = request.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        let etag = file.get(ETAG).and_then(|v| v.to_str().ok());
        return if_none_match
            .split(',')
            .map(|tag| tag.trim().trim_start_matches("W/"))
            .any(|tag| tag == "*" || Some(tag) == etag);
    }

    let since = request
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    let modified = file
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    match (since, modified) {
        (Some(since), Some(modified)) => modified <= since,
        _ => false,
    }
}

fn status_response(status: StatusCode) -> Response<Body> {
    let body = match status.canonical_reason() {
        Some(reason) if status != StatusCode::NOT_MODIFIED => Body::from(reason),
        _ => Body::empty(),
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn error_response(err: &FileServiceError) -> Response<Body> {
    if err.is_invalid_path() {
        warn!("Rejected request: {}", err);
        status_response(StatusCode::BAD_REQUEST)
    } else {
        error!("Failed to serve request: {}", err);
        status_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::headers::http_date;
    use crate::file_service::HttpFileService;
    use crate::testing::MemoryVfs;
    use std::time::{Duration, UNIX_EPOCH};

    fn headers(pairs: &[(hyper::header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn etag_match_is_not_modified() {
        let file = headers(&[(ETAG, "\"a-1\"")]);
        assert!(is_not_modified(&headers(&[(IF_NONE_MATCH, "\"a-1\"")]), &file));
        assert!(is_not_modified(&headers(&[(IF_NONE_MATCH, "\"x\", W/\"a-1\"")]), &file));
        assert!(is_not_modified(&headers(&[(IF_NONE_MATCH, "*")]), &file));
        assert!(!is_not_modified(&headers(&[(IF_NONE_MATCH, "\"b-2\"")]), &file));
    }

    #[test]
    fn modified_since_compares_seconds() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let file = headers(&[(LAST_MODIFIED, http_date(modified).as_str())]);
        let same = headers(&[(IF_MODIFIED_SINCE, http_date(modified).as_str())]);
        let before = headers(&[(IF_MODIFIED_SINCE, http_date(modified - Duration::from_secs(1)).as_str())]);
        assert!(is_not_modified(&same, &file));
        assert!(!is_not_modified(&before, &file));
        assert!(!is_not_modified(&HeaderMap::new(), &file));
    }

    #[test]
    fn etag_mismatch_ignores_modified_since() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let file = headers(&[(ETAG, "\"a-1\""), (LAST_MODIFIED, http_date(modified).as_str())]);
        let request = headers(&[
            (IF_NONE_MATCH, "\"b-2\""),
            (IF_MODIFIED_SINCE, http_date(modified).as_str()),
        ]);
        assert!(!is_not_modified(&request, &file));
    }

    #[test]
    fn invalid_path_maps_to_bad_request() {
        let response = error_response(&FileServiceError::InvalidPath("/..".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = error_response(&FileServiceError::NotListable("/x".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn streamed_get_is_sent_without_a_promised_length() {
        let vfs = MemoryVfs::new();
        vfs.put("/big.txt", b"streamed bytes", UNIX_EPOCH);
        let service = HttpFileService::builder(vfs)
            .max_cache_entry_size(4)
            .build();
        let server = FileServer::new("127.0.0.1:0".parse().unwrap(), Arc::new(service));
        let request = |method| {
            Request::builder()
                .method(method)
                .uri("/big.txt")
                .body(Body::empty())
                .unwrap()
        };

        let response = server.handle(request(Method::GET)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"streamed bytes");

        let response = server.handle(request(Method::HEAD)).await;
        assert_eq!(response.headers()[CONTENT_LENGTH], "14");
    }
}
