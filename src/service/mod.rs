use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::file::Resolution;

mod or_else;

pub use or_else::OrElse;

/// A request as handed over by the routing layer.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    path: String,
    decoded_path: String,
    mapped_path: String,
    accept_encoding: Option<String>,
}

impl ServiceRequest {
    /// A request for an already decoded path served at the root.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            decoded_path: path.clone(),
            mapped_path: path.clone(),
            path,
            accept_encoding: None,
        }
    }

    /// A request whose service is mounted below a prefix.
    ///
    /// `path` is the path as received and is used to build redirects,
    /// `decoded_path` its percent-decoded form, and `mapped_path` the decoded
    /// path with the mount prefix removed.
    pub fn mapped(
        path: impl Into<String>,
        decoded_path: impl Into<String>,
        mapped_path: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            decoded_path: decoded_path.into(),
            mapped_path: mapped_path.into(),
            accept_encoding: None,
        }
    }

    pub fn with_accept_encoding(mut self, accept_encoding: impl Into<String>) -> Self {
        self.accept_encoding = Some(accept_encoding.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn decoded_path(&self) -> &str {
        &self.decoded_path
    }

    pub fn mapped_path(&self) -> &str {
        &self.mapped_path
    }

    pub fn accept_encoding(&self) -> Option<&str> {
        self.accept_encoding.as_deref()
    }
}

#[async_trait]
pub trait HttpService: Send + Sync {
    fn name(&self) -> &str;

    /// Resolves the request. `Resolution::NotFound` means this service has
    /// nothing for the path.
    async fn serve(&self, req: &ServiceRequest) -> Result<Resolution>;

    /// Releases resources held by the service.
    async fn shutdown(&self) {}
}

#[async_trait]
impl<S: HttpService + ?Sized> HttpService for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn serve(&self, req: &ServiceRequest) -> Result<Resolution> {
        (**self).serve(req).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}

#[async_trait]
impl<S: HttpService + ?Sized> HttpService for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn serve(&self, req: &ServiceRequest) -> Result<Resolution> {
        (**self).serve(req).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}

pub trait HttpServiceExt: HttpService + Sized {
    /// Tries this service first and falls back to `next` when it has nothing
    /// for the requested path.
    fn or_else<S: HttpService>(self, next: S) -> OrElse<Self, S> {
        OrElse::new(self, next)
    }
}

impl<T: HttpService + Sized> HttpServiceExt for T {}
