use async_trait::async_trait;
use tracing::debug;

use super::{HttpService, ServiceRequest};
use crate::error::Result;
use crate::file::Resolution;

/// Serves from `first` when it finds the path, from `second` otherwise.
///
/// A redirect from `first` counts as found. Composition is associative:
/// `a.or_else(b).or_else(c)` and `a.or_else(b.or_else(c))` answer every
/// request the same way.
pub struct OrElse<A, B> {
    first: A,
    second: B,
    name: String,
}

impl<A: HttpService, B: HttpService> OrElse<A, B> {
    pub fn new(first: A, second: B) -> Self {
        let name = format!("{}|{}", first.name(), second.name());
        Self {
            first,
            second,
            name,
        }
    }
}

#[async_trait]
impl<A: HttpService, B: HttpService> HttpService for OrElse<A, B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn serve(&self, req: &ServiceRequest) -> Result<Resolution> {
        match self.first.serve(req).await? {
            Resolution::NotFound => {
                debug!(
                    "{} has no {}, trying {}",
                    self.first.name(),
                    req.mapped_path(),
                    self.second.name()
                );
                self.second.serve(req).await
            }
            found => Ok(found),
        }
    }

    async fn shutdown(&self) {
        self.first.shutdown().await;
        self.second.shutdown().await;
    }
}
