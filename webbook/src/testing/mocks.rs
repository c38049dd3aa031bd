use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::NetworkError;
use crate::http::{Fetcher, ResolvedRequest, Response};

/// An in-memory [`Fetcher`] that serves canned pages and records requests.
///
/// Unknown URLs fail with a 404 [`NetworkError`].
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Response>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ResolvedRequest>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url`.
    #[must_use]
    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), Response::new(body, url));
        self
    }

    /// Serves `body` for `url` as if the request was redirected to `final_url`.
    #[must_use]
    pub fn redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), Response::new(body, final_url));
        self
    }

    /// Delays every response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ResolvedRequest> {
        self.requests.lock().clone()
    }

    /// URLs requested so far, in order.
    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of requests received.
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &ResolvedRequest) -> Result<Response, NetworkError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(&request.url)
            .cloned()
            .ok_or_else(|| NetworkError::status(request.url.clone(), 404))
    }
}
