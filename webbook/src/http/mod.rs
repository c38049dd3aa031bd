//! Request templates, the network seam and request execution.
//!
//! - [`RequestBuilder`] resolves a profile template into a [`ResolvedRequest`]
//! - [`Fetcher`] performs it ([`ReqwestFetcher`] in production)
//! - [`RequestExecutor`] ties both to the content transformer and the tracer

mod executor;
mod fetcher;
mod request;
mod urls;

pub use executor::RequestExecutor;
#[cfg(test)]
pub use fetcher::MockFetcher;
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use request::{HttpMethod, RequestBuilder, RequestContext, ResolvedRequest};
pub use urls::{form_encode, resolve_url};

/// A fetched response.
///
/// `final_url` is the URL after redirects; relative links resolve against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Decoded body.
    pub body: String,
    /// URL the body was served from.
    pub final_url: String,
    /// HTTP status.
    pub status: u16,
}

impl Response {
    /// Creates a `200` response.
    #[must_use]
    pub fn new(body: impl Into<String>, final_url: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            final_url: final_url.into(),
            status: 200,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}
