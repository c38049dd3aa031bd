//! The network seam.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::request::{HttpMethod, ResolvedRequest};
use super::Response;
use crate::config::FetchConfig;
use crate::errors::{NetworkError, Result, WebBookError};

/// Performs resolved requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends `request` and returns the decoded body and the final URL.
    async fn fetch(&self, request: &ResolvedRequest) -> std::result::Result<Response, NetworkError>;
}

/// [`Fetcher`] backed by `reqwest`.
///
/// In-flight requests are bounded by a semaphore; redirects, timeout and the
/// body size limit come from [`FetchConfig`].
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    permits: Arc<Semaphore>,
    max_response_size: usize,
}

impl ReqwestFetcher {
    /// Creates a fetcher.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| WebBookError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            max_response_size: config.max_response_size,
        })
    }

    fn headers(request: &ResolvedRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => debug!(header = %name, "skipping invalid header"),
            }
        }
        headers
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &ResolvedRequest) -> std::result::Result<Response, NetworkError> {
        let url = request.url.as_str();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| NetworkError::new(url, e.to_string()))?;

        let builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let mut builder = builder.headers(Self::headers(request));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
            if request.method == HttpMethod::Post && request.header("content-type").is_none() {
                builder = builder.header("Content-Type", "application/x-www-form-urlencoded");
            }
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::status(url, status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if usize::try_from(length).map_or(true, |l| l > self.max_response_size) {
                return Err(NetworkError::new(url, format!("response too large ({length} bytes)")));
            }
        }

        let final_url = response.url().to_string();
        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of)
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?
        {
            if bytes.len() + chunk.len() > self.max_response_size {
                return Err(NetworkError::new(
                    url,
                    format!("response exceeds {} bytes", self.max_response_size),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let charset = request
            .charset
            .as_deref()
            .or(declared.as_deref())
            .unwrap_or("utf-8");
        let body = decode(&bytes, charset);

        debug!(url = %url, final_url = %final_url, status = status.as_u16(), "fetched");
        Ok(Response::new(body, final_url).with_status(status.as_u16()))
    }
}

/// The `charset` parameter of a `Content-Type` value.
fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

/// Decodes `bytes` with the named encoding, falling back to UTF-8 for unknown labels.
fn decode(bytes: &[u8], charset: &str) -> String {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}
