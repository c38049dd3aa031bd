//! Configuration types for fetching, scripting and stage execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{Result, WebBookError};

/// Top-level configuration for a [`WebBook`](crate::webbook::WebBook).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebBookConfig {
    /// HTTP fetching.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Script sandbox limits.
    #[serde(default)]
    pub script: ScriptConfig,
    /// Stage execution limits.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl WebBookConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields use defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WebBookError::Internal(format!("invalid config: {e}")))
    }

    /// Sets the fetch configuration.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Sets the script configuration.
    #[must_use]
    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.script = script;
        self
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// Configuration for HTTP fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_response_size: usize,
    /// Default headers; source profile headers take precedence per key.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Maximum number of requests in flight per fetcher.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_max_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_response_size: default_max_size(),
            headers: HashMap::new(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a default header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Limits applied to profile scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Wall-clock budget per evaluation in seconds.
    #[serde(default = "default_script_timeout")]
    pub timeout_seconds: f64,
    /// Operation budget per evaluation.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// Largest string a script may build.
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
}

fn default_script_timeout() -> f64 {
    10.0
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_max_string_size() -> usize {
    16 * 1024 * 1024
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_script_timeout(),
            max_operations: default_max_operations(),
            max_string_size: default_max_string_size(),
        }
    }
}

impl ScriptConfig {
    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the operation budget.
    #[must_use]
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Limits on stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of table-of-contents pages followed per call.
    #[serde(default = "default_max_toc_pages")]
    pub max_toc_pages: usize,
    /// Maximum number of content pages followed per chapter.
    #[serde(default = "default_max_content_pages")]
    pub max_content_pages: usize,
    /// Bodies larger than this are extracted on the blocking pool.
    #[serde(default = "default_inline_limit")]
    pub inline_extraction_limit: usize,
    /// Sort search results by relevance to the query.
    #[serde(default)]
    pub sort_search_by_relevance: bool,
    /// Worker threads of the shared background runtime.
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,
}

fn default_max_toc_pages() -> usize {
    64
}

fn default_max_content_pages() -> usize {
    32
}

fn default_inline_limit() -> usize {
    256 * 1024
}

fn default_io_workers() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_toc_pages: default_max_toc_pages(),
            max_content_pages: default_max_content_pages(),
            inline_extraction_limit: default_inline_limit(),
            sort_search_by_relevance: false,
            io_workers: default_io_workers(),
        }
    }
}

impl PipelineConfig {
    /// Enables relevance sorting for search results.
    #[must_use]
    pub fn with_relevance_sort(mut self, enabled: bool) -> Self {
        self.sort_search_by_relevance = enabled;
        self
    }

    /// Sets the inline extraction limit.
    #[must_use]
    pub fn with_inline_extraction_limit(mut self, bytes: usize) -> Self {
        self.inline_extraction_limit = bytes;
        self
    }
}
