use std::sync::Arc;

use super::{Inner, WebBook};
use crate::config::WebBookConfig;
use crate::debug::DebugSink;
use crate::errors::Result;
use crate::http::{Fetcher, ReqwestFetcher, RequestExecutor};
use crate::profile::SourceProfile;
use crate::rules::RuleCache;
use crate::script::{default_engine, ScriptEngine, ScriptRunner};

/// Builder for [`WebBook`].
///
/// Unset collaborators get production defaults: a [`ReqwestFetcher`] from
/// the fetch config, the default script engine, a fresh rule cache and the
/// process-wide debug sink.
#[must_use = "builders do nothing unless built"]
pub struct WebBookBuilder {
    profile: Arc<SourceProfile>,
    config: WebBookConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    script_engine: Option<Arc<dyn ScriptEngine>>,
    rule_cache: Option<Arc<RuleCache>>,
    debug_sink: Option<Arc<dyn DebugSink>>,
}

impl WebBookBuilder {
    pub(super) fn new(profile: Arc<SourceProfile>) -> Self {
        Self {
            profile,
            config: WebBookConfig::default(),
            fetcher: None,
            script_engine: None,
            rule_cache: None,
            debug_sink: None,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: WebBookConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the network seam.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the script engine used by transformers and `@js:` rule steps.
    pub fn script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.script_engine = Some(engine);
        self
    }

    /// Shares a compiled-rule cache, typically between the books of one source.
    pub fn rule_cache(mut self, cache: Arc<RuleCache>) -> Self {
        self.rule_cache = Some(cache);
        self
    }

    /// Sends this instance's trace lines to `sink` instead of the global sink.
    pub fn debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Builds the handle.
    pub fn build(self) -> Result<WebBook> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(&self.config.fetch)?),
        };
        let scripts = self
            .script_engine
            .unwrap_or_else(|| default_engine(&self.config.script));
        let runner = ScriptRunner::new(Arc::clone(&scripts), self.config.script.timeout());

        Ok(WebBook {
            inner: Arc::new(Inner {
                profile: self.profile,
                executor: RequestExecutor::new(fetcher),
                scripts,
                runner,
                cache: self.rule_cache.unwrap_or_default(),
                sink: self.debug_sink,
                config: self.config,
            }),
        })
    }
}

impl std::fmt::Debug for WebBookBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebBookBuilder")
            .field("source", &self.profile.source_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
