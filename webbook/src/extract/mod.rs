//! Stage extractors: typed results out of fetched bodies.
//!
//! Extraction is synchronous CPU work. A rule that is not configured
//! extracts nothing; a rule that fails is traced as an
//! [`ExtractionFieldError`] and its field stays empty. Only an empty body,
//! a broken profile or cancellation fail a stage here.

pub mod book_info;
pub mod book_list;
pub mod chapter_list;
pub mod content;

pub use book_info::analyze_book_info;
pub use book_list::analyze_book_list;
pub use chapter_list::{analyze_chapter_page, PageRef, TocPage};
pub use content::{analyze_content_page, ContentPage};

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::debug::Tracer;
use crate::errors::{ExtractionFieldError, Result, WebBookError};
use crate::profile::{non_empty, SourceProfile};
use crate::rules::{Document, Node, RuleCache, RuleEvaluator};
use crate::script::ScriptEngine;

/// Everything an extractor needs besides the body. Cheap to clone, so a run
/// can move it onto the blocking pool for large bodies.
#[derive(Clone)]
pub struct ExtractEnv {
    /// The source being read.
    pub profile: Arc<SourceProfile>,
    /// Compiled rule cache.
    pub cache: Arc<RuleCache>,
    /// Engine for `@js:` rule steps.
    pub scripts: Arc<dyn ScriptEngine>,
    /// Trace writer of the run.
    pub tracer: Tracer,
    /// Pipeline limits.
    pub config: PipelineConfig,
}

impl ExtractEnv {
    /// Creates an environment.
    #[must_use]
    pub fn new(
        profile: Arc<SourceProfile>,
        cache: Arc<RuleCache>,
        scripts: Arc<dyn ScriptEngine>,
        tracer: Tracer,
        config: PipelineConfig,
    ) -> Self {
        Self {
            profile,
            cache,
            scripts,
            tracer,
            config,
        }
    }

    /// Parses `body` per the profile's format, failing on a blank body.
    pub(crate) fn document(&self, body: &str) -> Result<Document> {
        if body.trim().is_empty() {
            return Err(WebBookError::no_content("response body is empty"));
        }
        Ok(Document::parse(body, self.profile.body_format))
    }

    /// An evaluator resolving relative URLs against `base_url`.
    pub(crate) fn evaluator<'e>(&'e self, base_url: &'e str) -> RuleEvaluator<'e> {
        RuleEvaluator::new(
            &self.cache,
            self.scripts.as_ref(),
            self.tracer.token(),
            base_url,
            &self.profile.source_url,
        )
    }

    /// Fails with [`WebBookError::Cancelled`] once the run is cancelled.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        let token = self.tracer.token();
        if token.is_cancelled() {
            return Err(WebBookError::Cancelled(token.reason().unwrap_or_default()));
        }
        Ok(())
    }

    /// Extracts a text field; failures are traced and yield an empty string.
    pub(crate) fn text(&self, ev: &RuleEvaluator<'_>, field: &str, rule: Option<&str>, node: &Node<'_>) -> String {
        let Some(rule) = non_empty(rule) else {
            return String::new();
        };
        ev.string(rule, node).unwrap_or_else(|e| {
            self.tracer
                .field_error(&ExtractionFieldError::new(field, rule, e.message));
            String::new()
        })
    }

    /// Extracts a URL field resolved against the evaluator's base URL.
    pub(crate) fn url(&self, ev: &RuleEvaluator<'_>, field: &str, rule: Option<&str>, node: &Node<'_>) -> String {
        let Some(rule) = non_empty(rule) else {
            return String::new();
        };
        ev.url(rule, node).unwrap_or_else(|e| {
            self.tracer
                .field_error(&ExtractionFieldError::new(field, rule, e.message));
            String::new()
        })
    }

    /// Extracts every URL a rule yields.
    pub(crate) fn urls(&self, ev: &RuleEvaluator<'_>, field: &str, rule: Option<&str>, node: &Node<'_>) -> Vec<String> {
        let Some(rule) = non_empty(rule) else {
            return Vec::new();
        };
        ev.urls(rule, node).unwrap_or_else(|e| {
            self.tracer
                .field_error(&ExtractionFieldError::new(field, rule, e.message));
            Vec::new()
        })
    }

    /// Traces one extracted value.
    pub(crate) fn trace_field(&self, field: &str, value: &str) {
        self.tracer.log(format!("┌{field}"));
        self.tracer.log(format!("└{value}"));
    }
}

impl std::fmt::Debug for ExtractEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractEnv")
            .field("source", &self.profile.source_url)
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::debug::CollectingDebugSink;
    use crate::script::NoScriptEngine;

    /// An environment over `profile` that collects its trace lines.
    pub fn env(profile: SourceProfile, stage: &'static str) -> (ExtractEnv, Arc<CollectingDebugSink>) {
        let sink = Arc::new(CollectingDebugSink::new());
        let tracer = Tracer::new(
            profile.source_url.clone(),
            stage,
            sink.clone(),
            Arc::new(CancellationToken::new()),
        );
        let env = ExtractEnv::new(
            Arc::new(profile),
            Arc::new(RuleCache::new()),
            Arc::new(NoScriptEngine),
            tracer,
            PipelineConfig::default(),
        );
        (env, sink)
    }
}
