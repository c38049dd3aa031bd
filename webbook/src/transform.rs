//! The content transformer: post-processing applied to a fetched body
//! before extraction.
//!
//! The profile script runs first, then the source regex lifts the fragment
//! the extractor should see out of the (possibly rewritten) body.

use regex::Regex;
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::errors::{Result, WebBookError};
use crate::profile::non_empty;
use crate::script::{ScriptInput, ScriptRunner};

/// Script and regex post-processing of a response body.
#[derive(Debug, Clone)]
pub struct ContentTransformer {
    runner: ScriptRunner,
    source_url: String,
    script: Option<String>,
    source_regex: Option<Regex>,
}

impl ContentTransformer {
    /// Creates a transformer that leaves bodies unchanged.
    #[must_use]
    pub fn new(runner: ScriptRunner, source_url: impl Into<String>) -> Self {
        Self {
            runner,
            source_url: source_url.into(),
            script: None,
            source_regex: None,
        }
    }

    /// Sets the post-processing script. Blank scripts are ignored.
    #[must_use]
    pub fn with_script(mut self, script: Option<&str>) -> Self {
        self.script = non_empty(script).map(str::to_string);
        self
    }

    /// Sets the source extraction regex. Blank patterns are ignored.
    pub fn with_source_regex(mut self, pattern: Option<&str>) -> Result<Self> {
        self.source_regex = non_empty(pattern)
            .map(Regex::new)
            .transpose()
            .map_err(|e| WebBookError::profile(format!("invalid source regex: {e}")))?;
        Ok(self)
    }

    /// Whether the transformer would leave every body unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.script.is_none() && self.source_regex.is_none()
    }

    /// Applies the script, then the regex, to `body`.
    ///
    /// A script failure is a [`WebBookError::Script`]; a regex that does not
    /// match is [`WebBookError::NoContent`].
    pub async fn apply(&self, body: String, final_url: &str, token: &Arc<CancellationToken>) -> Result<String> {
        let body = match &self.script {
            Some(script) => {
                let input = ScriptInput::new(body, final_url, self.source_url.as_str());
                self.runner.run(script, input, token).await?
            }
            None => body,
        };

        match &self.source_regex {
            Some(pattern) => first_match(pattern, &body)
                .map(str::to_string)
                .ok_or_else(|| WebBookError::no_content(format!("source regex '{pattern}' found no match"))),
            None => Ok(body),
        }
    }
}

/// Group 1 when the pattern has groups, otherwise the whole match.
fn first_match<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    let captures = pattern.captures(text)?;
    let matched = if pattern.captures_len() > 1 {
        captures.get(1)
    } else {
        captures.get(0)
    };
    matched.map(|m| m.as_str())
}
