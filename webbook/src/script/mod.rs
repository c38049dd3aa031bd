//! The script sandbox profile rules and transformers call into.
//!
//! Scripts are string in, string out: the input body is bound to `result`,
//! the value of the last expression is the output. Evaluation is bounded by
//! an operation budget and aborts as soon as the run token is cancelled.

#[cfg(feature = "rhai")]
mod rhai_engine;

#[cfg(feature = "rhai")]
pub use rhai_engine::RhaiScriptEngine;

use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::config::ScriptConfig;
use crate::errors::ScriptError;

/// Values bound into a script's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptInput {
    /// The value being processed, bound as `result`.
    pub result: String,
    /// URL of the response being processed, bound as `baseUrl`.
    pub base_url: String,
    /// The source origin, bound as `source`.
    pub source_url: String,
}

impl ScriptInput {
    /// Creates an input.
    #[must_use]
    pub fn new(result: impl Into<String>, base_url: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            base_url: base_url.into(),
            source_url: source_url.into(),
        }
    }
}

/// A synchronous, sandboxed script evaluator.
///
/// Implementations must check `token` while running and return an error
/// promptly once it is cancelled.
pub trait ScriptEngine: Send + Sync {
    /// Evaluates `script` and returns its value as a string.
    fn eval(&self, script: &str, input: &ScriptInput, token: &Arc<CancellationToken>) -> Result<String, ScriptError>;
}

/// An engine that rejects every script.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptEngine;

impl ScriptEngine for NoScriptEngine {
    fn eval(&self, _script: &str, _input: &ScriptInput, _token: &Arc<CancellationToken>) -> Result<String, ScriptError> {
        Err(ScriptError::new("scripting is not available"))
    }
}

/// The engine used when none is configured.
#[must_use]
pub fn default_engine(config: &ScriptConfig) -> Arc<dyn ScriptEngine> {
    #[cfg(feature = "rhai")]
    {
        Arc::new(RhaiScriptEngine::new(config.clone()))
    }
    #[cfg(not(feature = "rhai"))]
    {
        let _ = config;
        Arc::new(NoScriptEngine)
    }
}

/// Runs scripts off the async executor under a wall-clock limit.
#[derive(Clone)]
pub struct ScriptRunner {
    engine: Arc<dyn ScriptEngine>,
    timeout: Duration,
}

impl ScriptRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(engine: Arc<dyn ScriptEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    /// Evaluates `script` on the blocking pool.
    ///
    /// On timeout the evaluation is aborted through a child of `token`.
    pub async fn run(&self, script: &str, input: ScriptInput, token: &Arc<CancellationToken>) -> Result<String, ScriptError> {
        let eval_token = token.child();
        let engine = Arc::clone(&self.engine);
        let script = script.to_string();
        let worker_token = Arc::clone(&eval_token);

        let handle = tokio::task::spawn_blocking(move || engine.eval(&script, &input, &worker_token));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ScriptError::new(format!("script worker failed: {join_error}"))),
            Err(_) => {
                eval_token.cancel("script timed out");
                Err(ScriptError::exhausted(format!(
                    "script timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
