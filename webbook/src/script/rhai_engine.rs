//! Rhai-backed script engine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use std::sync::Arc;

use super::{ScriptEngine, ScriptInput};
use crate::cancellation::CancellationToken;
use crate::config::ScriptConfig;
use crate::errors::ScriptError;

const MAX_CALL_LEVELS: usize = 32;

/// Evaluates profile scripts with Rhai.
///
/// A fresh engine is built per evaluation, so scripts share no state.
/// Helper functions available to scripts: `md5_encode`, `base64_encode`,
/// `base64_decode` and `url_encode`.
#[derive(Debug, Clone, Default)]
pub struct RhaiScriptEngine {
    config: ScriptConfig,
}

impl RhaiScriptEngine {
    /// Creates an engine with the given limits.
    #[must_use]
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    fn build(&self, token: &Arc<CancellationToken>) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.config.max_operations);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_call_levels(MAX_CALL_LEVELS);

        let token = Arc::clone(token);
        engine.on_progress(move |_ops| {
            if token.is_cancelled() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        engine.register_fn("md5_encode", |text: &str| -> String { hex::encode(Md5::digest(text.as_bytes())) });
        engine.register_fn("base64_encode", |text: &str| -> String { STANDARD.encode(text) });
        engine.register_fn("base64_decode", |text: &str| -> Result<String, Box<EvalAltResult>> {
            let bytes = STANDARD
                .decode(text.trim())
                .map_err(|e| format!("base64_decode: {e}"))?;
            String::from_utf8(bytes).map_err(|e| format!("base64_decode: {e}").into())
        });
        engine.register_fn("url_encode", |text: &str| -> String {
            url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
        });

        engine
    }
}

impl ScriptEngine for RhaiScriptEngine {
    fn eval(&self, script: &str, input: &ScriptInput, token: &Arc<CancellationToken>) -> Result<String, ScriptError> {
        if token.is_cancelled() {
            return Err(ScriptError::exhausted("script cancelled before start"));
        }

        let engine = self.build(token);
        let mut scope = Scope::new();
        scope.push("result", input.result.clone());
        scope.push("baseUrl", input.base_url.clone());
        scope.push("source", input.source_url.clone());

        match engine.eval_with_scope::<Dynamic>(&mut scope, script) {
            Ok(value) => Ok(dynamic_to_string(value)),
            Err(err) => Err(map_error(&err)),
        }
    }
}

fn map_error(err: &EvalAltResult) -> ScriptError {
    match err {
        EvalAltResult::ErrorTooManyOperations(_) => ScriptError::exhausted("script exceeded its operation budget"),
        EvalAltResult::ErrorTerminated(..) => ScriptError::exhausted("script terminated"),
        EvalAltResult::ErrorDataTooLarge(..) => ScriptError::exhausted(err.to_string()),
        _ => ScriptError::new(err.to_string()),
    }
}

/// Strings pass through, unit is empty, arrays and maps become JSON.
fn dynamic_to_string(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is_string() {
        return value.into_string().unwrap_or_default();
    }
    if value.is_array() || value.is_map() {
        return to_json(&value).to_string();
    }
    value.to_string()
}

fn to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::from(i)
    } else if let Ok(f) = value.as_float() {
        Value::from(f)
    } else if value.is_string() {
        Value::String(value.clone().into_string().unwrap_or_default())
    } else if let Some(items) = value.read_lock::<rhai::Array>() {
        Value::Array(items.iter().map(to_json).collect())
    } else if let Some(map) = value.read_lock::<rhai::Map>() {
        Value::Object(map.iter().map(|(k, v)| (k.to_string(), to_json(v))).collect())
    } else {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn eval(script: &str, result: &str) -> Result<String, ScriptError> {
        RhaiScriptEngine::default().eval(
            script,
            &ScriptInput::new(result, "http://fixture/book/1", "http://fixture"),
            &Arc::new(CancellationToken::new()),
        )
    }

    #[test]
    fn test_result_binding() {
        assert_eq!(eval("result + \"!\"", "hi").unwrap(), "hi!");
        assert_eq!(eval("result.len()", "abcd").unwrap(), "4");
        assert_eq!(eval("baseUrl", "").unwrap(), "http://fixture/book/1");
        assert_eq!(eval("source", "").unwrap(), "http://fixture");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(eval("md5_encode(result)", "abc").unwrap(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(eval("base64_encode(result)", "hello").unwrap(), "aGVsbG8=");
        assert_eq!(eval("base64_decode(result)", "aGVsbG8=").unwrap(), "hello");
        assert_eq!(eval("url_encode(result)", "a b&c").unwrap(), "a+b%26c");
        assert!(eval("base64_decode(result)", "!!!").is_err());
    }

    #[test]
    fn test_arrays_become_json() {
        assert_eq!(eval("[\"a\", 1, true]", "").unwrap(), r#"["a",1,true]"#);
        assert_eq!(eval("()", "x").unwrap(), "");
    }

    #[test]
    fn test_syntax_error() {
        let err = eval("let = ;", "").unwrap_err();
        assert!(!err.exhausted);
    }

    #[test]
    fn test_operation_budget() {
        let engine = RhaiScriptEngine::new(ScriptConfig::default().with_max_operations(1_000));
        let err = engine
            .eval(
                "loop { }",
                &ScriptInput::default(),
                &Arc::new(CancellationToken::new()),
            )
            .unwrap_err();
        assert!(err.exhausted);
    }

    #[test]
    fn test_cancellation_terminates() {
        let engine = RhaiScriptEngine::new(ScriptConfig::default().with_max_operations(0));
        let token = Arc::new(CancellationToken::new());
        let canceller = {
            let token = Arc::clone(&token);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                token.cancel("stop");
            })
        };

        let err = engine.eval("loop { }", &ScriptInput::default(), &token).unwrap_err();
        canceller.join().unwrap();
        assert!(err.exhausted);
    }
}
