use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::fetcher::Fetcher;
use super::request::ResolvedRequest;
use super::Response;
use crate::debug::Tracer;
use crate::errors::{Result, WebBookError};
use crate::transform::ContentTransformer;

/// Executes resolved requests for one [`WebBook`](crate::webbook::WebBook).
///
/// Every execution races the run token: once it is cancelled the in-flight
/// request is dropped and the call returns [`WebBookError::Cancelled`].
#[derive(Clone)]
pub struct RequestExecutor {
    fetcher: Arc<dyn Fetcher>,
}

impl RequestExecutor {
    /// Creates an executor over `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetches `request`, then applies `transform` to the body.
    ///
    /// Emits one trace line with the requested URL, the final URL and the
    /// elapsed time.
    pub async fn execute(
        &self,
        request: &ResolvedRequest,
        transform: Option<&ContentTransformer>,
        tracer: &Tracer,
    ) -> Result<Response> {
        let token = Arc::clone(tracer.token());
        if token.is_cancelled() {
            return Err(cancelled(&token));
        }

        let started = Instant::now();
        let run = async {
            let mut response = self.fetcher.fetch(request).await?;
            if let Some(transform) = transform.filter(|t| !t.is_empty()) {
                response.body = transform
                    .apply(std::mem::take(&mut response.body), &response.final_url, &token)
                    .await?;
            }
            Ok::<_, WebBookError>(response)
        };

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(cancelled(&token)),
            result = run => result?,
        };

        let elapsed = started.elapsed().as_millis();
        debug!(url = %request.url, final_url = %response.final_url, elapsed_ms = elapsed, "request executed");
        if response.final_url == request.url {
            tracer.log(format!("{} {} ({elapsed}ms)", request.method, request.url));
        } else {
            tracer.log(format!(
                "{} {} -> {} ({elapsed}ms)",
                request.method, request.url, response.final_url
            ));
        }
        Ok(response)
    }
}

fn cancelled(token: &crate::cancellation::CancellationToken) -> WebBookError {
    WebBookError::Cancelled(token.reason().unwrap_or_default())
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::debug::{CollectingDebugSink, TraceKind};
    use crate::errors::NetworkError;
    use crate::http::MockFetcher;
    use crate::script::{NoScriptEngine, ScriptRunner};
    use std::time::Duration;

    fn tracer(sink: &Arc<CollectingDebugSink>, token: &Arc<CancellationToken>) -> Tracer {
        Tracer::new("http://fixture", "search", sink.clone(), Arc::clone(token))
    }

    #[tokio::test]
    async fn test_execute_traces_final_url() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Response::new("<p>ok</p>", "http://b/y")));
        let executor = RequestExecutor::new(Arc::new(fetcher));
        let sink = Arc::new(CollectingDebugSink::new());
        let token = Arc::new(CancellationToken::new());

        let response = executor
            .execute(&ResolvedRequest::get("http://a/x"), None, &tracer(&sink, &token))
            .await
            .unwrap();

        assert_eq!(response.final_url, "http://b/y");
        let lines = sink.lines_of_kind(TraceKind::Step);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].message.contains("http://a/x -> http://b/y"));
        assert!(lines[0].message.ends_with("ms)"));
    }

    #[tokio::test]
    async fn test_network_error_propagates() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|r| Err(NetworkError::status(r.url.clone(), 503)));
        let executor = RequestExecutor::new(Arc::new(fetcher));
        let sink = Arc::new(CollectingDebugSink::new());
        let token = Arc::new(CancellationToken::new());

        let err = executor
            .execute(&ResolvedRequest::get("http://a/x"), None, &tracer(&sink, &token))
            .await
            .unwrap_err();
        assert!(matches!(err, WebBookError::Network(ref e) if e.status == Some(503)));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_fetch() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().times(0);
        let executor = RequestExecutor::new(Arc::new(fetcher));
        let sink = Arc::new(CollectingDebugSink::new());
        let token = Arc::new(CancellationToken::new());
        let tracer = tracer(&sink, &token);
        token.cancel("gone");

        let err = executor
            .execute(&ResolvedRequest::get("http://a/x"), None, &tracer)
            .await
            .unwrap_err();
        assert!(matches!(err, WebBookError::Cancelled(_)));
        assert!(sink.lines_of_kind(TraceKind::Step).is_empty());
    }

    #[tokio::test]
    async fn test_transform_applies_regex() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|r| Ok(Response::new("var data = {\"a\":1};", r.url.clone())));
        let executor = RequestExecutor::new(Arc::new(fetcher));
        let sink = Arc::new(CollectingDebugSink::new());
        let token = Arc::new(CancellationToken::new());
        let transform = ContentTransformer::new(
            ScriptRunner::new(Arc::new(NoScriptEngine), Duration::from_secs(1)),
            "http://fixture",
        )
        .with_source_regex(Some(r"data = (\{.*\});"))
        .unwrap();

        let response = executor
            .execute(&ResolvedRequest::get("http://a/x"), Some(&transform), &tracer(&sink, &token))
            .await
            .unwrap();
        assert_eq!(response.body, "{\"a\":1}");
    }
}
