//! Handles to spawned stage runs.

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::CancellationToken;
use crate::errors::{Result, WebBookError};

/// How a stage run ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The stage produced a value.
    Success(T),
    /// The stage failed.
    Error(WebBookError),
    /// The run was cancelled. Carries no value and no error.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for `Cancelled`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts into a `Result`; cancellation becomes [`WebBookError::Cancelled`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Error(err) => Err(err),
            Self::Cancelled => Err(WebBookError::Cancelled("stage cancelled".to_string())),
        }
    }

    /// The value, if the stage succeeded.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<T>> for TaskOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(WebBookError::Cancelled(_)) => Self::Cancelled,
            Err(err) => Self::Error(err),
        }
    }
}

/// A stage run executing on a [`TaskScope`](super::TaskScope).
///
/// Cancelling the task (or its scope) makes it end as
/// [`TaskOutcome::Cancelled`], whatever the stage was doing at the time.
#[derive(Debug)]
pub struct StageTask<T> {
    handle: JoinHandle<TaskOutcome<T>>,
    token: Arc<CancellationToken>,
}

impl<T: Send + 'static> StageTask<T> {
    pub(crate) fn spawn<F>(handle: &Handle, token: Arc<CancellationToken>, stage: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let run_token = Arc::clone(&token);
        let handle = handle.spawn(async move {
            let result = tokio::select! {
                biased;
                () = run_token.cancelled() => return TaskOutcome::Cancelled,
                result = stage => result,
            };
            // A stage that finished while the token flipped still counts as cancelled.
            if run_token.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            TaskOutcome::from(result)
        });

        Self { handle, token }
    }

    /// Requests cancellation of this run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The run token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Waits for the run to end.
    pub async fn outcome(self) -> TaskOutcome<T> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Error(WebBookError::Internal(format!("stage task panicked: {e}"))),
        }
    }
}
