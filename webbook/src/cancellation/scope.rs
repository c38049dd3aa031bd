//! Task scopes: where stage runs execute and what cancels them.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle, Runtime};

use super::{CancellationToken, StageTask};
use crate::errors::Result;

const DEFAULT_IO_WORKERS: usize = 4;

static BACKGROUND: OnceLock<Runtime> = OnceLock::new();
static BACKGROUND_INIT: Mutex<()> = parking_lot::const_mutex(());

/// The lazily built multi-thread runtime used for background I/O.
///
/// The first caller decides the worker count.
pub(crate) fn background_runtime(workers: usize) -> Result<&'static Runtime> {
    if let Some(runtime) = BACKGROUND.get() {
        return Ok(runtime);
    }

    // Serialized so a losing builder never has to drop its runtime.
    let _guard = BACKGROUND_INIT.lock();
    if let Some(runtime) = BACKGROUND.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(workers.max(1))
        .thread_name("webbook-io")
        .enable_all()
        .build()?;
    Ok(BACKGROUND.get_or_init(|| runtime))
}

/// An executor plus a cancellation token.
///
/// Every task spawned on a scope runs under a child of the scope token:
/// cancelling the scope cancels all of them, cancelling one task leaves the
/// others running.
#[derive(Debug, Clone)]
pub struct TaskScope {
    handle: Handle,
    token: Arc<CancellationToken>,
}

impl TaskScope {
    /// A scope on an explicit runtime handle.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// A scope on the caller's runtime, or on the background runtime outside one.
    pub fn current() -> Result<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::with_handle(handle)),
            Err(_) => Self::background(),
        }
    }

    /// A scope on the shared background I/O runtime.
    pub fn background() -> Result<Self> {
        Self::background_with_workers(DEFAULT_IO_WORKERS)
    }

    /// Like [`background`](Self::background), sizing the runtime on first use.
    pub fn background_with_workers(workers: usize) -> Result<Self> {
        Ok(Self::with_handle(background_runtime(workers)?.handle().clone()))
    }

    /// The runtime handle tasks are spawned on.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The scope token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// A nested scope on the same runtime, cancelled with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            token: self.token.child(),
        }
    }

    /// Cancels every task of the scope.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns whether the scope was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawns a stage run. The closure receives the run token.
    pub fn spawn<T, F, Fut>(&self, stage: F) -> StageTask<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<CancellationToken>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let token = self.token.child();
        let future = stage(Arc::clone(&token));
        StageTask::spawn(&self.handle, token, future)
    }
}
