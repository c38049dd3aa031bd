//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CallbackList {
    next_id: u64,
    entries: Vec<(u64, CancelCallback)>,
}

/// Keeps a callback registered with [`CancellationToken::register`].
///
/// Dropping the registration removes the callback, so short-lived runs do
/// not accumulate callbacks on a long-lived token.
#[must_use = "dropping the registration removes the callback"]
pub struct CancelRegistration {
    id: u64,
    list: Weak<RwLock<CallbackList>>,
}

impl CancelRegistration {
    fn inert() -> Self {
        Self { id: 0, list: Weak::new() }
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.write().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelRegistration").field("id", &self.id).finish()
    }
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
/// Synchronous code polls [`is_cancelled`](Self::is_cancelled); async code
/// can race its work against [`cancelled`](Self::cancelled).
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation.
    callbacks: Arc<RwLock<CallbackList>>,
    /// Link to the parent token, for children.
    parent: Mutex<Option<CancelRegistration>>,
    /// Wakes tasks waiting in `cancelled()`.
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks run once, on the cancelling thread. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            self.notify.notify_waiters();

            let callbacks = std::mem::take(&mut self.callbacks.write().entries);
            for (_, callback) in &callbacks {
                invoke(callback.as_ref());
            }
        }
    }

    /// Registers a callback to be invoked on cancellation, for the life of the token.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Err(callback) = self.push(Box::new(callback)) {
            invoke(callback.as_ref());
        }
    }

    /// Registers a callback that stays registered while the returned guard lives.
    ///
    /// If already cancelled, the callback is invoked immediately and the
    /// guard is inert.
    pub fn register<F>(&self, callback: F) -> CancelRegistration
    where
        F: Fn() + Send + Sync + 'static,
    {
        match self.push(Box::new(callback)) {
            Ok(id) => CancelRegistration {
                id,
                list: Arc::downgrade(&self.callbacks),
            },
            Err(callback) => {
                invoke(callback.as_ref());
                CancelRegistration::inert()
            }
        }
    }

    /// Stores `callback` unless the token is already cancelled, in which case it is handed back.
    fn push(&self, callback: CancelCallback) -> Result<u64, CancelCallback> {
        let mut list = self.callbacks.write();
        if self.is_cancelled() {
            return Err(callback);
        }
        list.next_id += 1;
        let id = list.next_id;
        list.entries.push((id, callback));
        Ok(id)
    }

    /// Number of callbacks waiting for cancellation.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().entries.len()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the check so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Creates a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child leaves this token untouched. Dropping the child
    /// unregisters it from this token.
    #[must_use]
    pub fn child(&self) -> Arc<Self> {
        let child = Arc::new(Self::new());
        let weak = Arc::downgrade(&child);
        let link = self.register(move || {
            if let Some(child) = weak.upgrade() {
                child.cancel("parent cancelled");
            }
        });
        *child.parent.lock() = Some(link);
        child
    }
}

fn invoke(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
