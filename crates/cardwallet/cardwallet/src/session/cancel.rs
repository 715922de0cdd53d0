use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Cancels a running session from another thread
///
/// Clones share the same flag. Security delay waits wake up as soon as the token
/// is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.signal.notify_all();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn reset(&self) {
        *self.inner.cancelled.lock() = false;
    }

    /// Sleep for `timeout` unless cancelled first
    ///
    /// Returns whether the token was cancelled.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            let _ = self
                .inner
                .signal
                .wait_while_for(&mut cancelled, |cancelled| !*cancelled, timeout);
        }
        *cancelled
    }
}
