//! Lock-guarded shared cell

use std::sync::{Mutex, PoisonError};

/// A value that is only ever touched inside one critical section
///
/// Closures passed to `with_lock` must not await or call back into the
/// same cell; the guard is released as soon as the closure returns.
#[derive(Debug, Default)]
pub(crate) struct Locked<T> {
    inner: Mutex<T>,
}

impl<T> Locked<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `mutate` with exclusive access to the value
    ///
    /// A poisoned lock is recovered: every transition leaves the value
    /// consistent before anything that can panic runs.
    pub(crate) fn with_lock<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&mut guard)
    }
}
