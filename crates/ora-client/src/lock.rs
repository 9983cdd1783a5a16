//! Per-connection single-flight operation lock.
//!
//! Every operation that touches a session runs under an [`OperationLock`].
//! Contenders are served strictly in arrival order, or rejected outright
//! when the connection was configured to error on concurrent use.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// FIFO lock guarding a value that must be used by one operation at a time.
#[derive(Debug)]
pub struct OperationLock<T> {
    inner: Mutex<T>,
    error_on_concurrent: bool,
    waiting: AtomicUsize,
}

/// Exclusive access to the locked value. Dropping it hands the lock to the
/// oldest waiter.
#[derive(Debug)]
pub struct OperationGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

struct WaitingSlot<'a>(&'a AtomicUsize);

impl Drop for WaitingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> OperationLock<T> {
    /// Create an idle lock.
    pub fn new(value: T, error_on_concurrent: bool) -> Self {
        Self {
            inner: Mutex::new(value),
            error_on_concurrent,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Acquire the lock.
    ///
    /// Returns [`Error::ConcurrentOperation`] immediately if the lock is
    /// busy and concurrent use is configured as an error; otherwise waits
    /// behind every earlier contender.
    pub async fn acquire(&self) -> Result<OperationGuard<'_, T>> {
        if let Ok(guard) = self.inner.try_lock() {
            return Ok(OperationGuard { guard });
        }
        if self.error_on_concurrent {
            return Err(Error::ConcurrentOperation);
        }

        self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = WaitingSlot(&self.waiting);
        let guard = self.inner.lock().await;
        tracing::trace!("operation lock handed over");
        Ok(OperationGuard { guard })
    }

    /// Run `f` against the value if the lock is idle, without waiting.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.try_lock().ok().map(|guard| f(&guard))
    }

    /// Whether an operation currently holds the lock.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Number of operations queued behind the current holder.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Whether concurrent use fails instead of queueing.
    #[must_use]
    pub fn errors_on_concurrent(&self) -> bool {
        self.error_on_concurrent
    }
}

impl<T> Deref for OperationGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OperationGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn wait_for_waiters(lock: &OperationLock<Vec<u32>>, count: usize) {
        while lock.waiting() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_idle_acquire() {
        let lock = OperationLock::new(0u32, false);
        assert!(!lock.is_busy());
        {
            let mut guard = lock.acquire().await.unwrap();
            *guard += 1;
            assert!(lock.is_busy());
            assert_eq!(lock.try_with(|v| *v), None);
        }
        assert_eq!(lock.try_with(|v| *v), Some(1));
    }

    #[tokio::test]
    async fn test_error_on_concurrent() {
        let lock = OperationLock::new((), true);
        let _held = lock.acquire().await.unwrap();
        assert!(matches!(
            lock.acquire().await,
            Err(Error::ConcurrentOperation)
        ));
        assert_eq!(lock.waiting(), 0);
    }

    #[tokio::test]
    async fn test_waiters_served_in_arrival_order() {
        let lock = Arc::new(OperationLock::new(Vec::new(), false));
        let held = lock.acquire().await.unwrap();

        let mut tasks = Vec::new();
        for n in 1..=3u32 {
            let task_lock = Arc::clone(&lock);
            tasks.push(tokio::spawn(async move {
                task_lock.acquire().await.unwrap().push(n);
            }));
            wait_for_waiters(&lock, n as usize).await;
        }

        drop(held);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(lock.try_with(Clone::clone), Some(vec![1, 2, 3]));
        assert_eq!(lock.waiting(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_not_counted() {
        let lock = Arc::new(OperationLock::new(Vec::new(), false));
        let _held = lock.acquire().await.unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
            })
        };
        wait_for_waiters(&lock, 1).await;
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(lock.waiting(), 0);
    }
}
