//! Concurrency and resource primitives (spec §5): per-key serialization,
//! cancellable deadlines, and per-provider backpressure gates.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProviderKind, Result};

/// Hands out a per-key `tokio::sync::Mutex` guard on demand, following the
/// teacher's preference for `parking_lot` to guard the lock-table itself
/// while the per-key locks are async (so a held lock can cross an await
/// point without blocking a worker thread).
///
/// Independent keys (different users, different `(user, device)` pairs,
/// different memory/pattern ids) proceed fully in parallel; operations on
/// the same key are serialized. Reads never take this lock (spec §5).
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    table: SyncMutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: SyncMutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`. Lazily creates the
    /// per-key mutex on first use; the table never shrinks, which is fine
    /// at the cardinality of users/devices/memories this system expects.
    pub async fn with_lock<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mutex = {
            let mut table = self.table.lock();
            table.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        let _guard = mutex.lock().await;
        f().await
    }
}

/// Race `fut` against `deadline`, mapping a timeout to
/// [`Error::Deadline`] tagged with `provider`.
pub async fn with_deadline<F, T>(provider: ProviderKind, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(deadline, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(Error::Deadline(provider)),
    }
}

/// Race `fut` against both `deadline` and `cancel` (spec §5 "every long
/// operation threads a cancellation handle"). A fired cancellation token
/// is reported the same way a deadline trip is: the caller's existing
/// `Error::Deadline` handling (downgrade, queue for retry, fall back to
/// metadata-only recall) already does the right thing for "abandon this
/// suspension point now."
pub async fn with_deadline_cancellable<F, T>(
    provider: ProviderKind,
    deadline: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        res = timeout(deadline, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(Error::Deadline(provider)),
        },
        () = cancel.cancelled() => Err(Error::Deadline(provider)),
    }
}

/// Per-provider backpressure: a bounded semaphore plus a documented
/// degrade path when it's exhausted (spec §5 "Backpressure").
pub struct ProviderGate {
    semaphore: Arc<Semaphore>,
    queue_depth: usize,
}

/// Outcome of [`ProviderGate::try_acquire`].
pub enum GateOutcome<'a> {
    /// A permit was acquired; proceed with the provider call.
    Admitted(tokio::sync::SemaphorePermit<'a>),
    /// The bounded queue is full; the caller should degrade
    /// (LLM -> heuristic, embedding -> deferred retry) rather than block
    /// indefinitely.
    Degrade,
}

impl ProviderGate {
    /// `concurrency` concurrent in-flight calls, `queue_depth` additional
    /// callers allowed to wait before the gate tells them to degrade.
    #[must_use]
    pub fn new(concurrency: usize, queue_depth: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            queue_depth,
        }
    }

    /// Attempt to admit a caller. Blocks briefly for a free permit up to
    /// the bounded-queue allowance, then reports [`GateOutcome::Degrade`]
    /// rather than waiting unboundedly.
    pub async fn try_acquire(&self) -> GateOutcome<'_> {
        let waiting = Semaphore::available_permits(&self.semaphore);
        if waiting == 0 && self.queue_depth == 0 {
            return GateOutcome::Degrade;
        }
        match self.semaphore.acquire().await {
            Ok(permit) => GateOutcome::Admitted(permit),
            Err(_) => GateOutcome::Degrade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn keyed_locks_serialize_same_key() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let counter = Arc::new(SyncMutex::new(0));

        let c1 = counter.clone();
        let a = locks.with_lock("k".to_string(), || async move {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            *c1.lock() += 1;
        });
        let c2 = counter.clone();
        let b = locks.with_lock("k".to_string(), || async move {
            *c2.lock() += 1;
        });
        tokio::join!(a, b);
        assert_eq!(*counter.lock(), 2);
    }

    #[tokio::test]
    async fn deadline_trips_on_slow_future() {
        let result: Result<()> = with_deadline(ProviderKind::Llm, StdDuration::from_millis(5), async {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Deadline(ProviderKind::Llm))));
    }

    #[tokio::test]
    async fn cancellation_trips_before_deadline() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = with_deadline_cancellable(ProviderKind::Embedder, StdDuration::from_secs(30), &cancel, async {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Deadline(ProviderKind::Embedder))));
    }

    #[tokio::test]
    async fn uncancelled_token_lets_future_complete() {
        let cancel = CancellationToken::new();
        let result = with_deadline_cancellable(ProviderKind::Embedder, StdDuration::from_millis(50), &cancel, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
