//! Bounded-concurrency admission queue.
//!
//! Tasks wait for one of `limit` slots in submission order. A slot is held by
//! an [`Admission`] guard for as long as the task's future is alive, so it is
//! returned on success, on error, and when the caller drops the future
//! mid-flight.
//!
//! A waiter takes its place in line the first time its future is polled,
//! on the polling task itself, so admission order never depends on how the
//! runtime schedules other tasks.

use crate::{AbortSignal, AdmissionError};
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A FIFO queue admitting at most `limit` tasks at a time.
///
/// Clones share the same slots.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    limit: usize,
    /// Fair semaphore; its waiter list is the pending queue.
    slots: Arc<Semaphore>,
    /// Cancelled and replaced on every `clear()`.
    epoch: Mutex<CancellationToken>,
    in_flight: AtomicUsize,
    pending: AtomicUsize,
    changed: Notify,
}

impl AdmissionQueue {
    /// Create a queue admitting at most `limit` tasks concurrently.
    ///
    /// `name` only appears in logs.
    pub fn new(name: &'static str, limit: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                limit: limit.get(),
                slots: Arc::new(Semaphore::new(limit.get())),
                epoch: Mutex::new(CancellationToken::new()),
                in_flight: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                changed: Notify::new(),
            }),
        }
    }

    /// Queue name, as given at construction.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Maximum number of concurrently admitted tasks.
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Number of tasks currently admitted.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Number of tasks waiting for a slot.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Whether nothing is admitted or waiting.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0 && self.pending() == 0
    }

    /// Wait until nothing is admitted or waiting.
    pub async fn idle(&self) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.is_idle() {
                return;
            }
            changed.await;
        }
    }

    /// Run `task` once a slot is free.
    ///
    /// `task` is only invoked after admission. It is never invoked if the
    /// queue is cleared or `signal` fires first, and its future is abandoned
    /// if `signal` fires while it runs.
    pub async fn submit<F, Fut, T>(&self, signal: &AbortSignal, task: F) -> Result<T, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _admission = self.admit(signal).await?;
        signal.guard(task()).await.map_err(AdmissionError::Aborted)
    }

    /// Reject every task still waiting for a slot.
    ///
    /// Admitted tasks keep running.
    pub fn clear(&self) {
        let previous = std::mem::replace(&mut *self.inner.epoch.lock(), CancellationToken::new());
        previous.cancel();
        debug!(
            queue = self.inner.name,
            pending = self.pending(),
            in_flight = self.in_flight(),
            "Admission queue cleared"
        );
    }

    /// Wait for a slot and hold it until the returned guard is dropped.
    ///
    /// For work that cannot be expressed as a single future, such as a
    /// stream consumed by the caller. The place in line is taken on first
    /// poll and given up if the future is dropped before admission.
    pub async fn admit(&self, signal: &AbortSignal) -> Result<Admission, AdmissionError> {
        let epoch = self.inner.epoch.lock().clone();
        let waiting = Tracked::enter(&self.inner.pending, &self.inner.changed);

        let permit = tokio::select! {
            biased;
            _ = epoch.cancelled() => return Err(AdmissionError::Cleared),
            reason = signal.aborted() => return Err(AdmissionError::Aborted(reason)),
            // The semaphore is never closed.
            permit = self.inner.slots.clone().acquire_owned() => {
                permit.map_err(|_| AdmissionError::Cleared)?
            }
        };

        // Count the slot before leaving the waiting set so `idle()` never
        // sees a gap.
        let admission = Admission::enter(self.inner.clone(), permit);
        drop(waiting);
        trace!(
            queue = self.inner.name,
            in_flight = self.in_flight(),
            pending = self.pending(),
            "Task admitted"
        );
        Ok(admission)
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("name", &self.inner.name)
            .field("limit", &self.inner.limit)
            .field("in_flight", &self.in_flight())
            .field("pending", &self.pending())
            .finish()
    }
}

/// An admitted task's hold on a queue slot, released on drop.
pub struct Admission {
    inner: Arc<Inner>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Admission {
    fn enter(inner: Arc<Inner>, permit: OwnedSemaphorePermit) -> Self {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            inner,
            permit: Some(permit),
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        // Return the permit first so a woken `idle()` sees the slot free.
        drop(self.permit.take());
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.inner.changed.notify_waiters();
    }
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("queue", &self.inner.name)
            .finish()
    }
}

/// Counter increment undone on drop.
struct Tracked<'a> {
    count: &'a AtomicUsize,
    changed: &'a Notify,
}

impl<'a> Tracked<'a> {
    fn enter(count: &'a AtomicUsize, changed: &'a Notify) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self { count, changed }
    }
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
        self.changed.notify_waiters();
    }
}
