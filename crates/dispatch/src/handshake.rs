//! Start/finish handshake for work that outlives a single queued task.
//!
//! A streamed call has to hold its queue slot for as long as the caller keeps
//! consuming the stream, not just while the request is issued. The handshake
//! waits for a slot on behalf of that work and keeps it until `finish`.
//!
//! ```ignore
//! let mut handshake = Handshake::begin(&queue, signal);
//! handshake.started().await?;
//! // ... consume the stream ...
//! handshake.finish();
//! ```
//!
//! The wait happens inside `started`, on the task that polls it, so work
//! joins the queue in the order its owners first poll it. Dropping the
//! handshake finishes it, so early abandonment and error paths return the
//! slot as well.

use crate::{AbortSignal, Admission, AdmissionError, AdmissionQueue};

/// A queue slot held on behalf of work running elsewhere.
#[derive(Debug)]
pub struct Handshake {
    queue: AdmissionQueue,
    signal: AbortSignal,
    admission: Option<Admission>,
    admitted: bool,
    finished: bool,
    refused: Option<AdmissionError>,
}

impl Handshake {
    /// Prepare to wait for a slot on `queue`.
    ///
    /// Nothing is queued until [`started`](Self::started) is first polled.
    pub fn begin(queue: &AdmissionQueue, signal: AbortSignal) -> Self {
        Self {
            queue: queue.clone(),
            signal,
            admission: None,
            admitted: false,
            finished: false,
            refused: None,
        }
    }

    /// Wait until the slot is granted.
    ///
    /// Returns the admission error if the queue was cleared or the signal
    /// fired before admission, and [`AdmissionError::Dropped`] if the
    /// handshake was finished first. The outcome is remembered. Dropping
    /// the returned future before it completes gives up the place in line.
    pub async fn started(&mut self) -> Result<(), AdmissionError> {
        if self.admitted {
            return Ok(());
        }
        if let Some(err) = self.refused {
            return Err(err);
        }
        if self.finished {
            return Err(AdmissionError::Dropped);
        }

        match self.queue.admit(&self.signal).await {
            Ok(admission) => {
                self.admission = Some(admission);
                self.admitted = true;
                Ok(())
            }
            Err(err) => {
                self.refused = Some(err);
                Err(err)
            }
        }
    }

    /// Release the slot.
    ///
    /// Returns `true` the first time it is called and `false` afterwards.
    pub fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.admission = None;
        true
    }

    /// Whether the slot was granted.
    pub fn is_started(&self) -> bool {
        self.admitted
    }

    /// Whether `finish` has run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AbortReason;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready, task};
    use tokio_util::sync::CancellationToken;

    fn queue(limit: usize) -> AdmissionQueue {
        AdmissionQueue::new("test", NonZeroUsize::new(limit).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_holds_slot_until_finished() {
        let queue = queue(1);

        let mut first = Handshake::begin(&queue, AbortSignal::never());
        first.started().await.unwrap();
        assert!(first.is_started());
        assert_eq!(queue.in_flight(), 1);

        let mut second = Handshake::begin(&queue, AbortSignal::never());
        assert!(timeout(Duration::from_secs(1), second.started())
            .await
            .is_err());

        assert!(first.finish());
        assert!(!first.finish());
        assert!(first.is_finished());
        second.started().await.unwrap();
        assert_eq!(queue.in_flight(), 1);

        drop(second);
        queue.idle().await;
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn test_nothing_queued_before_first_poll() {
        let queue = queue(1);
        let _handshake = Handshake::begin(&queue, AbortSignal::never());
        assert!(queue.is_idle());
    }

    #[test]
    fn test_admits_in_poll_order() {
        let queue = queue(1);
        let mut holder = Handshake::begin(&queue, AbortSignal::never());
        let mut created_first = Handshake::begin(&queue, AbortSignal::never());
        let mut created_second = Handshake::begin(&queue, AbortSignal::never());

        assert_ready!(task::spawn(holder.started()).poll()).unwrap();

        let mut polled_second = task::spawn(created_second.started());
        let mut polled_first = task::spawn(created_first.started());
        assert_pending!(polled_second.poll());
        assert_pending!(polled_first.poll());
        assert_eq!(queue.pending(), 2);

        holder.finish();
        assert!(polled_second.is_woken());
        assert_pending!(polled_first.poll());
        assert_ready!(polled_second.poll()).unwrap();
        assert_eq!(queue.in_flight(), 1);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_drop_before_admission_withdraws() {
        let queue = queue(1);
        let mut holder = Handshake::begin(&queue, AbortSignal::never());
        assert_ready!(task::spawn(holder.started()).poll()).unwrap();

        let mut waiting = Handshake::begin(&queue, AbortSignal::never());
        {
            let mut started = task::spawn(waiting.started());
            assert_pending!(started.poll());
            assert_eq!(queue.pending(), 1);
        }
        assert_eq!(queue.pending(), 0);
        drop(waiting);
        drop(holder);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_reports_clear() {
        let queue = queue(1);
        let mut holder = Handshake::begin(&queue, AbortSignal::never());
        assert_ready!(task::spawn(holder.started()).poll()).unwrap();

        let mut waiting = Handshake::begin(&queue, AbortSignal::never());
        {
            let mut started = task::spawn(waiting.started());
            assert_pending!(started.poll());
            queue.clear();
            assert!(started.is_woken());
            assert_eq!(assert_ready!(started.poll()), Err(AdmissionError::Cleared));
        }
        // The outcome is remembered.
        let mut again = task::spawn(waiting.started());
        assert_eq!(assert_ready!(again.poll()), Err(AdmissionError::Cleared));
    }

    #[tokio::test]
    async fn test_reports_abort_before_admission() {
        let queue = queue(1);
        let mut holder = Handshake::begin(&queue, AbortSignal::never());
        holder.started().await.unwrap();

        let token = CancellationToken::new();
        let mut waiting = Handshake::begin(&queue, AbortSignal::any([token.clone()]));
        token.cancel();
        assert_eq!(
            waiting.started().await,
            Err(AdmissionError::Aborted(AbortReason::Cancelled))
        );

        drop(holder);
        queue.idle().await;
    }

    #[tokio::test]
    async fn test_finished_before_start_is_refused() {
        let queue = queue(1);
        let mut handshake = Handshake::begin(&queue, AbortSignal::never());
        assert!(handshake.finish());
        assert_eq!(handshake.started().await, Err(AdmissionError::Dropped));
        assert!(queue.is_idle());
    }
}
