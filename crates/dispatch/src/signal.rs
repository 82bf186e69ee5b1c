//! Fan-in of cancellation sources.
//!
//! An [`AbortSignal`] fires as soon as any of its sources is cancelled or its
//! deadline passes, and stays fired. Sources are plain
//! [`CancellationToken`]s, so a caller's own token, the client's shutdown
//! token and a per-call timeout compose without either side knowing about
//! the others.

use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::{pending, Future};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// One of the cancellation sources was cancelled.
    Cancelled,
    /// The deadline passed.
    TimedOut,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::TimedOut => f.write_str("timed out"),
        }
    }
}

/// The effective cancellation signal for one call.
///
/// Cloning is cheap; clones observe the same sources and deadline.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    sources: Vec<CancellationToken>,
    deadline: Option<Instant>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// A signal that fires when any of `sources` is cancelled.
    pub fn any<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = CancellationToken>,
    {
        Self {
            sources: sources.into_iter().collect(),
            deadline: None,
        }
    }

    /// Add another cancellation source.
    pub fn with_source(mut self, source: CancellationToken) -> Self {
        self.sources.push(source);
        self
    }

    /// Fire `timeout` from now, or earlier if a deadline is already set.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fire at `deadline`, or earlier if a deadline is already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the signal has fired, or `None` if it has not.
    pub fn reason(&self) -> Option<AbortReason> {
        if self.sources.iter().any(CancellationToken::is_cancelled) {
            return Some(AbortReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(AbortReason::TimedOut),
            _ => None,
        }
    }

    /// Whether the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the signal fires.
    ///
    /// Never completes for a signal with no sources and no deadline.
    pub async fn aborted(&self) -> AbortReason {
        let cancelled = async {
            let mut waiting: FuturesUnordered<_> =
                self.sources.iter().map(|source| source.cancelled()).collect();
            if waiting.next().await.is_none() {
                pending::<()>().await;
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => AbortReason::Cancelled,
            _ = expired => AbortReason::TimedOut,
        }
    }

    /// Run `fut` unless the signal fires first.
    ///
    /// A signal that has already fired wins without polling `fut`.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, AbortReason> {
        tokio::select! {
            biased;
            reason = self.aborted() => Err(reason),
            output = fut => Ok(output),
        }
    }
}
