//! Making local content discoverable through the delegate.
//!
//! Before the delegate can fetch and re-advertise our content it needs a path
//! back to us. Normally it already has one through the first configured
//! relay, so that relay is tried alone first. Only if it fails is every
//! relay tried at once, and one success among them is enough.

use crate::delegate::{CallOptions, Delegate};
use crate::error::{Operation, RoutingError};
use delegate_dispatch::{AdmissionError, AdmissionQueue};
use delegate_types::{Cid, CircuitCandidate, QueryEvent};
use futures::future::join_all;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one connection attempt through a relay candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnounceOutcome {
    Connected,
    Failed(String),
}

impl AnnounceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnnounceOutcome::Connected)
    }
}

/// How the delegate ended up connected to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No relays are configured; the delegate is assumed to reach us already.
    Assumed,
    /// The preferred relay worked.
    Preferred,
    /// At least one relay worked after the preferred one failed.
    Fallback { connected: usize, attempted: usize },
}

/// Whether a set of connection outcomes is good enough to announce.
///
/// One success is sufficient; unanimity is never required.
pub fn quorum_reached(outcomes: &[AnnounceOutcome]) -> bool {
    outcomes.iter().any(AnnounceOutcome::is_success)
}

/// Make sure the delegate can reach us through at least one relay.
///
/// Every attempt is bounded by `attempt_timeout` on top of the call's own
/// signal, so one dead relay cannot use up the whole call.
pub(crate) async fn ensure_connectivity(
    delegate: &dyn Delegate,
    cid: &Cid,
    candidates: &[CircuitCandidate],
    options: &CallOptions,
    attempt_timeout: Duration,
) -> Result<Connectivity, RoutingError> {
    let Some(preferred) = candidates.first() else {
        return Ok(Connectivity::Assumed);
    };

    let attempt = attempt_options(options, attempt_timeout);
    match connect(delegate, preferred, &attempt).await {
        AnnounceOutcome::Connected => {
            debug!(key = %cid, relay = %preferred.relay(), "Connected through preferred relay");
            return Ok(Connectivity::Preferred);
        }
        AnnounceOutcome::Failed(reason) => {
            warn!(
                key = %cid,
                relay = %preferred.relay(),
                reason = %reason,
                "Preferred relay failed, trying all relays"
            );
        }
    }
    check_signal(cid, options)?;

    // Fresh deadline for the fallback round.
    let attempt = attempt_options(options, attempt_timeout);
    let outcomes = join_all(
        candidates
            .iter()
            .map(|candidate| connect(delegate, candidate, &attempt)),
    )
    .await;
    check_signal(cid, options)?;

    let connected = outcomes.iter().filter(|o| o.is_success()).count();
    if !quorum_reached(&outcomes) {
        return Err(RoutingError::ConnectivityExhausted {
            key: cid.to_string(),
            attempted: outcomes.len(),
        });
    }

    info!(key = %cid, connected, attempted = outcomes.len(), "Connected through fallback relays");
    Ok(Connectivity::Fallback {
        connected,
        attempted: outcomes.len(),
    })
}

/// Options for one round of connection attempts, deadline starting now.
fn attempt_options(options: &CallOptions, attempt_timeout: Duration) -> CallOptions {
    let timeout = attempt_timeout.min(options.timeout);
    CallOptions {
        signal: options.signal.clone().with_timeout(timeout),
        timeout,
        ..options.clone()
    }
}

async fn connect(
    delegate: &dyn Delegate,
    candidate: &CircuitCandidate,
    options: &CallOptions,
) -> AnnounceOutcome {
    match options
        .signal
        .guard(delegate.connect(candidate.address(), options))
        .await
    {
        Ok(Ok(())) => AnnounceOutcome::Connected,
        Ok(Err(err)) => AnnounceOutcome::Failed(err.to_string()),
        Err(reason) => AnnounceOutcome::Failed(reason.to_string()),
    }
}

fn check_signal(cid: &Cid, options: &CallOptions) -> Result<(), RoutingError> {
    match options.signal.reason() {
        Some(reason) => Err(RoutingError::aborted(
            Operation::Provide,
            cid,
            AdmissionError::Aborted(reason),
        )),
        None => Ok(()),
    }
}

/// Have the delegate fetch `cid` and advertise itself as its provider.
///
/// Runs on the long-call queue.
pub(crate) async fn announce(
    delegate: &dyn Delegate,
    queue: &AdmissionQueue,
    cid: &Cid,
    options: &CallOptions,
) -> Result<(), RoutingError> {
    let outcome = queue
        .submit(&options.signal, || async {
            let stat = delegate
                .block_stat(cid, options)
                .await
                .map_err(|err| RoutingError::from_delegate(Operation::BlockStat, cid, err))?;
            debug!(key = %cid, size = stat.size, "Delegate holds block");

            let mut events = delegate
                .provide(cid, options)
                .await
                .map_err(|err| RoutingError::from_delegate(Operation::Provide, cid, err))?;
            while let Some(event) = events.next().await {
                match event {
                    Ok(QueryEvent::QueryError { message }) => {
                        debug!(key = %cid, error = %message, "Provide query error");
                    }
                    Ok(_) => {}
                    Err(err) => return Err(RoutingError::from_delegate(Operation::Provide, cid, err)),
                }
            }
            Ok::<(), RoutingError>(())
        })
        .await;

    match outcome {
        Ok(result) => result,
        Err(cause) => Err(RoutingError::aborted(Operation::Provide, cid, cause)),
    }
}
