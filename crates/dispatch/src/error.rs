//! Error types for admission.

use crate::AbortReason;
use thiserror::Error;

/// Reasons a task was not run to completion by an admission queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The queue was cleared while the task was waiting for a slot.
    #[error("Queue cleared before admission")]
    Cleared,

    /// The task's signal fired while it was waiting or running.
    #[error("Signal fired: {0}")]
    Aborted(AbortReason),

    /// A handshake was finished before it was admitted.
    #[error("Handshake finished before admission")]
    Dropped,
}
