//! Admission control and cancellation for calls to a delegate node.
//!
//! # Architecture
//!
//! - [`AbortSignal`] merges any number of cancellation tokens and an optional
//!   deadline into the single signal a call observes.
//! - [`AdmissionQueue`] bounds how many calls run at once and admits waiters
//!   in submission order.
//! - [`Handshake`] lets a streamed call hold a queue slot for as long as its
//!   consumer keeps reading.

mod error;
mod handshake;
mod queue;
mod signal;

pub use error::AdmissionError;
pub use handshake::Handshake;
pub use queue::{Admission, AdmissionQueue};
pub use signal::{AbortReason, AbortSignal};
