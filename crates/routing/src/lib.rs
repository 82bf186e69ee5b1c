//! Content routing through a delegate node.
//!
//! Instead of running a DHT itself, a client asks a remote node that speaks
//! an HTTP control API to find providers, announce content and read or write
//! records on its behalf.
//!
//! # Architecture
//!
//! - [`DelegatedRouting`] is the client. It owns two admission queues (one for
//!   short calls, one for long-running provides) and the shutdown token that
//!   [`DelegatedRouting::stop`] fires.
//! - `find_providers` returns a lazy [`ProviderStream`] that holds a queue slot
//!   through a start/finish handshake for as long as it is consumed.
//! - `provide` first makes sure the delegate can reach us through a relay
//!   (preferred relay, then all relays, one success suffices) and then has
//!   the delegate fetch and announce the content.
//! - The remote side is abstracted by the [`Delegate`] trait.

mod announce;
mod config;
mod delegate;
mod error;
mod options;
mod resolver;
mod router;

pub use announce::{quorum_reached, AnnounceOutcome, Connectivity};
pub use config::{
    RoutingConfig, DEFAULT_GENERAL_CONCURRENCY, DEFAULT_LONG_CONCURRENCY, DEFAULT_RELAY_TIMEOUT,
    DEFAULT_TIMEOUT,
};
pub use delegate::{BlockStat, CallOptions, Delegate, DelegateError, EventStream};
pub use error::{Operation, RoutingError};
pub use options::RequestOptions;
pub use resolver::ProviderStream;
pub use router::{DelegatedRouting, GetValueResult};
