//! The remote node a client delegates its DHT work to.

use async_trait::async_trait;
use bytes::Bytes;
use delegate_dispatch::{AbortReason, AbortSignal};
use delegate_types::{Cid, Multiaddr, QueryEvent, RecordKey};
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

/// Query events streamed back by the delegate.
pub type EventStream = BoxStream<'static, Result<QueryEvent, DelegateError>>;

/// Failures reported by a [`Delegate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegateError {
    /// The delegate (or the transport to it) reported an error.
    #[error("{0}")]
    Remote(String),

    /// The call's signal fired.
    #[error("aborted: {0}")]
    Aborted(AbortReason),
}

/// Per-call parameters handed to the delegate.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Effective cancellation for this call. Implementations should stop
    /// work and return [`DelegateError::Aborted`] once it fires.
    pub signal: AbortSignal,
    /// Time budget the delegate may spend on its own query.
    pub timeout: Duration,
    /// Stop a provider search after this many providers.
    pub num_providers: Option<usize>,
    /// Provide every block of the DAG, not only the root.
    pub recursive: bool,
    /// Extra HTTP headers to send with the request.
    pub headers: Vec<(String, String)>,
}

impl CallOptions {
    /// Options with the given signal and timeout and nothing else set.
    pub fn new(signal: AbortSignal, timeout: Duration) -> Self {
        Self {
            signal,
            timeout,
            num_providers: None,
            recursive: false,
            headers: Vec::new(),
        }
    }
}

/// Size information for a block held by the delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStat {
    pub cid: Cid,
    pub size: u64,
}

/// A remote node able to run DHT operations on the client's behalf.
///
/// Streaming calls return once the request is accepted; events arrive on the
/// returned stream in the order the delegate produced them.
#[async_trait]
pub trait Delegate: Send + Sync + 'static {
    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;

    /// Search the DHT for providers of `cid`.
    async fn find_providers(
        &self,
        cid: &Cid,
        options: &CallOptions,
    ) -> Result<EventStream, DelegateError>;

    /// Announce that the delegate provides `cid`.
    async fn provide(&self, cid: &Cid, options: &CallOptions) -> Result<EventStream, DelegateError>;

    /// Ask the delegate to connect to `addr`.
    async fn connect(&self, addr: &Multiaddr, options: &CallOptions) -> Result<(), DelegateError>;

    /// Ask the delegate to fetch `cid` and report its size.
    async fn block_stat(&self, cid: &Cid, options: &CallOptions) -> Result<BlockStat, DelegateError>;

    /// Look up the value stored under `key`.
    async fn get(&self, key: &RecordKey, options: &CallOptions)
        -> Result<EventStream, DelegateError>;

    /// Store `value` under `key`.
    async fn put(
        &self,
        key: &RecordKey,
        value: Bytes,
        options: &CallOptions,
    ) -> Result<EventStream, DelegateError>;
}
