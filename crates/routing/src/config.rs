//! Routing client configuration.

use delegate_types::{Multiaddr, PeerId};
use std::time::Duration;

/// Default time budget for a single call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of concurrent discovery, put and get calls.
pub const DEFAULT_GENERAL_CONCURRENCY: usize = 4;

/// Default number of concurrent provide calls.
pub const DEFAULT_LONG_CONCURRENCY: usize = 2;

/// Default budget for one relay connection attempt.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`DelegatedRouting`](crate::DelegatedRouting) client.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Timeout applied to calls that don't specify their own.
    pub default_timeout: Duration,

    /// Maximum concurrent short calls (find_providers, put, get).
    pub general_concurrency: usize,

    /// Maximum concurrent long calls (provide).
    ///
    /// Kept separate so slow announces cannot starve discovery.
    pub long_concurrency: usize,

    /// Budget for a single relay connection attempt.
    pub relay_timeout: Duration,

    /// Relays the delegate can reach us through. The first is preferred.
    pub relays: Vec<Multiaddr>,

    /// Our own identity. Required when `relays` is not empty.
    pub local_peer: Option<PeerId>,

    /// The delegate's identity, reported as the source of fetched values.
    pub delegate_peer: Option<PeerId>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            general_concurrency: DEFAULT_GENERAL_CONCURRENCY,
            long_concurrency: DEFAULT_LONG_CONCURRENCY,
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            relays: Vec::new(),
            local_peer: None,
            delegate_peer: None,
        }
    }
}

impl RoutingConfig {
    /// Set the default per-call timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the concurrency of both queues.
    pub fn with_concurrency(mut self, general: usize, long: usize) -> Self {
        self.general_concurrency = general;
        self.long_concurrency = long;
        self
    }

    /// Set the budget for each relay connection attempt.
    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Set the relays used to make us reachable before providing.
    pub fn with_relays(mut self, local_peer: PeerId, relays: Vec<Multiaddr>) -> Self {
        self.local_peer = Some(local_peer);
        self.relays = relays;
        self
    }

    /// Set the delegate's identity.
    pub fn with_delegate_peer(mut self, peer: PeerId) -> Self {
        self.delegate_peer = Some(peer);
        self
    }
}
