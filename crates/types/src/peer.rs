//! Peer records and relay circuit candidates.

use crate::{Multiaddr, PeerId, Protocol};
use std::fmt;

/// A peer together with the addresses it can be dialled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Peer identity.
    pub id: PeerId,
    /// Known addresses, in the order the delegate reported them.
    pub multiaddrs: Vec<Multiaddr>,
}

impl PeerRecord {
    /// Create a record with no addresses.
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            multiaddrs: Vec::new(),
        }
    }

    /// Add addresses to the record.
    pub fn with_multiaddrs(mut self, multiaddrs: Vec<Multiaddr>) -> Self {
        self.multiaddrs = multiaddrs;
        self
    }
}

/// An address through which the delegate can reach the local peer via a relay.
///
/// Built by appending `/p2p-circuit/p2p/<local peer>` to a relay address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CircuitCandidate {
    relay: Multiaddr,
    address: Multiaddr,
}

impl CircuitCandidate {
    /// Build the circuit address for `local` through `relay`.
    pub fn new(relay: Multiaddr, local: &PeerId) -> Self {
        let address = relay
            .clone()
            .with(Protocol::P2pCircuit)
            .with(Protocol::P2p(*local));
        Self { relay, address }
    }

    /// The relay this circuit goes through.
    pub fn relay(&self) -> &Multiaddr {
        &self.relay
    }

    /// The full circuit address the delegate should dial.
    pub fn address(&self) -> &Multiaddr {
        &self.address
    }
}

impl fmt::Display for CircuitCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
