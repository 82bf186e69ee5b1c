//! Core types for delegated content routing.
//!
//! These are the values exchanged between the routing client and a delegate
//! node: content identifiers, peer identities, addresses, and the DHT query
//! events a delegate streams back while it works.

mod event;
mod identifiers;
mod peer;

pub use event::{DhtRecord, EventType, MessageType, QueryEvent};
pub use identifiers::{Cid, Identifier, Multiaddr, ParseError, PeerId, Protocol, RecordKey};
pub use peer::{CircuitCandidate, PeerRecord};
