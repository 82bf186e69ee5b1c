//! DHT query events reported by the delegate while it works on a request.

use crate::{PeerId, PeerRecord};
use bytes::Bytes;
use std::fmt;

/// Numeric event codes, as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    SendingQuery = 0,
    PeerResponse = 1,
    FinalPeer = 2,
    QueryError = 3,
    Provider = 4,
    Value = 5,
    AddingPeer = 6,
    DialingPeer = 7,
}

impl EventType {
    /// Upper-case event name.
    pub fn name(self) -> &'static str {
        match self {
            EventType::SendingQuery => "SENDING_QUERY",
            EventType::PeerResponse => "PEER_RESPONSE",
            EventType::FinalPeer => "FINAL_PEER",
            EventType::QueryError => "QUERY_ERROR",
            EventType::Provider => "PROVIDER",
            EventType::Value => "VALUE",
            EventType::AddingPeer => "ADDING_PEER",
            EventType::DialingPeer => "DIALING_PEER",
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => EventType::SendingQuery,
            1 => EventType::PeerResponse,
            2 => EventType::FinalPeer,
            3 => EventType::QueryError,
            4 => EventType::Provider,
            5 => EventType::Value,
            6 => EventType::AddingPeer,
            7 => EventType::DialingPeer,
            other => return Err(other),
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DHT message kinds a peer response can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    PutValue = 0,
    GetValue = 1,
    AddProvider = 2,
    GetProviders = 3,
    FindNode = 4,
    Ping = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => MessageType::PutValue,
            1 => MessageType::GetValue,
            2 => MessageType::AddProvider,
            3 => MessageType::GetProviders,
            4 => MessageType::FindNode,
            5 => MessageType::Ping,
            other => return Err(other),
        })
    }
}

/// A record carried in a peer response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtRecord {
    pub key: Bytes,
    pub value: Bytes,
}

/// One step of a DHT query running on the delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// The delegate is sending a query to a peer.
    SendingQuery,

    /// A peer answered one of the delegate's queries.
    PeerResponse {
        from: PeerId,
        message_type: Option<MessageType>,
        providers: Vec<PeerRecord>,
        closer: Vec<PeerRecord>,
        record: Option<DhtRecord>,
    },

    /// The query converged on a peer.
    FinalPeer { peer: PeerRecord },

    /// The query (or one of its branches) failed.
    QueryError { message: String },

    /// Providers of the requested content were found.
    Provider { providers: Vec<PeerRecord> },

    /// A value for the requested key was found.
    Value { value: Bytes },

    /// A peer was added to the delegate's routing table.
    AddingPeer { peer: PeerId },

    /// The delegate is dialling a peer.
    DialingPeer { peer: PeerId },
}

impl QueryEvent {
    /// The wire code for this event.
    pub fn event_type(&self) -> EventType {
        match self {
            QueryEvent::SendingQuery => EventType::SendingQuery,
            QueryEvent::PeerResponse { .. } => EventType::PeerResponse,
            QueryEvent::FinalPeer { .. } => EventType::FinalPeer,
            QueryEvent::QueryError { .. } => EventType::QueryError,
            QueryEvent::Provider { .. } => EventType::Provider,
            QueryEvent::Value { .. } => EventType::Value,
            QueryEvent::AddingPeer { .. } => EventType::AddingPeer,
            QueryEvent::DialingPeer { .. } => EventType::DialingPeer,
        }
    }

    /// Upper-case event name.
    pub fn name(&self) -> &'static str {
        self.event_type().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes() {
        for code in 0..=7u8 {
            let ty = EventType::try_from(code).unwrap();
            assert_eq!(ty as u8, code);
        }
        assert_eq!(EventType::try_from(8), Err(8));
    }

    #[test]
    fn test_event_name() {
        let event = QueryEvent::Value {
            value: Bytes::from_static(b"v"),
        };
        assert_eq!(event.name(), "VALUE");
        assert_eq!(QueryEvent::SendingQuery.event_type(), EventType::SendingQuery);
    }
}
