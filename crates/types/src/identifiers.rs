//! Identifier types exchanged with the delegate node.
//!
//! Content identifiers, peer identities and multiaddresses are the libp2p
//! ecosystem types. [`Identifier`] parses any of them from text with a
//! single error type. Record keys are raw bytes.

use bytes::Bytes;
use std::fmt;

pub use cid::Cid;
pub use libp2p_identity::PeerId;
pub use multiaddr::{Multiaddr, Protocol};

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The input was empty.
    #[error("Empty {0}")]
    Empty(&'static str),

    /// The input did not decode as the expected identifier.
    #[error("Invalid {kind} {input:?}: {message}")]
    Invalid {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        input: String,
        /// Why the decoder rejected it.
        message: String,
    },
}

impl ParseError {
    fn invalid(kind: &'static str, input: &str, err: impl fmt::Display) -> Self {
        ParseError::Invalid {
            kind,
            input: input.to_string(),
            message: err.to_string(),
        }
    }
}

/// An identifier with a canonical text form.
pub trait Identifier: Sized {
    /// Human-readable name of the identifier kind, for errors.
    const KIND: &'static str;

    /// Parse the canonical text form.
    fn parse_identifier(input: &str) -> Result<Self, ParseError>;
}

fn non_empty(kind: &'static str, input: &str) -> Result<(), ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty(kind));
    }
    Ok(())
}

impl Identifier for Cid {
    const KIND: &'static str = "cid";

    fn parse_identifier(input: &str) -> Result<Self, ParseError> {
        non_empty(Self::KIND, input)?;
        input
            .parse()
            .map_err(|e| ParseError::invalid(Self::KIND, input, e))
    }
}

impl Identifier for PeerId {
    const KIND: &'static str = "peer id";

    fn parse_identifier(input: &str) -> Result<Self, ParseError> {
        non_empty(Self::KIND, input)?;
        input
            .parse()
            .map_err(|e| ParseError::invalid(Self::KIND, input, e))
    }
}

impl Identifier for Multiaddr {
    const KIND: &'static str = "multiaddr";

    fn parse_identifier(input: &str) -> Result<Self, ParseError> {
        non_empty(Self::KIND, input)?;
        let addr: Multiaddr = input
            .parse()
            .map_err(|e| ParseError::invalid(Self::KIND, input, e))?;
        // Nothing can dial the empty address.
        if addr.is_empty() {
            return Err(ParseError::Empty(Self::KIND));
        }
        Ok(addr)
    }
}

/// Key of a record in the delegate's key/value store.
///
/// Keys are arbitrary bytes. Delegates that address records by path (for
/// example `/ipns/<id>`) expect them to be valid UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(Bytes);

impl RecordKey {
    /// Create a key from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the key as text, if it is valid UTF-8.
    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for RecordKey {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_utf8() {
            Some(text) => f.write_str(text),
            None => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash::Multihash;

    const PEER: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";

    #[test]
    fn test_parses_real_identifiers() {
        let cid = Cid::parse_identifier("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap();
        assert_eq!(cid.to_string(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");

        let peer = PeerId::parse_identifier(PEER).unwrap();
        assert_eq!(peer.to_string(), PEER);

        let text = format!("/ip4/104.131.131.82/tcp/4001/p2p/{}", PEER);
        let addr = Multiaddr::parse_identifier(&text).unwrap();
        assert_eq!(addr.to_string(), text);
        assert_eq!(addr.iter().last(), Some(Protocol::P2p(peer)));
    }

    #[test]
    fn test_cid_v1_text_form_round_trips() {
        let hash = Multihash::<64>::wrap(0x00, b"hello").unwrap();
        let cid = Cid::new_v1(0x55, hash);
        let text = cid.to_string();
        assert!(text.starts_with('b'));
        assert_eq!(Cid::parse_identifier(&text).unwrap(), cid);
    }

    #[test]
    fn test_rejects_garbage_identifiers() {
        assert_eq!(Cid::parse_identifier(""), Err(ParseError::Empty("cid")));
        assert!(matches!(
            Cid::parse_identifier("hello"),
            Err(ParseError::Invalid { kind: "cid", .. })
        ));
        assert!(matches!(
            PeerId::parse_identifier("not-a-peer-id!"),
            Err(ParseError::Invalid { kind: "peer id", .. })
        ));
        assert!(matches!(
            Multiaddr::parse_identifier("/bogus/proto/zzz"),
            Err(ParseError::Invalid { kind: "multiaddr", .. })
        ));
        assert!(Multiaddr::parse_identifier("ip4/127.0.0.1").is_err());
        assert!(Multiaddr::parse_identifier("/").is_err());
    }

    #[test]
    fn test_record_key_display() {
        assert_eq!(RecordKey::from("/ipns/abc").to_string(), "/ipns/abc");
        assert_eq!(RecordKey::from(vec![0xff, 0x00]).to_string(), "0xff00");
    }
}
