//! Decoding of the delegate's streamed query events.
//!
//! # Wire Format
//!
//! Streaming commands answer with newline-delimited JSON, one query event
//! per line:
//!
//! ```text
//! {"ID":"","Type":4,"Responses":[{"ID":"Qm...","Addrs":["/ip4/..."]}],"Extra":""}
//! ```
//!
//! `Type` is the numeric [`EventType`] code. For `Value` events `Extra`
//! holds the record, base64 encoded. A failure part-way through the stream
//! arrives as an error object instead:
//!
//! ```text
//! {"Message":"routing: not found","Code":0,"Type":"error"}
//! ```

use async_stream::stream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use delegate_routing::{DelegateError, EventStream};
use delegate_types::{
    EventType, Identifier, Multiaddr, ParseError, PeerId, PeerRecord, QueryEvent,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while decoding a response body.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownEventType(u8),

    #[error("Event {0} carries no peer")]
    MissingPeer(EventType),

    #[error("Invalid identifier: {0}")]
    Identifier(#[from] ParseError),

    #[error("Value is not valid base64: {0}")]
    Value(#[from] base64::DecodeError),

    /// The delegate reported an error inside the stream.
    #[error("{0}")]
    Remote(String),
}

impl From<CodecError> for DelegateError {
    fn from(err: CodecError) -> Self {
        DelegateError::Remote(err.to_string())
    }
}

/// One peer inside an event's `Responses`.
#[derive(Debug, Deserialize)]
pub struct RawPeer {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Addrs", default)]
    pub addrs: Option<Vec<String>>,
}

/// A query event as it appears on the wire.
#[derive(Debug, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Type")]
    pub kind: u8,
    #[serde(rename = "Responses", default)]
    pub responses: Option<Vec<RawPeer>>,
    #[serde(rename = "Extra", default)]
    pub extra: String,
}

/// Error object returned by the delegate, in a stream or as a failed response body.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Code", default)]
    pub code: i64,
    #[serde(rename = "Type")]
    pub kind: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Line {
    Error(ErrorBody),
    Event(RawEvent),
}

impl RawPeer {
    fn into_record(self) -> Result<PeerRecord, CodecError> {
        let id = PeerId::parse_identifier(&self.id)?;
        let multiaddrs = self
            .addrs
            .unwrap_or_default()
            .iter()
            .map(|addr| Multiaddr::parse_identifier(addr))
            .collect::<Result<_, _>>()?;
        Ok(PeerRecord::new(id).with_multiaddrs(multiaddrs))
    }
}

impl RawEvent {
    fn peers(self) -> Result<Vec<PeerRecord>, CodecError> {
        self.responses
            .unwrap_or_default()
            .into_iter()
            .map(RawPeer::into_record)
            .collect()
    }

    /// The peer an event is about: the first response, else the event's own ID.
    fn subject(self, kind: EventType) -> Result<PeerRecord, CodecError> {
        if !self.id.is_empty() && self.responses.as_ref().map_or(true, Vec::is_empty) {
            return Ok(PeerRecord::new(PeerId::parse_identifier(&self.id)?));
        }
        self.peers()?
            .into_iter()
            .next()
            .ok_or(CodecError::MissingPeer(kind))
    }

    /// Convert into a typed event.
    pub fn into_event(self) -> Result<QueryEvent, CodecError> {
        let kind =
            EventType::try_from(self.kind).map_err(CodecError::UnknownEventType)?;

        let event = match kind {
            EventType::SendingQuery => QueryEvent::SendingQuery,
            EventType::PeerResponse => QueryEvent::PeerResponse {
                from: PeerId::parse_identifier(&self.id)?,
                message_type: None,
                providers: Vec::new(),
                closer: self.peers()?,
                record: None,
            },
            EventType::FinalPeer => QueryEvent::FinalPeer {
                peer: self.subject(kind)?,
            },
            EventType::QueryError => QueryEvent::QueryError {
                message: self.extra,
            },
            EventType::Provider => QueryEvent::Provider {
                providers: self.peers()?,
            },
            EventType::Value => QueryEvent::Value {
                value: Bytes::from(STANDARD.decode(self.extra.as_bytes())?),
            },
            EventType::AddingPeer => QueryEvent::AddingPeer {
                peer: self.subject(kind)?.id,
            },
            EventType::DialingPeer => QueryEvent::DialingPeer {
                peer: self.subject(kind)?.id,
            },
        };
        Ok(event)
    }
}

/// Decode one line of a streamed response.
///
/// Blank lines decode to `None`.
pub fn decode_line(line: &[u8]) -> Result<Option<QueryEvent>, CodecError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }

    match serde_json::from_slice(line)? {
        Line::Error(body) => Err(CodecError::Remote(body.message)),
        Line::Event(raw) => raw.into_event().map(Some),
    }
}

/// Extract the human readable message from a failed response body.
pub fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => error.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Turn a chunked response body into a stream of query events.
///
/// Lines may be split across chunks. The stream ends after the first error.
pub fn decode_stream<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Box::pin(stream! {
        let mut body = Box::pin(body);
        let mut buf = BytesMut::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(e) => {
                    yield Err(DelegateError::Remote(format!("Error reading response body: {}", e)));
                    return;
                }
            }

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.split_to(pos + 1);
                match decode_line(&line) {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    }
                }
            }
        }

        // The last line need not be terminated.
        match decode_line(&buf) {
            Ok(Some(event)) => yield Ok(event),
            Ok(None) => {}
            Err(e) => yield Err(e.into()),
        }
    })
}
