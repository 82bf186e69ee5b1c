//! HTTP delegate for delegated content routing.
//!
//! [`HttpDelegate`] implements [`delegate_routing::Delegate`] against a node
//! exposing the Kubo RPC API (`/api/v0`). Query events are streamed back as
//! newline-delimited JSON and decoded lazily, so a provider search can be
//! consumed while the delegate is still walking the DHT.

mod client;
pub mod codec;
mod config;
mod error;

pub use client::HttpDelegate;
pub use codec::CodecError;
pub use config::EndpointConfig;
pub use error::HttpError;
