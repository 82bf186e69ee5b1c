//! Configuration file for the `delegate` command.
//!
//! ```toml
//! endpoint = "http://127.0.0.1:5001/api/v0"
//! timeout = "30s"
//! general_concurrency = 4
//! long_concurrency = 2
//! relay_timeout = "5s"
//! local_peer = "12D3KooW..."
//! relays = ["/ip4/1.2.3.4/tcp/4001/p2p/12D3KooW..."]
//! ```
//!
//! Every field is optional; missing fields take the routing defaults.

use delegate_http::{EndpointConfig, HttpError};
use delegate_routing::RoutingConfig;
use delegate_types::{Identifier, Multiaddr, ParseError, PeerId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid duration for {field}: {source}")]
    Duration {
        field: &'static str,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Invalid {field}: {source}")]
    Identifier {
        field: &'static str,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Endpoint(#[from] HttpError),
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Delegate RPC endpoint URL.
    pub endpoint: Option<String>,
    /// Default per-call timeout, e.g. `"30s"`.
    pub timeout: Option<String>,
    pub general_concurrency: Option<usize>,
    pub long_concurrency: Option<usize>,
    /// Budget for each relay connection attempt, e.g. `"5s"`.
    pub relay_timeout: Option<String>,
    pub relays: Vec<String>,
    pub local_peer: Option<String>,
    pub delegate_peer: Option<String>,
}

impl FileConfig {
    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The delegate endpoint, or the public default.
    pub fn endpoint(&self) -> Result<EndpointConfig, ConfigError> {
        match &self.endpoint {
            Some(url) => Ok(url.parse()?),
            None => Ok(EndpointConfig::default()),
        }
    }

    /// Build the routing client configuration.
    pub fn routing_config(&self) -> Result<RoutingConfig, ConfigError> {
        let mut config = RoutingConfig::default();

        if let Some(timeout) = &self.timeout {
            config = config.with_default_timeout(duration("timeout", timeout)?);
        }
        if let Some(timeout) = &self.relay_timeout {
            config = config.with_relay_timeout(duration("relay_timeout", timeout)?);
        }
        let general = self.general_concurrency.unwrap_or(config.general_concurrency);
        let long = self.long_concurrency.unwrap_or(config.long_concurrency);
        config = config.with_concurrency(general, long);

        if let Some(peer) = &self.delegate_peer {
            config = config.with_delegate_peer(identifier("delegate_peer", peer)?);
        }
        if let Some(local) = &self.local_peer {
            let relays = self
                .relays
                .iter()
                .map(|relay| identifier::<Multiaddr>("relays", relay))
                .collect::<Result<_, _>>()?;
            config = config.with_relays(identifier::<PeerId>("local_peer", local)?, relays);
        } else if !self.relays.is_empty() {
            // Let the client report the missing identity.
            config.relays = self
                .relays
                .iter()
                .map(|relay| identifier::<Multiaddr>("relays", relay))
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }
}

fn duration(field: &'static str, text: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(text).map_err(|source| ConfigError::Duration { field, source })
}

fn identifier<T: Identifier>(field: &'static str, text: &str) -> Result<T, ConfigError> {
    T::parse_identifier(text).map_err(|source| ConfigError::Identifier { field, source })
}
