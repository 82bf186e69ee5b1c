//! Delegate endpoint configuration.

use crate::error::HttpError;
use std::fmt;
use std::str::FromStr;

/// Where the delegate's RPC API is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// `http` or `https`.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Path prefix of the RPC API, e.g. `/api/v0`.
    pub api_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: "node0.delegate.ipfs.io".to_string(),
            port: 443,
            api_path: "/api/v0".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Plain HTTP endpoint on `host:port` with the default API path.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: "http".to_string(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let path = self.api_path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", self.protocol, self.host, self.port, path)
        }
    }

    /// URL of an RPC command such as `dht/findprovs`.
    pub fn command_url(&self, command: &str) -> String {
        format!("{}/{}", self.base_url(), command.trim_start_matches('/'))
    }
}

impl FromStr for EndpointConfig {
    type Err = HttpError;

    /// Parse `protocol://host[:port][/api/path]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HttpError::InvalidEndpoint(s.to_string());

        let (protocol, rest) = s.split_once("://").ok_or_else(invalid)?;
        let default_port = match protocol {
            "http" => 80,
            "https" => 443,
            _ => return Err(invalid()),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let api_path = if path.trim_matches('/').is_empty() {
            EndpointConfig::default().api_path
        } else {
            path.trim_end_matches('/').to_string()
        };

        Ok(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            api_path,
        })
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}
