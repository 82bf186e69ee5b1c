//! [`Delegate`] implementation over the delegate's HTTP RPC API.
//!
//! Every command is a `POST` to `<api>/<command>?arg=...`. Streaming commands
//! (`dht/findprovs`, `dht/provide`, `dht/get`, `dht/put`) answer with
//! newline-delimited JSON decoded by [`codec`](crate::codec).

use crate::codec::{self, decode_stream};
use crate::config::EndpointConfig;
use crate::error::HttpError;
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use delegate_dispatch::AbortSignal;
use delegate_routing::{BlockStat, CallOptions, Delegate, DelegateError, EventStream};
use delegate_types::{Cid, Identifier, Multiaddr, RecordKey};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, trace};

/// Response of `swarm/connect`.
#[derive(Debug, Deserialize)]
struct ConnectResponse {
    #[serde(rename = "Strings", default)]
    strings: Vec<String>,
}

/// Response of `block/stat`.
#[derive(Debug, Deserialize)]
struct BlockStatResponse {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: u64,
}

/// A delegate reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDelegate {
    endpoint: EndpointConfig,
    client: Client,
}

impl HttpDelegate {
    /// Create a delegate client for `endpoint`.
    pub fn new(endpoint: EndpointConfig) -> Result<Self, HttpError> {
        let client = Client::builder().build().map_err(HttpError::Client)?;
        Ok(Self::with_client(endpoint, client))
    }

    /// Create a delegate client sharing an existing connection pool.
    pub fn with_client(endpoint: EndpointConfig, client: Client) -> Self {
        Self { endpoint, client }
    }

    pub fn endpoint_config(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn request(&self, command: &str, query: &[(&str, String)], options: &CallOptions) -> RequestBuilder {
        let mut request = self.client.post(self.endpoint.command_url(command)).query(query);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// Send a request and fail on a non-success status.
    async fn send(
        &self,
        command: &'static str,
        request: RequestBuilder,
        signal: &AbortSignal,
    ) -> Result<Response, DelegateError> {
        trace!(command, "Sending delegate request");
        let response = signal
            .guard(request.send())
            .await
            .map_err(DelegateError::Aborted)?
            .map_err(|source| HttpError::Request { command, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = signal
            .guard(response.bytes())
            .await
            .map_err(DelegateError::Aborted)?
            .unwrap_or_default();
        let message = codec::error_message(&body);
        debug!(command, status = status.as_u16(), message = %message, "Delegate request failed");
        Err(HttpError::Status {
            command,
            status: status.as_u16(),
            message,
        }
        .into())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        command: &'static str,
        request: RequestBuilder,
        signal: &AbortSignal,
    ) -> Result<T, DelegateError> {
        let response = self.send(command, request, signal).await?;
        let body = signal
            .guard(response.bytes())
            .await
            .map_err(DelegateError::Aborted)?
            .map_err(|source| HttpError::Request { command, source })?;
        let value = serde_json::from_slice(&body).map_err(codec::CodecError::from)?;
        Ok(value)
    }

    async fn send_streaming(
        &self,
        command: &'static str,
        request: RequestBuilder,
        signal: &AbortSignal,
    ) -> Result<EventStream, DelegateError> {
        let response = self.send(command, request, signal).await?;
        Ok(abortable(decode_stream(response.bytes_stream()), signal.clone()))
    }
}

/// End `events` with an abort error once `signal` fires.
fn abortable(mut events: EventStream, signal: AbortSignal) -> EventStream {
    Box::pin(stream! {
        loop {
            match signal.guard(events.next()).await {
                Ok(Some(event)) => yield event,
                Ok(None) => break,
                Err(reason) => {
                    yield Err(DelegateError::Aborted(reason));
                    break;
                }
            }
        }
    })
}

fn key_arg(key: &RecordKey) -> Result<String, DelegateError> {
    key.as_utf8()
        .map(str::to_string)
        .ok_or_else(|| HttpError::InvalidKey(key.to_string()).into())
}

fn timeout_arg(options: &CallOptions) -> String {
    format!("{}ms", options.timeout.as_millis())
}

#[async_trait]
impl Delegate for HttpDelegate {
    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }

    async fn find_providers(&self, cid: &Cid, options: &CallOptions) -> Result<EventStream, DelegateError> {
        let mut query = vec![("arg", cid.to_string()), ("timeout", timeout_arg(options))];
        if let Some(n) = options.num_providers {
            query.push(("num-providers", n.to_string()));
        }
        let request = self.request("dht/findprovs", &query, options);
        self.send_streaming("dht/findprovs", request, &options.signal).await
    }

    async fn provide(&self, cid: &Cid, options: &CallOptions) -> Result<EventStream, DelegateError> {
        let query = [
            ("arg", cid.to_string()),
            ("recursive", options.recursive.to_string()),
            ("timeout", timeout_arg(options)),
        ];
        let request = self.request("dht/provide", &query, options);
        self.send_streaming("dht/provide", request, &options.signal).await
    }

    async fn connect(&self, addr: &Multiaddr, options: &CallOptions) -> Result<(), DelegateError> {
        let request = self.request("swarm/connect", &[("arg", addr.to_string())], options);
        let response: ConnectResponse = self
            .send_json("swarm/connect", request, &options.signal)
            .await?;

        // The delegate reports some dial failures in a successful response.
        if let Some(failure) = response.strings.iter().find(|s| s.contains("failure")) {
            return Err(HttpError::ConnectFailed {
                addr: addr.to_string(),
                message: failure.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn block_stat(&self, cid: &Cid, options: &CallOptions) -> Result<BlockStat, DelegateError> {
        let request = self.request("block/stat", &[("arg", cid.to_string())], options);
        let response: BlockStatResponse = self
            .send_json("block/stat", request, &options.signal)
            .await?;
        let cid = Cid::parse_identifier(&response.key)
            .map_err(|e| HttpError::Codec(codec::CodecError::Identifier(e)))?;
        Ok(BlockStat {
            cid,
            size: response.size,
        })
    }

    async fn get(&self, key: &RecordKey, options: &CallOptions) -> Result<EventStream, DelegateError> {
        let query = [("arg", key_arg(key)?), ("timeout", timeout_arg(options))];
        let request = self.request("dht/get", &query, options);
        self.send_streaming("dht/get", request, &options.signal).await
    }

    async fn put(
        &self,
        key: &RecordKey,
        value: Bytes,
        options: &CallOptions,
    ) -> Result<EventStream, DelegateError> {
        let query = [("arg", key_arg(key)?), ("timeout", timeout_arg(options))];
        let form = Form::new().part("file", Part::bytes(value.to_vec()).file_name("value"));
        let request = self.request("dht/put", &query, options).multipart(form);
        self.send_streaming("dht/put", request, &options.signal).await
    }
}
