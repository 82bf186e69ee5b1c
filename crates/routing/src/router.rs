//! The delegated routing client.

use crate::announce::{self, Connectivity};
use crate::config::RoutingConfig;
use crate::delegate::{CallOptions, Delegate};
use crate::error::{Operation, RoutingError};
use crate::options::RequestOptions;
use crate::resolver::{self, ProviderStream};
use bytes::Bytes;
use delegate_dispatch::{AbortSignal, AdmissionQueue};
use delegate_types::{Cid, CircuitCandidate, PeerId, QueryEvent, RecordKey};
use futures::StreamExt;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A value fetched from the delegate's key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetValueResult {
    /// The delegate that answered, if its identity is configured.
    pub from: Option<PeerId>,
    pub value: Bytes,
}

/// Content routing through a delegate node.
///
/// Discovery, put and get share the general queue; provide uses a separate
/// long-call queue so slow announces cannot starve discovery. Every call's
/// effective signal combines the caller's token, its timeout and the
/// client's shutdown token, which [`stop`](Self::stop) fires.
pub struct DelegatedRouting {
    delegate: Arc<dyn Delegate>,
    config: RoutingConfig,
    general: AdmissionQueue,
    long: AdmissionQueue,
    candidates: Vec<CircuitCandidate>,
    shutdown: RwLock<CancellationToken>,
    started: AtomicBool,
}

impl DelegatedRouting {
    /// Create a client routing through `delegate`.
    pub fn new(delegate: Arc<dyn Delegate>, config: RoutingConfig) -> Result<Self, RoutingError> {
        let general = queue("general", config.general_concurrency)?;
        let long = queue("long", config.long_concurrency)?;

        let candidates = match (&config.local_peer, config.relays.is_empty()) {
            (_, true) => Vec::new(),
            (Some(local), false) => config
                .relays
                .iter()
                .map(|relay| CircuitCandidate::new(relay.clone(), local))
                .collect(),
            (None, false) => {
                return Err(RoutingError::InvalidConfig(
                    "relays configured without a local peer id".to_string(),
                ))
            }
        };

        info!(
            endpoint = %delegate.endpoint(),
            general = config.general_concurrency,
            long = config.long_concurrency,
            relays = candidates.len(),
            "Delegated routing enabled"
        );

        Ok(Self {
            delegate,
            config,
            general,
            long,
            candidates,
            shutdown: RwLock::new(CancellationToken::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Whether [`start`](Self::start) was called more recently than [`stop`](Self::stop).
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        debug!("Delegated routing started");
    }

    /// Reject queued calls and cancel running ones.
    ///
    /// The shutdown token is replaced, so calls made after a later
    /// [`start`](Self::start) are unaffected.
    pub fn stop(&self) {
        self.general.clear();
        self.long.clear();
        let previous = std::mem::replace(&mut *self.shutdown.write(), CancellationToken::new());
        previous.cancel();
        self.started.store(false, Ordering::Release);
        debug!("Delegated routing stopped");
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Queue shared by find_providers, put and get.
    pub fn general_queue(&self) -> &AdmissionQueue {
        &self.general
    }

    /// Queue used by provide.
    pub fn long_queue(&self) -> &AdmissionQueue {
        &self.long
    }

    /// Relay circuits tried before providing, preferred first.
    pub fn candidates(&self) -> &[CircuitCandidate] {
        &self.candidates
    }

    /// Stream the providers of `cid` known to the delegate's DHT.
    ///
    /// The search starts when the stream is first polled and holds a general
    /// queue slot until the stream ends or is dropped. Streams are admitted
    /// in the order they are first polled, and the timeout counts from that
    /// poll. [`stop`](Self::stop) still ends a stream that was never polled.
    pub fn find_providers(&self, cid: Cid, options: RequestOptions) -> ProviderStream {
        let options = self.deferred_call_options(&options);
        resolver::find_providers(self.delegate.clone(), self.general.clone(), cid, options)
    }

    /// Make the delegate provide `cid` on our behalf.
    ///
    /// Ensures the delegate can reach us through a relay, then has it fetch
    /// the block and announce it. This has to be called for every block of a
    /// DAG; otherwise only the root can be served.
    pub async fn provide(&self, cid: &Cid, options: RequestOptions) -> Result<(), RoutingError> {
        debug!(key = %cid, "provide starts");
        let options = self.call_options(&options);

        let connectivity = announce::ensure_connectivity(
            self.delegate.as_ref(),
            cid,
            &self.candidates,
            &options,
            self.config.relay_timeout,
        )
        .await?;
        if let Connectivity::Fallback { connected, attempted } = connectivity {
            debug!(key = %cid, connected, attempted, "provide connected via fallback");
        }

        announce::announce(self.delegate.as_ref(), &self.long, cid, &options).await?;
        debug!(key = %cid, "provide finished");
        Ok(())
    }

    /// Store `value` under `key` in the delegate's key/value store.
    ///
    /// Fails if the delegate does not use a key/value store for routing.
    pub async fn put(
        &self,
        key: &RecordKey,
        value: Bytes,
        options: RequestOptions,
    ) -> Result<(), RoutingError> {
        debug!(key = %key, "put value starts");
        let options = self.call_options(&options);
        let delegate = self.delegate.as_ref();

        let outcome = self
            .general
            .submit(&options.signal, || async {
                let mut events = delegate
                    .put(key, value, &options)
                    .await
                    .map_err(|err| RoutingError::from_delegate(Operation::Put, key, err))?;
                while let Some(event) = events.next().await {
                    if let Err(err) = event {
                        return Err(RoutingError::from_delegate(Operation::Put, key, err));
                    }
                }
                Ok::<(), RoutingError>(())
            })
            .await
            .map_err(|cause| RoutingError::aborted(Operation::Put, key, cause))?;

        outcome?;
        debug!(key = %key, "put value finished");
        Ok(())
    }

    /// Fetch the value stored under `key`, unchanged.
    ///
    /// Fails with [`RoutingError::NotFound`] if the delegate's search ends
    /// without producing a value.
    pub async fn get(&self, key: &RecordKey, options: RequestOptions) -> Result<Bytes, RoutingError> {
        debug!(key = %key, "get value starts");
        let options = self.call_options(&options);
        let delegate = self.delegate.as_ref();

        let found = self
            .general
            .submit(&options.signal, || async {
                let mut events = delegate
                    .get(key, &options)
                    .await
                    .map_err(|err| RoutingError::from_delegate(Operation::Get, key, err))?;
                while let Some(event) = events.next().await {
                    match event {
                        Ok(QueryEvent::Value { value }) => return Ok(Some(value)),
                        Ok(_) => {}
                        Err(err) => return Err(RoutingError::from_delegate(Operation::Get, key, err)),
                    }
                }
                Ok::<_, RoutingError>(None)
            })
            .await
            .map_err(|cause| RoutingError::aborted(Operation::Get, key, cause))??;

        match found {
            Some(value) => {
                debug!(key = %key, len = value.len(), "get value finished");
                Ok(value)
            }
            None => Err(RoutingError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Like [`get`](Self::get), also reporting which delegate answered.
    pub async fn get_value(
        &self,
        key: &RecordKey,
        options: RequestOptions,
    ) -> Result<GetValueResult, RoutingError> {
        let value = self.get(key, options).await?;
        Ok(GetValueResult {
            from: self.config.delegate_peer,
            value,
        })
    }

    fn call_options(&self, options: &RequestOptions) -> CallOptions {
        let call = self.deferred_call_options(options);
        CallOptions {
            signal: call.signal.with_timeout(call.timeout),
            ..call
        }
    }

    /// Call options whose deadline has not started yet.
    fn deferred_call_options(&self, options: &RequestOptions) -> CallOptions {
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let mut signal = AbortSignal::any([self.shutdown.read().clone()]);
        if let Some(caller) = &options.signal {
            signal = signal.with_source(caller.clone());
        }

        CallOptions {
            signal,
            timeout,
            num_providers: options.num_providers,
            recursive: options.recursive,
            headers: options.headers.clone(),
        }
    }
}

fn queue(name: &'static str, limit: usize) -> Result<AdmissionQueue, RoutingError> {
    let limit = NonZeroUsize::new(limit)
        .ok_or_else(|| RoutingError::InvalidConfig(format!("{} concurrency must be positive", name)))?;
    Ok(AdmissionQueue::new(name, limit))
}
