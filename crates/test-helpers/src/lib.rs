//! Test helpers for delegated routing.
//!
//! [`MockDelegate`] is an in-memory [`Delegate`] with scripted responses. It
//! records every call, tracks how many provider searches are open at once,
//! and can hold searches open until a test releases them.

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use delegate_routing::{BlockStat, CallOptions, Delegate, DelegateError, EventStream};
use delegate_types::{Cid, Multiaddr, PeerId, PeerRecord, Protocol, QueryEvent, RecordKey};
use multihash::Multihash;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Multihash code of the identity hash.
const IDENTITY: u64 = 0x00;
/// Multicodec code for raw bytes.
const RAW: u64 = 0x55;

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindProviders(Cid),
    Provide(Cid),
    BlockStat(Cid),
    Connect(Multiaddr),
    Get(RecordKey),
    Put(RecordKey),
}

/// How a scripted connect attempt behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehaviour {
    Succeed,
    Fail,
    /// Never answers; only the call's signal ends it.
    Hang,
}

/// Scripted response to a provider search.
#[derive(Debug, Clone, Default)]
pub struct ProviderScript {
    /// Fail the call itself instead of returning a stream.
    pub call_error: Option<DelegateError>,
    /// Items streamed back, in order.
    pub events: Vec<Result<QueryEvent, DelegateError>>,
    /// After the events, wait until the call's signal fires.
    pub hang: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    providers: HashMap<Cid, ProviderScript>,
    connect: HashMap<Multiaddr, ConnectBehaviour>,
    values: HashMap<RecordKey, Bytes>,
    get_events: HashMap<RecordKey, Vec<Result<QueryEvent, DelegateError>>>,
    put_error: Option<DelegateError>,
    provide_error: Option<DelegateError>,
    block_stat_error: Option<DelegateError>,
    connect_timeouts: Vec<Duration>,
}

/// In-memory delegate for tests.
#[derive(Default)]
pub struct MockDelegate {
    state: Mutex<State>,
    /// When set, provider searches stay open until a permit is available.
    gate: Option<Arc<Semaphore>>,
    /// When set, block stats wait for a permit before answering.
    announce_gate: Option<Arc<Semaphore>>,
    open_searches: Arc<AtomicUsize>,
    max_open_searches: Arc<AtomicUsize>,
}

impl MockDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every provider search open until [`release`](Self::release) is called.
    pub fn holding_searches(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held provider searches finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Keep every block stat, and so every announce, waiting until
    /// [`release_announces`](Self::release_announces) is called.
    pub fn holding_announces(mut self) -> Self {
        self.announce_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held announces continue.
    pub fn release_announces(&self, n: usize) {
        if let Some(gate) = &self.announce_gate {
            gate.add_permits(n);
        }
    }

    /// Answer searches for `cid` with one provider event.
    pub fn with_providers(self, cid: &Cid, providers: Vec<PeerRecord>) -> Self {
        self.with_provider_script(
            cid,
            ProviderScript {
                events: vec![
                    Ok(QueryEvent::SendingQuery),
                    Ok(QueryEvent::Provider { providers }),
                ],
                ..Default::default()
            },
        )
    }

    pub fn with_provider_script(self, cid: &Cid, script: ProviderScript) -> Self {
        self.state.lock().providers.insert(cid.clone(), script);
        self
    }

    pub fn with_connect(self, addr: &Multiaddr, behaviour: ConnectBehaviour) -> Self {
        self.state.lock().connect.insert(addr.clone(), behaviour);
        self
    }

    pub fn with_value(self, key: &RecordKey, value: Bytes) -> Self {
        self.state.lock().values.insert(key.clone(), value);
        self
    }

    /// Answer gets for `key` with exactly these items.
    pub fn with_get_events(
        self,
        key: &RecordKey,
        events: Vec<Result<QueryEvent, DelegateError>>,
    ) -> Self {
        self.state.lock().get_events.insert(key.clone(), events);
        self
    }

    pub fn with_put_error(self, err: DelegateError) -> Self {
        self.state.lock().put_error = Some(err);
        self
    }

    pub fn with_provide_error(self, err: DelegateError) -> Self {
        self.state.lock().provide_error = Some(err);
        self
    }

    pub fn with_block_stat_error(self, err: DelegateError) -> Self {
        self.state.lock().block_stat_error = Some(err);
        self
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of connect calls received so far.
    pub fn connect_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Connect(_)))
            .count()
    }

    /// The `timeout` passed with each connect call, in arrival order.
    pub fn connect_timeouts(&self) -> Vec<Duration> {
        self.state.lock().connect_timeouts.clone()
    }

    /// Provider searches whose stream is still alive.
    pub fn open_searches(&self) -> usize {
        self.open_searches.load(Ordering::SeqCst)
    }

    /// Highest number of provider searches ever open at once.
    pub fn max_open_searches(&self) -> usize {
        self.max_open_searches.load(Ordering::SeqCst)
    }

    /// The value currently stored under `key`.
    pub fn stored(&self, key: &RecordKey) -> Option<Bytes> {
        self.state.lock().values.get(key).cloned()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

/// Decrements the open-search count when a search stream is dropped.
struct OpenSearch(Arc<AtomicUsize>);

impl Drop for OpenSearch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn scripted(events: Vec<Result<QueryEvent, DelegateError>>) -> EventStream {
    Box::pin(futures::stream::iter(events))
}

#[async_trait]
impl Delegate for MockDelegate {
    fn endpoint(&self) -> String {
        "mock://delegate".to_string()
    }

    async fn find_providers(
        &self,
        cid: &Cid,
        options: &CallOptions,
    ) -> Result<EventStream, DelegateError> {
        self.record(Call::FindProviders(cid.clone()));
        let script = self
            .state
            .lock()
            .providers
            .get(cid)
            .cloned()
            .unwrap_or_default();
        if let Some(err) = script.call_error {
            return Err(err);
        }

        let open = self.open_searches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_searches.fetch_max(open, Ordering::SeqCst);
        let guard = OpenSearch(self.open_searches.clone());
        let gate = self.gate.clone();
        let signal = options.signal.clone();

        Ok(Box::pin(stream! {
            let _guard = guard;
            for event in script.events {
                yield event;
            }
            if script.hang {
                let reason = signal.aborted().await;
                yield Err(DelegateError::Aborted(reason));
                return;
            }
            if let Some(gate) = gate {
                let released = tokio::select! {
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        None
                    }
                    reason = signal.aborted() => Some(reason),
                };
                if let Some(reason) = released {
                    yield Err(DelegateError::Aborted(reason));
                }
            }
        }))
    }

    async fn provide(&self, cid: &Cid, _options: &CallOptions) -> Result<EventStream, DelegateError> {
        self.record(Call::Provide(cid.clone()));
        if let Some(err) = self.state.lock().provide_error.clone() {
            return Err(err);
        }
        Ok(scripted(vec![
            Ok(QueryEvent::SendingQuery),
            Ok(QueryEvent::QueryError {
                message: "failed to dial a closer peer".to_string(),
            }),
            Ok(QueryEvent::FinalPeer {
                peer: PeerRecord::new(peer_id("QmClosest")),
            }),
        ]))
    }

    async fn connect(&self, addr: &Multiaddr, options: &CallOptions) -> Result<(), DelegateError> {
        let behaviour = {
            let mut state = self.state.lock();
            state.calls.push(Call::Connect(addr.clone()));
            state.connect_timeouts.push(options.timeout);
            state
                .connect
                .get(addr)
                .copied()
                .unwrap_or(ConnectBehaviour::Succeed)
        };
        match behaviour {
            ConnectBehaviour::Succeed => Ok(()),
            ConnectBehaviour::Fail => Err(DelegateError::Remote(format!(
                "connect {} failure: no route to peer",
                addr
            ))),
            ConnectBehaviour::Hang => Err(DelegateError::Aborted(options.signal.aborted().await)),
        }
    }

    async fn block_stat(&self, cid: &Cid, options: &CallOptions) -> Result<BlockStat, DelegateError> {
        self.record(Call::BlockStat(cid.clone()));
        if let Some(gate) = &self.announce_gate {
            tokio::select! {
                permit = gate.acquire() => {
                    if let Ok(permit) = permit {
                        permit.forget();
                    }
                }
                reason = options.signal.aborted() => return Err(DelegateError::Aborted(reason)),
            }
        }
        if let Some(err) = self.state.lock().block_stat_error.clone() {
            return Err(err);
        }
        Ok(BlockStat {
            cid: cid.clone(),
            size: 1024,
        })
    }

    async fn get(&self, key: &RecordKey, _options: &CallOptions) -> Result<EventStream, DelegateError> {
        self.record(Call::Get(key.clone()));
        let state = self.state.lock();
        if let Some(events) = state.get_events.get(key) {
            return Ok(scripted(events.clone()));
        }
        let mut events = vec![Ok(QueryEvent::SendingQuery)];
        if let Some(value) = state.values.get(key) {
            events.push(Ok(QueryEvent::Value {
                value: value.clone(),
            }));
        }
        Ok(scripted(events))
    }

    async fn put(
        &self,
        key: &RecordKey,
        value: Bytes,
        _options: &CallOptions,
    ) -> Result<EventStream, DelegateError> {
        self.record(Call::Put(key.clone()));
        let mut state = self.state.lock();
        if let Some(err) = state.put_error.clone() {
            return Err(err);
        }
        state.values.insert(key.clone(), value);
        Ok(scripted(vec![Ok(QueryEvent::SendingQuery)]))
    }
}

fn identity_hash(label: &str) -> Multihash<64> {
    Multihash::wrap(IDENTITY, label.as_bytes()).expect("fixture label fits an identity multihash")
}

/// A raw-codec CID whose identity hash is `label`.
///
/// Equal labels give equal CIDs, so tests can name content by what it is.
pub fn cid(label: &str) -> Cid {
    Cid::new_v1(RAW, identity_hash(label))
}

/// A peer id inlining `label`. Labels must be at most 42 bytes.
pub fn peer_id(label: &str) -> PeerId {
    PeerId::from_multihash(identity_hash(label)).expect("fixture label fits an inline peer id")
}

/// Parse a test fixture multiaddr. Panics on malformed input.
pub fn multiaddr(s: &str) -> Multiaddr {
    s.parse().expect("valid multiaddr fixture")
}

/// A TCP address on `host` ending in `/p2p/<peer>`.
pub fn peer_addr(host: [u8; 4], peer: &str) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::Ip4(Ipv4Addr::from(host)))
        .with(Protocol::Tcp(4001))
        .with(Protocol::P2p(peer_id(peer)))
}

/// A provider record with one TCP address.
pub fn provider(label: &str) -> PeerRecord {
    PeerRecord::new(peer_id(label)).with_multiaddrs(vec![peer_addr([10, 0, 0, 1], label)])
}
