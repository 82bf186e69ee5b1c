//! End-to-end behaviour of the routing client against a scripted delegate.

use bytes::Bytes;
use delegate_dispatch::{AbortReason, AdmissionError};
use delegate_routing::{
    Delegate, DelegateError, DelegatedRouting, Operation, RequestOptions, RoutingConfig,
    RoutingError,
};
use delegate_test_helpers::{
    cid, peer_addr, peer_id, provider, Call, ConnectBehaviour, MockDelegate, ProviderScript,
};
use delegate_types::{CircuitCandidate, QueryEvent, RecordKey};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn start_client(mock: &Arc<MockDelegate>, config: RoutingConfig) -> DelegatedRouting {
    let delegate: Arc<dyn Delegate> = mock.clone();
    let router = DelegatedRouting::new(delegate, config).unwrap();
    router.start();
    router
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never became true");
}

async fn assert_idle(router: &DelegatedRouting) {
    timeout(Duration::from_secs(5), router.general_queue().idle())
        .await
        .expect("general queue never drained");
    assert_eq!(router.general_queue().in_flight(), 0);
}

fn hanging_after(providers: Vec<delegate_types::PeerRecord>) -> ProviderScript {
    ProviderScript {
        events: vec![Ok(QueryEvent::Provider { providers })],
        hang: true,
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_zero_concurrency_is_rejected() {
    let mock = Arc::new(MockDelegate::new());
    let delegate: Arc<dyn Delegate> = mock;
    let result = DelegatedRouting::new(delegate, RoutingConfig::default().with_concurrency(0, 2));
    assert!(matches!(result, Err(RoutingError::InvalidConfig(_))));
}

#[test]
fn test_relays_need_local_peer() {
    let delegate: Arc<dyn Delegate> = Arc::new(MockDelegate::new());
    let config = RoutingConfig {
        relays: vec![peer_addr([127, 0, 0, 1], "QmRelay")],
        ..Default::default()
    };
    assert!(matches!(
        DelegatedRouting::new(delegate, config),
        Err(RoutingError::InvalidConfig(_))
    ));
}

#[test]
fn test_candidates_follow_relay_order() {
    let local = peer_id("QmLocal");
    let relays = vec![
        peer_addr([127, 0, 0, 1], "QmRelayA"),
        peer_addr([127, 0, 0, 2], "QmRelayB"),
    ];
    let delegate: Arc<dyn Delegate> = Arc::new(MockDelegate::new());
    let router = DelegatedRouting::new(
        delegate,
        RoutingConfig::default().with_relays(local, relays.clone()),
    )
    .unwrap();

    let candidates = router.candidates();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].relay(), &relays[0]);
    assert_eq!(
        candidates[1].address().to_string(),
        format!(
            "/ip4/127.0.0.2/tcp/4001/p2p/{}/p2p-circuit/p2p/{}",
            peer_id("QmRelayB"),
            local
        )
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// find_providers
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
#[traced_test]
async fn test_find_providers_streams_records() {
    let key = cid("bafyreiexample");
    let records = vec![provider("QmProviderA"), provider("QmProviderB")];
    let mock = Arc::new(MockDelegate::new().with_providers(&key, records.clone()));
    let router = start_client(&mock, RoutingConfig::default());

    let found: Vec<_> = router
        .find_providers(key.clone(), RequestOptions::default())
        .collect()
        .await;

    assert_eq!(found, records.into_iter().map(Ok).collect::<Vec<_>>());
    assert_eq!(mock.calls(), vec![Call::FindProviders(key)]);
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_find_providers_is_lazy() {
    let key = cid("bafylazy");
    let mock = Arc::new(MockDelegate::new());
    let router = start_client(&mock, RoutingConfig::default());

    let stream = router.find_providers(key, RequestOptions::default());
    tokio::task::yield_now().await;
    assert!(mock.calls().is_empty());
    assert_eq!(router.general_queue().pending(), 0);
    drop(stream);
}

#[tokio::test]
async fn test_find_providers_respects_concurrency_in_fifo_order() {
    let keys: Vec<_> = (0..5).map(|i| cid(&format!("bafykey{}", i))).collect();
    let mut mock = MockDelegate::new().holding_searches();
    for (i, key) in keys.iter().enumerate() {
        mock = mock.with_providers(key, vec![provider(&format!("QmProvider{}", i))]);
    }
    let mock = Arc::new(mock);
    let router = Arc::new(start_client(&mock, RoutingConfig::default().with_concurrency(2, 1)));

    let handles: Vec<_> = keys
        .iter()
        .cloned()
        .map(|key| {
            let router = router.clone();
            tokio::spawn(async move {
                router
                    .find_providers(key, RequestOptions::default())
                    .collect::<Vec<_>>()
                    .await
            })
        })
        .collect();

    wait_until(|| mock.calls().len() == 2).await;
    assert_eq!(router.general_queue().in_flight(), 2);
    assert_eq!(router.general_queue().pending(), 3);

    for admitted in 3..=5 {
        mock.release(1);
        wait_until(|| mock.calls().len() == admitted).await;
        assert!(router.general_queue().in_flight() <= 2);
    }
    mock.release(2);

    for (i, handle) in handles.into_iter().enumerate() {
        let found = handle.await.unwrap();
        assert_eq!(found, vec![Ok(provider(&format!("QmProvider{}", i)))]);
    }

    let order: Vec<_> = keys.into_iter().map(Call::FindProviders).collect();
    assert_eq!(mock.calls(), order);
    assert_eq!(mock.max_open_searches(), 2);
    assert_idle(&router).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streams_admitted_in_first_poll_order() {
    let (held, first, second) = (cid("bafyheld"), cid("bafyfirst"), cid("bafysecond"));
    let mock = Arc::new(
        MockDelegate::new()
            .with_provider_script(&held, hanging_after(vec![provider("QmHeld")]))
            .with_providers(&first, vec![provider("QmFirst")])
            .with_providers(&second, vec![provider("QmSecond")]),
    );
    let router = start_client(&mock, RoutingConfig::default().with_concurrency(1, 1));

    let mut holder = router.find_providers(held.clone(), RequestOptions::default());
    assert!(holder.next().await.unwrap().is_ok());

    // Built in the opposite order to the one they are polled in.
    let mut later = router.find_providers(second.clone(), RequestOptions::default());
    let mut earlier = router.find_providers(first.clone(), RequestOptions::default());
    assert!(futures::poll!(earlier.next()).is_pending());
    assert!(futures::poll!(later.next()).is_pending());
    assert_eq!(router.general_queue().pending(), 2);

    drop(holder);
    let found: Vec<_> = earlier.collect().await;
    assert_eq!(found, vec![Ok(provider("QmFirst"))]);
    let found: Vec<_> = later.collect().await;
    assert_eq!(found, vec![Ok(provider("QmSecond"))]);

    assert_eq!(
        mock.calls(),
        vec![
            Call::FindProviders(held),
            Call::FindProviders(first),
            Call::FindProviders(second),
        ]
    );
    assert_idle(&router).await;
}

#[tokio::test]
#[traced_test]
async fn test_stop_mid_stream_yields_abort_then_ends() {
    let key = cid("bafystop");
    let mock = Arc::new(
        MockDelegate::new().with_provider_script(&key, hanging_after(vec![provider("QmFirst")])),
    );
    let router = start_client(&mock, RoutingConfig::default());

    let mut stream = router.find_providers(key, RequestOptions::default());
    assert_eq!(stream.next().await, Some(Ok(provider("QmFirst"))));

    router.stop();
    assert!(!router.is_started());

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.operation(), Some(Operation::FindProviders));
    assert!(stream.next().await.is_none());
    drop(stream);
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_stop_rejects_queued_search() {
    let held = cid("bafyheld");
    let queued = cid("bafyqueued");
    let mock = Arc::new(
        MockDelegate::new()
            .with_provider_script(&held, hanging_after(vec![provider("QmHeld")]))
            .with_providers(&queued, vec![provider("QmQueued")]),
    );
    let router = Arc::new(start_client(&mock, RoutingConfig::default().with_concurrency(1, 1)));

    let mut first = router.find_providers(held, RequestOptions::default());
    assert!(first.next().await.unwrap().is_ok());

    let second = {
        let router = router.clone();
        tokio::spawn(async move {
            router
                .find_providers(queued, RequestOptions::default())
                .collect::<Vec<_>>()
                .await
        })
    };
    wait_until(|| router.general_queue().pending() == 1).await;

    router.stop();
    let results = second.await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        &results[0],
        Err(RoutingError::Aborted {
            op: Operation::FindProviders,
            cause: AdmissionError::Cleared,
            ..
        })
    ));
    assert_eq!(mock.calls().len(), 1);
    drop(first);
}

#[tokio::test]
async fn test_calls_work_again_after_restart() {
    let key = cid("bafyrestart");
    let mock = Arc::new(MockDelegate::new().with_providers(&key, vec![provider("QmAgain")]));
    let router = start_client(&mock, RoutingConfig::default());

    router.stop();
    router.start();

    let found: Vec<_> = router
        .find_providers(key, RequestOptions::default())
        .collect()
        .await;
    assert_eq!(found, vec![Ok(provider("QmAgain"))]);
}

#[tokio::test(start_paused = true)]
async fn test_find_providers_times_out() {
    let key = cid("bafyslow");
    let mock = Arc::new(MockDelegate::new().with_provider_script(
        &key,
        ProviderScript {
            hang: true,
            ..Default::default()
        },
    ));
    let router = start_client(&mock, RoutingConfig::default());

    let found: Vec<_> = router
        .find_providers(
            key,
            RequestOptions::default().with_timeout(Duration::from_millis(100)),
        )
        .collect()
        .await;

    assert_eq!(found.len(), 1);
    assert!(matches!(
        &found[0],
        Err(RoutingError::Aborted {
            cause: AdmissionError::Aborted(AbortReason::TimedOut),
            ..
        })
    ));
    assert_idle(&router).await;
}

#[tokio::test(start_paused = true)]
async fn test_find_providers_deadline_starts_on_first_poll() {
    let key = cid("bafylate");
    let mock = Arc::new(
        MockDelegate::new().with_provider_script(&key, hanging_after(vec![provider("QmFirst")])),
    );
    let router = start_client(&mock, RoutingConfig::default());

    let mut stream = router.find_providers(
        key,
        RequestOptions::default().with_timeout(Duration::from_secs(10)),
    );
    tokio::time::sleep(Duration::from_secs(8)).await;

    assert_eq!(stream.next().await, Some(Ok(provider("QmFirst"))));
    // Ten seconds from the first poll, not from construction.
    assert!(timeout(Duration::from_secs(9), stream.next()).await.is_err());
    assert!(matches!(
        stream.next().await,
        Some(Err(RoutingError::Aborted {
            cause: AdmissionError::Aborted(AbortReason::TimedOut),
            ..
        }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_query_error_fails_search() {
    let key = cid("bafyqueryerror");
    let mock = Arc::new(MockDelegate::new().with_provider_script(
        &key,
        ProviderScript {
            events: vec![
                Ok(QueryEvent::SendingQuery),
                Ok(QueryEvent::QueryError {
                    message: "routing: not found".to_string(),
                }),
                Ok(QueryEvent::Provider {
                    providers: vec![provider("QmNeverSeen")],
                }),
            ],
            ..Default::default()
        },
    ));
    let router = start_client(&mock, RoutingConfig::default());

    let found: Vec<_> = router
        .find_providers(key, RequestOptions::default())
        .collect()
        .await;

    assert_eq!(found.len(), 1);
    assert!(matches!(
        &found[0],
        Err(RoutingError::RemoteCallFailed { message, .. }) if message == "routing: not found"
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// Slot release on every exit path
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_slot_released_when_call_fails() {
    let key = cid("bafycallfails");
    let mock = Arc::new(MockDelegate::new().with_provider_script(
        &key,
        ProviderScript {
            call_error: Some(DelegateError::Remote("connection refused".to_string())),
            ..Default::default()
        },
    ));
    let router = start_client(&mock, RoutingConfig::default().with_concurrency(1, 1));

    let found: Vec<_> = router
        .find_providers(key, RequestOptions::default())
        .collect()
        .await;
    assert!(matches!(&found[..], [Err(RoutingError::RemoteCallFailed { .. })]));
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_slot_released_when_stream_fails() {
    let key = cid("bafystreamfails");
    let mock = Arc::new(MockDelegate::new().with_provider_script(
        &key,
        ProviderScript {
            events: vec![
                Ok(QueryEvent::Provider {
                    providers: vec![provider("QmBefore")],
                }),
                Err(DelegateError::Remote("unexpected end of body".to_string())),
            ],
            ..Default::default()
        },
    ));
    let router = start_client(&mock, RoutingConfig::default().with_concurrency(1, 1));

    let found: Vec<_> = router
        .find_providers(key, RequestOptions::default())
        .collect()
        .await;
    assert_eq!(found.len(), 2);
    assert_eq!(found[0], Ok(provider("QmBefore")));
    assert!(matches!(&found[1], Err(RoutingError::RemoteCallFailed { .. })));
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_slot_released_when_caller_cancels() {
    let key = cid("bafycancelled");
    let mock = Arc::new(
        MockDelegate::new().with_provider_script(&key, hanging_after(vec![provider("QmOne")])),
    );
    let router = start_client(&mock, RoutingConfig::default().with_concurrency(1, 1));
    let token = CancellationToken::new();

    let mut stream = router.find_providers(key, RequestOptions::default().with_signal(token.clone()));
    assert!(stream.next().await.unwrap().is_ok());
    token.cancel();

    assert!(matches!(
        stream.next().await,
        Some(Err(RoutingError::Aborted {
            cause: AdmissionError::Aborted(AbortReason::Cancelled),
            ..
        }))
    ));
    assert!(stream.next().await.is_none());
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_slot_released_when_stream_dropped() {
    let key = cid("bafyabandoned");
    let mock = Arc::new(
        MockDelegate::new().with_provider_script(&key, hanging_after(vec![provider("QmOne")])),
    );
    let router = start_client(&mock, RoutingConfig::default().with_concurrency(1, 1));

    let mut stream = router.find_providers(key, RequestOptions::default());
    assert!(stream.next().await.unwrap().is_ok());
    assert_eq!(router.general_queue().in_flight(), 1);

    drop(stream);
    assert_idle(&router).await;
    assert_eq!(mock.open_searches(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// provide
// ═══════════════════════════════════════════════════════════════════════════

struct ProvideSetup {
    mock: Arc<MockDelegate>,
    router: DelegatedRouting,
}

fn provide_setup(behaviours: &[ConnectBehaviour]) -> ProvideSetup {
    let local = peer_id("QmLocal");
    let relays: Vec<_> = (0..behaviours.len())
        .map(|i| peer_addr([127, 0, 0, i as u8 + 1], &format!("QmRelay{}", i)))
        .collect();

    let mut mock = MockDelegate::new();
    for (relay, behaviour) in relays.iter().zip(behaviours) {
        let candidate = CircuitCandidate::new(relay.clone(), &local);
        mock = mock.with_connect(candidate.address(), *behaviour);
    }
    let mock = Arc::new(mock);
    let config = RoutingConfig::default()
        .with_relays(local, relays)
        .with_relay_timeout(Duration::from_secs(1));
    let router = start_client(&mock, config);
    ProvideSetup { mock, router }
}

fn provided(mock: &MockDelegate) -> bool {
    mock.calls().iter().any(|call| matches!(call, Call::Provide(_)))
}

#[tokio::test]
async fn test_provide_without_relays_skips_connect() {
    let setup = provide_setup(&[]);
    let key = cid("bafyprovide");

    setup
        .router
        .provide(&key, RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(setup.mock.connect_calls(), 0);
    assert_eq!(
        setup.mock.calls(),
        vec![Call::BlockStat(key.clone()), Call::Provide(key)]
    );
}

#[tokio::test]
#[traced_test]
async fn test_provide_single_relay() {
    use ConnectBehaviour::*;
    let key = cid("bafysingle");

    let setup = provide_setup(&[Succeed]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_calls(), 1);
    assert!(provided(&setup.mock));

    let setup = provide_setup(&[Fail]);
    let err = setup
        .router
        .provide(&key, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::ConnectivityExhausted { attempted: 1, .. }));
    // Preferred attempt plus the fallback round.
    assert_eq!(setup.mock.connect_calls(), 2);
    assert!(!provided(&setup.mock));
}

#[tokio::test]
async fn test_provide_three_relays() {
    use ConnectBehaviour::*;
    let key = cid("bafytriple");

    let setup = provide_setup(&[Fail, Fail, Fail]);
    let err = setup
        .router
        .provide(&key, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RoutingError::ConnectivityExhausted { attempted: 3, .. }));
    assert_eq!(setup.mock.connect_calls(), 4);
    assert!(!provided(&setup.mock));

    let setup = provide_setup(&[Fail, Fail, Succeed]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_calls(), 4);
    assert!(provided(&setup.mock));

    let setup = provide_setup(&[Succeed, Fail, Fail]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_calls(), 1);

    let setup = provide_setup(&[Succeed, Succeed, Succeed]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_calls(), 1);
    assert!(provided(&setup.mock));
}

#[tokio::test(start_paused = true)]
async fn test_provide_survives_hanging_relay() {
    use ConnectBehaviour::*;
    let key = cid("bafyhanging");

    let setup = provide_setup(&[Hang, Succeed, Fail]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_calls(), 4);
    assert!(provided(&setup.mock));
}

#[tokio::test]
async fn test_connect_attempts_carry_relay_timeout() {
    use ConnectBehaviour::*;
    let key = cid("bafybounded");

    let setup = provide_setup(&[Fail, Succeed]);
    setup.router.provide(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(setup.mock.connect_timeouts(), vec![Duration::from_secs(1); 3]);

    // A call budget below the relay timeout bounds the attempts instead.
    let setup = provide_setup(&[Succeed]);
    setup
        .router
        .provide(&key, RequestOptions::default().with_timeout(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(setup.mock.connect_timeouts(), vec![Duration::from_millis(200)]);
}

#[tokio::test]
async fn test_stop_clears_queued_provide_and_aborts_running_one() {
    let mock = Arc::new(MockDelegate::new().holding_announces());
    let router = Arc::new(start_client(&mock, RoutingConfig::default().with_concurrency(4, 1)));
    let (running_key, queued_key) = (cid("bafyrunning"), cid("bafyqueuedprovide"));

    let running = {
        let router = router.clone();
        let key = running_key.clone();
        tokio::spawn(async move { router.provide(&key, RequestOptions::default()).await })
    };
    wait_until(|| mock.calls().contains(&Call::BlockStat(running_key.clone()))).await;
    assert_eq!(router.long_queue().in_flight(), 1);

    let queued = {
        let router = router.clone();
        let key = queued_key.clone();
        tokio::spawn(async move { router.provide(&key, RequestOptions::default()).await })
    };
    wait_until(|| router.long_queue().pending() == 1).await;

    router.stop();

    let err = queued.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        RoutingError::Aborted {
            op: Operation::Provide,
            cause: AdmissionError::Cleared,
            ..
        }
    ));
    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        RoutingError::Aborted {
            op: Operation::Provide,
            cause: AdmissionError::Aborted(AbortReason::Cancelled),
            ..
        }
    ));

    timeout(Duration::from_secs(5), router.long_queue().idle())
        .await
        .expect("long queue never drained");
    assert_eq!(router.long_queue().in_flight(), 0);
    assert!(!mock.calls().contains(&Call::BlockStat(queued_key)));
    assert!(!provided(&mock));
}

#[tokio::test]
async fn test_provide_ignores_query_errors() {
    // The mock's provide stream carries a QueryError event.
    let setup = provide_setup(&[]);
    let key = cid("bafynoisy");
    assert!(setup.router.provide(&key, RequestOptions::default()).await.is_ok());
    assert!(setup.router.long_queue().is_idle());
}

#[tokio::test]
async fn test_provide_reports_delegate_failures() {
    let key = cid("bafymissing");
    let mock = Arc::new(
        MockDelegate::new().with_block_stat_error(DelegateError::Remote("block not found".into())),
    );
    let router = start_client(&mock, RoutingConfig::default());
    let err = router.provide(&key, RequestOptions::default()).await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::BlockStat));

    let mock = Arc::new(
        MockDelegate::new().with_provide_error(DelegateError::Remote("dht disabled".into())),
    );
    let router = start_client(&mock, RoutingConfig::default());
    let err = router.provide(&key, RequestOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        RoutingError::RemoteCallFailed {
            op: Operation::Provide,
            ..
        }
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// put / get
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_get_missing_value_is_not_found() {
    let mock = Arc::new(MockDelegate::new());
    let router = start_client(&mock, RoutingConfig::default());
    let key = RecordKey::from("/v/missing");

    let err = router.get(&key, RequestOptions::default()).await.unwrap_err();
    assert_eq!(
        err,
        RoutingError::NotFound {
            key: "/v/missing".to_string()
        }
    );
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_get_returns_exact_bytes() {
    let key = RecordKey::from("/v/binary");
    let value = Bytes::from_static(&[0x00, 0x9f, 0x92, 0x96, 0xff]);
    let mock = Arc::new(MockDelegate::new().with_value(&key, value.clone()));
    let router = start_client(&mock, RoutingConfig::default());

    let fetched = router.get(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(fetched, value);
}

#[tokio::test]
async fn test_get_skips_query_errors_before_value() {
    let key = RecordKey::from("/v/noisy");
    let mock = Arc::new(MockDelegate::new().with_get_events(
        &key,
        vec![
            Ok(QueryEvent::SendingQuery),
            Ok(QueryEvent::QueryError {
                message: "peer unreachable".to_string(),
            }),
            Ok(QueryEvent::Value {
                value: Bytes::from_static(b"found"),
            }),
        ],
    ));
    let router = start_client(&mock, RoutingConfig::default());

    let value = router.get(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(value, Bytes::from_static(b"found"));
}

#[tokio::test]
#[traced_test]
async fn test_put_then_get_round_trips() {
    let mock = Arc::new(MockDelegate::new());
    let router = start_client(
        &mock,
        RoutingConfig::default().with_delegate_peer(peer_id("QmDelegate")),
    );
    let key = RecordKey::from("/v/hello");
    let value = Bytes::from_static(b"world");

    router
        .put(&key, value.clone(), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(mock.stored(&key), Some(value.clone()));

    let result = router.get_value(&key, RequestOptions::default()).await.unwrap();
    assert_eq!(result.value, value);
    assert_eq!(result.from, Some(peer_id("QmDelegate")));
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_put_failure_is_reported() {
    let mock = Arc::new(MockDelegate::new().with_put_error(DelegateError::Remote(
        "routing service is not a DHT".to_string(),
    )));
    let router = start_client(&mock, RoutingConfig::default());

    let err = router
        .put(&RecordKey::from("/v/nope"), Bytes::from_static(b"x"), RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoutingError::RemoteCallFailed {
            op: Operation::Put,
            ..
        }
    ));
    assert_idle(&router).await;
}

#[tokio::test]
async fn test_get_with_cancelled_signal_is_aborted() {
    let mock = Arc::new(MockDelegate::new());
    let router = start_client(&mock, RoutingConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let err = router
        .get(
            &RecordKey::from("/v/cancelled"),
            RequestOptions::default().with_signal(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(mock.calls().is_empty());
}
