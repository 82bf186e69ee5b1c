//! Lazy, cancellable provider discovery.

use crate::delegate::{CallOptions, Delegate};
use crate::error::{Operation, RoutingError};
use async_stream::stream;
use delegate_dispatch::{AdmissionError, AdmissionQueue, Handshake};
use delegate_types::{Cid, PeerRecord, QueryEvent};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error};

/// Providers of a content identifier, in the order the delegate found them.
///
/// Ends after the delegate's search completes, or with a single error item.
pub type ProviderStream = BoxStream<'static, Result<PeerRecord, RoutingError>>;

/// Stream the providers of `cid`.
///
/// Nothing happens until the stream is first polled: that poll takes the
/// stream's place in `queue` and starts the `options.timeout` deadline. The
/// stream holds its slot from admission until it ends or is dropped.
pub(crate) fn find_providers(
    delegate: Arc<dyn Delegate>,
    queue: AdmissionQueue,
    cid: Cid,
    options: CallOptions,
) -> ProviderStream {
    let providers = stream! {
        debug!(key = %cid, "find_providers starts");
        let options = CallOptions {
            signal: options.signal.clone().with_timeout(options.timeout),
            ..options
        };
        let signal = options.signal.clone();
        let mut handshake = Handshake::begin(&queue, signal.clone());

        if let Err(cause) = handshake.started().await {
            yield Err(RoutingError::aborted(Operation::FindProviders, &cid, cause));
            return;
        }

        let mut events = match signal.guard(delegate.find_providers(&cid, &options)).await {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                error!(key = %cid, error = %err, "find_providers errored");
                yield Err(RoutingError::from_delegate(Operation::FindProviders, &cid, err));
                return;
            }
            Err(reason) => {
                yield Err(RoutingError::aborted(
                    Operation::FindProviders,
                    &cid,
                    AdmissionError::Aborted(reason),
                ));
                return;
            }
        };

        let mut yielded = 0usize;
        'events: loop {
            let event = match signal.guard(events.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(reason) => {
                    yield Err(RoutingError::aborted(
                        Operation::FindProviders,
                        &cid,
                        AdmissionError::Aborted(reason),
                    ));
                    break;
                }
            };

            match event {
                Ok(QueryEvent::Provider { providers }) => {
                    for provider in providers {
                        // The consumer may have stopped us between items.
                        if let Some(reason) = signal.reason() {
                            yield Err(RoutingError::aborted(
                                Operation::FindProviders,
                                &cid,
                                AdmissionError::Aborted(reason),
                            ));
                            break 'events;
                        }
                        yielded += 1;
                        yield Ok(provider);
                    }
                }
                Ok(QueryEvent::QueryError { message }) => {
                    error!(key = %cid, error = %message, "find_providers errored");
                    yield Err(RoutingError::RemoteCallFailed {
                        op: Operation::FindProviders,
                        key: cid.to_string(),
                        message,
                    });
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    error!(key = %cid, error = %err, "find_providers errored");
                    yield Err(RoutingError::from_delegate(Operation::FindProviders, &cid, err));
                    break;
                }
            }
        }

        handshake.finish();
        debug!(key = %cid, providers = yielded, "find_providers finished");
    };

    Box::pin(providers)
}
