// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response correlation over an unordered message channel.
//!
//! Every outbound job gets a fresh [`RequestId`]; the broker keeps the
//! caller's completion handle until the matching response (or a rejection)
//! arrives. Responses may come back in any order.
//!
//! A caller that stops awaiting its [`CompletionHandle`] does not remove the
//! pending entry. It is cleaned up when the late response arrives or when
//! the session ends with [`CorrelationBroker::reject_all`]; a worker that
//! never answers keeps the entry alive until then.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use fontshell_protocol::RequestId;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, ShellError};

/// A settled request: the worker's payload plus the caller's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T, M> {
    pub value: T,
    pub metadata: M,
}

struct PendingRequest<T, M> {
    sender: oneshot::Sender<Result<Completion<T, M>>>,
    metadata: M,
}

struct BrokerState<T, M> {
    next_id: u64,
    pending: HashMap<RequestId, PendingRequest<T, M>>,
}

/// Maps request ids to the callers waiting on them.
pub struct CorrelationBroker<T, M = ()> {
    state: Mutex<BrokerState<T, M>>,
}

impl<T, M> Default for CorrelationBroker<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> CorrelationBroker<T, M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState {
                next_id: 1,
                pending: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState<T, M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending request.
    ///
    /// Returns the id to embed in the outbound message and a handle that
    /// resolves once the request settles.
    pub fn allocate(&self, metadata: M) -> (RequestId, CompletionHandle<T, M>) {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();
        let id = RequestId::new(state.next_id);
        state.next_id += 1;
        state
            .pending
            .insert(id, PendingRequest { sender, metadata });
        debug!(%id, pending = state.pending.len(), "request allocated");
        (id, CompletionHandle { id, receiver })
    }

    fn take(&self, id: RequestId) -> Option<PendingRequest<T, M>> {
        self.lock().pending.remove(&id)
    }

    /// Fulfill the request `id` with `value`.
    ///
    /// Unknown ids (stale, duplicate or never allocated) are logged and
    /// ignored; the return value tells whether anything was settled.
    pub fn resolve(&self, id: RequestId, value: T) -> bool {
        let Some(pending) = self.take(id) else {
            warn!(%id, "discarding response for unknown request");
            return false;
        };

        let completion = Completion {
            value,
            metadata: pending.metadata,
        };
        if pending.sender.send(Ok(completion)).is_err() {
            debug!(%id, "caller stopped awaiting before the response arrived");
        }
        true
    }

    /// Fail the request `id` with `error`. Unknown ids are ignored.
    pub fn reject(&self, id: RequestId, error: ShellError) -> bool {
        let Some(pending) = self.take(id) else {
            warn!(%id, %error, "discarding failure for unknown request");
            return false;
        };

        if pending.sender.send(Err(error)).is_err() {
            debug!(%id, "caller stopped awaiting before the failure arrived");
        }
        true
    }

    /// Fail every pending request with `error` and clear the map.
    ///
    /// Returns the number of requests rejected.
    pub fn reject_all(&self, error: ShellError) -> usize {
        let drained: Vec<_> = self.lock().pending.drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            if pending.sender.send(Err(error.clone())).is_err() {
                debug!(%id, "caller stopped awaiting before the session ended");
            }
        }
        if count > 0 {
            warn!(count, %error, "rejected all pending requests");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.lock().pending.contains_key(&id)
    }
}

/// Awaitable side of a pending request.
#[must_use = "a completion handle does nothing unless awaited"]
pub struct CompletionHandle<T, M> {
    id: RequestId,
    receiver: oneshot::Receiver<Result<Completion<T, M>>>,
}

impl<T, M> CompletionHandle<T, M> {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T, M> Future for CompletionHandle<T, M> {
    type Output = Result<Completion<T, M>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|settled| match settled {
            Ok(outcome) => outcome,
            // Sender dropped without settling: the broker itself went away.
            Err(_) => Err(ShellError::SessionLost(format!(
                "request {} abandoned by the broker",
                this.id
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    type Broker = CorrelationBroker<String, &'static str>;

    #[test]
    fn test_allocate_ids_are_unique_and_monotonic() {
        let broker = Broker::new();
        let mut seen = HashSet::new();
        let mut last = 0;
        let mut handles = Vec::new();

        for _ in 0..100 {
            let (id, handle) = broker.allocate("meta");
            assert!(seen.insert(id), "duplicate id {id}");
            assert!(id.get() > last);
            last = id.get();
            handles.push(handle);
        }
        assert_eq!(broker.pending_count(), 100);
    }

    #[test]
    fn test_ids_not_reused_after_settling() {
        let broker = Broker::new();
        let (first, _h1) = broker.allocate("a");
        broker.resolve(first, "done".to_string());
        let (second, _h2) = broker.allocate("b");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_resolve_returns_value_and_metadata() {
        let broker = Broker::new();
        let (id, handle) = broker.allocate("MyFont.ttf");

        assert!(broker.resolve(id, "bytes".to_string()));
        let completion = handle.await.unwrap();
        assert_eq!(completion.value, "bytes");
        assert_eq!(completion.metadata, "MyFont.ttf");
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let broker = Broker::new();
        let (id_a, handle_a) = broker.allocate("a");
        let (id_b, handle_b) = broker.allocate("b");

        assert!(broker.resolve(id_b, "result B".to_string()));
        assert!(broker.resolve(id_a, "result A".to_string()));

        assert_eq!(handle_a.await.unwrap().value, "result A");
        assert_eq!(handle_b.await.unwrap().value, "result B");
    }

    #[tokio::test]
    async fn test_second_settlement_is_noop() {
        let broker = Broker::new();
        let (id, handle) = broker.allocate("x");

        assert!(broker.resolve(id, "first".to_string()));
        assert!(!broker.resolve(id, "second".to_string()));
        assert!(!broker.reject(id, ShellError::Job("late".to_string())));

        assert_eq!(handle.await.unwrap().value, "first");
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_others_untouched() {
        let broker = Broker::new();
        let (id, handle) = broker.allocate("x");

        assert!(!broker.resolve(RequestId::new(999), "stray".to_string()));
        assert!(!broker.reject(RequestId::new(999), ShellError::Job("stray".to_string())));
        assert!(broker.is_pending(id));
        assert_eq!(broker.pending_count(), 1);

        broker.resolve(id, "mine".to_string());
        assert_eq!(handle.await.unwrap().value, "mine");
    }

    #[tokio::test]
    async fn test_reject_delivers_error() {
        let broker = Broker::new();
        let (id, handle) = broker.allocate("x");

        assert!(broker.reject(id, ShellError::Job("bad kerning".to_string())));
        assert_eq!(
            handle.await.unwrap_err(),
            ShellError::Job("bad kerning".to_string())
        );
    }

    #[tokio::test]
    async fn test_reject_all_rejects_each_once_and_clears() {
        let broker = Broker::new();
        let handles: Vec<_> = (0..3).map(|_| broker.allocate("x").1).collect();

        let lost = ShellError::SessionLost("worker crashed".to_string());
        assert_eq!(broker.reject_all(lost.clone()), 3);
        assert_eq!(broker.pending_count(), 0);

        for handle in handles {
            assert_eq!(handle.await.unwrap_err(), lost);
        }
        assert_eq!(broker.reject_all(lost), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_cleaned_up_by_late_response() {
        let broker = Broker::new();
        let (id, handle) = broker.allocate("x");
        drop(handle);

        assert!(broker.is_pending(id));
        assert!(broker.resolve(id, "late".to_string()));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_broker_fails_handles() {
        let broker = Broker::new();
        let (_, handle) = broker.allocate("x");
        drop(broker);

        assert!(matches!(handle.await, Err(ShellError::SessionLost(_))));
    }
}
