// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One-time asynchronous initialization shared by concurrent awaiters.
//!
//! The first [`ReadinessGate::ensure_ready`] call starts the init routine;
//! calls that arrive while it runs await the same shared future and observe
//! the same outcome. A failed init is not cached, so the next call retries.
//! [`ReadinessGate::reset`] forces a fresh init; an init that was already
//! running when the gate was reset cannot mark it ready.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::error::{Result, ShellError};
use crate::events::{EventBus, ShellEventKind};

type InitFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
type InitFuture = Shared<BoxFuture<'static, Result<()>>>;

struct GateState {
    ready: bool,
    generation: u64,
    in_flight: Option<InitFuture>,
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ReadinessGate {
    name: &'static str,
    init: InitFn,
    state: Arc<Mutex<GateState>>,
    events: Option<EventBus>,
}

impl ReadinessGate {
    pub fn new<F, Fut>(name: &'static str, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name,
            init: Arc::new(move || init().boxed()),
            state: Arc::new(Mutex::new(GateState {
                ready: false,
                generation: 0,
                in_flight: None,
            })),
            events: None,
        }
    }

    /// Publish `GateReady` on `events` when initialization succeeds.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }

    /// Resolve once initialization has succeeded, starting it if needed.
    pub async fn ensure_ready(&self) -> Result<()> {
        let init = {
            let mut state = lock(&self.state);
            if state.ready {
                return Ok(());
            }
            match state.in_flight.clone() {
                Some(init) => init,
                None => self.start(&mut state),
            }
        };
        init.await
    }

    /// Forget any previous initialization.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.ready = false;
        state.in_flight = None;
        debug!(gate = self.name, generation = state.generation, "gate reset");
    }

    /// The init routine is invoked on first poll, after the state lock is
    /// released, so it may call back into the gate.
    fn start(&self, state: &mut GateState) -> InitFuture {
        let generation = state.generation;
        let name = self.name;
        let init = Arc::clone(&self.init);
        let shared_state = Arc::clone(&self.state);
        let events = self.events.clone();
        debug!(gate = name, generation, "starting initialization");

        let init = async move {
            let outcome = init().await.map_err(|error| match error {
                ShellError::GateInit(_) => error,
                other => ShellError::GateInit(other.to_string()),
            });

            let mut state = lock(&shared_state);
            if state.generation != generation {
                debug!(gate = name, generation, "discarding outcome of superseded initialization");
                return outcome;
            }

            state.in_flight = None;
            match &outcome {
                Ok(()) => {
                    state.ready = true;
                    info!(gate = name, "gate ready");
                    if let Some(events) = events {
                        events.publish(ShellEventKind::GateReady);
                    }
                }
                Err(error) => warn!(gate = name, %error, "initialization failed, will retry"),
            }
            outcome
        }
        .boxed()
        .shared();

        state.in_flight = Some(init.clone());
        init
    }
}
