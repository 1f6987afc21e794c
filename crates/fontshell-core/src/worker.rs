// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker session lifecycle.
//!
//! [`WorkerManager`] owns one worker session at a time:
//!
//! ```text
//! Uninitialized ──boot──> Booting ──ready──> Ready ──exit/fatal──> Terminated
//!                            │
//!                            └──timeout/error──> Failed
//! ```
//!
//! No job is posted before the worker has signalled readiness. Concurrent
//! callers that arrive while a boot is in flight await that same boot, so a
//! session spawns at most one worker. A failed boot is cached: later calls
//! fail fast with the same error until [`WorkerManager::reset`].
//!
//! The session lock also guards broker allocation and teardown, so a job can
//! never be allocated against a session that has already rejected its
//! pending set.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use fontshell_protocol::{CompileJob, CompiledFont, JobEnvelope, WorkerMessage};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broker::{Completion, CorrelationBroker};
use crate::error::{Result, ShellError};
use crate::events::{EventBus, ShellEventKind};
use crate::transport::{FontCompiler, WorkerCommand, WorkerEvent, WorkerLink, WorkerSpawner};

/// Default time a worker has to signal readiness.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(30);

const RESET_WHILE_BOOTING: &str = "worker session was reset while booting";

/// Lifecycle state of the worker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Booting,
    Ready,
    /// Boot failed; the error is returned to every caller until reset.
    Failed(ShellError),
    /// The worker went away after becoming ready.
    Terminated(String),
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    /// Error handed to callers that cannot use the session in this state.
    fn unavailable(&self) -> ShellError {
        match self {
            SessionState::Failed(error) => error.clone(),
            SessionState::Terminated(reason) => ShellError::SessionUnavailable(reason.clone()),
            other => ShellError::SessionUnavailable(format!("worker session is {}", other)),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Booting => write!(f, "booting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Failed(error) => write!(f, "failed: {}", error),
            SessionState::Terminated(reason) => write!(f, "terminated: {}", reason),
        }
    }
}

/// A compiled font plus the worker-reported compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub font: CompiledFont,
    pub time_taken_ms: u64,
}

type BootFuture = Shared<BoxFuture<'static, Result<()>>>;

struct Session {
    state: SessionState,
    commands: Option<mpsc::UnboundedSender<WorkerCommand>>,
    boot: Option<BootFuture>,
    boot_cancel: Option<CancellationToken>,
    /// Bumped whenever a session is started or torn down; events from an
    /// older epoch are ignored.
    epoch: u64,
}

struct Inner<M> {
    spawner: Arc<dyn WorkerSpawner>,
    boot_timeout: Duration,
    fallback: Option<Arc<dyn FontCompiler>>,
    events: Option<EventBus>,
    broker: CorrelationBroker<CompileOutput, M>,
    session: Mutex<Session>,
    state_tx: watch::Sender<SessionState>,
}

/// Builder for [`WorkerManager`].
pub struct WorkerManagerBuilder {
    spawner: Arc<dyn WorkerSpawner>,
    boot_timeout: Duration,
    fallback: Option<Arc<dyn FontCompiler>>,
    events: Option<EventBus>,
}

impl WorkerManagerBuilder {
    pub fn boot_timeout(mut self, boot_timeout: Duration) -> Self {
        self.boot_timeout = boot_timeout;
        self
    }

    /// Compile on `compiler` (off the async runtime) while the session is
    /// `Failed`, instead of rejecting.
    pub fn fallback(mut self, compiler: Arc<dyn FontCompiler>) -> Self {
        self.fallback = Some(compiler);
        self
    }

    /// Publish session state changes on `events`.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build<M: Send + 'static>(self) -> WorkerManager<M> {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        WorkerManager {
            inner: Arc::new(Inner {
                spawner: self.spawner,
                boot_timeout: self.boot_timeout,
                fallback: self.fallback,
                events: self.events,
                broker: CorrelationBroker::new(),
                session: Mutex::new(Session {
                    state: SessionState::Uninitialized,
                    commands: None,
                    boot: None,
                    boot_cancel: None,
                    epoch: 0,
                }),
                state_tx,
            }),
        }
    }
}

/// Submits compile jobs to a background worker and matches the responses
/// back to their callers.
///
/// `M` is caller metadata carried alongside each job and returned with its
/// result. Cloning is cheap; clones share the session.
pub struct WorkerManager<M = ()> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for WorkerManager<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl WorkerManager {
    pub fn builder(spawner: Arc<dyn WorkerSpawner>) -> WorkerManagerBuilder {
        WorkerManagerBuilder {
            spawner,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            fallback: None,
            events: None,
        }
    }
}

impl<M: Send + 'static> WorkerManager<M> {
    /// Manager with default settings.
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        WorkerManager::builder(spawner).build()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Jobs posted and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.inner.broker.pending_count()
    }

    /// Boot the worker if needed and wait until it is ready.
    ///
    /// Callers arriving while a boot is in flight share its outcome.
    #[instrument(skip(self), fields(spawner = self.inner.spawner.name()))]
    pub async fn boot(&self) -> Result<()> {
        let boot = {
            let mut session = self.inner.lock();
            match &session.state {
                SessionState::Ready => return Ok(()),
                SessionState::Failed(_) | SessionState::Terminated(_) => {
                    return Err(session.state.unavailable());
                }
                SessionState::Uninitialized | SessionState::Booting => {}
            }
            if let Some(boot) = session.boot.clone() {
                boot
            } else {
                self.start_boot(&mut session)
            }
        };
        boot.await
    }

    fn start_boot(&self, session: &mut Session) -> BootFuture {
        session.epoch += 1;
        let epoch = session.epoch;
        let cancel = CancellationToken::new();
        self.inner.set_state(session, SessionState::Booting);

        // The boot runs as its own task so it completes even if every
        // caller awaiting it is dropped.
        let task = tokio::spawn(Inner::run_boot(
            Arc::clone(&self.inner),
            epoch,
            cancel.clone(),
        ));
        let boot = async move {
            task.await.unwrap_or_else(|e| {
                Err(ShellError::BootError(format!("boot task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        session.boot = Some(boot.clone());
        session.boot_cancel = Some(cancel);
        boot
    }

    /// Post `job` to the worker and wait for its result.
    ///
    /// Boots the worker on first use. Fails fast with the cached boot error
    /// when the session is `Failed` (unless a fallback compiler is
    /// configured) and with `SessionUnavailable` once it is `Terminated`.
    #[instrument(skip(self, job, metadata), fields(filename = %job.filename))]
    pub async fn submit(&self, job: CompileJob, metadata: M) -> Result<Completion<CompileOutput, M>> {
        if let Err(error) = self.boot().await {
            if let Some(compiler) = &self.inner.fallback {
                if matches!(self.state(), SessionState::Failed(_)) {
                    return self.run_fallback(Arc::clone(compiler), job, metadata).await;
                }
            }
            return Err(error);
        }

        let handle = {
            let session = self.inner.lock();
            match (&session.state, &session.commands) {
                (SessionState::Ready, Some(commands)) => {
                    let (id, handle) = self.inner.broker.allocate(metadata);
                    debug!(%id, "posting job");
                    if commands
                        .send(WorkerCommand::Job(JobEnvelope::new(id, job)))
                        .is_err()
                    {
                        self.inner
                            .broker
                            .reject(id, ShellError::SessionLost("worker link closed".to_string()));
                    }
                    handle
                }
                (state, _) => return Err(state.unavailable()),
            }
        };

        handle.await
    }

    async fn run_fallback(
        &self,
        compiler: Arc<dyn FontCompiler>,
        job: CompileJob,
        metadata: M,
    ) -> Result<Completion<CompileOutput, M>> {
        info!(filename = %job.filename, "compiling with fallback compiler");
        let compiled = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            compiler.compile(&job).map(|bytes| CompileOutput {
                font: CompiledFont::new(bytes),
                time_taken_ms: started.elapsed().as_millis() as u64,
            })
        })
        .await
        .map_err(|e| ShellError::Job(format!("fallback compiler panicked: {}", e)))?;

        let value = compiled.map_err(ShellError::Job)?;
        Ok(Completion { value, metadata })
    }

    /// Stop the worker and reject everything pending.
    ///
    /// The session stays `Terminated` until [`reset`](Self::reset).
    pub fn shutdown(&self) {
        let mut session = self.inner.lock();
        self.inner.teardown(&mut session, "worker session shut down");
        self.inner.set_state(
            &mut session,
            SessionState::Terminated("worker session shut down".to_string()),
        );
    }

    /// Discard the current session so the next call boots a fresh worker.
    pub fn reset(&self) {
        let mut session = self.inner.lock();
        self.inner.teardown(&mut session, "worker session reset");
        self.inner.set_state(&mut session, SessionState::Uninitialized);
    }
}

impl<M: Send + 'static> Inner<M> {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, session: &mut Session, state: SessionState) {
        if session.state == state {
            return;
        }
        info!(from = %session.state, to = %state, "worker session state changed");
        session.state = state.clone();
        self.state_tx.send_replace(state.clone());
        if let Some(events) = &self.events {
            events.publish(ShellEventKind::SessionStateChanged { state });
        }
    }

    fn teardown(&self, session: &mut Session, reason: &str) {
        session.epoch += 1;
        session.boot = None;
        if let Some(cancel) = session.boot_cancel.take() {
            cancel.cancel();
        }
        if let Some(commands) = session.commands.take() {
            let _ = commands.send(WorkerCommand::Shutdown);
        }
        self.broker
            .reject_all(ShellError::SessionLost(reason.to_string()));
    }

    async fn run_boot(inner: Arc<Self>, epoch: u64, cancel: CancellationToken) -> Result<()> {
        let started = Instant::now();
        let booted = tokio::select! {
            _ = cancel.cancelled() => Err(ShellError::SessionUnavailable(RESET_WHILE_BOOTING.to_string())),
            booted = inner.spawn_and_handshake() => booted,
        };

        match booted {
            Ok((commands, events)) => {
                inner.settle_boot(epoch, Ok(commands))?;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "worker ready"
                );
                tokio::spawn(Inner::dispatch(Arc::clone(&inner), epoch, events));
                Ok(())
            }
            Err(error) => {
                warn!(%error, "worker boot failed");
                inner.settle_boot(epoch, Err(error))
            }
        }
    }

    async fn spawn_and_handshake(
        &self,
    ) -> Result<(
        mpsc::UnboundedSender<WorkerCommand>,
        mpsc::UnboundedReceiver<WorkerEvent>,
    )> {
        let WorkerLink {
            commands,
            mut events,
        } = self.spawner.spawn().await.map_err(|error| {
            if error.is_session_fatal() {
                error
            } else {
                ShellError::BootError(error.to_string())
            }
        })?;

        let handshake = match timeout(self.boot_timeout, wait_for_ready(&mut events)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ShellError::BootTimeout {
                timeout_ms: self.boot_timeout.as_millis() as u64,
            }),
        };

        match handshake {
            Ok(()) => Ok((commands, events)),
            Err(error) => {
                let _ = commands.send(WorkerCommand::Shutdown);
                Err(error)
            }
        }
    }

    fn settle_boot(
        &self,
        epoch: u64,
        outcome: Result<mpsc::UnboundedSender<WorkerCommand>>,
    ) -> Result<()> {
        let mut session = self.lock();
        if session.epoch != epoch || session.state != SessionState::Booting {
            if let Ok(commands) = outcome {
                let _ = commands.send(WorkerCommand::Shutdown);
            }
            return Err(ShellError::SessionUnavailable(
                RESET_WHILE_BOOTING.to_string(),
            ));
        }

        session.boot = None;
        session.boot_cancel = None;
        match outcome {
            Ok(commands) => {
                session.commands = Some(commands);
                self.set_state(&mut session, SessionState::Ready);
                Ok(())
            }
            Err(error) => {
                self.set_state(&mut session, SessionState::Failed(error.clone()));
                Err(error)
            }
        }
    }

    async fn dispatch(inner: Arc<Self>, epoch: u64, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
        let reason = loop {
            match events.recv().await {
                Some(WorkerEvent::Message(WorkerMessage::Success {
                    id,
                    result,
                    time_taken_ms,
                })) => {
                    debug!(%id, time_taken_ms, bytes = result.len(), "job succeeded");
                    inner.broker.resolve(
                        id,
                        CompileOutput {
                            font: result,
                            time_taken_ms,
                        },
                    );
                }
                Some(WorkerEvent::Message(WorkerMessage::Failure {
                    id: Some(id),
                    error,
                })) => {
                    debug!(%id, %error, "job failed");
                    inner.broker.reject(id, ShellError::Job(error));
                }
                Some(WorkerEvent::Message(WorkerMessage::Failure { id: None, error })) => {
                    break format!("worker reported a fatal error: {}", error);
                }
                Some(WorkerEvent::Message(WorkerMessage::Ready)) => {
                    debug!("ignoring repeated ready signal");
                }
                Some(WorkerEvent::Exited(reason)) => break reason,
                None => break "worker link closed".to_string(),
            }
        };

        inner.terminate(epoch, reason);
    }

    fn terminate(&self, epoch: u64, reason: String) {
        let mut session = self.lock();
        if session.epoch != epoch {
            debug!(%reason, "previous worker session ended");
            return;
        }

        warn!(%reason, pending = self.broker.pending_count(), "worker session lost");
        if let Some(commands) = session.commands.take() {
            let _ = commands.send(WorkerCommand::Shutdown);
        }
        self.broker
            .reject_all(ShellError::SessionLost(reason.clone()));
        self.set_state(&mut session, SessionState::Terminated(reason));
    }
}

async fn wait_for_ready(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Result<()> {
    loop {
        match events.recv().await {
            Some(WorkerEvent::Message(WorkerMessage::Ready)) => return Ok(()),
            Some(WorkerEvent::Message(WorkerMessage::Failure { id: None, error })) => {
                return Err(ShellError::BootError(error));
            }
            Some(WorkerEvent::Message(message)) => {
                warn!(id = ?message.request_id(), "ignoring worker message received before ready");
            }
            Some(WorkerEvent::Exited(reason)) => {
                return Err(ShellError::BootError(format!(
                    "worker exited before ready: {}",
                    reason
                )));
            }
            None => {
                return Err(ShellError::BootError(
                    "worker link closed before ready".to_string(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Booting.to_string(), "booting");
        assert_eq!(
            SessionState::Failed(ShellError::BootTimeout { timeout_ms: 5 }).to_string(),
            "failed: worker did not become ready within 5ms"
        );
        assert_eq!(
            SessionState::Terminated("crashed".to_string()).to_string(),
            "terminated: crashed"
        );
    }

    #[test]
    fn test_unavailable_error_for_state() {
        let boot = ShellError::BootError("no wasm".to_string());
        assert_eq!(SessionState::Failed(boot.clone()).unavailable(), boot);
        assert_eq!(
            SessionState::Terminated("gone".to_string()).unavailable(),
            ShellError::SessionUnavailable("gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_handshake_skips_messages_before_ready() {
        let (mut link, endpoint) = WorkerLink::pair();
        endpoint.send(WorkerMessage::failure(
            Some(fontshell_protocol::RequestId::new(4)),
            "early",
        ));
        endpoint.send(WorkerMessage::Ready);

        assert_eq!(wait_for_ready(&mut link.events).await, Ok(()));
    }

    #[tokio::test]
    async fn test_handshake_boot_failure() {
        let (mut link, endpoint) = WorkerLink::pair();
        endpoint.send(WorkerMessage::failure(None, "wasm init failed"));

        assert_eq!(
            wait_for_ready(&mut link.events).await,
            Err(ShellError::BootError("wasm init failed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_handshake_link_closed() {
        let (mut link, endpoint) = WorkerLink::pair();
        drop(endpoint);

        assert!(matches!(
            wait_for_ready(&mut link.events).await,
            Err(ShellError::BootError(_))
        ));
    }
}
