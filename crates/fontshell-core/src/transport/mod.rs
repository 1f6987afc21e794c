// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker transports.
//!
//! This module provides different ways of hosting the compiler worker:
//! - `local`: a compiler running on a dedicated OS thread
//! - `stream`: a worker speaking the framed protocol over any byte stream,
//!   including a child process's stdio (`process` feature)
//!
//! Every transport hands the manager a [`WorkerLink`]: an outbound command
//! channel and an inbound event channel. Nothing else crosses the boundary.

pub mod local;
pub mod stream;

use async_trait::async_trait;
use fontshell_protocol::{CompileJob, CompiledFont, JobEnvelope, WorkerMessage};
use tokio::sync::mpsc;

use crate::error::Result;

pub use local::LocalSpawner;
#[cfg(feature = "process")]
pub use stream::ProcessSpawner;
pub use stream::{StreamSpawner, attach_stream};

/// Host → worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Job(JobEnvelope<CompileJob>),
    Shutdown,
}

/// Worker → host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Message(WorkerMessage<CompiledFont>),
    /// The worker stopped; no further messages will arrive.
    Exited(String),
}

/// Host side of a running worker.
#[derive(Debug)]
pub struct WorkerLink {
    pub commands: mpsc::UnboundedSender<WorkerCommand>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Worker side of a [`WorkerLink`].
#[derive(Debug)]
pub struct WorkerEndpoint {
    pub commands: mpsc::UnboundedReceiver<WorkerCommand>,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerEndpoint {
    /// Post a message to the host. Returns false once the host has gone.
    pub fn send(&self, message: WorkerMessage<CompiledFont>) -> bool {
        self.events.send(WorkerEvent::Message(message)).is_ok()
    }
}

impl WorkerLink {
    /// Create a connected host/worker pair.
    pub fn pair() -> (WorkerLink, WorkerEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            WorkerLink {
                commands: command_tx,
                events: event_rx,
            },
            WorkerEndpoint {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

/// Starts worker instances.
///
/// Each call to [`spawn`](WorkerSpawner::spawn) must start a fresh worker.
/// The returned link carries nothing until the worker posts its readiness
/// signal (or an id-less failure).
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<WorkerLink>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "worker"
    }
}

/// A synchronous font compiler.
///
/// Implementations wrap whatever actually produces font binaries; the shell
/// only moves jobs and results around.
pub trait FontCompiler: Send + Sync + 'static {
    /// One-time setup run before the worker reports ready.
    fn init(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    fn compile(&self, job: &CompileJob) -> std::result::Result<Vec<u8>, String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fontshell_protocol::RequestId;

    #[tokio::test]
    async fn test_pair_carries_both_directions() {
        let (mut link, mut endpoint) = WorkerLink::pair();

        let job = JobEnvelope::new(RequestId::new(1), CompileJob::new("{}", "A.babelfont"));
        link.commands.send(WorkerCommand::Job(job.clone())).unwrap();
        assert_eq!(endpoint.commands.recv().await, Some(WorkerCommand::Job(job)));

        assert!(endpoint.send(WorkerMessage::Ready));
        assert_eq!(
            link.events.recv().await,
            Some(WorkerEvent::Message(WorkerMessage::Ready))
        );
    }

    #[test]
    fn test_endpoint_send_reports_closed_host() {
        let (link, endpoint) = WorkerLink::pair();
        drop(link);
        assert!(!endpoint.send(WorkerMessage::Ready));
    }
}
