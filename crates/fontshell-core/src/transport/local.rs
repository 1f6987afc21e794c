// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process worker running a [`FontCompiler`] on its own OS thread.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use async_trait::async_trait;
use fontshell_protocol::{CompiledFont, WorkerMessage};
use tracing::{debug, info, warn};

use super::{FontCompiler, WorkerCommand, WorkerEndpoint, WorkerEvent, WorkerLink, WorkerSpawner};
use crate::error::{Result, ShellError};

/// Spawns a fresh compiler thread per session.
#[derive(Clone)]
pub struct LocalSpawner {
    compiler: Arc<dyn FontCompiler>,
}

impl LocalSpawner {
    pub fn new(compiler: Arc<dyn FontCompiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl WorkerSpawner for LocalSpawner {
    async fn spawn(&self) -> Result<WorkerLink> {
        let (link, endpoint) = WorkerLink::pair();
        let compiler = Arc::clone(&self.compiler);

        thread::Builder::new()
            .name("fontshell-worker".to_string())
            .spawn(move || run_worker(compiler.as_ref(), endpoint))
            .map_err(|e| ShellError::BootError(format!("failed to start worker thread: {}", e)))?;

        Ok(link)
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn run_worker(compiler: &dyn FontCompiler, mut endpoint: WorkerEndpoint) {
    if let Err(error) = compiler.init() {
        warn!(%error, "compiler initialization failed");
        endpoint.send(WorkerMessage::failure(None, error));
        return;
    }

    if !endpoint.send(WorkerMessage::Ready) {
        return;
    }
    info!("local worker ready");

    while let Some(command) = endpoint.commands.blocking_recv() {
        let envelope = match command {
            WorkerCommand::Job(envelope) => envelope,
            WorkerCommand::Shutdown => break,
        };

        let id = envelope.id;
        debug!(%id, filename = %envelope.payload.filename, "compiling");
        let started = Instant::now();
        let reply = match compiler.compile(&envelope.payload) {
            Ok(bytes) => WorkerMessage::Success {
                id,
                result: CompiledFont::new(bytes),
                time_taken_ms: started.elapsed().as_millis() as u64,
            },
            Err(error) => WorkerMessage::failure(Some(id), error),
        };

        if !endpoint.send(reply) {
            break;
        }
    }

    let _ = endpoint
        .events
        .send(WorkerEvent::Exited("worker thread stopped".to_string()));
    info!("local worker stopped");
}
