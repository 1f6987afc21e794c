// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fontshell_core::{
    CodeGenerator, CompileJob, DocumentHost, FontCompiler, Result, ScriptRuntime, ShellError,
    Terminal, WorkerEndpoint, WorkerLink, WorkerSpawner,
};
use fontshell_protocol::WorkerMessage;
use serde_json::Value;
use tokio::sync::mpsc;

/// Spawner that hands each worker endpoint to the test, which then plays
/// the worker.
pub struct ScriptedSpawner {
    spawns: AtomicUsize,
    auto_ready: bool,
    endpoints: mpsc::UnboundedSender<WorkerEndpoint>,
}

impl ScriptedSpawner {
    /// Workers announce readiness immediately.
    pub fn ready() -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerEndpoint>) {
        Self::build(true)
    }

    /// Workers stay silent until the test sends a message.
    pub fn silent() -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerEndpoint>) {
        Self::build(false)
    }

    fn build(auto_ready: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerEndpoint>) {
        let (endpoints, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                spawns: AtomicUsize::new(0),
                auto_ready,
                endpoints,
            }),
            rx,
        )
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self) -> Result<WorkerLink> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let (link, endpoint) = WorkerLink::pair();
        if self.auto_ready {
            endpoint.send(WorkerMessage::Ready);
        }
        let _ = self.endpoints.send(endpoint);
        Ok(link)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Spawner whose worker can never be started.
#[derive(Default)]
pub struct FailingSpawner {
    spawns: AtomicUsize,
}

impl FailingSpawner {
    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerSpawner for FailingSpawner {
    async fn spawn(&self) -> Result<WorkerLink> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        Err(ShellError::BootError("compiler module failed to load".to_string()))
    }
}

/// Compiler that returns the source JSON bytes, or fails on empty input.
pub struct EchoCompiler;

impl FontCompiler for EchoCompiler {
    fn compile(&self, job: &CompileJob) -> std::result::Result<Vec<u8>, String> {
        if job.babelfont_json.is_empty() {
            return Err("empty font source".to_string());
        }
        Ok(job.babelfont_json.as_bytes().to_vec())
    }
}

/// Terminal that records everything written to it.
#[derive(Default)]
pub struct RecordingTerminal {
    echoed: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingTerminal {
    pub fn echoed(&self) -> Vec<String> {
        self.echoed.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Terminal for RecordingTerminal {
    fn echo(&self, message: &str) {
        self.echoed.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Runtime that evaluates `raise <msg>` as an error and anything else as a
/// value, recording hook calls.
#[derive(Default)]
pub struct ScriptedRuntime {
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRuntime for ScriptedRuntime {
    async fn evaluate(&self, code: &str) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(format!("evaluate:{code}"));
        if let Some(message) = code.strip_prefix("raise ") {
            return Err(ShellError::Script(message.to_string()));
        }
        if code.starts_with("pass") {
            return Ok(None);
        }
        Ok(Some(format!("=> {code}")))
    }

    async fn before_execution(&self) {
        self.calls.lock().unwrap().push("before".to_string());
    }

    async fn after_execution(&self) {
        self.calls.lock().unwrap().push("after".to_string());
    }
}

/// Document host with configurable latency and failures.
pub struct MockDocument {
    pub filename: String,
    pub source: String,
    pub save_delay: Duration,
    pub tracking_delay: Duration,
    pub tracking_failures: AtomicUsize,
    pub tracking_inits: AtomicUsize,
    pub saves: AtomicUsize,
    pub fail_save: Mutex<Option<String>>,
}

impl MockDocument {
    pub fn new(filename: &str, source: &str) -> Self {
        Self {
            filename: filename.to_string(),
            source: source.to_string(),
            save_delay: Duration::from_millis(50),
            tracking_delay: Duration::from_millis(20),
            tracking_failures: AtomicUsize::new(0),
            tracking_inits: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            fail_save: Mutex::new(None),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn tracking_inits(&self) -> usize {
        self.tracking_inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentHost for MockDocument {
    async fn init_dirty_tracking(&self) -> Result<()> {
        self.tracking_inits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.tracking_delay).await;
        let failures_left = self.tracking_failures.load(Ordering::SeqCst);
        if failures_left > 0 {
            self.tracking_failures.store(failures_left - 1, Ordering::SeqCst);
            return Err(ShellError::GateInit("font not indexed yet".to_string()));
        }
        Ok(())
    }

    async fn save_current(&self) -> Result<()> {
        tokio::time::sleep(self.save_delay).await;
        if let Some(message) = self.fail_save.lock().unwrap().clone() {
            return Err(ShellError::Document(message));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn export_current(&self) -> Result<CompileJob> {
        Ok(CompileJob::new(self.source.clone(), self.filename.clone()))
    }
}

/// Generator that replays scripted answers and records the error feedback
/// it was given.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: Mutex<VecDeque<Result<String>>>,
    pub feedback: Mutex<Vec<Option<String>>>,
}

impl ScriptedGenerator {
    pub fn new(answers: Vec<Result<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            feedback: Mutex::new(Vec::new()),
        }
    }

    pub fn feedback(&self) -> Vec<Option<String>> {
        self.feedback.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _context: &Value,
        previous_error: Option<&str>,
    ) -> Result<String> {
        self.feedback
            .lock()
            .unwrap()
            .push(previous_error.map(str::to_string));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ShellError::Generation("out of answers".to_string())))
    }
}
