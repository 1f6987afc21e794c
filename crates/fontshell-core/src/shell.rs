// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Application context.
//!
//! [`Shell`] owns every service the editor shell needs and wires the user
//! flows together:
//!
//! ```text
//! save:     guard(Save)    -> dirty-tracking gate -> BeforeSave -> document.save -> AfterSave
//! compile:  guard(Compile) -> document.export -> worker.submit -> CompileFinished
//! generate: guard(GenerateCode) -> assistant (generate -> console -> retry)
//! ```
//!
//! Every failure in a flow is written to the terminal's error channel and
//! returned to the caller.

use std::sync::Arc;

use fontshell_protocol::CompiledFont;
use serde_json::Value;
use tracing::{info, instrument};

use crate::assist::{CodeAssistant, Generated};
use crate::collaborators::{CodeGenerator, DocumentHost, ScriptRuntime, Terminal};
use crate::config::ShellConfig;
use crate::console::Console;
use crate::error::{Result, ShellError};
use crate::events::{EventBus, ShellEventKind};
use crate::gate::ReadinessGate;
use crate::guard::{Action, ActionGuard, ButtonState, RunOutcome};
use crate::store::{KeyValueStore, Preferences};
use crate::transport::{FontCompiler, WorkerSpawner};
use crate::worker::WorkerManager;

/// External collaborators handed to [`Shell::new`].
pub struct ShellServices {
    pub terminal: Arc<dyn Terminal>,
    pub runtime: Arc<dyn ScriptRuntime>,
    pub document: Arc<dyn DocumentHost>,
    pub spawner: Arc<dyn WorkerSpawner>,
    pub store: Arc<dyn KeyValueStore>,
    pub generator: Option<Arc<dyn CodeGenerator>>,
    /// Compiler used while the worker session is failed.
    pub fallback: Option<Arc<dyn FontCompiler>>,
}

/// A finished compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub filename: String,
    pub font: CompiledFont,
    pub time_taken_ms: u64,
}

pub struct Shell {
    terminal: Arc<dyn Terminal>,
    document: Arc<dyn DocumentHost>,
    events: EventBus,
    guard: ActionGuard,
    dirty_tracking: ReadinessGate,
    worker: WorkerManager<String>,
    console: Console,
    assistant: Option<CodeAssistant>,
    preferences: Preferences,
}

impl Shell {
    pub fn new(services: ShellServices, config: &ShellConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);

        let document = Arc::clone(&services.document);
        let dirty_tracking = ReadinessGate::new("dirty-tracking", move || {
            let document = Arc::clone(&document);
            async move { document.init_dirty_tracking().await }
        })
        .with_events(events.clone());

        let mut worker = WorkerManager::builder(services.spawner)
            .boot_timeout(config.boot_timeout())
            .events(events.clone());
        if let Some(fallback) = services.fallback {
            worker = worker.fallback(fallback);
        }

        let console = Console::new(services.runtime, Arc::clone(&services.terminal));
        let assistant = services.generator.map(|generator| {
            CodeAssistant::new(
                generator,
                console.clone(),
                Arc::clone(&services.terminal),
                config.assist_retry.clone(),
            )
        });

        Ok(Self {
            terminal: services.terminal,
            document: services.document,
            guard: ActionGuard::new().with_events(events.clone()),
            events,
            dirty_tracking,
            worker: worker.build(),
            console,
            assistant,
            preferences: Preferences::new(services.store),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn worker(&self) -> &WorkerManager<String> {
        &self.worker
    }

    pub fn guard(&self) -> &ActionGuard {
        &self.guard
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn is_dirty_tracking_ready(&self) -> bool {
        self.dirty_tracking.is_ready()
    }

    pub fn button_state(&self, action: Action) -> ButtonState {
        ButtonState::for_action(action, self.guard.is_in_flight(action))
    }

    /// Save the active document. A save already in flight makes this a no-op.
    #[instrument(skip(self))]
    pub async fn save(&self) -> RunOutcome<Result<()>> {
        self.guard
            .run(Action::Save, async {
                let saved = self.save_document().await;
                self.report(saved)
            })
            .await
    }

    async fn save_document(&self) -> Result<()> {
        self.dirty_tracking.ensure_ready().await?;
        self.events.publish(ShellEventKind::BeforeSave);
        self.document.save_current().await?;
        self.events.publish(ShellEventKind::AfterSave);
        info!("document saved");
        Ok(())
    }

    /// Export the active font and compile it on the worker.
    #[instrument(skip(self))]
    pub async fn compile(&self) -> RunOutcome<Result<CompileReport>> {
        self.guard
            .run(Action::Compile, async {
                let compiled = self.compile_document().await;
                self.report(compiled)
            })
            .await
    }

    async fn compile_document(&self) -> Result<CompileReport> {
        let job = self.document.export_current().await?;
        let filename = job.output_filename();

        let completion = self.worker.submit(job, filename).await?;
        let report = CompileReport {
            filename: completion.metadata,
            font: completion.value.font,
            time_taken_ms: completion.value.time_taken_ms,
        };

        self.events.publish(ShellEventKind::CompileFinished {
            filename: report.filename.clone(),
            bytes: report.font.len(),
            time_taken_ms: report.time_taken_ms,
        });
        self.terminal.echo(&format!(
            "Compiled {} ({} bytes) in {} ms",
            report.filename,
            report.font.len(),
            report.time_taken_ms
        ));
        Ok(report)
    }

    /// Ask the code assistant for code and run it.
    #[instrument(skip(self, context))]
    pub async fn generate_code(&self, prompt: &str, context: &Value) -> RunOutcome<Result<Generated>> {
        self.guard
            .run(Action::GenerateCode, async {
                match &self.assistant {
                    // The assistant reports its own failures on the terminal.
                    Some(assistant) => assistant.generate_and_run(prompt, context).await,
                    None => self.report(Err(ShellError::Generation(
                        "no code generator configured".to_string(),
                    ))),
                }
            })
            .await
    }

    /// Run code in the scripting console.
    pub async fn execute(&self, code: &str) -> Result<Option<String>> {
        self.console.execute(code).await
    }

    /// The active document changed; dirty tracking must be set up again.
    pub fn document_changed(&self) {
        self.dirty_tracking.reset();
    }

    /// Stop the worker. Pending compiles fail with `SessionLost`.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    fn report<T>(&self, outcome: Result<T>) -> Result<T> {
        if let Err(error) = &outcome {
            self.terminal.error(&error.to_string());
        }
        outcome
    }
}
