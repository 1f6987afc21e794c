// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! fontshell core - job dispatch and action coordination for the fontshell
//! font editor.
//!
//! The editor compiles fonts on a background worker and lets users trigger
//! overlapping asynchronous actions (save, compile, generate code). This
//! crate keeps those actions from tripping over each other.
//!
//! # Features
//!
//! - **Correlation**: match out-of-order worker responses to their callers
//!   ([`CorrelationBroker`])
//! - **Worker Lifecycle**: boot handshake with timeout, single boot in
//!   flight, fail-fast after failure, optional fallback compiler
//!   ([`WorkerManager`])
//! - **Single-Flight Actions**: double clicks are no-ops; button state
//!   follows guard transitions ([`ActionGuard`])
//! - **Readiness Gate**: one shared, retryable initialization for many
//!   awaiters ([`ReadinessGate`])
//! - **Shell Context**: the save, compile and code-generation flows wired
//!   together over injected collaborators ([`Shell`])
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fontshell_core::{Shell, ShellConfig, ShellServices, RunOutcome};
//!
//! let config = ShellConfig::from_env()?;
//! let shell = Shell::new(
//!     ShellServices {
//!         terminal,
//!         runtime,
//!         document,
//!         spawner: Arc::new(LocalSpawner::new(compiler)),
//!         store: Arc::new(MemoryStore::new()),
//!         generator: None,
//!         fallback: None,
//!     },
//!     &config,
//! )?;
//!
//! match shell.compile().await {
//!     RunOutcome::Ran(Ok(report)) => println!("{} bytes", report.font.len()),
//!     RunOutcome::Ran(Err(e)) => eprintln!("compile failed: {e}"),
//!     RunOutcome::Skipped => {} // already compiling
//! }
//! ```
//!
//! # Transports
//!
//! The worker is reached through a [`WorkerSpawner`]:
//!
//! - [`LocalSpawner`]: a [`FontCompiler`] on a dedicated thread
//! - [`StreamSpawner`]: any byte stream speaking the framed protocol
//! - [`ProcessSpawner`]: a child process over stdio (`process` feature)

pub mod assist;
pub mod broker;
pub mod collaborators;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod gate;
pub mod guard;
pub mod shell;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod worker;

pub use assist::{CodeAssistant, Generated};
pub use broker::{Completion, CompletionHandle, CorrelationBroker};
pub use collaborators::{CodeGenerator, DocumentHost, ScriptRuntime, Terminal};
pub use config::{RetryConfig, RetryStrategy, ShellConfig};
pub use console::Console;
pub use error::{Result, ShellError};
pub use events::{EventBus, ShellEvent, ShellEventKind};
pub use gate::ReadinessGate;
pub use guard::{Action, ActionGuard, ButtonState, GuardTransition, RunOutcome};
pub use shell::{CompileReport, Shell, ShellServices};
pub use store::{KeyValueStore, MemoryStore, Preferences};
#[cfg(feature = "process")]
pub use transport::ProcessSpawner;
pub use transport::{
    FontCompiler, LocalSpawner, StreamSpawner, WorkerCommand, WorkerEndpoint, WorkerEvent,
    WorkerLink, WorkerSpawner,
};
pub use worker::{CompileOutput, SessionState, WorkerManager, WorkerManagerBuilder};

// Re-export protocol types for convenience
pub use fontshell_protocol::{CompileJob, CompiledFont, RequestId};
