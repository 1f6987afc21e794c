// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scripting console.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::collaborators::{ScriptRuntime, Terminal};
use crate::error::Result;

/// Runs user code through the scripting runtime and echoes the outcome.
#[derive(Clone)]
pub struct Console {
    runtime: Arc<dyn ScriptRuntime>,
    terminal: Arc<dyn Terminal>,
}

impl Console {
    pub fn new(runtime: Arc<dyn ScriptRuntime>, terminal: Arc<dyn Terminal>) -> Self {
        Self { runtime, terminal }
    }

    /// Evaluate `code` between the runtime's before/after hooks.
    ///
    /// The printable result is echoed; an error is printed on the error
    /// channel and returned. Blank input is ignored.
    #[instrument(skip_all, fields(len = code.len()))]
    pub async fn execute(&self, code: &str) -> Result<Option<String>> {
        if code.trim().is_empty() {
            return Ok(None);
        }

        self.runtime.before_execution().await;
        let outcome = self.runtime.evaluate(code).await;
        self.runtime.after_execution().await;

        match &outcome {
            Ok(Some(value)) => self.terminal.echo(value),
            Ok(None) => debug!("evaluation produced no value"),
            Err(error) => {
                warn!(%error, "evaluation failed");
                self.terminal.error(&error.to_string());
            }
        }
        outcome
    }
}
