// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AI code assistant.
//!
//! Generated code is run through the console. If it raises, the error is
//! sent back with the next generation request so the model can correct
//! itself, up to `max_retries` times with exponential backoff in between.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::collaborators::{CodeGenerator, Terminal};
use crate::config::RetryConfig;
use crate::console::Console;
use crate::error::{Result, ShellError};

/// A successful assistant run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub code: String,
    pub output: Option<String>,
    /// 1 for a first-try success.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct CodeAssistant {
    generator: Arc<dyn CodeGenerator>,
    console: Console,
    terminal: Arc<dyn Terminal>,
    retry: RetryConfig,
}

impl CodeAssistant {
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        console: Console,
        terminal: Arc<dyn Terminal>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            generator,
            console,
            terminal,
            retry,
        }
    }

    /// Generate code for `prompt` and run it, retrying on evaluation errors.
    ///
    /// Failures of the generator itself are not retried.
    #[instrument(skip(self, context))]
    pub async fn generate_and_run(&self, prompt: &str, context: &Value) -> Result<Generated> {
        let mut previous_error: Option<String> = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let code = match self
                .generator
                .generate(prompt, context, previous_error.as_deref())
                .await
            {
                Ok(code) => code,
                Err(error) => {
                    let error = match error {
                        ShellError::Generation(_) => error,
                        other => ShellError::Generation(other.to_string()),
                    };
                    self.terminal.error(&error.to_string());
                    return Err(error);
                }
            };

            match self.console.execute(&code).await {
                Ok(output) => {
                    info!(attempt, "generated code ran successfully");
                    return Ok(Generated {
                        code,
                        output,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    warn!(attempt, %error, "generated code failed");
                    previous_error = Some(error.to_string());
                }
            }

            if attempt > self.retry.max_retries {
                break;
            }
            let delay = self.retry.delay_for_attempt(attempt);
            self.terminal.echo(&format!(
                "Generated code failed, retrying ({}/{})…",
                attempt, self.retry.max_retries
            ));
            tokio::time::sleep(delay).await;
        }

        let error = ShellError::Generation(format!(
            "giving up after {} attempts: {}",
            attempt,
            previous_error.unwrap_or_default()
        ));
        self.terminal.error(&error.to_string());
        Err(error)
    }
}
