// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interfaces to the pieces of the editor the core drives but does not own.

use async_trait::async_trait;
use fontshell_protocol::CompileJob;
use serde_json::Value;

use crate::error::Result;

/// Output surface for user-visible messages.
pub trait Terminal: Send + Sync {
    fn echo(&self, message: &str);
    fn error(&self, message: &str);
}

/// The embedded scripting runtime.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Evaluate `code`, returning its printable result if it produced one.
    async fn evaluate(&self, code: &str) -> Result<Option<String>>;

    /// Called before user code runs (e.g. to pause UI updates).
    async fn before_execution(&self) {}

    /// Called after user code ran, whether or not it succeeded.
    async fn after_execution(&self) {}
}

/// The font document currently open in the editor.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Install dirty-state tracking on the active document.
    async fn init_dirty_tracking(&self) -> Result<()>;

    async fn save_current(&self) -> Result<()>;

    /// Serialize the active font into a compile job.
    async fn export_current(&self) -> Result<CompileJob>;
}

/// AI code generation.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate code for `prompt`. On retries `previous_error` carries the
    /// error the last attempt produced.
    async fn generate(
        &self,
        prompt: &str,
        context: &Value,
        previous_error: Option<&str>,
    ) -> Result<String>;
}
