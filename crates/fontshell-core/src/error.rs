// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shell error types.
//!
//! Errors are `Clone` because one boot or gate-initialization outcome is
//! handed to every caller that was awaiting it.

use fontshell_protocol::{FrameError, MessageError};
use thiserror::Error;

/// Errors that can occur in the shell core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    /// The worker did not signal readiness within the boot window
    #[error("worker did not become ready within {timeout_ms}ms")]
    BootTimeout {
        /// The boot window that elapsed
        timeout_ms: u64,
    },

    /// The worker reported an error while starting
    #[error("worker failed to start: {0}")]
    BootError(String),

    /// A submitted job failed; other jobs are unaffected
    #[error("job failed: {0}")]
    Job(String),

    /// The worker died while jobs were pending
    #[error("worker session lost: {0}")]
    SessionLost(String),

    /// The worker session cannot accept jobs in its current state
    #[error("worker session unavailable: {0}")]
    SessionUnavailable(String),

    /// Readiness-gate initialization failed
    #[error("initialization failed: {0}")]
    GateInit(String),

    /// The scripting runtime raised an error
    #[error("script error: {0}")]
    Script(String),

    /// The document host could not save or export
    #[error("document error: {0}")]
    Document(String),

    /// The code generator failed to produce code
    #[error("code generation failed: {0}")]
    Generation(String),

    /// Transport-level failure talking to the worker
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ShellError {
    /// True for errors that end the worker session rather than a single job.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ShellError::BootTimeout { .. }
                | ShellError::BootError(_)
                | ShellError::SessionLost(_)
        )
    }
}

impl From<FrameError> for ShellError {
    fn from(err: FrameError) -> Self {
        ShellError::Transport(err.to_string())
    }
}

impl From<MessageError> for ShellError {
    fn from(err: MessageError) -> Self {
        ShellError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ShellError {
    fn from(err: serde_json::Error) -> Self {
        ShellError::Serialization(err.to_string())
    }
}

/// Type alias for shell results.
pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_preserve_cause() {
        let err = ShellError::Job("glyph 'a' has no outline".to_string());
        assert_eq!(err.to_string(), "job failed: glyph 'a' has no outline");

        let err = ShellError::BootTimeout { timeout_ms: 30_000 };
        assert_eq!(err.to_string(), "worker did not become ready within 30000ms");
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(ShellError::BootTimeout { timeout_ms: 1 }.is_session_fatal());
        assert!(ShellError::BootError("x".into()).is_session_fatal());
        assert!(ShellError::SessionLost("x".into()).is_session_fatal());
        assert!(!ShellError::Job("x".into()).is_session_fatal());
        assert!(!ShellError::GateInit("x".into()).is_session_fatal());
    }

    #[test]
    fn test_frame_error_conversion() {
        let err: ShellError = FrameError::ConnectionClosed.into();
        assert_eq!(err, ShellError::Transport("connection closed".to_string()));
    }
}
