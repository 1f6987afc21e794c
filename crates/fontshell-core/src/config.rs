// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shell configuration.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ShellError};
use crate::events::DEFAULT_EVENT_CAPACITY;

/// Retry strategy for the code assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Exponential backoff: delay * 2^(attempt-1)
    #[default]
    ExponentialBackoff,
}

/// How often, and how patiently, a failed attempt is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just one attempt).
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub delay_ms: u64,
    pub strategy: RetryStrategy,
}

impl RetryConfig {
    pub fn new(max_retries: u32, delay_ms: u64, strategy: RetryStrategy) -> Self {
        Self {
            max_retries,
            delay_ms,
            strategy,
        }
    }

    /// Delay before retry `attempt` (1-indexed: attempt 1 follows the first
    /// failure).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = match self.strategy {
            RetryStrategy::ExponentialBackoff => 2u64.saturating_pow(attempt.saturating_sub(1)),
        };
        Duration::from_millis(self.delay_ms.saturating_mul(multiplier))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 500,
            strategy: RetryStrategy::default(),
        }
    }
}

/// Runtime configuration for the shell core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Time the worker has to signal readiness, in milliseconds (default: 30_000)
    pub boot_timeout_ms: u64,
    /// Command line of the child-process worker, if one is used
    pub worker_command: Option<String>,
    /// Code assistant retry policy (default: 3 retries, 500ms base delay)
    pub assist_retry: RetryConfig,
    /// Events buffered per event-bus subscriber (default: 64)
    pub event_capacity: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            boot_timeout_ms: 30_000,
            worker_command: None,
            assist_retry: RetryConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ShellConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `FONTSHELL_BOOT_TIMEOUT_MS` - Worker boot timeout (default: 30000)
    /// - `FONTSHELL_WORKER_COMMAND` - Child-process worker command line
    /// - `FONTSHELL_ASSIST_MAX_RETRIES` - Code assistant retries (default: 3)
    /// - `FONTSHELL_ASSIST_RETRY_DELAY_MS` - Base retry delay (default: 500)
    /// - `FONTSHELL_EVENT_CAPACITY` - Event bus buffer (default: 64)
    ///
    /// Values that are set but do not parse are rejected.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let worker_command = env::var("FONTSHELL_WORKER_COMMAND")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let config = Self {
            boot_timeout_ms: env_or("FONTSHELL_BOOT_TIMEOUT_MS", defaults.boot_timeout_ms)?,
            worker_command,
            assist_retry: RetryConfig {
                max_retries: env_or("FONTSHELL_ASSIST_MAX_RETRIES", defaults.assist_retry.max_retries)?,
                delay_ms: env_or("FONTSHELL_ASSIST_RETRY_DELAY_MS", defaults.assist_retry.delay_ms)?,
                strategy: RetryStrategy::default(),
            },
            event_capacity: env_or("FONTSHELL_EVENT_CAPACITY", defaults.event_capacity)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_boot_timeout_ms(mut self, boot_timeout_ms: u64) -> Self {
        self.boot_timeout_ms = boot_timeout_ms;
        self
    }

    pub fn with_worker_command(mut self, command: impl Into<String>) -> Self {
        self.worker_command = Some(command.into());
        self
    }

    pub fn with_assist_retry(mut self, retry: RetryConfig) -> Self {
        self.assist_retry = retry;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.boot_timeout_ms == 0 {
            return Err(ShellError::Config(
                "FONTSHELL_BOOT_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ShellError::Config(
                "FONTSHELL_EVENT_CAPACITY must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ShellError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
