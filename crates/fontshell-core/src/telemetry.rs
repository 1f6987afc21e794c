// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber initialization for hosts embedding the shell.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Result, ShellError};

/// Install a global subscriber writing to stderr.
///
/// Respects `RUST_LOG` (default: `info`). Fails if a global subscriber is
/// already set.
pub fn init_subscriber() -> Result<()> {
    init_subscriber_with_default("info")
}

/// Like [`init_subscriber`], with `default_filter` used when `RUST_LOG` is
/// unset or invalid.
pub fn init_subscriber_with_default(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(fmt)
        .with(filter)
        .try_init()
        .map_err(|e| ShellError::Config(format!("failed to install tracing subscriber: {}", e)))
}
