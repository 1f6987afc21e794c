// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! fontshell protocol - the message boundary between the editor shell and
//! its background compiler worker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    fontshell-protocol                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: JobEnvelope out, WorkerMessage in (tagged)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Payloads: CompileJob / CompiledFont (JSON, base64 bytes)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Framing: length-prefixed frames for stream transports      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The host side lives in `fontshell-core`; the [`worker`] module holds the
//! matching worker-side loop for processes that host a compiler.
//!
//! # Usage
//!
//! ```ignore
//! use fontshell_protocol::{CompiledFont, WorkerMessage};
//!
//! let message = WorkerMessage::<CompiledFont>::decode(&frame.payload)?;
//! match message {
//!     WorkerMessage::Ready => { /* boot finished */ }
//!     WorkerMessage::Success { id, result, .. } => { /* resolve id */ }
//!     WorkerMessage::Failure { id, error } => { /* reject id, or the session */ }
//! }
//! ```

pub mod frame;
pub mod job;
pub mod message;
pub mod worker;

pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use job::{CompileJob, CompiledFont};
pub use message::{JobEnvelope, MessageError, RequestId, WorkerMessage, peek_request_id};
