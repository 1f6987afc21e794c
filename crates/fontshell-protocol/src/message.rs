// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker boundary message schema.
//!
//! The worker speaks a small JSON dialect:
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | outbound  | `{ "id": 7, "payload": { ... } }` |
//! | inbound   | `{ "ready": true }` |
//! | inbound   | `{ "id": 7, "result": { ... }, "timeTakenMs": 12 }` |
//! | inbound   | `{ "id": 7, "error": "..." }` |
//! | inbound   | `{ "error": "..." }` (boot time, no id yet) |
//!
//! Inbound messages are decoded exactly once into [`WorkerMessage`], so the
//! rest of the system never inspects raw field presence.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Correlation token embedded in every job and its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recover the `id` of a message whose full shape does not decode.
///
/// Lets either side answer a malformed request or response for the right
/// caller instead of dropping it.
pub fn peek_request_id(bytes: &[u8]) -> Option<RequestId> {
    #[derive(Deserialize)]
    struct IdOnly {
        id: Option<RequestId>,
    }

    serde_json::from_slice::<IdOnly>(bytes).ok().and_then(|header| header.id)
}

/// Outbound job: `{ id, payload }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope<P> {
    pub id: RequestId,
    pub payload: P,
}

impl<P> JobEnvelope<P> {
    pub fn new(id: RequestId, payload: P) -> Self {
        Self { id, payload }
    }
}

/// Errors produced while decoding an inbound worker message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed worker message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized worker message: {0}")]
    Unrecognized(&'static str),
}

/// A decoded inbound message from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage<R> {
    /// Unsolicited readiness signal sent once after boot.
    Ready,
    /// A job finished successfully.
    Success {
        id: RequestId,
        result: R,
        time_taken_ms: u64,
    },
    /// A job failed, or (with no id) the worker itself failed.
    Failure {
        id: Option<RequestId>,
        error: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundWire<R> {
    ready: Option<bool>,
    id: Option<RequestId>,
    result: Option<R>,
    time_taken_ms: Option<u64>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundWire<'a, R> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_taken_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<R> WorkerMessage<R> {
    /// Correlation id carried by the message, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            WorkerMessage::Ready => None,
            WorkerMessage::Success { id, .. } => Some(*id),
            WorkerMessage::Failure { id, .. } => *id,
        }
    }

    pub fn failure(id: Option<RequestId>, error: impl Into<String>) -> Self {
        WorkerMessage::Failure {
            id,
            error: error.into(),
        }
    }
}

impl<R: DeserializeOwned> WorkerMessage<R> {
    /// Decode a raw JSON message.
    ///
    /// An `error` field takes precedence over every other field, so a
    /// message carrying both `result` and `error` is a failure.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let wire: InboundWire<R> = serde_json::from_slice(bytes)?;
        Self::from_wire(wire)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, MessageError> {
        let wire: InboundWire<R> = serde_json::from_value(value)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: InboundWire<R>) -> Result<Self, MessageError> {
        if let Some(error) = wire.error {
            return Ok(WorkerMessage::Failure { id: wire.id, error });
        }

        if wire.ready == Some(true) {
            return Ok(WorkerMessage::Ready);
        }

        match (wire.id, wire.result) {
            (Some(id), Some(result)) => Ok(WorkerMessage::Success {
                id,
                result,
                time_taken_ms: wire.time_taken_ms.unwrap_or(0),
            }),
            (Some(_), None) => Err(MessageError::Unrecognized(
                "message has an id but neither result nor error",
            )),
            (None, _) => Err(MessageError::Unrecognized(
                "message has no ready flag, id or error",
            )),
        }
    }
}

impl<R: Serialize> WorkerMessage<R> {
    /// Encode into the JSON wire shape.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let wire = match self {
            WorkerMessage::Ready => OutboundWire {
                ready: Some(true),
                id: None,
                result: None,
                time_taken_ms: None,
                error: None,
            },
            WorkerMessage::Success {
                id,
                result,
                time_taken_ms,
            } => OutboundWire {
                ready: None,
                id: Some(*id),
                result: Some(result),
                time_taken_ms: Some(*time_taken_ms),
                error: None,
            },
            WorkerMessage::Failure { id, error } => OutboundWire {
                ready: None,
                id: *id,
                result: None,
                time_taken_ms: None,
                error: Some(error.as_str()),
            },
        };
        Ok(serde_json::to_vec(&wire)?)
    }
}
