// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed notifications published by the shell core.
//!
//! UI listeners subscribe explicitly with [`EventBus::subscribe`]. Publishing
//! never blocks and never fails; with no subscribers the event is dropped.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::trace;

use crate::guard::Action;
use crate::worker::SessionState;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEventKind {
    /// The worker session moved to a new state.
    SessionStateChanged { state: SessionState },
    /// A guarded action began executing.
    ActionStarted { action: Action },
    /// A guarded action finished, successfully or not.
    ActionFinished { action: Action },
    /// The active document is about to be saved.
    BeforeSave,
    /// The active document was saved.
    AfterSave,
    /// A compile job produced a font binary.
    CompileFinished {
        filename: String,
        bytes: usize,
        time_taken_ms: u64,
    },
    /// Dirty-state tracking finished initializing.
    GateReady,
}

/// A timestamped shell event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellEvent {
    pub at: DateTime<Utc>,
    pub kind: ShellEventKind,
}

impl ShellEvent {
    pub fn new(kind: ShellEventKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }
}

/// Broadcast channel for [`ShellEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ShellEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, kind: ShellEventKind) {
        let event = ShellEvent::new(kind);
        trace!(event = ?event.kind, "publishing shell event");
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(ShellEventKind::BeforeSave);
        bus.publish(ShellEventKind::AfterSave);

        assert_eq!(rx.recv().await.unwrap().kind, ShellEventKind::BeforeSave);
        assert_eq!(rx.recv().await.unwrap().kind, ShellEventKind::AfterSave);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(ShellEventKind::GateReady);
    }

    #[test]
    fn test_event_timestamp_is_recent() {
        let before = Utc::now();
        let event = ShellEvent::new(ShellEventKind::GateReady);
        assert!(event.at >= before);
    }
}
