// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-flight guard for user-triggered actions.
//!
//! At most one instance of each [`Action`] runs at a time. A trigger that
//! arrives while the same action is in flight is dropped without being
//! polled. The in-flight flag is cleared when the run ends for any reason,
//! including a panic or the caller dropping the run future.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::{EventBus, ShellEventKind};

/// User-facing action classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Save,
    Compile,
    GenerateCode,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Save => "save",
            Action::Compile => "compile",
            Action::GenerateCode => "generate_code",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action entering or leaving flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardTransition {
    pub action: Action,
    pub in_flight: bool,
}

/// Result of [`ActionGuard::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Ran(T),
    /// The action was already in flight; nothing ran.
    Skipped,
}

impl<T> RunOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }

    pub fn ran(self) -> Option<T> {
        match self {
            RunOutcome::Ran(value) => Some(value),
            RunOutcome::Skipped => None,
        }
    }
}

/// Label and enabled state for an action's button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub label: &'static str,
    pub disabled: bool,
}

impl ButtonState {
    pub fn for_action(action: Action, in_flight: bool) -> Self {
        let label = match (action, in_flight) {
            (Action::Save, false) => "Save",
            (Action::Save, true) => "Saving…",
            (Action::Compile, false) => "Compile",
            (Action::Compile, true) => "Compiling…",
            (Action::GenerateCode, false) => "Generate",
            (Action::GenerateCode, true) => "Generating…",
        };
        Self {
            label,
            disabled: in_flight,
        }
    }
}

const TRANSITION_CAPACITY: usize = 32;

pub struct ActionGuard {
    in_flight: Mutex<HashSet<Action>>,
    transitions: broadcast::Sender<GuardTransition>,
    events: Option<EventBus>,
}

impl Default for ActionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionGuard {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            in_flight: Mutex::new(HashSet::new()),
            transitions,
            events: None,
        }
    }

    /// Also publish `ActionStarted`/`ActionFinished` on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Action>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self, action: Action) -> bool {
        self.lock().contains(&action)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardTransition> {
        self.transitions.subscribe()
    }

    /// Run `fut` unless `action` is already in flight.
    pub async fn run<F, T>(&self, action: Action, fut: F) -> RunOutcome<T>
    where
        F: Future<Output = T>,
    {
        let Some(_token) = self.begin(action) else {
            debug!(%action, "action already in flight, ignoring trigger");
            return RunOutcome::Skipped;
        };
        RunOutcome::Ran(fut.await)
    }

    fn begin(&self, action: Action) -> Option<InFlightToken<'_>> {
        if !self.lock().insert(action) {
            return None;
        }
        info!(%action, "action started");
        self.notify(action, true);
        Some(InFlightToken {
            guard: self,
            action,
        })
    }

    fn finish(&self, action: Action) {
        self.lock().remove(&action);
        info!(%action, "action finished");
        self.notify(action, false);
    }

    fn notify(&self, action: Action, in_flight: bool) {
        let _ = self.transitions.send(GuardTransition { action, in_flight });
        if let Some(events) = &self.events {
            events.publish(if in_flight {
                ShellEventKind::ActionStarted { action }
            } else {
                ShellEventKind::ActionFinished { action }
            });
        }
    }
}

struct InFlightToken<'a> {
    guard: &'a ActionGuard,
    action: Action,
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.guard.finish(self.action);
    }
}
