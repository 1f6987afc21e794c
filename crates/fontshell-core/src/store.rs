// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! UI preference storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Result;

const VOLUME_KEY: &str = "fontshell.volume";
const LAST_VIEW_KEY: &str = "fontshell.lastActiveView";

/// Default sound volume.
pub const DEFAULT_VOLUME: f32 = 0.5;

/// A string key/value store (browser local storage or equivalent).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// Typed JSON view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, serde_json::to_string(value)?);
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    /// Sound volume in `0.0..=1.0`. Unreadable values fall back to the
    /// default.
    pub fn volume(&self) -> f32 {
        match self.get::<f32>(VOLUME_KEY) {
            Ok(Some(volume)) => volume.clamp(0.0, 1.0),
            Ok(None) => DEFAULT_VOLUME,
            Err(error) => {
                warn!(%error, "ignoring stored volume");
                DEFAULT_VOLUME
            }
        }
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.set(VOLUME_KEY, &volume.clamp(0.0, 1.0))
    }

    pub fn last_active_view(&self) -> Option<String> {
        self.get(LAST_VIEW_KEY).ok().flatten()
    }

    pub fn set_last_active_view(&self, view: &str) -> Result<()> {
        self.set(LAST_VIEW_KEY, &view)
    }
}
