//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use derive_new::new;
use serde_json::Value;

use crate::error::{Error, Result};

/// Identifies one subscription of a subscribe-request.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(new)]
pub struct Ids {
    pub request: u64,
    pub subscription: u64,
}

/// Last value collected for a leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct Telemetry {
    pub value: Value,
    pub update_time: DateTime<Utc>,
}

/// In-memory telemetry data, keyed by subscription and leaf path.
///
/// Clones share the same data. Each subscription has a single writer, any
/// number of readers.
#[derive(Clone, Debug, Default)]
pub struct TelemetryStore {
    data: Arc<Mutex<BTreeMap<Ids, Leaves>>>,
}

type Leaves = BTreeMap<String, Telemetry>;

/// Subscribe-requests known to the engine, by request id.
#[derive(Debug)]
pub struct SubscriptionStore<T> {
    requests: BTreeMap<u64, T>,
}

// ===== impl Ids =====

impl std::fmt::Display for Ids {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.request, self.subscription)
    }
}

// ===== impl TelemetryStore =====

impl TelemetryStore {
    /// Records a value. The update time never goes backwards for a given
    /// leaf, even if the wall clock does.
    pub fn set(&self, ids: Ids, path: &str, value: Value) {
        let mut data = self.lock();
        let leaves = data.entry(ids).or_default();
        let now = Utc::now();
        match leaves.get_mut(path) {
            Some(telemetry) => {
                telemetry.value = value;
                telemetry.update_time = telemetry.update_time.max(now);
            }
            None => {
                leaves.insert(
                    path.to_owned(),
                    Telemetry {
                        value,
                        update_time: now,
                    },
                );
            }
        }
    }

    pub fn get(&self, ids: Ids, path: &str) -> Result<Telemetry> {
        self.lock()
            .get(&ids)
            .and_then(|leaves| leaves.get(path))
            .cloned()
            .ok_or_else(|| Error::TelemetryNotFound(ids, path.to_owned()))
    }

    pub fn delete(&self, ids: Ids, path: &str) -> Result<()> {
        let mut data = self.lock();
        let Entry::Occupied(mut leaves) = data.entry(ids) else {
            return Err(Error::TelemetryNotFound(ids, path.to_owned()));
        };
        if leaves.get_mut().remove(path).is_none() {
            return Err(Error::TelemetryNotFound(ids, path.to_owned()));
        }
        if leaves.get().is_empty() {
            leaves.remove();
        }
        Ok(())
    }

    /// Leaf paths recorded for a subscription, in lexicographic order.
    pub fn list(&self, ids: Ids) -> Vec<String> {
        self.lock()
            .get(&ids)
            .map(|leaves| leaves.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops everything recorded for a subscribe-request.
    pub fn delete_request(&self, request: u64) {
        self.lock().retain(|ids, _| ids.request != request);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Ids, Leaves>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ===== impl SubscriptionStore =====

impl<T> SubscriptionStore<T> {
    pub fn add(&mut self, id: u64, request: T) -> Result<()> {
        match self.requests.entry(id) {
            Entry::Occupied(_) => Err(Error::RequestExists(id)),
            Entry::Vacant(entry) => {
                entry.insert(request);
                Ok(())
            }
        }
    }

    pub fn delete(&mut self, id: u64) -> Result<T> {
        self.requests.remove(&id).ok_or(Error::RequestNotFound(id))
    }

    pub fn get(&self, id: u64) -> Result<&T> {
        self.requests.get(&id).ok_or(Error::RequestNotFound(id))
    }

    pub fn list(&self) -> Vec<u64> {
        self.requests.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &T)> + '_ {
        self.requests.iter()
    }
}

impl<T> Default for SubscriptionStore<T> {
    fn default() -> SubscriptionStore<T> {
        SubscriptionStore {
            requests: BTreeMap::new(),
        }
    }
}
