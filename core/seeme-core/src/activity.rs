//! In-memory cache of each account's last reported activity.
//!
//! Derived state only: it is seeded from the account store at startup and
//! never consulted for account existence.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Label of a record that has never received a push.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub label: String,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Updated within `window` of `now`.
    pub fn is_online(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.updated_at) <= window
    }
}

pub struct ActivityCache {
    records: Mutex<HashMap<String, ActivityRecord>>,
    online_window: Duration,
}

impl ActivityCache {
    pub fn new(online_window: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            online_window,
        }
    }

    pub fn online_window(&self) -> Duration {
        self.online_window
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, ActivityRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an `unknown` record that already reads as offline.
    /// An existing record is left untouched.
    pub fn seed(&self, identity: &str) {
        let stale_at = Utc::now() - self.online_window - Duration::seconds(1);
        self.records()
            .entry(identity.to_string())
            .or_insert_with(|| ActivityRecord {
                label: UNKNOWN_LABEL.to_string(),
                updated_at: stale_at,
            });
    }

    /// Create-or-refresh. The label is last-write-wins; the stored timestamp
    /// never moves backwards.
    pub fn update(&self, identity: &str, label: &str, timestamp: DateTime<Utc>) {
        let mut records = self.records();
        match records.get_mut(identity) {
            Some(record) => {
                record.label = label.to_string();
                record.updated_at = record.updated_at.max(timestamp);
            }
            None => {
                records.insert(
                    identity.to_string(),
                    ActivityRecord {
                        label: label.to_string(),
                        updated_at: timestamp,
                    },
                );
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<ActivityRecord> {
        self.records().get(identity).cloned()
    }

    pub fn remove(&self, identity: &str) -> Option<ActivityRecord> {
        self.records().remove(identity)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
