//! Event creation policies and the save modes they produce

use crate::event::EventId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many times, and when, a scope's event is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCreationPolicy {
    /// Insert once when the scope ends
    #[default]
    InsertOnEnd,
    /// Insert when the scope starts, replace that row on every later save
    InsertOnStartReplaceOnEnd,
    /// Insert when the scope starts and again on every later save
    InsertOnStartInsertOnEnd,
    /// Persist only on explicit `save()`
    Manual,
}

impl EventCreationPolicy {
    pub const ALL: [EventCreationPolicy; 4] = [
        EventCreationPolicy::InsertOnEnd,
        EventCreationPolicy::InsertOnStartReplaceOnEnd,
        EventCreationPolicy::InsertOnStartInsertOnEnd,
        EventCreationPolicy::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCreationPolicy::InsertOnEnd => "insert_on_end",
            EventCreationPolicy::InsertOnStartReplaceOnEnd => "insert_on_start_replace_on_end",
            EventCreationPolicy::InsertOnStartInsertOnEnd => "insert_on_start_insert_on_end",
            EventCreationPolicy::Manual => "manual",
        }
    }

    /// Whether the event is inserted as soon as the scope is created
    pub fn inserts_on_start(&self) -> bool {
        matches!(
            self,
            EventCreationPolicy::InsertOnStartReplaceOnEnd
                | EventCreationPolicy::InsertOnStartInsertOnEnd
        )
    }

    /// Save mode reported before the first save happens
    pub(crate) fn initial_save_mode(&self) -> SaveMode {
        match self {
            EventCreationPolicy::InsertOnEnd => SaveMode::InsertOnEnd,
            EventCreationPolicy::Manual => SaveMode::Manual,
            _ => SaveMode::InsertOnStart,
        }
    }

    /// Save mode for a trigger, or `None` when this trigger persists nothing
    pub(crate) fn save_mode(&self, trigger: SaveTrigger, has_event_id: bool) -> Option<SaveMode> {
        match (self, trigger) {
            (policy, SaveTrigger::Creation) => {
                policy.inserts_on_start().then_some(SaveMode::InsertOnStart)
            }
            (EventCreationPolicy::Manual, SaveTrigger::Terminal) => None,
            (EventCreationPolicy::Manual, SaveTrigger::Explicit) => Some(SaveMode::Manual),
            (EventCreationPolicy::InsertOnStartInsertOnEnd, _) => Some(SaveMode::InsertOnEnd),
            (_, _) if has_event_id => Some(SaveMode::ReplaceOnEnd),
            (_, _) => Some(SaveMode::InsertOnEnd),
        }
    }
}

impl fmt::Display for EventCreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCreationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown creation policy '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

/// The concrete action a given save performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    InsertOnStart,
    InsertOnEnd,
    ReplaceOnEnd,
    /// Explicit save under the manual policy: insert first, replace after.
    ///
    /// Every manual save reports this mode. Whether a given save inserted or
    /// replaced shows in the scope's `event_id()`: it is `None` until the
    /// first manual save succeeds and stays fixed afterwards.
    Manual,
}

impl SaveMode {
    /// Provider call for this mode given the id assigned so far
    pub(crate) fn provider_call(&self, event_id: Option<EventId>) -> ProviderCall {
        match (self, event_id) {
            (SaveMode::ReplaceOnEnd | SaveMode::Manual, Some(id)) => ProviderCall::Replace(id),
            _ => ProviderCall::Insert,
        }
    }
}

/// What caused a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveTrigger {
    Creation,
    Explicit,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProviderCall {
    Insert,
    Replace(EventId),
}
