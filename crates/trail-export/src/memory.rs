//! In-memory data provider

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use trail_core::{AuditDataProvider, AuditError, AuditEvent, AuditResult, EventId};

/// Keeps every event as JSON in a map keyed by ULID event ids
#[derive(Debug, Default)]
pub struct InMemoryDataProvider {
    events: RwLock<HashMap<EventId, Value>>,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Ids of every stored event, oldest first
    pub fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.events.read().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl AuditDataProvider for InMemoryDataProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        let id = crate::new_event_id();
        self.events
            .write()
            .insert(id.clone(), serde_json::to_value(event)?);
        Ok(Some(id))
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        let value = serde_json::to_value(event)?;
        let mut events = self.events.write();
        match events.get_mut(event_id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(AuditError::sink(anyhow::anyhow!(
                "no event with id {} to replace",
                event_id
            ))),
        }
    }

    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        let value = self.events.read().get(event_id).cloned();
        value
            .map(|v| serde_json::from_value(v).map_err(AuditError::from))
            .transpose()
    }
}
