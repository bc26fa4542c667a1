//! Helpers shared by the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use trail_core::{
    AuditConfig, AuditDataProvider, AuditError, AuditEvent, AuditResult, EventId, ScopeFactory,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert(EventId),
    Replace(EventId),
    Get(EventId),
}

/// Provider that records every call and keeps what it was given
#[derive(Default)]
pub struct RecordingProvider {
    next_id: AtomicU64,
    fail: AtomicBool,
    calls: Mutex<Vec<Call>>,
    stored: Mutex<HashMap<EventId, AuditEvent>>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following write fail
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn inserts(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Insert(_))).count()
    }

    pub fn replaces(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Replace(_))).count()
    }

    pub fn stored(&self, id: impl Into<EventId>) -> Option<AuditEvent> {
        self.stored.lock().get(&id.into()).cloned()
    }

    fn check(&self) -> AuditResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::sink(anyhow::anyhow!("sink unavailable")));
        }
        Ok(())
    }
}

impl AuditDataProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        self.check()?;
        let id = EventId::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls.lock().push(Call::Insert(id.clone()));
        self.stored.lock().insert(id.clone(), event.clone());
        Ok(Some(id))
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        self.check()?;
        self.calls.lock().push(Call::Replace(event_id.clone()));
        self.stored.lock().insert(event_id.clone(), event.clone());
        Ok(())
    }

    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        self.calls.lock().push(Call::Get(event_id.clone()));
        Ok(self.stored.lock().get(event_id).cloned())
    }
}

/// Independent configuration writing to `provider`
pub fn isolated(provider: Arc<RecordingProvider>) -> (Arc<AuditConfig>, ScopeFactory) {
    let config = Arc::new(AuditConfig::new());
    config.set_data_provider(provider);
    config.set_include_environment(false);
    let factory = ScopeFactory::new(config.clone());
    (config, factory)
}
