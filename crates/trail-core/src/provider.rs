//! Data provider contract implemented by every audit sink
//!
//! Each operation has a synchronous form and an async form taking a
//! cancellation token. The async forms default to checking the token and
//! then delegating to the synchronous form; sinks doing real asynchronous
//! I/O override them.

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditEvent, EventId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handle to a provider
pub type SharedProvider = Arc<dyn AuditDataProvider>;

/// Persistence capability for audit events
#[async_trait]
pub trait AuditDataProvider: Send + Sync {
    /// Provider name, used in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Persist the event for the first time.
    ///
    /// Returns `None` when the sink has no addressable identifier.
    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>>;

    /// Update a previously inserted event in place
    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()>;

    /// Retrieve a stored event
    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        let _ = event_id;
        Err(AuditError::not_supported(self.name(), "get_event"))
    }

    /// Produce an isolated copy of a value about to be snapshotted
    fn clone_value(&self, value: &Value, event: &AuditEvent) -> AuditResult<Value> {
        let _ = event;
        Ok(default_clone_value(value))
    }

    async fn insert_event_async(
        &self,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<EventId>> {
        ensure_not_cancelled(cancel)?;
        self.insert_event(event)
    }

    async fn replace_event_async(
        &self,
        event_id: &EventId,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<()> {
        ensure_not_cancelled(cancel)?;
        self.replace_event(event_id, event)
    }

    async fn get_event_async(
        &self,
        event_id: &EventId,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<AuditEvent>> {
        ensure_not_cancelled(cancel)?;
        self.get_event(event_id)
    }
}

/// Typed retrieval on top of [`AuditDataProvider::get_event`]
pub trait AuditDataProviderExt: AuditDataProvider {
    /// Fetch an event and deserialize it into `T`
    fn get_event_as<T: DeserializeOwned>(&self, event_id: &EventId) -> AuditResult<Option<T>> {
        match self.get_event(event_id)? {
            Some(event) => Ok(Some(serde_json::from_value(serde_json::to_value(&event)?)?)),
            None => Ok(None),
        }
    }
}

impl<P: AuditDataProvider + ?Sized> AuditDataProviderExt for P {}

/// Default snapshot policy.
///
/// `null` stays `null`, scalars are immutable and returned as-is, and
/// composites are deep copied so later edits to the source cannot reach the
/// snapshot.
pub fn default_clone_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(items) => Value::Array(items.iter().map(default_clone_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), default_clone_value(v)))
                .collect(),
        ),
    }
}

/// Fail with `Cancelled` if the token has fired
pub fn ensure_not_cancelled(cancel: &CancellationToken) -> AuditResult<()> {
    if cancel.is_cancelled() {
        return Err(AuditError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording provider shared by the unit tests of this crate

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Insert(EventId),
        Replace(EventId),
        Get(EventId),
    }

    #[derive(Default)]
    pub struct RecordingProvider {
        next_id: AtomicUsize,
        pub calls: Mutex<Vec<Call>>,
        pub stored: Mutex<HashMap<EventId, AuditEvent>>,
        pub fail_inserts: bool,
    }

    impl RecordingProvider {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail_inserts: true,
                ..Self::default()
            })
        }

        pub fn inserts(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, Call::Insert(_)))
                .count()
        }

        pub fn replaces(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, Call::Replace(_)))
                .count()
        }

        pub fn total(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl AuditDataProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
            if self.fail_inserts {
                return Err(AuditError::sink(anyhow::anyhow!("insert rejected")));
            }
            let id = EventId::from((self.next_id.fetch_add(1, Ordering::SeqCst) + 1) as u64);
            self.calls.lock().push(Call::Insert(id.clone()));
            self.stored.lock().insert(id.clone(), event.clone());
            Ok(Some(id))
        }

        fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
            self.calls.lock().push(Call::Replace(event_id.clone()));
            self.stored.lock().insert(event_id.clone(), event.clone());
            Ok(())
        }

        fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
            self.calls.lock().push(Call::Get(event_id.clone()));
            Ok(self.stored.lock().get(event_id).cloned())
        }
    }
}
