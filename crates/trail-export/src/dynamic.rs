//! Dynamic data provider - behaviour supplied as closures

use trail_core::{AuditDataProvider, AuditError, AuditEvent, AuditResult, EventId};

type InsertFn = Box<dyn Fn(&AuditEvent) -> AuditResult<Option<EventId>> + Send + Sync>;
type ReplaceFn = Box<dyn Fn(&EventId, &AuditEvent) -> AuditResult<()> + Send + Sync>;
type GetFn = Box<dyn Fn(&EventId) -> AuditResult<Option<AuditEvent>> + Send + Sync>;

/// Provider assembled from closures; operations without a closure are not
/// supported
pub struct DynamicDataProvider {
    on_insert: InsertFn,
    on_replace: Option<ReplaceFn>,
    on_get: Option<GetFn>,
}

impl DynamicDataProvider {
    pub fn new<F>(on_insert: F) -> Self
    where
        F: Fn(&AuditEvent) -> AuditResult<Option<EventId>> + Send + Sync + 'static,
    {
        Self {
            on_insert: Box::new(on_insert),
            on_replace: None,
            on_get: None,
        }
    }

    /// One callback for every save; inserts return no id, so each save
    /// reaches the callback as an insert
    pub fn on_insert_and_replace<F>(f: F) -> Self
    where
        F: Fn(&AuditEvent) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            f(event);
            Ok(None)
        })
    }

    pub fn with_replace<F>(mut self, on_replace: F) -> Self
    where
        F: Fn(&EventId, &AuditEvent) -> AuditResult<()> + Send + Sync + 'static,
    {
        self.on_replace = Some(Box::new(on_replace));
        self
    }

    pub fn with_get<F>(mut self, on_get: F) -> Self
    where
        F: Fn(&EventId) -> AuditResult<Option<AuditEvent>> + Send + Sync + 'static,
    {
        self.on_get = Some(Box::new(on_get));
        self
    }
}

impl AuditDataProvider for DynamicDataProvider {
    fn name(&self) -> &str {
        "dynamic"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        (self.on_insert)(event)
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        match &self.on_replace {
            Some(f) => f(event_id, event),
            None => Err(AuditError::not_supported(self.name(), "replace_event")),
        }
    }

    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        match &self.on_get {
            Some(f) => f(event_id),
            None => Err(AuditError::not_supported(self.name(), "get_event")),
        }
    }
}
