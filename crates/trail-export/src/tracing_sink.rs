//! Tracing data provider - emits events as structured log records

use tracing::Level;
use trail_core::{AuditDataProvider, AuditEvent, AuditResult, EventId};

const TARGET: &str = "trail::audit";

/// Writes each save as a `tracing` record under the `trail::audit` target
#[derive(Debug, Clone)]
pub struct TracingDataProvider {
    level: Level,
}

impl Default for TracingDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingDataProvider {
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn emit(&self, action: &str, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        let payload = event.to_json()?;
        let event_type = event.event_type.as_str();
        macro_rules! record {
            ($mac:ident) => {
                tracing::$mac!(
                    target: TARGET,
                    action,
                    event_id = %event_id,
                    event_type,
                    payload = %payload,
                    "Audit event"
                )
            };
        }
        match self.level {
            Level::TRACE => record!(trace),
            Level::DEBUG => record!(debug),
            Level::INFO => record!(info),
            Level::WARN => record!(warn),
            _ => record!(error),
        }
        Ok(())
    }
}

impl AuditDataProvider for TracingDataProvider {
    fn name(&self) -> &str {
        "tracing"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        let id = crate::new_event_id();
        self.emit("insert", &id, event)?;
        Ok(Some(id))
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        self.emit("replace", event_id, event)
    }
}
