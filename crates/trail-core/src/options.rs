//! Per-call inputs for creating a scope

use crate::error::AuditResult;
use crate::event::{flatten_fields, AuditEvent};
use crate::policy::EventCreationPolicy;
use crate::provider::SharedProvider;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Zero-argument getter producing the current state of the audited object
#[derive(Clone)]
pub struct TargetGetter {
    getter: Arc<dyn Fn() -> AuditResult<Value> + Send + Sync>,
    type_name: &'static str,
}

impl TargetGetter {
    pub fn new<T, F>(getter: F) -> Self
    where
        T: Serialize,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            getter: Arc::new(move || Ok(serde_json::to_value(getter())?)),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Read the target and convert it to its JSON form
    pub fn capture(&self) -> AuditResult<Value> {
        (self.getter)()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for TargetGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetGetter")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Options for a single scope; anything left unset falls back to the
/// configuration defaults
#[derive(Default)]
pub struct AuditScopeOptions {
    pub(crate) event_type: Option<String>,
    pub(crate) target: Option<TargetGetter>,
    pub(crate) extra_fields: Option<AuditResult<HashMap<String, Value>>>,
    pub(crate) creation_policy: Option<EventCreationPolicy>,
    pub(crate) data_provider: Option<SharedProvider>,
    pub(crate) audit_event: Option<AuditEvent>,
    pub(crate) include_environment: Option<bool>,
    pub(crate) items: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl AuditScopeOptions {
    /// Options for an event of the given type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Default::default()
        }
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Audit a target object; the getter runs at creation and at each save
    pub fn target<T, F>(mut self, getter: F) -> Self
    where
        T: Serialize,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.target = Some(TargetGetter::new(getter));
        self
    }

    /// Object flattened into the event's custom fields; these override
    /// fields already present on a reused event
    pub fn extra_fields(mut self, fields: impl Serialize) -> Self {
        self.extra_fields = Some(flatten_fields(fields));
        self
    }

    pub fn creation_policy(mut self, policy: EventCreationPolicy) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    pub fn data_provider(mut self, provider: SharedProvider) -> Self {
        self.data_provider = Some(provider);
        self
    }

    /// Reuse a pre-built event instead of constructing one
    pub fn audit_event(mut self, event: AuditEvent) -> Self {
        self.audit_event = Some(event);
        self
    }

    pub fn include_environment(mut self, include: bool) -> Self {
        self.include_environment = Some(include);
        self
    }

    /// Ambient item made available on the scope handle
    pub fn item<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.items.insert(key.into(), Arc::new(value));
        self
    }
}

impl fmt::Debug for AuditScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditScopeOptions")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("creation_policy", &self.creation_policy)
            .field("has_data_provider", &self.data_provider.is_some())
            .field("has_audit_event", &self.audit_event.is_some())
            .finish()
    }
}
