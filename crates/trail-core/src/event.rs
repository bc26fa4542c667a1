//! Audit event - the payload persisted by data providers

use crate::error::{AuditError, AuditResult};
use crate::scope::ScopeHandle;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Opaque identifier returned by a provider's insert
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for EventId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Top-level keys of a serialized event; custom fields may not use them
pub const RESERVED_FIELDS: [&str; 8] = [
    "event_type",
    "start_date",
    "end_date",
    "duration_ms",
    "environment",
    "target",
    "comments",
    "timed_events",
];

/// Before/after snapshot of the audited object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTarget {
    /// Rust type name of the target, when recorded
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Snapshot taken when the scope was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,

    /// Snapshot taken at the latest save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Sub-event recorded while a scope is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Milliseconds since the scope started
    pub offset_ms: i64,

    /// Arbitrary payload
    pub data: Value,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_fields: HashMap<String, Value>,
}

/// Where and by whom the event was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEventEnvironment {
    pub machine_name: Option<String>,

    pub user_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,

    /// Source location that opened the scope (`file:line:column`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calling_location: Option<String>,

    /// Error text recorded for the audited operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// The audit event
///
/// Owned by its scope while the scope is alive. Holds a weak reference back
/// to the scope so a persisted copy never keeps the scope's resources alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type (e.g., "Order:Update")
    pub event_type: String,

    /// When the scope started
    pub start_date: DateTime<Utc>,

    /// When the event was last saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    /// Milliseconds between start and last save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<AuditEventEnvironment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<AuditTarget>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_events: Vec<TimedEvent>,

    /// Custom fields, flattened into the top level of the JSON document
    #[serde(flatten)]
    pub custom_fields: HashMap<String, Value>,

    #[serde(skip)]
    scope: Weak<ScopeHandle>,
}

impl AuditEvent {
    /// Create an event of the given type starting now
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            start_date: Utc::now(),
            end_date: None,
            duration_ms: None,
            environment: None,
            target: None,
            comments: Vec::new(),
            timed_events: Vec::new(),
            custom_fields: HashMap::new(),
            scope: Weak::new(),
        }
    }

    /// Set the start date
    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = start_date;
        self
    }

    /// Add a comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// Set a custom field
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> AuditResult<Self> {
        let name = name.into();
        check_field_name(&name)?;
        self.custom_fields.insert(name, value);
        Ok(self)
    }

    /// The scope that owns this event, if it is still alive
    pub fn get_scope(&self) -> Option<Arc<ScopeHandle>> {
        self.scope.upgrade()
    }

    pub(crate) fn attach_scope(&mut self, handle: &Arc<ScopeHandle>) {
        self.scope = Arc::downgrade(handle);
    }

    /// Set a custom field from any serializable value
    pub fn set_custom_field(&mut self, name: impl Into<String>, value: impl Serialize) -> AuditResult<()> {
        let name = name.into();
        check_field_name(&name)?;
        let value = serde_json::to_value(value)?;
        self.custom_fields.insert(name, value);
        Ok(())
    }

    /// Read a custom field as `T`
    pub fn custom_field<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.custom_fields
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Merge fields into the event; incoming values win on name clashes.
    ///
    /// Nothing is merged if any name is reserved.
    pub fn merge_custom_fields(&mut self, fields: HashMap<String, Value>) -> AuditResult<()> {
        fields.keys().try_for_each(|name| check_field_name(name))?;
        self.custom_fields.extend(fields);
        Ok(())
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> AuditResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> AuditResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Flatten any serializable object into a custom-fields map.
///
/// `null` flattens to an empty map; anything other than an object is
/// rejected.
pub fn flatten_fields(fields: impl Serialize) -> AuditResult<HashMap<String, Value>> {
    match serde_json::to_value(fields)? {
        Value::Null => Ok(HashMap::new()),
        Value::Object(map) => {
            map.keys().try_for_each(|name| check_field_name(name))?;
            Ok(map.into_iter().collect())
        }
        other => Err(AuditError::InvalidCustomFields(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn check_field_name(name: &str) -> AuditResult<()> {
    if RESERVED_FIELDS.contains(&name) {
        return Err(AuditError::InvalidCustomFields(format!(
            "'{}' is a reserved event field",
            name
        )));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
