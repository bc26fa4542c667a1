//! Configuration values that are either constant or computed from the event

use crate::event::AuditEvent;
use std::fmt;
use std::sync::Arc;

/// A value that is either a literal or derived from the in-flight event.
///
/// `get_value` may run the function any number of times; nothing here is
/// memoized.
pub enum Setting<T> {
    /// Constant value
    Value(T),
    /// Computed per call from the event
    Func(Arc<dyn Fn(&AuditEvent) -> T + Send + Sync>),
}

impl<T: Clone> Setting<T> {
    /// Build a setting computed from the event
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&AuditEvent) -> T + Send + Sync + 'static,
    {
        Setting::Func(Arc::new(f))
    }

    /// Resolve the value for this event
    pub fn get_value(&self, event: &AuditEvent) -> T {
        match self {
            Setting::Value(v) => v.clone(),
            Setting::Func(f) => f(event),
        }
    }

    /// Whether this setting is a constant
    pub fn is_constant(&self) -> bool {
        matches!(self, Setting::Value(_))
    }
}

impl<T> From<T> for Setting<T> {
    fn from(value: T) -> Self {
        Setting::Value(value)
    }
}

impl<T: Clone> Clone for Setting<T> {
    fn clone(&self) -> Self {
        match self {
            Setting::Value(v) => Setting::Value(v.clone()),
            Setting::Func(f) => Setting::Func(f.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Setting::Func(_) => f.write_str("Func(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_constant_setting() {
        let setting: Setting<String> = "audit".to_string().into();
        let event = AuditEvent::new("Order:Update");
        assert!(setting.is_constant());
        assert_eq!(setting.get_value(&event), "audit");
    }

    #[test]
    fn test_func_setting_reads_event() {
        let setting = Setting::from_fn(|e: &AuditEvent| format!("{}.json", e.event_type));
        let event = AuditEvent::new("Login");
        assert_eq!(setting.get_value(&event), "Login.json");
    }

    #[test]
    fn test_func_setting_is_not_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let setting = Setting::from_fn(move |_: &AuditEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            1u32
        });
        let event = AuditEvent::new("x");
        setting.get_value(&event);
        setting.get_value(&event);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
