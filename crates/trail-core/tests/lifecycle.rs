//! Scope lifecycle: creation policies, discard, snapshots, back-references

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{isolated, Call, RecordingProvider};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use trail_core::{
    AuditEvent, AuditScopeOptions, CancellationToken, EventCreationPolicy, EventId, ManualClock,
    SaveMode,
};

fn id(n: u64) -> EventId {
    EventId::from(n)
}

#[test]
fn test_insert_on_end_single_insert() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let scope = factory.create(AuditScopeOptions::new("Order:Update")).unwrap();
    scope.dispose().unwrap();

    assert_eq!(provider.calls(), vec![Call::Insert(id(1))]);
}

#[test]
fn test_insert_on_end_with_explicit_save_replaces() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let mut scope = factory.create(AuditScopeOptions::new("Order:Update")).unwrap();
    scope.save().unwrap();
    assert_eq!(scope.save_mode(), SaveMode::InsertOnEnd);
    scope.dispose().unwrap();

    assert_eq!(provider.calls(), vec![Call::Insert(id(1)), Call::Replace(id(1))]);
}

#[test]
fn test_insert_on_start_replace_on_end() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

    let mut scope = factory.create(options).unwrap();
    assert_eq!(provider.calls(), vec![Call::Insert(id(1))]);
    scope.save().unwrap();
    assert_eq!(scope.save_mode(), SaveMode::ReplaceOnEnd);
    scope.dispose().unwrap();

    assert_eq!(
        provider.calls(),
        vec![Call::Insert(id(1)), Call::Replace(id(1)), Call::Replace(id(1))]
    );
}

#[test]
fn test_insert_on_start_insert_on_end() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartInsertOnEnd);

    let scope = factory.create(options).unwrap();
    assert_eq!(scope.event_id(), Some(id(1)));
    scope.dispose().unwrap();

    assert_eq!(provider.calls(), vec![Call::Insert(id(1)), Call::Insert(id(2))]);
}

#[test]
fn test_insert_on_start_insert_on_end_every_save_inserts() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartInsertOnEnd);

    let mut scope = factory.create(options).unwrap();
    let first = scope.event_id().unwrap();
    scope.save().unwrap();
    let second = scope.event_id().unwrap();
    assert_ne!(second, first);
    assert_eq!(scope.save_mode(), SaveMode::InsertOnEnd);
    scope.save().unwrap();
    let third = scope.event_id().unwrap();
    assert_ne!(third, second);
    scope.dispose().unwrap();

    assert_eq!(
        provider.calls(),
        vec![
            Call::Insert(id(1)),
            Call::Insert(id(2)),
            Call::Insert(id(3)),
            Call::Insert(id(4))
        ]
    );
    assert_eq!(provider.replaces(), 0);
}

#[test]
fn test_manual_saves_only_when_asked() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let options = AuditScopeOptions::new("Export").creation_policy(EventCreationPolicy::Manual);

    let scope = factory.create(options).unwrap();
    scope.dispose().unwrap();
    assert!(provider.calls().is_empty());

    let options = AuditScopeOptions::new("Export").creation_policy(EventCreationPolicy::Manual);
    let mut scope = factory.create(options).unwrap();
    assert_eq!(scope.event_id(), None);
    scope.save().unwrap();
    assert_eq!(scope.save_mode(), SaveMode::Manual);
    assert_eq!(scope.event_id(), Some(id(1)));
    scope.save().unwrap();
    assert_eq!(scope.save_mode(), SaveMode::Manual);
    assert_eq!(scope.event_id(), Some(id(1)));
    scope.dispose().unwrap();
    assert_eq!(provider.calls(), vec![Call::Insert(id(1)), Call::Replace(id(1))]);
}

#[test]
fn test_discard_suppresses_every_later_save() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let mut scope = factory.create(AuditScopeOptions::new("Noise")).unwrap();
    scope.discard();
    scope.save().unwrap();
    scope.dispose().unwrap();
    assert!(provider.calls().is_empty());

    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);
    let mut scope = factory.create(options).unwrap();
    scope.discard();
    assert!(scope.is_discarded());
    scope.dispose().unwrap();
    assert_eq!(provider.calls(), vec![Call::Insert(id(1))]);
}

#[test]
fn test_manual_save_then_discard_keeps_single_insert() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let options = AuditScopeOptions::new("Export").creation_policy(EventCreationPolicy::Manual);

    let mut scope = factory.create(options).unwrap();
    scope.save().unwrap();
    scope.discard();
    scope.save().unwrap();
    scope.dispose().unwrap();

    assert_eq!(provider.calls(), vec![Call::Insert(id(1))]);
}

#[test]
fn test_target_snapshots_are_isolated() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let live = Arc::new(Mutex::new(vec!["initial".to_string()]));
    let source = live.clone();

    let scope = factory
        .create(AuditScopeOptions::new("List:Edit").target(move || source.lock().clone()))
        .unwrap();
    live.lock().push("final".to_string());
    scope.dispose().unwrap();

    let event = provider.stored(1u64).unwrap();
    let target = event.target.unwrap();
    assert_eq!(target.old, Some(json!(["initial"])));
    assert_eq!(target.new, Some(json!(["initial", "final"])));
    assert!(target.type_name.unwrap().contains("Vec"));
}

#[test]
fn test_target_getter_can_be_replaced() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let mut scope = factory
        .create(AuditScopeOptions::new("Counter").target(|| 1))
        .unwrap();
    scope.set_target_getter(|| 2);
    scope.dispose().unwrap();

    let target = provider.stored(1u64).unwrap().target.unwrap();
    assert_eq!(target.old, Some(json!(1)));
    assert_eq!(target.new, Some(json!(2)));
}

#[test]
fn test_event_back_reference_tracks_scope_lifetime() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let scope = factory.create(AuditScopeOptions::new("Login")).unwrap();
    let detached: AuditEvent = scope.event().clone();
    let handle = detached.get_scope().unwrap();
    assert_eq!(handle.scope_id(), scope.handle().scope_id());
    drop(handle);

    scope.dispose().unwrap();
    assert!(detached.get_scope().is_none());
    assert!(provider.stored(1u64).unwrap().get_scope().is_none());
}

#[test]
fn test_reused_event_keeps_fields_and_extra_fields_win() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let event = AuditEvent::new("Prebuilt")
        .with_comment("from caller")
        .with_field("tenant", json!("old"))
        .and_then(|e| e.with_field("region", json!("eu")))
        .unwrap();

    let options = AuditScopeOptions::new("Order:Create")
        .audit_event(event)
        .extra_fields(json!({"tenant": "acme", "order_id": 42}));
    factory.create(options).unwrap().dispose().unwrap();

    let stored = provider.stored(1u64).unwrap();
    assert_eq!(stored.event_type, "Order:Create");
    assert_eq!(stored.comments, vec!["from caller".to_string()]);
    assert_eq!(stored.custom_field::<String>("tenant").as_deref(), Some("acme"));
    assert_eq!(stored.custom_field::<String>("region").as_deref(), Some("eu"));
    assert_eq!(stored.custom_field::<u32>("order_id"), Some(42));
}

#[test]
fn test_invalid_extra_fields_fail_creation() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let result = factory.create(AuditScopeOptions::new("x").extra_fields("not an object"));
    assert!(matches!(result, Err(trail_core::AuditError::InvalidCustomFields(_))));
    assert!(provider.calls().is_empty());
}

#[test]
fn test_custom_fields_cannot_shadow_event_attributes() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let result = factory.create(AuditScopeOptions::new("x").extra_fields(json!({"target": 1})));
    assert!(matches!(result, Err(trail_core::AuditError::InvalidCustomFields(_))));

    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);
    let mut scope = factory.create(options).unwrap();
    let err = scope.set_custom_field("event_type", "spoofed").unwrap_err();
    assert!(matches!(err, trail_core::AuditError::InvalidCustomFields(_)));
    scope.set_custom_field("actor", "ana").unwrap();
    scope.dispose().unwrap();

    let stored = provider.stored(1u64).unwrap();
    assert_eq!(stored.event_type, "Login");
    assert!(!stored.custom_fields.contains_key("event_type"));
    assert_eq!(stored.custom_field::<String>("actor").as_deref(), Some("ana"));
}

#[test]
fn test_clock_substitution_drives_timestamps() {
    let provider = RecordingProvider::new();
    let (config, factory) = isolated(provider.clone());
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    config.set_clock(clock.clone());

    let scope = factory.create(AuditScopeOptions::new("Timed")).unwrap();
    clock.advance(Duration::seconds(3));
    scope.dispose().unwrap();

    let event = provider.stored(1u64).unwrap();
    assert_eq!(event.start_date, start);
    assert_eq!(event.end_date, Some(start + Duration::seconds(3)));
    assert_eq!(event.duration_ms, Some(3000));
}

#[test]
fn test_environment_records_call_site() {
    let provider = RecordingProvider::new();
    let (config, factory) = isolated(provider.clone());
    config.set_include_environment(true);

    factory.create(AuditScopeOptions::new("Env")).unwrap().dispose().unwrap();

    let environment = provider.stored(1u64).unwrap().environment.unwrap();
    assert!(environment.calling_location.unwrap().contains("lifecycle.rs"));
    assert_eq!(environment.process_id, Some(std::process::id()));
}

#[test]
fn test_sink_error_propagates_from_dispose() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    let scope = factory.create(AuditScopeOptions::new("x")).unwrap();
    provider.fail_writes();
    let err = scope.dispose().unwrap_err();
    assert!(matches!(err, trail_core::AuditError::Sink(_)));
}

#[test]
fn test_log_shortcut_inserts_once() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());

    factory.log("Heartbeat", json!({"node": "a1"})).unwrap();

    assert_eq!(provider.calls(), vec![Call::Insert(id(1))]);
    let stored = provider.stored(1u64).unwrap();
    assert_eq!(stored.event_type, "Heartbeat");
    assert_eq!(stored.custom_field::<String>("node").as_deref(), Some("a1"));
}

#[tokio::test]
async fn test_async_lifecycle_matches_sync() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let cancel = CancellationToken::new();
    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

    let mut scope = factory.create_async(options, &cancel).await.unwrap();
    scope.save_async(&cancel).await.unwrap();
    scope.dispose_async(&cancel).await.unwrap();

    assert_eq!(
        provider.calls(),
        vec![Call::Insert(id(1)), Call::Replace(id(1)), Call::Replace(id(1))]
    );

    factory
        .log_async("Heartbeat", json!({"node": "b2"}), &cancel)
        .await
        .unwrap();
    assert_eq!(provider.inserts(), 2);
}

#[tokio::test]
async fn test_cancelled_token_skips_provider() {
    let provider = RecordingProvider::new();
    let (_, factory) = isolated(provider.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);
    let result = factory.create_async(options, &cancel).await;

    assert!(matches!(result, Err(trail_core::AuditError::Cancelled)));
    assert!(provider.calls().is_empty());
}
