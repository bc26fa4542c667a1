//! Scopes driven end to end against the reference sinks

use std::sync::Arc;
use trail_core::{
    AuditConfig, AuditDataProvider, AuditScopeOptions, CancellationToken, EventCreationPolicy,
    ScopeFactory, Setting,
};
use trail_export::{FileDataProvider, InMemoryDataProvider, JsonlDataProvider};

fn factory(provider: trail_core::SharedProvider) -> ScopeFactory {
    let config = AuditConfig::new();
    config.set_data_provider(provider);
    ScopeFactory::new(Arc::new(config))
}

#[test]
fn test_memory_sink_keeps_latest_version() {
    let sink = Arc::new(InMemoryDataProvider::new());
    let factory = factory(sink.clone());
    let options = AuditScopeOptions::new("Order:Update")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

    let mut scope = factory.create(options).unwrap();
    let id = scope.event_id().unwrap();
    scope.set_custom_field("status", "shipped").unwrap();
    scope.dispose().unwrap();

    assert_eq!(sink.len(), 1);
    let stored = sink.get_event(&id).unwrap().unwrap();
    assert_eq!(stored.custom_field::<String>("status").as_deref(), Some("shipped"));
    assert!(stored.end_date.is_some());
}

#[tokio::test]
async fn test_file_sink_async_replace_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let sink = Arc::new(
        FileDataProvider::new(Setting::from_fn(move |event: &trail_core::AuditEvent| {
            root.join(&event.event_type)
        }))
        .with_prefix("evt_".to_string()),
    );
    let factory = factory(sink.clone());
    let cancel = CancellationToken::new();
    let options = AuditScopeOptions::new("Login")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

    let mut scope = factory.create_async(options, &cancel).await.unwrap();
    let id = scope.event_id().unwrap();
    scope.comment("second factor ok");
    scope.dispose_async(&cancel).await.unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path().join("Login")).unwrap().collect();
    assert_eq!(files.len(), 1);
    let stored = sink.get_event_async(&id, &cancel).await.unwrap().unwrap();
    assert_eq!(stored.comments, vec!["second factor ok".to_string()]);
}

#[test]
fn test_jsonl_sink_appends_every_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let sink = Arc::new(JsonlDataProvider::new(&path));
    let factory = factory(sink.clone());
    let options = AuditScopeOptions::new("Import")
        .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

    let mut scope = factory.create(options).unwrap();
    scope.save().unwrap();
    scope.dispose().unwrap();

    assert_eq!(sink.events_written(), 3);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
}
