//! Audit scope - the lifecycle state machine around one audit event
//!
//! A scope owns its [`AuditEvent`], decides from the creation policy which
//! provider call each save performs, and drives the custom-action pipeline
//! around those calls. The synchronous and asynchronous paths share the
//! planning steps (`plan_save`, `record_insert`) and differ only in how the
//! provider and the actions are called.

use crate::actions::{ActionType, CustomActions};
use crate::clock::Clock;
use crate::error::AuditResult;
use crate::event::{AuditEvent, AuditTarget, EventId, TimedEvent};
use crate::factory::ScopeFactory;
use crate::options::{AuditScopeOptions, TargetGetter};
use crate::policy::{EventCreationPolicy, ProviderCall, SaveMode, SaveTrigger};
use crate::provider::{ensure_not_cancelled, SharedProvider};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared view of a scope, reachable from its event through a weak
/// reference for as long as the scope is alive
pub struct ScopeHandle {
    scope_id: u64,
    policy: EventCreationPolicy,
    event_id: RwLock<Option<EventId>>,
    save_mode: RwLock<SaveMode>,
    discarded: AtomicBool,
    items: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ScopeHandle {
    fn new(policy: EventCreationPolicy, items: HashMap<String, Arc<dyn Any + Send + Sync>>) -> Self {
        Self {
            scope_id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            policy,
            event_id: RwLock::new(None),
            save_mode: RwLock::new(policy.initial_save_mode()),
            discarded: AtomicBool::new(false),
            items: RwLock::new(items),
        }
    }

    /// Process-unique scope number
    pub fn scope_id(&self) -> u64 {
        self.scope_id
    }

    pub fn creation_policy(&self) -> EventCreationPolicy {
        self.policy
    }

    /// Id assigned by the latest successful insert
    pub fn event_id(&self) -> Option<EventId> {
        self.event_id.read().clone()
    }

    pub fn save_mode(&self) -> SaveMode {
        *self.save_mode.read()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Suppress every future save of the scope
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    pub fn set_item<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.items.write().insert(key.into(), Arc::new(value));
    }

    /// Typed ambient item, `None` if missing or of another type
    pub fn item<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let item = self.items.read().get(key).cloned()?;
        item.downcast::<T>().ok()
    }

    pub fn remove_item(&self, key: &str) -> bool {
        self.items.write().remove(key).is_some()
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("scope_id", &self.scope_id)
            .field("policy", &self.policy)
            .field("event_id", &self.event_id())
            .field("save_mode", &self.save_mode())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

/// Everything the factory resolved for a new scope
pub(crate) struct ScopeParts {
    pub event: AuditEvent,
    pub policy: EventCreationPolicy,
    pub provider: SharedProvider,
    pub actions: Arc<CustomActions>,
    pub clock: Arc<dyn Clock>,
    pub target: Option<TargetGetter>,
    pub include_type_name: bool,
    pub items: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

/// Unit of work wrapping one audit event from creation to disposal.
///
/// Call [`dispose`](AuditScope::dispose) or
/// [`dispose_async`](AuditScope::dispose_async) to end the scope and see
/// the outcome of the terminal save. A scope that is simply dropped can only
/// log the failure of its terminal save. A scope opened with
/// [`create_async`](AuditScope::create_async) and dropped inside a tokio
/// runtime finishes on a spawned task, so the drop never blocks the runtime
/// thread; anywhere else the drop runs the synchronous path.
pub struct AuditScope {
    event: AuditEvent,
    handle: Arc<ScopeHandle>,
    provider: SharedProvider,
    actions: Arc<CustomActions>,
    clock: Arc<dyn Clock>,
    target: Option<TargetGetter>,
    include_type_name: bool,
    async_origin: bool,
    disposed: bool,
}

impl AuditScope {
    /// Create a scope from the global configuration
    #[track_caller]
    pub fn create(options: AuditScopeOptions) -> AuditResult<AuditScope> {
        ScopeFactory::global().create(options)
    }

    /// Create a scope from the global configuration on the async path
    #[track_caller]
    pub fn create_async(
        options: AuditScopeOptions,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = AuditResult<AuditScope>> + Send + '_ {
        ScopeFactory::global().create_async(options, cancel)
    }

    /// Create and immediately dispose a scope holding the given fields
    #[track_caller]
    pub fn log(event_type: impl Into<String>, fields: impl Serialize) -> AuditResult<()> {
        ScopeFactory::global().log(event_type, fields)
    }

    pub(crate) fn from_parts(parts: ScopeParts) -> AuditResult<Self> {
        let ScopeParts {
            mut event,
            policy,
            provider,
            actions,
            clock,
            target,
            include_type_name,
            items,
        } = parts;

        let handle = Arc::new(ScopeHandle::new(policy, items));
        event.attach_scope(&handle);

        let mut scope = Self {
            event,
            handle,
            provider,
            actions,
            clock,
            target,
            include_type_name,
            async_origin: false,
            disposed: false,
        };
        if let Err(e) = scope.snapshot_old() {
            scope.abandon();
            return Err(e);
        }
        Ok(scope)
    }

    /// Drop without the terminal save; used when creation fails
    pub(crate) fn abandon(&mut self) {
        self.disposed = true;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn event(&self) -> &AuditEvent {
        &self.event
    }

    pub fn event_mut(&mut self) -> &mut AuditEvent {
        &mut self.event
    }

    /// Id assigned by the latest successful insert, `None` before
    pub fn event_id(&self) -> Option<EventId> {
        self.handle.event_id()
    }

    /// The action the current (or most recent) save performs
    pub fn save_mode(&self) -> SaveMode {
        self.handle.save_mode()
    }

    pub fn creation_policy(&self) -> EventCreationPolicy {
        self.handle.creation_policy()
    }

    pub fn data_provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn handle(&self) -> &Arc<ScopeHandle> {
        &self.handle
    }

    pub fn is_discarded(&self) -> bool {
        self.handle.is_discarded()
    }

    pub fn set_item<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.handle.set_item(key, value);
    }

    pub fn item<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.handle.item(key)
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Append a comment
    pub fn comment(&mut self, text: impl Into<String>) {
        self.event.comments.push(text.into());
    }

    /// Set (or overwrite) a custom field
    pub fn set_custom_field(&mut self, name: impl Into<String>, value: impl Serialize) -> AuditResult<()> {
        self.event.set_custom_field(name, value)
    }

    /// Record a sub-event at the current offset from the scope start
    pub fn add_timed_event(
        &mut self,
        data: impl Serialize,
        custom_fields: Option<HashMap<String, Value>>,
    ) -> AuditResult<()> {
        let offset = self.clock.utc_now() - self.event.start_date;
        self.event.timed_events.push(TimedEvent {
            offset_ms: offset.num_milliseconds(),
            data: serde_json::to_value(data)?,
            custom_fields: custom_fields.unwrap_or_default(),
        });
        Ok(())
    }

    /// Replace the target getter; the next save snapshots through it
    pub fn set_target_getter<T, F>(&mut self, getter: F)
    where
        T: Serialize,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.target = Some(TargetGetter::new(getter));
    }

    /// Record the error of the audited operation in the environment block
    pub fn set_exception(&mut self, error: impl fmt::Display) {
        self.event
            .environment
            .get_or_insert_with(Default::default)
            .exception = Some(error.to_string());
    }

    /// Skip every future save; saves already made stay persisted
    pub fn discard(&mut self) {
        debug!(scope_id = self.handle.scope_id(), "Audit scope discarded");
        self.handle.discard();
    }

    // =========================================================================
    // SYNCHRONOUS PATH
    // =========================================================================

    /// Run the creation stage: `OnScopeCreated`, then the insert-on-start
    pub(crate) fn start(&mut self) -> AuditResult<()> {
        self.run_actions(ActionType::OnScopeCreated)?;
        self.save_with(SaveTrigger::Creation)
    }

    /// Persist the event now according to the creation policy
    pub fn save(&mut self) -> AuditResult<()> {
        self.save_with(SaveTrigger::Explicit)
    }

    /// End the scope: terminal save, then `OnScopeDisposed`
    pub fn dispose(mut self) -> AuditResult<()> {
        self.dispose_inner()
    }

    fn dispose_inner(&mut self) -> AuditResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let saved = self.save_with(SaveTrigger::Terminal);
        let disposed = self.run_actions(ActionType::OnScopeDisposed);
        debug!(
            scope_id = self.handle.scope_id(),
            event_id = ?self.handle.event_id(),
            "Audit scope disposed"
        );
        saved.and(disposed)
    }

    fn save_with(&mut self, trigger: SaveTrigger) -> AuditResult<()> {
        let Some(mode) = self.plan_save(trigger)? else {
            return Ok(());
        };

        self.run_actions(ActionType::OnEventSaving)?;
        if self.handle.is_discarded() {
            return Ok(());
        }

        match mode.provider_call(self.handle.event_id()) {
            ProviderCall::Insert => {
                let id = self.provider.insert_event(&self.event)?;
                self.record_insert(mode, id);
            }
            ProviderCall::Replace(id) => {
                self.provider.replace_event(&id, &self.event)?;
                debug!(scope_id = self.handle.scope_id(), event_id = %id, ?mode, "Audit event replaced");
            }
        }

        self.run_actions(ActionType::OnEventSaved)
    }

    fn run_actions(&mut self, stage: ActionType) -> AuditResult<()> {
        let actions = self.actions.snapshot(stage);
        for (index, action) in actions.iter().enumerate() {
            if !action.invoke(self)? {
                debug!(?stage, index, "Custom action stopped the pipeline");
                break;
            }
        }
        Ok(())
    }

    // =========================================================================
    // ASYNCHRONOUS PATH
    // =========================================================================

    pub(crate) async fn start_async(&mut self, cancel: &CancellationToken) -> AuditResult<()> {
        self.async_origin = true;
        self.run_actions_async(ActionType::OnScopeCreated, cancel).await?;
        self.save_with_async(SaveTrigger::Creation, cancel).await
    }

    /// Persist the event now according to the creation policy
    pub async fn save_async(&mut self, cancel: &CancellationToken) -> AuditResult<()> {
        self.save_with_async(SaveTrigger::Explicit, cancel).await
    }

    /// End the scope: terminal save, then `OnScopeDisposed`
    pub async fn dispose_async(mut self, cancel: &CancellationToken) -> AuditResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let saved = self.save_with_async(SaveTrigger::Terminal, cancel).await;
        let disposed = self
            .run_actions_async(ActionType::OnScopeDisposed, cancel)
            .await;
        debug!(
            scope_id = self.handle.scope_id(),
            event_id = ?self.handle.event_id(),
            "Audit scope disposed"
        );
        saved.and(disposed)
    }

    async fn save_with_async(
        &mut self,
        trigger: SaveTrigger,
        cancel: &CancellationToken,
    ) -> AuditResult<()> {
        let Some(mode) = self.plan_save(trigger)? else {
            return Ok(());
        };

        self.run_actions_async(ActionType::OnEventSaving, cancel).await?;
        if self.handle.is_discarded() {
            return Ok(());
        }

        ensure_not_cancelled(cancel)?;
        match mode.provider_call(self.handle.event_id()) {
            ProviderCall::Insert => {
                let id = self.provider.insert_event_async(&self.event, cancel).await?;
                self.record_insert(mode, id);
            }
            ProviderCall::Replace(id) => {
                self.provider
                    .replace_event_async(&id, &self.event, cancel)
                    .await?;
                debug!(scope_id = self.handle.scope_id(), event_id = %id, ?mode, "Audit event replaced");
            }
        }

        self.run_actions_async(ActionType::OnEventSaved, cancel).await
    }

    async fn run_actions_async(
        &mut self,
        stage: ActionType,
        cancel: &CancellationToken,
    ) -> AuditResult<()> {
        let actions = self.actions.snapshot(stage);
        for (index, action) in actions.iter().enumerate() {
            if !action.invoke_async(self, cancel).await? {
                debug!(?stage, index, "Custom action stopped the pipeline");
                break;
            }
        }
        Ok(())
    }

    // =========================================================================
    // SHARED PLANNING
    // =========================================================================

    /// Decide what this save does and prepare the event for it.
    ///
    /// Returns `None` when nothing is persisted (discarded scope, or a
    /// trigger the policy ignores).
    fn plan_save(&mut self, trigger: SaveTrigger) -> AuditResult<Option<SaveMode>> {
        if self.handle.is_discarded() {
            debug!(scope_id = self.handle.scope_id(), ?trigger, "Save skipped, scope discarded");
            return Ok(None);
        }

        let has_id = self.handle.event_id().is_some();
        let Some(mode) = self.handle.policy.save_mode(trigger, has_id) else {
            return Ok(None);
        };

        if trigger != SaveTrigger::Creation {
            self.end_event()?;
        }
        *self.handle.save_mode.write() = mode;
        debug!(scope_id = self.handle.scope_id(), ?trigger, ?mode, "Audit save planned");
        Ok(Some(mode))
    }

    fn record_insert(&mut self, mode: SaveMode, id: Option<EventId>) {
        debug!(scope_id = self.handle.scope_id(), event_id = ?id, ?mode, "Audit event inserted");
        if let Some(id) = id {
            *self.handle.event_id.write() = Some(id);
        }
    }

    /// Stamp the end time and take the `New` target snapshot
    fn end_event(&mut self) -> AuditResult<()> {
        let now = self.clock.utc_now();
        self.event.end_date = Some(now);
        self.event.duration_ms = Some((now - self.event.start_date).num_milliseconds());

        if let Some(target) = &self.target {
            let value = target.capture()?;
            let snapshot = self.provider.clone_value(&value, &self.event)?;
            let type_name = self.include_type_name.then(|| target.type_name().to_string());
            let entry = self.event.target.get_or_insert_with(AuditTarget::default);
            entry.new = Some(snapshot);
            if entry.type_name.is_none() {
                entry.type_name = type_name;
            }
        }
        Ok(())
    }

    /// Move the live state into a new scope, leaving `self` disposed
    fn take(&mut self) -> AuditScope {
        self.disposed = true;
        AuditScope {
            event: std::mem::replace(&mut self.event, AuditEvent::new("")),
            handle: self.handle.clone(),
            provider: self.provider.clone(),
            actions: self.actions.clone(),
            clock: self.clock.clone(),
            target: self.target.take(),
            include_type_name: self.include_type_name,
            async_origin: self.async_origin,
            disposed: false,
        }
    }

    /// Take the `Old` target snapshot at creation
    fn snapshot_old(&mut self) -> AuditResult<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let value = target.capture()?;
        let snapshot = self.provider.clone_value(&value, &self.event)?;
        self.event.target = Some(AuditTarget {
            type_name: self.include_type_name.then(|| target.type_name().to_string()),
            old: Some(snapshot),
            new: None,
        });
        Ok(())
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if std::thread::panicking() {
            self.set_exception("panicked");
        }

        // Async actions may wait on the runtime's timers or I/O, which
        // `block_on` on a runtime thread would never see complete.
        if self.async_origin {
            if let Ok(runtime) = Handle::try_current() {
                let scope = self.take();
                debug!(scope_id = scope.handle.scope_id(), "Deferring terminal save to the runtime");
                runtime.spawn(async move {
                    let scope_id = scope.handle.scope_id();
                    let event_type = scope.event.event_type.clone();
                    if let Err(e) = scope.dispose_async(&CancellationToken::new()).await {
                        error!(
                            scope_id,
                            %event_type,
                            error = %e,
                            "Terminal save failed while dropping audit scope"
                        );
                    }
                });
                return;
            }
        }

        if let Err(e) = self.dispose_inner() {
            error!(
                scope_id = self.handle.scope_id(),
                event_type = %self.event.event_type,
                error = %e,
                "Terminal save failed while dropping audit scope"
            );
        }
    }
}

impl fmt::Debug for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditScope")
            .field("event_type", &self.event.event_type)
            .field("handle", &self.handle)
            .field("provider", &self.provider.name())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::CustomAction;
    use crate::clock::ManualClock;
    use crate::config::AuditConfig;
    use crate::provider::testing::RecordingProvider;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn factory_with(provider: Arc<RecordingProvider>) -> ScopeFactory {
        let config = AuditConfig::new();
        config.set_data_provider(provider);
        config.set_include_environment(false);
        ScopeFactory::new(Arc::new(config))
    }

    #[test]
    fn test_insert_on_end_inserts_once_on_dispose() {
        let provider = RecordingProvider::new();
        let factory = factory_with(provider.clone());

        let scope = factory.create(AuditScopeOptions::new("Order:Update")).unwrap();
        assert_eq!(provider.total(), 0);
        assert_eq!(scope.save_mode(), SaveMode::InsertOnEnd);

        scope.dispose().unwrap();
        assert_eq!(provider.inserts(), 1);
        assert_eq!(provider.replaces(), 0);
    }

    #[test]
    fn test_drop_performs_terminal_save() {
        let provider = RecordingProvider::new();
        let factory = factory_with(provider.clone());
        {
            let _scope = factory.create(AuditScopeOptions::new("Order:Update")).unwrap();
        }
        assert_eq!(provider.inserts(), 1);
    }

    #[test]
    fn test_event_id_recorded_after_insert() {
        let provider = RecordingProvider::new();
        let factory = factory_with(provider.clone());
        let options = AuditScopeOptions::new("Login")
            .creation_policy(EventCreationPolicy::InsertOnStartReplaceOnEnd);

        let scope = factory.create(options).unwrap();
        assert_eq!(scope.event_id(), Some(EventId::from(1u64)));
        assert_eq!(scope.save_mode(), SaveMode::InsertOnStart);
        scope.dispose().unwrap();
        assert_eq!(provider.replaces(), 1);
    }

    #[test]
    fn test_timed_event_offset_uses_clock() {
        let provider = RecordingProvider::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        let config = AuditConfig::new();
        config.set_data_provider(provider.clone());
        config.set_clock(clock.clone());
        let factory = ScopeFactory::new(Arc::new(config));

        let mut scope = factory.create(AuditScopeOptions::new("Batch")).unwrap();
        clock.advance(Duration::milliseconds(250));
        scope.add_timed_event(json!({"step": "load"}), None).unwrap();
        clock.advance(Duration::milliseconds(750));
        scope.dispose().unwrap();

        let stored = provider.stored.lock();
        let event = stored.get(&EventId::from(1u64)).unwrap();
        assert_eq!(event.timed_events[0].offset_ms, 250);
        assert_eq!(event.duration_ms, Some(1000));
    }

    #[test]
    fn test_items_reachable_through_event() {
        let provider = RecordingProvider::new();
        let factory = factory_with(provider);
        let scope = factory
            .create(AuditScopeOptions::new("Request").item("tenant", "acme".to_string()))
            .unwrap();

        let handle = scope.event().get_scope().unwrap();
        assert_eq!(handle.item::<String>("tenant").as_deref().map(String::as_str), Some("acme"));
        assert!(handle.item::<u32>("tenant").is_none());
        handle.set_item("attempt", 2u32);
        assert_eq!(scope.item::<u32>("attempt").map(|v| *v), Some(2));
        scope.dispose().unwrap();
    }

    #[test]
    fn test_failed_creation_skips_terminal_save() {
        let provider = RecordingProvider::new();
        let config = AuditConfig::new();
        config.set_data_provider(provider.clone());
        config.add_custom_action(
            ActionType::OnScopeCreated,
            CustomAction::try_new(|_| Err(crate::error::AuditError::action(anyhow::anyhow!("boom")))),
        );
        let factory = ScopeFactory::new(Arc::new(config));

        assert!(factory.create(AuditScopeOptions::new("x")).is_err());
        assert_eq!(provider.total(), 0);
    }

    #[tokio::test]
    async fn test_async_cancelled_save_leaves_provider_uncalled() {
        let provider = RecordingProvider::new();
        let factory = factory_with(provider.clone());
        let cancel = CancellationToken::new();

        let scope = factory
            .create_async(AuditScopeOptions::new("x"), &cancel)
            .await
            .unwrap();
        cancel.cancel();
        let result = scope.dispose_async(&cancel).await;

        assert!(matches!(result, Err(crate::error::AuditError::Cancelled)));
        assert_eq!(provider.total(), 0);
    }
}
