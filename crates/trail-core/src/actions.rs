//! Custom actions - observer callbacks hooked into the scope lifecycle
//!
//! Actions are kept per lifecycle point in registration order. The registry
//! is copy-on-write: every firing iterates a snapshot taken when the firing
//! starts, so concurrent registration never exposes a half-updated list.

use crate::error::AuditResult;
use crate::scope::AuditScope;
use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle points actions can hook into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// After the event is populated, before any insert
    OnScopeCreated,
    /// Immediately before each insert/replace
    OnEventSaving,
    /// Immediately after each successful insert/replace
    OnEventSaved,
    /// During teardown, after the terminal save attempt
    OnScopeDisposed,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::OnScopeCreated,
        ActionType::OnEventSaving,
        ActionType::OnEventSaved,
        ActionType::OnScopeDisposed,
    ];

    fn index(self) -> usize {
        match self {
            ActionType::OnScopeCreated => 0,
            ActionType::OnEventSaving => 1,
            ActionType::OnEventSaved => 2,
            ActionType::OnScopeDisposed => 3,
        }
    }
}

type SyncAction = dyn Fn(&mut AuditScope) -> AuditResult<bool> + Send + Sync;
type AsyncAction =
    dyn for<'a> Fn(&'a mut AuditScope, CancellationToken) -> BoxFuture<'a, AuditResult<bool>>
        + Send
        + Sync;

/// One registered callback.
///
/// A callback returning `false` stops the remaining callbacks of the same
/// lifecycle point for that firing only.
#[derive(Clone)]
pub enum CustomAction {
    Sync(Arc<SyncAction>),
    Async(Arc<AsyncAction>),
}

impl CustomAction {
    /// Callback that always continues
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut AuditScope) + Send + Sync + 'static,
    {
        CustomAction::Sync(Arc::new(move |scope: &mut AuditScope| -> AuditResult<bool> {
            f(scope);
            Ok(true)
        }))
    }

    /// Callback deciding whether later callbacks run
    pub fn with_result<F>(f: F) -> Self
    where
        F: Fn(&mut AuditScope) -> bool + Send + Sync + 'static,
    {
        CustomAction::Sync(Arc::new(move |scope: &mut AuditScope| -> AuditResult<bool> {
            Ok(f(scope))
        }))
    }

    /// Fallible callback; an error aborts the remaining callbacks and
    /// propagates to the scope operation
    pub fn try_new<F>(f: F) -> Self
    where
        F: Fn(&mut AuditScope) -> AuditResult<bool> + Send + Sync + 'static,
    {
        CustomAction::Sync(Arc::new(f))
    }

    /// Asynchronous callback
    pub fn new_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut AuditScope, CancellationToken) -> BoxFuture<'a, AuditResult<bool>>
            + Send
            + Sync
            + 'static,
    {
        CustomAction::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, CustomAction::Async(_))
    }

    /// Run on the synchronous path; async callbacks are blocked on
    pub(crate) fn invoke(&self, scope: &mut AuditScope) -> AuditResult<bool> {
        match self {
            CustomAction::Sync(f) => f(scope),
            CustomAction::Async(f) => futures::executor::block_on(f(scope, CancellationToken::new())),
        }
    }

    /// Run on the asynchronous path
    pub(crate) async fn invoke_async(
        &self,
        scope: &mut AuditScope,
        cancel: &CancellationToken,
    ) -> AuditResult<bool> {
        match self {
            CustomAction::Sync(f) => f(scope),
            CustomAction::Async(f) => f(scope, cancel.clone()).await,
        }
    }
}

impl fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomAction::Sync(_) => f.write_str("CustomAction::Sync"),
            CustomAction::Async(_) => f.write_str("CustomAction::Async"),
        }
    }
}

/// Registry of custom actions per lifecycle point
pub struct CustomActions {
    stages: [ArcSwap<Vec<CustomAction>>; 4],
}

impl Default for CustomActions {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomActions {
    pub fn new() -> Self {
        Self {
            stages: std::array::from_fn(|_| ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Append an action to a lifecycle point
    pub fn add(&self, action_type: ActionType, action: CustomAction) {
        self.stages[action_type.index()].rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(action.clone());
            next
        });
    }

    /// Stable snapshot of the actions registered for a lifecycle point
    pub fn snapshot(&self, action_type: ActionType) -> Arc<Vec<CustomAction>> {
        self.stages[action_type.index()].load_full()
    }

    pub fn len(&self, action_type: ActionType) -> usize {
        self.stages[action_type.index()].load().len()
    }

    pub fn is_empty(&self) -> bool {
        ActionType::ALL.iter().all(|t| self.len(*t) == 0)
    }

    /// Remove every action from every lifecycle point
    pub fn clear(&self) {
        for stage in &self.stages {
            stage.store(Arc::new(Vec::new()));
        }
    }
}

impl fmt::Debug for CustomActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for action_type in ActionType::ALL {
            map.entry(&action_type, &self.len(action_type));
        }
        map.finish()
    }
}
