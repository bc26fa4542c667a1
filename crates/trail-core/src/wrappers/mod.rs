//! Wrapper providers - providers whose only job is to pick another provider
//!
//! Every contract operation is implemented once in [`WrapperDataProvider`],
//! which asks its [`ProviderResolver`] for the inner provider for the
//! current event and forwards the call. A resolver that yields no provider
//! turns every operation into a no-op.

mod conditional;
mod deferred;
mod lazy;

pub use conditional::{ConditionalBuilder, ConditionalDataProvider, ConditionalResolver};
pub use deferred::{DeferredDataProvider, DeferredResolver};
pub use lazy::{LazyDataProvider, LazyResolver};

use crate::error::AuditResult;
use crate::event::{AuditEvent, EventId};
use crate::provider::{default_clone_value, ensure_not_cancelled, AuditDataProvider, SharedProvider};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Hook that picks the inner provider
///
/// `event` is `None` for operations that have no event in hand (retrieval).
pub trait ProviderResolver: Send + Sync {
    /// Resolve the provider for this operation
    fn resolve(&self, event: Option<&AuditEvent>) -> AuditResult<Option<SharedProvider>>;

    /// Name used in diagnostics
    fn describe(&self) -> &str;
}

/// Provider that delegates every operation to whatever its resolver picks
pub struct WrapperDataProvider<R> {
    resolver: R,
}

impl<R: ProviderResolver> WrapperDataProvider<R> {
    /// Wrap a resolver
    pub fn from_resolver(resolver: R) -> Self {
        Self { resolver }
    }

    /// Access the resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

#[async_trait]
impl<R: ProviderResolver> AuditDataProvider for WrapperDataProvider<R> {
    fn name(&self) -> &str {
        self.resolver.describe()
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        match self.resolver.resolve(Some(event))? {
            Some(inner) => inner.insert_event(event),
            None => Ok(None),
        }
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        match self.resolver.resolve(Some(event))? {
            Some(inner) => inner.replace_event(event_id, event),
            None => Ok(()),
        }
    }

    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        match self.resolver.resolve(None)? {
            Some(inner) => inner.get_event(event_id),
            None => Ok(None),
        }
    }

    fn clone_value(&self, value: &Value, event: &AuditEvent) -> AuditResult<Value> {
        match self.resolver.resolve(Some(event))? {
            Some(inner) => inner.clone_value(value, event),
            None => Ok(default_clone_value(value)),
        }
    }

    async fn insert_event_async(
        &self,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<EventId>> {
        ensure_not_cancelled(cancel)?;
        match self.resolver.resolve(Some(event))? {
            Some(inner) => inner.insert_event_async(event, cancel).await,
            None => Ok(None),
        }
    }

    async fn replace_event_async(
        &self,
        event_id: &EventId,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<()> {
        ensure_not_cancelled(cancel)?;
        match self.resolver.resolve(Some(event))? {
            Some(inner) => inner.replace_event_async(event_id, event, cancel).await,
            None => Ok(()),
        }
    }

    async fn get_event_async(
        &self,
        event_id: &EventId,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<AuditEvent>> {
        ensure_not_cancelled(cancel)?;
        match self.resolver.resolve(None)? {
            Some(inner) => inner.get_event_async(event_id, cancel).await,
            None => Ok(None),
        }
    }
}

/// Resolver that never yields a provider
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ProviderResolver for NullResolver {
    fn resolve(&self, _event: Option<&AuditEvent>) -> AuditResult<Option<SharedProvider>> {
        Ok(None)
    }

    fn describe(&self) -> &str {
        "null"
    }
}

/// Provider that silently drops everything; the configuration default
pub type NullDataProvider = WrapperDataProvider<NullResolver>;

impl NullDataProvider {
    pub fn new() -> Self {
        Self::from_resolver(NullResolver)
    }
}

impl Default for NullDataProvider {
    fn default() -> Self {
        Self::new()
    }
}
