//! Deferred provider - re-resolves the inner provider on every operation

use super::{ProviderResolver, WrapperDataProvider};
use crate::error::AuditResult;
use crate::event::AuditEvent;
use crate::provider::SharedProvider;
use std::sync::Arc;

type Factory = Arc<dyn Fn(Option<&AuditEvent>) -> SharedProvider + Send + Sync>;

/// Resolver that asks its factory for a provider on every call
pub struct DeferredResolver {
    factory: Factory,
}

impl DeferredResolver {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Option<&AuditEvent>) -> SharedProvider + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl ProviderResolver for DeferredResolver {
    fn resolve(&self, event: Option<&AuditEvent>) -> AuditResult<Option<SharedProvider>> {
        Ok(Some((self.factory)(event)))
    }

    fn describe(&self) -> &str {
        "deferred"
    }
}

/// Provider chosen from the current event at each operation
pub type DeferredDataProvider = WrapperDataProvider<DeferredResolver>;

impl DeferredDataProvider {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Option<&AuditEvent>) -> SharedProvider + Send + Sync + 'static,
    {
        Self::from_resolver(DeferredResolver::new(factory))
    }
}
