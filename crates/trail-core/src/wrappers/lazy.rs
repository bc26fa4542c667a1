//! Lazy provider - builds the inner provider on first use and keeps it

use super::{ProviderResolver, WrapperDataProvider};
use crate::error::AuditResult;
use crate::event::AuditEvent;
use crate::provider::SharedProvider;
use once_cell::sync::Lazy;
use tracing::debug;

type Factory = Box<dyn FnOnce() -> SharedProvider + Send>;

/// Resolver that runs its factory exactly once, even under concurrent
/// first use
pub struct LazyResolver {
    inner: Lazy<SharedProvider, Factory>,
}

impl LazyResolver {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> SharedProvider + Send + 'static,
    {
        let factory: Factory = Box::new(move || {
            let provider = factory();
            debug!(provider = provider.name(), "Lazy data provider resolved");
            provider
        });
        Self {
            inner: Lazy::new(factory),
        }
    }

    /// Whether the factory has already run
    pub fn is_resolved(&self) -> bool {
        Lazy::get(&self.inner).is_some()
    }
}

impl ProviderResolver for LazyResolver {
    fn resolve(&self, _event: Option<&AuditEvent>) -> AuditResult<Option<SharedProvider>> {
        Ok(Some(Lazy::force(&self.inner).clone()))
    }

    fn describe(&self) -> &str {
        "lazy"
    }
}

/// Provider resolved once from a zero-argument factory
pub type LazyDataProvider = WrapperDataProvider<LazyResolver>;

impl LazyDataProvider {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> SharedProvider + Send + 'static,
    {
        Self::from_resolver(LazyResolver::new(factory))
    }
}
