//! Conditional provider - routes each event to the first matching branch

use super::{ProviderResolver, WrapperDataProvider};
use crate::error::{AuditError, AuditResult};
use crate::event::AuditEvent;
use crate::provider::SharedProvider;
use std::sync::Arc;
use tracing::debug;

type Predicate = Arc<dyn Fn(&AuditEvent) -> bool + Send + Sync>;
type Factory = Arc<dyn Fn(&AuditEvent) -> SharedProvider + Send + Sync>;

enum Route {
    /// Fixed instance registered up front
    Instance(SharedProvider),
    /// Resolved again on every call
    Factory(Factory),
}

impl Route {
    fn provider_for(&self, event: &AuditEvent) -> SharedProvider {
        match self {
            Route::Instance(p) => p.clone(),
            Route::Factory(f) => f(event),
        }
    }
}

struct Branch {
    predicate: Predicate,
    route: Route,
}

/// Resolver evaluating predicates in registration order
pub struct ConditionalResolver {
    branches: Vec<Branch>,
    default: Option<SharedProvider>,
}

impl ConditionalResolver {
    /// Number of registered branches (default excluded)
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    fn no_route(&self, reason: &str) -> AuditError {
        AuditError::Configuration(format!(
            "conditional data provider: {} and no default provider is configured",
            reason
        ))
    }
}

impl ProviderResolver for ConditionalResolver {
    fn resolve(&self, event: Option<&AuditEvent>) -> AuditResult<Option<SharedProvider>> {
        let Some(event) = event else {
            return self
                .default
                .clone()
                .map(Some)
                .ok_or_else(|| self.no_route("operation carries no event"));
        };

        for (index, branch) in self.branches.iter().enumerate() {
            if (branch.predicate)(event) {
                debug!(
                    branch = index,
                    event_type = %event.event_type,
                    "Conditional data provider matched"
                );
                return Ok(Some(branch.route.provider_for(event)));
            }
        }

        match &self.default {
            Some(default) => {
                debug!(event_type = %event.event_type, "Conditional data provider fell through to default");
                Ok(Some(default.clone()))
            }
            None => Err(self.no_route(&format!(
                "no predicate matched event type '{}'",
                event.event_type
            ))),
        }
    }

    fn describe(&self) -> &str {
        "conditional"
    }
}

/// Builder for [`ConditionalDataProvider`]
#[derive(Default)]
pub struct ConditionalBuilder {
    branches: Vec<Branch>,
    default: Option<SharedProvider>,
}

impl ConditionalBuilder {
    /// Route matching events to a fixed provider instance
    pub fn when<P>(mut self, predicate: P, provider: SharedProvider) -> Self
    where
        P: Fn(&AuditEvent) -> bool + Send + Sync + 'static,
    {
        self.branches.push(Branch {
            predicate: Arc::new(predicate),
            route: Route::Instance(provider),
        });
        self
    }

    /// Route matching events to a provider built by `factory` on each call
    pub fn when_factory<P, F>(mut self, predicate: P, factory: F) -> Self
    where
        P: Fn(&AuditEvent) -> bool + Send + Sync + 'static,
        F: Fn(&AuditEvent) -> SharedProvider + Send + Sync + 'static,
    {
        self.branches.push(Branch {
            predicate: Arc::new(predicate),
            route: Route::Factory(Arc::new(factory)),
        });
        self
    }

    /// Provider used when nothing matches
    pub fn otherwise(mut self, provider: SharedProvider) -> Self {
        self.default = Some(provider);
        self
    }

    pub fn build(self) -> ConditionalDataProvider {
        ConditionalDataProvider::from_resolver(ConditionalResolver {
            branches: self.branches,
            default: self.default,
        })
    }
}

/// Provider that routes by predicate over the event
pub type ConditionalDataProvider = WrapperDataProvider<ConditionalResolver>;

impl ConditionalDataProvider {
    pub fn builder() -> ConditionalBuilder {
        ConditionalBuilder::default()
    }
}
