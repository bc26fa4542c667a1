//! Process-wide audit configuration
//!
//! [`AuditConfig`] holds the defaults consumed when a scope is created: the
//! data provider, the creation policy, the custom-action registry, and the
//! clock. There is one global instance, but scope factories can be bound to
//! independent instances.

use crate::actions::{ActionType, CustomAction, CustomActions};
use crate::clock::{Clock, SystemClock};
use crate::policy::EventCreationPolicy;
use crate::provider::SharedProvider;
use crate::wrappers::NullDataProvider;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

static GLOBAL: Lazy<Arc<AuditConfig>> = Lazy::new(|| Arc::new(AuditConfig::new()));

/// Where the default provider comes from
#[derive(Clone)]
enum ProviderSource {
    Instance(SharedProvider),
    Factory(Arc<dyn Fn() -> SharedProvider + Send + Sync>),
}

#[derive(Clone)]
struct ConfigState {
    provider: ProviderSource,
    creation_policy: EventCreationPolicy,
    clock: Arc<dyn Clock>,
    include_environment: bool,
    include_type_name: bool,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            provider: ProviderSource::Instance(Arc::new(NullDataProvider::new())),
            creation_policy: EventCreationPolicy::default(),
            clock: Arc::new(SystemClock),
            include_environment: true,
            include_type_name: true,
        }
    }
}

/// Audit configuration context
pub struct AuditConfig {
    state: RwLock<ConfigState>,
    actions: Arc<CustomActions>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditConfig {
    /// Create an independent configuration with default values
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConfigState::default()),
            actions: Arc::new(CustomActions::new()),
        }
    }

    /// The process-wide configuration
    pub fn global() -> Arc<AuditConfig> {
        GLOBAL.clone()
    }

    /// Reinitialize every default and drop all registered actions
    pub fn reset(&self) {
        *self.state.write() = ConfigState::default();
        self.actions.clear();
        debug!("Audit configuration reset");
    }

    /// Use a fixed provider instance
    pub fn set_data_provider(&self, provider: SharedProvider) {
        debug!(provider = provider.name(), "Default data provider set");
        self.state.write().provider = ProviderSource::Instance(provider);
    }

    /// Build the provider from a factory each time a scope is created
    pub fn set_data_provider_factory<F>(&self, factory: F)
    where
        F: Fn() -> SharedProvider + Send + Sync + 'static,
    {
        self.state.write().provider = ProviderSource::Factory(Arc::new(factory));
    }

    /// Resolve the default provider
    pub fn data_provider(&self) -> SharedProvider {
        let source = self.state.read().provider.clone();
        match source {
            ProviderSource::Instance(p) => p,
            ProviderSource::Factory(f) => f(),
        }
    }

    pub fn set_creation_policy(&self, policy: EventCreationPolicy) {
        self.state.write().creation_policy = policy;
    }

    pub fn creation_policy(&self) -> EventCreationPolicy {
        self.state.read().creation_policy
    }

    /// Substitute the clock used for every timestamp
    pub fn set_clock(&self, clock: Arc<dyn Clock>) {
        self.state.write().clock = clock;
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.state.read().clock.clone()
    }

    pub fn utc_now(&self) -> DateTime<Utc> {
        self.clock().utc_now()
    }

    /// Whether new events get an environment block
    pub fn set_include_environment(&self, include: bool) {
        self.state.write().include_environment = include;
    }

    pub fn include_environment(&self) -> bool {
        self.state.read().include_environment
    }

    /// Whether target snapshots record the target's type name
    pub fn set_include_type_name(&self, include: bool) {
        self.state.write().include_type_name = include;
    }

    pub fn include_type_name(&self) -> bool {
        self.state.read().include_type_name
    }

    /// The custom-action registry
    pub fn actions(&self) -> &Arc<CustomActions> {
        &self.actions
    }

    /// Register a custom action
    pub fn add_custom_action(&self, action_type: ActionType, action: CustomAction) {
        debug!(?action_type, is_async = action.is_async(), "Custom action registered");
        self.actions.add(action_type, action);
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("AuditConfig")
            .field("creation_policy", &state.creation_policy)
            .field("include_environment", &state.include_environment)
            .field("include_type_name", &state.include_type_name)
            .field("actions", &self.actions)
            .finish()
    }
}
