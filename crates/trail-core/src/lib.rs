//! Trail Core - Audit scopes, data providers, and the custom-action pipeline
//!
//! This crate provides the instrumentation core of Trail:
//!
//! - **Scopes**: the lifecycle state machine around one audit event
//! - **Providers**: the sink contract plus lazy, deferred and conditional wrappers
//! - **Actions**: callbacks hooked into four lifecycle points
//! - **Config**: process-wide defaults, a pluggable clock, and file-based settings

pub mod actions;
pub mod clock;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod factory;
pub mod options;
pub mod policy;
pub mod provider;
pub mod scope;
pub mod setting;
pub mod settings;
pub mod wrappers;

// Re-export commonly used types
pub use actions::{ActionType, CustomAction, CustomActions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use event::{
    flatten_fields, AuditEvent, AuditEventEnvironment, AuditTarget, EventId, TimedEvent,
    RESERVED_FIELDS,
};
pub use factory::ScopeFactory;
pub use options::AuditScopeOptions;
pub use policy::{EventCreationPolicy, SaveMode};
pub use provider::{AuditDataProvider, AuditDataProviderExt, SharedProvider};
pub use scope::{AuditScope, ScopeHandle};
pub use setting::Setting;
pub use settings::{AuditSettings, ConfigLoader, SinkSettings};
pub use wrappers::{
    ConditionalDataProvider, DeferredDataProvider, LazyDataProvider, NullDataProvider,
    ProviderResolver, WrapperDataProvider,
};

pub use tokio_util::sync::CancellationToken;

/// Library version
pub const TRAIL_VERSION: &str = env!("CARGO_PKG_VERSION");
