//! Scope factory - resolves options against a configuration context

use crate::config::AuditConfig;
use crate::environment;
use crate::error::AuditResult;
use crate::event::{flatten_fields, AuditEvent};
use crate::options::AuditScopeOptions;
use crate::policy::EventCreationPolicy;
use crate::scope::{AuditScope, ScopeParts};
use serde::Serialize;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Creates audit scopes bound to one [`AuditConfig`]
#[derive(Debug, Clone)]
pub struct ScopeFactory {
    config: Arc<AuditConfig>,
}

impl Default for ScopeFactory {
    fn default() -> Self {
        Self::global()
    }
}

impl ScopeFactory {
    pub fn new(config: Arc<AuditConfig>) -> Self {
        Self { config }
    }

    /// Factory bound to the process-wide configuration
    pub fn global() -> Self {
        Self::new(AuditConfig::global())
    }

    pub fn config(&self) -> &Arc<AuditConfig> {
        &self.config
    }

    /// Create and start a scope.
    ///
    /// Fires `OnScopeCreated` and, under an insert-on-start policy, performs
    /// the first insert before returning.
    #[track_caller]
    pub fn create(&self, options: AuditScopeOptions) -> AuditResult<AuditScope> {
        let mut scope = self.prepare(options, Location::caller())?;
        if let Err(e) = scope.start() {
            scope.abandon();
            return Err(e);
        }
        Ok(scope)
    }

    /// Async form of [`create`](Self::create)
    #[track_caller]
    pub fn create_async<'a>(
        &self,
        options: AuditScopeOptions,
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = AuditResult<AuditScope>> + Send + 'a {
        let location = Location::caller();
        let factory = self.clone();
        async move {
            let mut scope = factory.prepare(options, location)?;
            if let Err(e) = scope.start_async(cancel).await {
                scope.abandon();
                return Err(e);
            }
            Ok(scope)
        }
    }

    /// Create a scope holding `fields`, then dispose it at once
    #[track_caller]
    pub fn log(&self, event_type: impl Into<String>, fields: impl Serialize) -> AuditResult<()> {
        let options = Self::log_options(event_type.into(), fields);
        self.create(options)?.dispose()
    }

    /// Async form of [`log`](Self::log)
    #[track_caller]
    pub fn log_async<'a>(
        &self,
        event_type: impl Into<String>,
        fields: impl Serialize,
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = AuditResult<()>> + Send + 'a {
        let options = Self::log_options(event_type.into(), fields);
        self.dispose_new_async(options, cancel)
    }

    #[track_caller]
    fn dispose_new_async<'a>(
        &self,
        options: AuditScopeOptions,
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = AuditResult<()>> + Send + 'a {
        let create = self.create_async(options, cancel);
        async move { create.await?.dispose_async(cancel).await }
    }

    fn log_options(event_type: String, fields: impl Serialize) -> AuditScopeOptions {
        let mut options =
            AuditScopeOptions::new(event_type).creation_policy(EventCreationPolicy::InsertOnEnd);
        options.extra_fields = Some(flatten_fields(fields));
        options
    }

    /// Build the event and the scope without running any lifecycle stage
    fn prepare(
        &self,
        options: AuditScopeOptions,
        location: &'static Location<'static>,
    ) -> AuditResult<AuditScope> {
        let AuditScopeOptions {
            event_type,
            target,
            extra_fields,
            creation_policy,
            data_provider,
            audit_event,
            include_environment,
            items,
        } = options;

        let policy = creation_policy.unwrap_or_else(|| self.config.creation_policy());
        let provider = data_provider.unwrap_or_else(|| self.config.data_provider());
        let clock = self.config.clock();

        let mut event = audit_event.unwrap_or_else(|| AuditEvent::new(""));
        if let Some(event_type) = event_type {
            event.event_type = event_type;
        }
        event.start_date = clock.utc_now();

        if include_environment.unwrap_or_else(|| self.config.include_environment())
            && event.environment.is_none()
        {
            event.environment = Some(environment::capture(location));
        }

        if let Some(fields) = extra_fields {
            event.merge_custom_fields(fields?)?;
        }

        debug!(
            event_type = %event.event_type,
            %policy,
            provider = provider.name(),
            "Creating audit scope"
        );

        AuditScope::from_parts(ScopeParts {
            event,
            policy,
            provider,
            actions: self.config.actions().clone(),
            clock,
            target,
            include_type_name: self.config.include_type_name(),
            items,
        })
    }
}
