//! Reference data providers for Trail

pub mod dynamic;
pub mod file;
pub mod jsonl;
pub mod memory;
pub mod tracing_sink;

pub use dynamic::DynamicDataProvider;
pub use file::FileDataProvider;
pub use jsonl::JsonlDataProvider;
pub use memory::InMemoryDataProvider;
pub use tracing_sink::TracingDataProvider;

use std::path::PathBuf;
use std::sync::Arc;
use trail_core::{AuditError, AuditResult, NullDataProvider, SharedProvider, SinkSettings};
use ulid::Ulid;

/// Build the provider described by the sink settings
pub fn build_provider(settings: &SinkSettings) -> AuditResult<SharedProvider> {
    let provider: SharedProvider = match settings.kind.to_lowercase().as_str() {
        "null" => Arc::new(NullDataProvider::new()),
        "memory" => Arc::new(InMemoryDataProvider::new()),
        "file" => Arc::new(
            FileDataProvider::new(PathBuf::from(&settings.path))
                .with_prefix(settings.file_prefix.clone()),
        ),
        "jsonl" => Arc::new(
            JsonlDataProvider::new(PathBuf::from(&settings.path))
                .with_flush_each(settings.flush_each),
        ),
        "tracing" => Arc::new(TracingDataProvider::new()),
        other => {
            return Err(AuditError::Configuration(format!(
                "unknown sink kind '{}' (expected one of: {})",
                other,
                SinkSettings::KINDS.join(", ")
            )))
        }
    };
    tracing::debug!(kind = %settings.kind, provider = provider.name(), "Built data provider");
    Ok(provider)
}

/// Fresh sortable event id
pub(crate) fn new_event_id() -> trail_core::EventId {
    trail_core::EventId::new(Ulid::new().to_string())
}
