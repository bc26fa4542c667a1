//! File data provider - one JSON document per event

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use trail_core::CancellationToken;
use tracing::debug;
use trail_core::provider::ensure_not_cancelled;
use trail_core::{AuditDataProvider, AuditError, AuditEvent, AuditResult, EventId, Setting};

/// Writes each event to `<directory>/<prefix><ulid>.json`.
///
/// Directory and prefix are [`Setting`]s, so they can depend on the event
/// (a directory per event type, for instance). The event id is the full
/// path of the written file, which keeps replace and get independent of the
/// settings.
pub struct FileDataProvider {
    directory: Setting<PathBuf>,
    prefix: Setting<String>,
    pretty: bool,
}

impl FileDataProvider {
    pub fn new(directory: impl Into<Setting<PathBuf>>) -> Self {
        Self {
            directory: directory.into(),
            prefix: Setting::Value(String::new()),
            pretty: true,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<Setting<String>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Pretty print documents (default: true)
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn target_path(&self, event: &AuditEvent) -> PathBuf {
        let directory = self.directory.get_value(event);
        let file_name = format!("{}{}.json", self.prefix.get_value(event), ulid::Ulid::new());
        directory.join(file_name)
    }

    fn render(&self, event: &AuditEvent) -> AuditResult<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(event)?
        } else {
            serde_json::to_string(event)?
        })
    }

    /// Map an id back to its file, refusing anything this provider could
    /// not have written
    fn event_path(&self, event_id: &EventId) -> AuditResult<PathBuf> {
        let path = PathBuf::from(event_id.as_str());
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || path.extension().map_or(true, |ext| ext != "json") {
            return Err(AuditError::sink(anyhow::anyhow!(
                "'{}' is not a file event id",
                event_id
            )));
        }
        if let Setting::Value(directory) = &self.directory {
            if !path.starts_with(directory) {
                return Err(AuditError::sink(anyhow::anyhow!(
                    "{} is outside {}",
                    path.display(),
                    directory.display()
                )));
            }
        }
        Ok(path)
    }

    fn existing_path(&self, event_id: &EventId) -> AuditResult<PathBuf> {
        let path = self.event_path(event_id)?;
        if !path.is_file() {
            return Err(AuditError::sink(anyhow::anyhow!(
                "no event file at {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

fn path_id(path: &Path) -> EventId {
    EventId::new(path.to_string_lossy().to_string())
}

#[async_trait]
impl AuditDataProvider for FileDataProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        let path = self.target_path(event);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.render(event)?)?;
        debug!(path = %path.display(), "Audit event written");
        Ok(Some(path_id(&path)))
    }

    fn replace_event(&self, event_id: &EventId, event: &AuditEvent) -> AuditResult<()> {
        let path = self.existing_path(event_id)?;
        std::fs::write(&path, self.render(event)?)?;
        Ok(())
    }

    fn get_event(&self, event_id: &EventId) -> AuditResult<Option<AuditEvent>> {
        let path = self.event_path(event_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(AuditEvent::from_json(&content)?))
    }

    async fn insert_event_async(
        &self,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<EventId>> {
        ensure_not_cancelled(cancel)?;
        let path = self.target_path(event);
        let content = self.render(event)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "Audit event written");
        Ok(Some(path_id(&path)))
    }

    async fn replace_event_async(
        &self,
        event_id: &EventId,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<()> {
        ensure_not_cancelled(cancel)?;
        let path = self.existing_path(event_id)?;
        let content = self.render(event)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn get_event_async(
        &self,
        event_id: &EventId,
        cancel: &CancellationToken,
    ) -> AuditResult<Option<AuditEvent>> {
        ensure_not_cancelled(cancel)?;
        let path = self.event_path(event_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(AuditEvent::from_json(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
