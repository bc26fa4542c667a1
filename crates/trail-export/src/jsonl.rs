//! JSONL data provider - append-only event log

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use trail_core::{AuditDataProvider, AuditError, AuditEvent, AuditResult, EventId};

/// Appends one JSON line per save.
///
/// The log cannot be rewritten, so inserts return no event id: every save
/// of a scope appends a new line, and replace/get are not supported.
pub struct JsonlDataProvider {
    path: PathBuf,
    flush_each: bool,
    writer: Mutex<Option<BufWriter<File>>>,
    events_written: AtomicU64,
}

impl JsonlDataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_each: true,
            writer: Mutex::new(None),
            events_written: AtomicU64::new(0),
        }
    }

    /// Flush after each write (default: true)
    pub fn with_flush_each(mut self, flush_each: bool) -> Self {
        self.flush_each = flush_each;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    /// Flush buffered lines to disk
    pub fn flush(&self) -> AuditResult<()> {
        if let Some(w) = self.writer.lock().as_mut() {
            w.flush()?;
        }
        Ok(())
    }

    fn open(&self) -> AuditResult<BufWriter<File>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        info!("JSONL data provider writing to: {:?}", self.path);
        Ok(BufWriter::new(file))
    }
}

impl AuditDataProvider for JsonlDataProvider {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn insert_event(&self, event: &AuditEvent) -> AuditResult<Option<EventId>> {
        let json = serde_json::to_string(event)?;

        let mut guard = self.writer.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(w) = guard.as_mut() {
            writeln!(w, "{}", json)?;
            if self.flush_each {
                w.flush()?;
            }
        }

        self.events_written.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn replace_event(&self, _event_id: &EventId, _event: &AuditEvent) -> AuditResult<()> {
        Err(AuditError::not_supported(self.name(), "replace_event"))
    }
}

impl Drop for JsonlDataProvider {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
