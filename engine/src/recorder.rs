use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use provenance_core::error::RecordError;
use provenance_core::records::{CallRecord, VERIFICATION_TOOL_NAME, VerificationRecord};
use provenance_core::verdict::Verdict;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::layout::LogLayout;
use crate::session::SessionContext;

/// A tool invocation that just finished, successfully or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub response: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<f64>,
}

impl CompletedCall {
    pub fn success(tool_name: &str, arguments: Map<String, Value>, response: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            arguments,
            response: Some(response),
            success: true,
            error: None,
            duration_ms: None,
        }
    }

    pub fn failure(tool_name: &str, arguments: Map<String, Value>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            arguments,
            response: None,
            success: false,
            error: Some(error.into()),
            duration_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// The only writer into the log store.
///
/// Each append opens the target file in append mode, writes exactly one
/// newline-terminated JSON object and closes it again. There is no lock
/// across the tree; concurrent recorders only ever contend on the same
/// file, where the append-mode single write keeps lines whole.
#[derive(Debug, Clone)]
pub struct CallRecorder {
    layout: LogLayout,
    write_failures: Arc<AtomicU64>,
}

impl CallRecorder {
    pub fn new(layout: LogLayout) -> Self {
        Self {
            layout,
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// Number of appends that failed since this recorder was created.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Best-effort record. Never fails from the caller's point of view;
    /// returns the file written on success.
    pub fn record(&self, session: &SessionContext, call: CompletedCall) -> Option<PathBuf> {
        self.record_at(session, call, Utc::now())
    }

    pub fn record_at(
        &self,
        session: &SessionContext,
        call: CompletedCall,
        now: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let tool_name = call.tool_name.clone();
        match self.try_record_at(session, call, now) {
            Ok(path) => Some(path),
            Err(err) => {
                self.note_failure(&err, &tool_name);
                None
            }
        }
    }

    pub fn try_record_at(
        &self,
        session: &SessionContext,
        call: CompletedCall,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, RecordError> {
        let entity_id = session.resolve_entity(&call.arguments);
        let path = self.layout.call_log_path(&entity_id, &call.tool_name, now);
        let record = CallRecord {
            timestamp: now,
            tool_name: call.tool_name,
            entity_id,
            arguments: call.arguments,
            response: call.response,
            success: call.success,
            error: call.error,
            duration_ms: call.duration_ms,
        };
        append_line(&path, &record)?;
        tracing::debug!(
            session_id = %session.id(),
            tool = %record.tool_name,
            entity = %record.entity_id,
            path = %path.display(),
            "recorded tool call"
        );
        Ok(path)
    }

    /// Append a verdict and the text it judged to the entity's log store.
    pub fn record_verification(
        &self,
        entity_id: &str,
        content: &str,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let path = self
            .layout
            .call_log_path(entity_id, VERIFICATION_TOOL_NAME, now);
        let record = VerificationRecord {
            timestamp: now,
            tool_name: VERIFICATION_TOOL_NAME.to_string(),
            entity_id: entity_id.to_string(),
            content: content.to_string(),
            result: verdict.clone(),
        };
        match append_line(&path, &record) {
            Ok(()) => Some(path),
            Err(err) => {
                self.note_failure(&err, VERIFICATION_TOOL_NAME);
                None
            }
        }
    }

    fn note_failure(&self, err: &RecordError, tool_name: &str) {
        let total = self.write_failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            error = %err,
            tool = %tool_name,
            write_failures = total,
            "failed to append log record; continuing without it"
        );
    }
}

fn append_line<T: Serialize>(path: &Path, entry: &T) -> Result<(), RecordError> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let io_err = |source: std::io::Error| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).map_err(io_err)?;
    Ok(())
}
