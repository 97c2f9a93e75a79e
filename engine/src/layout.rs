//! On-disk layout of the log store.
//!
//! ```text
//! {root}/{entity}/{tool}_{YYYYMMDD_HHMMSS}.jsonl     current layout
//! {root}/unknown_{tool}_{YYYYMMDD_HHMMSS}.jsonl      calls with no resolvable entity
//! {root}/{prefix}_{entity}_{YYYYMMDD_HHMMSS}.jsonl   legacy, still read
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use provenance_core::records::{UNKNOWN_ENTITY, VERIFICATION_TOOL_NAME};

pub const LOG_FILE_EXTENSION: &str = "jsonl";
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const COMPACT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entity_dir(&self, entity_id: &str) -> PathBuf {
        self.root.join(path_safe(entity_id))
    }

    /// File a record for `(entity, tool)` created at `at` is appended to.
    pub fn call_log_path(&self, entity_id: &str, tool_name: &str, at: DateTime<Utc>) -> PathBuf {
        let stamp = encode_file_timestamp(at);
        let tool = path_safe(tool_name);
        if entity_id == UNKNOWN_ENTITY {
            self.root.join(format!(
                "{UNKNOWN_ENTITY}_{tool}_{stamp}.{LOG_FILE_EXTENSION}"
            ))
        } else {
            self.entity_dir(entity_id)
                .join(format!("{tool}_{stamp}.{LOG_FILE_EXTENSION}"))
        }
    }
}

/// Make an identifier usable as a single path component.
pub fn path_safe(raw: &str) -> String {
    let cleaned = raw.trim().replace(['/', '\\'], "_");
    if cleaned.is_empty() {
        return "_".to_string();
    }
    if cleaned.chars().all(|c| c == '.') {
        return cleaned.replace('.', "_");
    }
    cleaned
}

pub fn encode_file_timestamp(at: DateTime<Utc>) -> String {
    at.format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Split a log file stem into its name prefix and the timestamp it
/// encodes. Accepts `..._YYYYMMDD_HHMMSS` and `..._YYYYMMDDHHMMSS`.
fn split_file_stem(stem: &str) -> Option<(String, DateTime<Utc>)> {
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 2 {
        return None;
    }
    let last = parts[parts.len() - 1];
    let before_last = parts[parts.len() - 2];
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let (compact, prefix_parts) = if last.len() == 6
        && before_last.len() == 8
        && is_digits(last)
        && is_digits(before_last)
    {
        (format!("{before_last}{last}"), &parts[..parts.len() - 2])
    } else if last.len() == 14 && is_digits(last) {
        (last.to_string(), &parts[..parts.len() - 1])
    } else {
        return None;
    };

    let naive = NaiveDateTime::parse_from_str(&compact, COMPACT_TIMESTAMP_FORMAT).ok()?;
    Some((prefix_parts.join("_"), naive.and_utc()))
}

/// Timestamp encoded in a log file name, if it has a readable one.
pub fn parse_file_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?;
    split_file_stem(stem).map(|(_, at)| at)
}

pub fn is_log_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(LOG_FILE_EXTENSION)
}

/// Whether the file holds verification audit records rather than tool calls.
pub fn is_verification_log(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    match split_file_stem(stem) {
        Some((prefix, _)) => {
            prefix == VERIFICATION_TOOL_NAME
                || prefix.ends_with(&format!("_{VERIFICATION_TOOL_NAME}"))
        }
        None => false,
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
