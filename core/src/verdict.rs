use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a fact came from: the log file it was read from and the dotted
/// path inside that file's payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactSource {
    pub file: String,
    pub path: String,
}

impl FactSource {
    pub fn new(file: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for FactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.path)
    }
}

/// How a number in the text was tied to a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The text quotes the stored value.
    Direct,
    /// The text quotes a stored ratio scaled by 100 (0.125 written as 12.5%).
    PercentScale,
}

/// A number found in the text together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMatch {
    /// The token exactly as written in the text
    pub token: String,
    pub value: f64,
    pub source: FactSource,
    pub kind: MatchKind,
}

impl fmt::Display for FactMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MatchKind::Direct => write!(f, "{} -> {}", self.token, self.source),
            MatchKind::PercentScale => write!(f, "{} -> {} (x100%)", self.token, self.source),
        }
    }
}

/// Character-count check on the trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthCheck {
    pub valid: bool,
    pub observed: usize,
    pub min: usize,
    pub max: usize,
}

/// Evidence that the required prior tool calls happened inside the window.
/// Counts and the inspected file list are always computed, even when the
/// requirement is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequirementReport {
    pub satisfied: bool,
    pub enforced: bool,
    pub search_calls: usize,
    pub fetch_calls: usize,
    pub missing: Vec<String>,
    pub logs_inspected: Vec<String>,
}

/// Outcome of one verification request. An invalid verdict is a normal
/// result, fully explained by `message` and `reason_codes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub entity_id: String,
    pub overall_valid: bool,
    pub matched_count: usize,
    pub matched: Vec<FactMatch>,
    /// Numbers in the text with no traceable source, as written
    pub unmatched_values: Vec<String>,
    /// Cross-context contamination warnings. Always empty for now; kept so
    /// the validity rule already accounts for them.
    pub suspicious_alerts: Vec<String>,
    pub step_requirement: StepRequirementReport,
    pub length: LengthCheck,
    /// Log files whose payloads made up the fact snapshot
    pub logs_checked: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_codes: Vec<String>,
    pub message: String,
}
