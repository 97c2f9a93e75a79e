use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::verdict::Verdict;

/// Tool name under which verification verdicts are written back to the
/// log store.
pub const VERIFICATION_TOOL_NAME: &str = "validate_key_message";

/// Entity identifier used when neither the call arguments nor the
/// session cursor name a subject.
pub const UNKNOWN_ENTITY: &str = "unknown";

/// One completed tool invocation. Written once, one JSON object per line,
/// never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub entity_id: String,
    /// Arguments as handed to the tool (context fields already stripped)
    pub arguments: Map<String, Value>,
    /// Raw tool response; `null` when the call failed
    pub response: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<f64>,
}

/// Audit entry for one verification decision. Carries no `response`
/// field, so replaying it through the aggregator never yields facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub entity_id: String,
    /// The narrative text the verdict was computed from
    pub content: String,
    pub result: Verdict,
}

/// Lenient view of any line in the log store. Older writers used other
/// field sets (naive timestamps, `ticker` instead of `entity_id`), so only
/// the fields the aggregator needs are read, and all are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogLine {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub response: Option<Value>,
}
