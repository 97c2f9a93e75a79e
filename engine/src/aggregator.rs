use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use provenance_core::records::{LogLine, VerificationRecord};
use provenance_core::verdict::FactSource;
use serde_json::Value;

use crate::flatten::flatten;
use crate::layout::{self, LogLayout};

/// One scalar fact: where it sits in its payload, its value, and the
/// file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatFact {
    pub path: String,
    pub value: Value,
    pub source: FactSource,
}

/// Most recent usable payload for one tool name.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestPayload {
    pub file: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: Value,
}

/// What aggregation saw but could not use. Never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub files_inspected: usize,
    pub files_unusable: usize,
    pub records_without_payload: usize,
}

/// Merged current-facts view for one entity. Rebuilt per request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSnapshot {
    pub entity_id: String,
    /// tool name -> latest payload (last write wins by file timestamp)
    pub latest: BTreeMap<String, LatestPayload>,
    pub facts: Vec<FlatFact>,
    /// value string -> where it came from; a later fact with the same
    /// value string replaces the earlier source
    pub value_sources: Vec<(String, FactSource)>,
    /// Tool-call log files inside the window, oldest first
    pub files: Vec<PathBuf>,
    pub suspicious_alerts: Vec<String>,
    pub stats: AggregateStats,
}

impl FactSnapshot {
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|p| layout::file_name(p)).collect()
    }

    pub fn latest_payload(&self, tool_name: &str) -> Option<&Value> {
        self.latest.get(tool_name).map(|latest| &latest.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimedFile {
    recorded_at: DateTime<Utc>,
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    layout: LogLayout,
}

impl Aggregator {
    pub fn new(layout: LogLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// Every log file that may belong to `entity_id`: the entity's own
    /// directory plus root-level files carrying the entity as a whole
    /// `_`-delimited name segment (`mcp_AAPL_...` is not an `AA` file).
    pub fn discover(&self, entity_id: &str) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();
        found.extend(list_log_files(&self.layout.entity_dir(entity_id)));

        let needle = entity_id.trim();
        if !needle.is_empty() {
            let segment = format!("_{}_", layout::path_safe(needle));
            found.extend(
                list_log_files(self.layout.root())
                    .into_iter()
                    .filter(|path| names_entity(path, &segment)),
            );
        }
        found.into_iter().collect()
    }

    pub fn aggregate(&self, entity_id: &str, window_minutes: u32) -> FactSnapshot {
        self.aggregate_at(entity_id, window_minutes, Utc::now())
    }

    pub fn aggregate_at(
        &self,
        entity_id: &str,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> FactSnapshot {
        let files: Vec<TimedFile> = self
            .recent_files(entity_id, window_minutes, now)
            .into_iter()
            .filter(|file| !layout::is_verification_log(&file.path))
            .collect();

        let mut snapshot = FactSnapshot {
            entity_id: entity_id.to_string(),
            ..FactSnapshot::default()
        };

        for file in &files {
            snapshot.stats.files_inspected += 1;
            let name = layout::file_name(&file.path);

            let line = match read_complete_lines(&file.path) {
                Ok(lines) => lines.into_iter().last(),
                Err(err) => {
                    tracing::debug!(file = %name, error = %err, "skipping unreadable log file");
                    snapshot.stats.files_unusable += 1;
                    continue;
                }
            };
            let Some(line) = line else {
                snapshot.stats.files_unusable += 1;
                continue;
            };
            let entry: LogLine = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(file = %name, error = %err, "skipping unparseable log line");
                    snapshot.stats.files_unusable += 1;
                    continue;
                }
            };
            if entry.tool_name.trim().is_empty() {
                snapshot.stats.files_unusable += 1;
                continue;
            }
            let Some(response) = entry.response else {
                snapshot.stats.records_without_payload += 1;
                continue;
            };

            snapshot.latest.insert(
                entry.tool_name,
                LatestPayload {
                    file: name,
                    recorded_at: file.recorded_at,
                    payload: unwrap_payload(&response),
                },
            );
        }

        snapshot.files = files.into_iter().map(|file| file.path).collect();
        index_facts(&mut snapshot);

        tracing::debug!(
            entity = %entity_id,
            files = snapshot.stats.files_inspected,
            unusable = snapshot.stats.files_unusable,
            tools = snapshot.latest.len(),
            facts = snapshot.facts.len(),
            "aggregated fact snapshot"
        );
        snapshot
    }

    /// Replay verification audit records inside the window, oldest first.
    pub fn verification_history(
        &self,
        entity_id: &str,
        window_minutes: u32,
    ) -> Vec<VerificationRecord> {
        self.verification_history_at(entity_id, window_minutes, Utc::now())
    }

    pub fn verification_history_at(
        &self,
        entity_id: &str,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Vec<VerificationRecord> {
        let mut history = Vec::new();
        for file in self.recent_files(entity_id, window_minutes, now) {
            if !layout::is_verification_log(&file.path) {
                continue;
            }
            let Ok(lines) = read_complete_lines(&file.path) else {
                continue;
            };
            history.extend(
                lines
                    .iter()
                    .filter_map(|line| serde_json::from_str::<VerificationRecord>(line).ok()),
            );
        }
        history
    }

    /// Files with a readable name timestamp strictly newer than
    /// `now - window_minutes`, sorted oldest first.
    fn recent_files(
        &self,
        entity_id: &str,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Vec<TimedFile> {
        let cutoff = now - Duration::minutes(i64::from(window_minutes));
        let mut files: Vec<TimedFile> = self
            .discover(entity_id)
            .into_iter()
            .filter_map(|path| {
                let recorded_at = layout::parse_file_timestamp(&path)?;
                (recorded_at > cutoff).then_some(TimedFile { recorded_at, path })
            })
            .collect();
        files.sort();
        files
    }
}

/// Tool responses often wrap the real payload as JSON text, either in
/// `content[0].text` or in `structuredContent.result`. Unwrap it when
/// present; text that is not JSON is kept as a string.
pub fn unwrap_payload(response: &Value) -> Value {
    let content_text = response
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty());
    if let Some(text) = content_text {
        return parse_embedded(text);
    }

    if let Some(result) = response
        .get("structuredContent")
        .and_then(|structured| structured.get("result"))
    {
        match result {
            Value::String(text) if !text.is_empty() => return parse_embedded(text),
            Value::String(_) | Value::Null => {}
            other => return other.clone(),
        }
    }

    response.clone()
}

fn parse_embedded(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        // Double-encoded payloads show up as a JSON string holding JSON.
        Ok(Value::String(inner)) => {
            serde_json::from_str(&inner).unwrap_or(Value::String(inner))
        }
        Ok(value) => value,
        Err(_) => Value::String(text.to_string()),
    }
}

/// Flatten every latest payload (oldest file first) into facts and the
/// value-string reverse index. Raw-text payloads carry no indexable facts.
fn index_facts(snapshot: &mut FactSnapshot) {
    let mut ordered: Vec<&LatestPayload> = snapshot.latest.values().collect();
    ordered.sort_by(|a, b| {
        a.recorded_at
            .cmp(&b.recorded_at)
            .then_with(|| a.file.cmp(&b.file))
    });

    let mut facts = Vec::new();
    let mut value_sources: Vec<(String, FactSource)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for latest in ordered {
        if latest.payload.is_string() {
            continue;
        }
        for (path, value) in flatten(&latest.payload) {
            let Some(value_string) = fact_value_string(&value) else {
                continue;
            };
            let source = FactSource::new(latest.file.clone(), path.clone());
            match positions.get(&value_string) {
                Some(&index) => value_sources[index].1 = source.clone(),
                None => {
                    positions.insert(value_string.clone(), value_sources.len());
                    value_sources.push((value_string, source.clone()));
                }
            }
            facts.push(FlatFact {
                path,
                value,
                source,
            });
        }
    }

    snapshot.facts = facts;
    snapshot.value_sources = value_sources;
}

fn fact_value_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Complete (newline-terminated) lines of a file as of now. A trailing
/// partial line from a concurrent writer is ignored, and so is any line
/// that is not valid UTF-8; the rest of the file still reads.
pub(crate) fn read_complete_lines(path: &Path) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let complete = match bytes.iter().rposition(|&byte| byte == b'\n') {
        Some(end) => &bytes[..end],
        None => &bytes[..0],
    };
    Ok(complete
        .split(|&byte| byte == b'\n')
        .filter_map(|line| match std::str::from_utf8(line) {
            Ok(text) => Some(text.trim()),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipping undecodable log line");
                None
            }
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `segment` is `_{entity}_`; the stem is padded so the entity may also
/// lead the name.
fn names_entity(path: &Path, segment: &str) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| format!("_{stem}_").contains(segment))
}

fn list_log_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| layout::is_log_file(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{Map, Value, json};
    use tempfile::tempdir;

    use super::{Aggregator, read_complete_lines, unwrap_payload};
    use crate::layout::LogLayout;
    use crate::recorder::{CallRecorder, CompletedCall};
    use crate::session::SessionContext;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unwraps_content_block_text() {
        let response = json!({"content": [{"type": "text", "text": "{\"price\": 105}"}]});
        assert_eq!(unwrap_payload(&response), json!({"price": 105}));
    }

    #[test]
    fn unwraps_structured_result_and_keeps_raw_text() {
        let structured = json!({"structuredContent": {"result": "{\"pe\": 21.4}"}});
        assert_eq!(unwrap_payload(&structured), json!({"pe": 21.4}));

        let text = json!({"content": [{"text": "Apple shares rose"}]});
        assert_eq!(unwrap_payload(&text), json!("Apple shares rose"));

        let nested = json!({"structuredContent": {"result": {"pe": 21.4}}});
        assert_eq!(unwrap_payload(&nested), json!({"pe": 21.4}));
    }

    #[test]
    fn unwraps_double_encoded_text() {
        let inner = serde_json::to_string(&json!({"eps": 6.1})).unwrap();
        let outer = serde_json::to_string(&inner).unwrap();
        let response = json!({"content": [{"text": outer}]});
        assert_eq!(unwrap_payload(&response), json!({"eps": 6.1}));
    }

    #[test]
    fn other_shapes_pass_through() {
        let local = json!({"upside_percentage": 12.5});
        assert_eq!(unwrap_payload(&local), local);
        assert_eq!(unwrap_payload(&json!({"content": []})), json!({"content": []}));
    }

    #[test]
    fn latest_file_wins_per_tool() {
        let dir = tempdir().unwrap();
        let recorder = CallRecorder::new(LogLayout::new(dir.path()));
        let session = SessionContext::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        for (minutes_ago, price) in [(30, 100), (20, 103), (5, 105)] {
            recorder.record_at(
                &session,
                CompletedCall::success("profile", args(json!({"ticker": "AAPL"})), json!({"price": price})),
                now - Duration::minutes(minutes_ago),
            );
        }

        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);
        assert_eq!(snapshot.files.len(), 3);
        assert_eq!(snapshot.latest_payload("profile"), Some(&json!({"price": 105})));
        assert_eq!(snapshot.facts.len(), 1);
        assert_eq!(snapshot.facts[0].path, "price");
        assert_eq!(snapshot.facts[0].source.file, "profile_20260301_115500.jsonl");
    }

    #[test]
    fn only_the_last_line_of_a_file_counts() {
        let dir = tempdir().unwrap();
        let recorder = CallRecorder::new(LogLayout::new(dir.path()));
        let session = SessionContext::for_entity("AAPL");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 11, 50, 0).unwrap();

        recorder.record_at(&session, CompletedCall::success("quote", Map::new(), json!({"bid": 1.5})), at);
        recorder.record_at(&session, CompletedCall::success("quote", Map::new(), json!({"bid": 2.5})), at);

        let snapshot = Aggregator::new(LogLayout::new(dir.path()))
            .aggregate_at("AAPL", 60, at + Duration::minutes(1));
        assert_eq!(snapshot.latest_payload("quote"), Some(&json!({"bid": 2.5})));
    }

    #[test]
    fn stale_and_unstamped_files_are_excluded() {
        let dir = tempdir().unwrap();
        let entity_dir = dir.path().join("AAPL");
        fs::create_dir_all(&entity_dir).unwrap();
        let line = "{\"tool_name\":\"profile\",\"response\":{\"price\":1}}\n";
        fs::write(entity_dir.join("profile_20260301_100000.jsonl"), line).unwrap();
        fs::write(entity_dir.join("profile_latest.jsonl"), line).unwrap();
        fs::write(entity_dir.join("notes.txt"), line).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);

        assert!(snapshot.files.is_empty());
        assert!(snapshot.latest.is_empty());
    }

    #[test]
    fn legacy_root_files_are_discovered_by_name() {
        let dir = tempdir().unwrap();
        let line = "{\"tool_name\":\"get_stock_info\",\"ticker\":\"2330.TW\",\"response\":{\"structuredContent\":{\"result\":\"{\\\"currentPrice\\\": 1010}\"}}}\n";
        fs::write(dir.path().join("mcp_2330.TW_20260301_115000.jsonl"), line).unwrap();
        fs::write(dir.path().join("mcp_AAPL_20260301115000.jsonl"), line).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("2330.TW", 60, now);

        assert_eq!(snapshot.file_names(), vec!["mcp_2330.TW_20260301_115000.jsonl"]);
        assert_eq!(
            snapshot.latest_payload("get_stock_info"),
            Some(&json!({"currentPrice": 1010}))
        );
    }

    #[test]
    fn broken_files_are_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let entity_dir = dir.path().join("AAPL");
        fs::create_dir_all(&entity_dir).unwrap();
        fs::write(entity_dir.join("a_20260301_115000.jsonl"), "not json\n").unwrap();
        fs::write(entity_dir.join("b_20260301_115001.jsonl"), "").unwrap();
        fs::write(
            entity_dir.join("c_20260301_115002.jsonl"),
            "{\"tool_name\":\"c\",\"response\":null,\"success\":false}\n",
        )
        .unwrap();
        fs::write(
            entity_dir.join("d_20260301_115003.jsonl"),
            "{\"tool_name\":\"d\",\"response\":{\"v\":42}}\n",
        )
        .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);

        assert_eq!(snapshot.stats.files_inspected, 4);
        assert_eq!(snapshot.stats.files_unusable, 2);
        assert_eq!(snapshot.stats.records_without_payload, 1);
        assert_eq!(snapshot.latest.len(), 1);
        assert_eq!(snapshot.latest_payload("d"), Some(&json!({"v": 42})));
    }

    #[test]
    fn failed_call_does_not_erase_earlier_payload() {
        let dir = tempdir().unwrap();
        let recorder = CallRecorder::new(LogLayout::new(dir.path()));
        let session = SessionContext::for_entity("AAPL");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        recorder.record_at(
            &session,
            CompletedCall::success("profile", Map::new(), json!({"price": 100})),
            now - Duration::minutes(10),
        );
        recorder.record_at(
            &session,
            CompletedCall::failure("profile", Map::new(), "rate limited"),
            now - Duration::minutes(2),
        );

        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);
        assert_eq!(snapshot.latest_payload("profile"), Some(&json!({"price": 100})));
        assert_eq!(snapshot.stats.records_without_payload, 1);
    }

    #[test]
    fn later_fact_replaces_source_for_same_value() {
        let dir = tempdir().unwrap();
        let recorder = CallRecorder::new(LogLayout::new(dir.path()));
        let session = SessionContext::for_entity("AAPL");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        recorder.record_at(
            &session,
            CompletedCall::success("profile", Map::new(), json!({"price": 105})),
            now - Duration::minutes(10),
        );
        recorder.record_at(
            &session,
            CompletedCall::success("quote", Map::new(), json!({"last": 105})),
            now - Duration::minutes(5),
        );

        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);
        assert_eq!(snapshot.facts.len(), 2);
        assert_eq!(snapshot.value_sources.len(), 1);
        assert_eq!(snapshot.value_sources[0].0, "105");
        assert_eq!(snapshot.value_sources[0].1.to_string(), "quote_20260301_115500.jsonl:last");
    }

    #[test]
    fn partial_trailing_line_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_20260301_115000.jsonl");
        fs::write(&path, "{\"a\":1}\n{\"a\":2}\n{\"a\":").unwrap();

        let lines = read_complete_lines(&path).unwrap();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[test]
    fn legacy_root_match_needs_a_whole_name_segment() {
        let dir = tempdir().unwrap();
        let line = "{\"tool_name\":\"profile\",\"response\":{\"price\":230}}\n";
        fs::write(dir.path().join("mcp_AAPL_20260301_115000.jsonl"), line).unwrap();
        fs::write(dir.path().join("mcp_AA_20260301_115500.jsonl"), line).unwrap();

        let aggregator = Aggregator::new(LogLayout::new(dir.path()));
        let files: Vec<String> = aggregator
            .discover("AA")
            .iter()
            .map(|path| crate::layout::file_name(path))
            .collect();
        assert_eq!(files, vec!["mcp_AA_20260301_115500.jsonl"]);
        assert_eq!(aggregator.discover("AAPL").len(), 1);
        assert!(aggregator.discover("APL").is_empty());
    }

    #[test]
    fn truncated_multibyte_tail_keeps_last_complete_record() {
        let dir = tempdir().unwrap();
        let entity_dir = dir.path().join("2330.TW");
        fs::create_dir_all(&entity_dir).unwrap();
        let mut contents = b"{\"tool_name\":\"profile\",\"response\":{\"price\":1010}}\n".to_vec();
        contents.extend_from_slice(b"{\"tool_name\":\"profile\",\"response\":{\"name\":\"");
        contents.extend_from_slice(&"\u{53f0}".as_bytes()[..2]);
        fs::write(entity_dir.join("profile_20260301_115000.jsonl"), contents).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("2330.TW", 60, now);

        assert_eq!(snapshot.stats.files_inspected, 1);
        assert_eq!(snapshot.stats.files_unusable, 0);
        assert_eq!(snapshot.latest_payload("profile"), Some(&json!({"price": 1010})));
    }

    #[test]
    fn corrupt_earlier_line_does_not_hide_the_last_record() {
        let dir = tempdir().unwrap();
        let entity_dir = dir.path().join("AAPL");
        fs::create_dir_all(&entity_dir).unwrap();
        let mut contents = vec![0xff, 0xfe, b'\n'];
        contents.extend_from_slice(b"{\"tool_name\":\"profile\",\"response\":{\"price\":105}}\n");
        let path = entity_dir.join("profile_20260301_115000.jsonl");
        fs::write(&path, contents).unwrap();

        assert_eq!(read_complete_lines(&path).unwrap().len(), 1);

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Aggregator::new(LogLayout::new(dir.path())).aggregate_at("AAPL", 60, now);
        assert_eq!(snapshot.stats.files_unusable, 0);
        assert_eq!(snapshot.latest_payload("profile"), Some(&json!({"price": 105})));
    }
}
