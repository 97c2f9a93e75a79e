use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use provenance_core::error::{ConfigError, codes};
use provenance_core::records::LogLine;
use provenance_core::verdict::{LengthCheck, StepRequirementReport, Verdict};

use crate::aggregator::{Aggregator, read_complete_lines};
use crate::config::{FETCH_STEP_NAME, LengthBounds, SEARCH_STEP_NAME, StepPolicy, VerifierConfig};
use crate::layout;
use crate::matcher::{FactIndex, match_text};
use crate::recorder::CallRecorder;

pub const VERIFICATION_PASSED_MESSAGE: &str = "Verification passed";

/// Decides whether a narrative text may be used: it must fit the length
/// bounds, cite only numbers traceable to logged facts, and (when the
/// policy enforces it) follow the required research steps. Every verdict
/// is written back to the entity's log store.
#[derive(Debug, Clone)]
pub struct CoverageValidator {
    recorder: CallRecorder,
    aggregator: Aggregator,
    config: VerifierConfig,
}

impl CoverageValidator {
    pub fn new(recorder: CallRecorder, config: VerifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let aggregator = Aggregator::new(recorder.layout().clone());
        Ok(Self {
            recorder,
            aggregator,
            config,
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify against the configured length bounds.
    pub fn validate_with_defaults(&self, text: &str, entity_id: &str) -> Verdict {
        self.validate_at(text, entity_id, self.config.length, Utc::now())
    }

    /// Verify with per-call length bounds that override the configured ones.
    pub fn validate(&self, text: &str, entity_id: &str, bounds: LengthBounds) -> Verdict {
        self.validate_at(text, entity_id, bounds, Utc::now())
    }

    pub fn validate_at(
        &self,
        text: &str,
        entity_id: &str,
        bounds: LengthBounds,
        now: DateTime<Utc>,
    ) -> Verdict {
        let length = check_length(text, bounds);

        let snapshot = self
            .aggregator
            .aggregate_at(entity_id, self.config.window_minutes, now);
        let index = FactIndex::from_snapshot(&snapshot);
        let outcome = match_text(text, &index);
        let step_requirement = analyze_steps(&snapshot.files, &self.config.steps);

        let (message, reason_codes) = compose_message(
            &length,
            outcome.unmatched.len(),
            snapshot.suspicious_alerts.len(),
            &step_requirement,
        );

        let verdict = Verdict {
            entity_id: entity_id.to_string(),
            overall_valid: reason_codes.is_empty(),
            matched_count: outcome.matched.len(),
            matched: outcome.matched,
            unmatched_values: outcome.unmatched,
            suspicious_alerts: snapshot.suspicious_alerts.clone(),
            step_requirement,
            length,
            logs_checked: snapshot.file_names(),
            reason_codes,
            message,
        };

        tracing::info!(
            entity = %entity_id,
            valid = verdict.overall_valid,
            matched = verdict.matched_count,
            unmatched = verdict.unmatched_values.len(),
            facts = index.len(),
            "verified narrative text"
        );

        self.recorder
            .record_verification(entity_id, text, &verdict, now);
        verdict
    }
}

pub fn check_length(text: &str, bounds: LengthBounds) -> LengthCheck {
    let observed = text.trim().chars().count();
    LengthCheck {
        valid: bounds.contains(observed),
        observed,
        min: bounds.min(),
        max: bounds.max(),
    }
}

/// Count search and fetch calls across every line of the given files.
pub fn analyze_steps(files: &[PathBuf], policy: &StepPolicy) -> StepRequirementReport {
    let mut search_calls = 0;
    let mut fetch_calls = 0;
    let mut logs_inspected = Vec::with_capacity(files.len());

    for path in files {
        logs_inspected.push(layout::file_name(path));
        let Ok(lines) = read_complete_lines(path) else {
            continue;
        };
        for line in lines {
            let Ok(entry) = serde_json::from_str::<LogLine>(&line) else {
                continue;
            };
            if policy.is_search_call(&entry.tool_name) {
                search_calls += 1;
            }
            if policy.is_fetch_call(&entry.tool_name) {
                fetch_calls += 1;
            }
        }
    }

    let mut missing = Vec::new();
    if policy.enforce {
        if search_calls == 0 {
            missing.push(SEARCH_STEP_NAME.to_string());
        }
        if fetch_calls == 0 {
            missing.push(FETCH_STEP_NAME.to_string());
        }
    }

    StepRequirementReport {
        satisfied: missing.is_empty(),
        enforced: policy.enforce,
        search_calls,
        fetch_calls,
        missing,
        logs_inspected,
    }
}

/// One clause per failing check, always in the order length, unmatched
/// values, suspicious alerts, missing steps.
fn compose_message(
    length: &LengthCheck,
    unmatched: usize,
    suspicious: usize,
    steps: &StepRequirementReport,
) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut reason_codes = Vec::new();

    if !length.valid {
        clauses.push(format!(
            "Text length {} is outside the required range {}-{}.",
            length.observed, length.min, length.max
        ));
        reason_codes.push(codes::LENGTH_OUT_OF_BOUNDS.to_string());
    }
    if unmatched > 0 {
        clauses.push(format!("Found {unmatched} values without a direct source."));
        reason_codes.push(codes::UNMATCHED_VALUES.to_string());
    }
    if suspicious > 0 {
        clauses.push(format!(
            "Warning: detected {suspicious} suspicious data sources."
        ));
        reason_codes.push(codes::SUSPICIOUS_ALERTS.to_string());
    }
    if !steps.satisfied {
        let missing = if steps.missing.is_empty() {
            format!("{SEARCH_STEP_NAME}/{FETCH_STEP_NAME}")
        } else {
            steps.missing.join(", ")
        };
        clauses.push(format!(
            "Required step tool calls not found (missing: {missing})."
        ));
        reason_codes.push(codes::REQUIRED_STEPS_MISSING.to_string());
    }

    dedupe_reason_codes(&mut reason_codes);
    if clauses.is_empty() {
        (VERIFICATION_PASSED_MESSAGE.to_string(), reason_codes)
    } else {
        (clauses.join(" "), reason_codes)
    }
}

fn dedupe_reason_codes(reason_codes: &mut Vec<String>) {
    let mut seen = HashSet::new();
    reason_codes.retain(|code| seen.insert(code.clone()));
}
