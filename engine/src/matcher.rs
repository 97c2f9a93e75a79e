use std::collections::HashMap;
use std::sync::LazyLock;

use provenance_core::verdict::{FactMatch, FactSource, MatchKind};
use regex::Regex;

use crate::aggregator::FactSnapshot;

/// Optional sign, digits with optional comma-grouped thousands, optional
/// decimal part.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d+(?:,\d{3})*(?:\.\d+)?").expect("valid number token regex")
});

/// Two numbers closer than this are the same number.
pub const MATCH_TOLERANCE: f64 = 0.01;

const FACT_NOISE_CHARS: [char; 6] = [',', '%', '$', '€', '£', '¥'];

/// A number written in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericToken {
    pub raw: String,
    pub value: f64,
    pub span_start: usize,
    pub span_end: usize,
}

/// Numbers in `text`, in order of appearance. Single-digit tokens are
/// dropped: they are list markers ("1.", "2)") far more often than facts.
pub fn extract_numeric_tokens(text: &str) -> Vec<NumericToken> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let digits = raw.bytes().filter(u8::is_ascii_digit).count();
            if digits <= 1 {
                return None;
            }
            let value = raw.replace(',', "").parse::<f64>().ok()?;
            Some(NumericToken {
                raw: raw.to_string(),
                value,
                span_start: m.start(),
                span_end: m.end(),
            })
        })
        .collect()
}

/// Parse a stored fact value ("1,800", "12.5%", "$105", 0.125) as a number.
pub fn parse_fact_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !FACT_NOISE_CHARS.contains(c)).collect();
    let value = cleaned.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Numeric view of a snapshot's facts.
///
/// Values that parse to the same number collapse into one entry and the
/// later source wins, so a match reports one provenance, not all of them.
#[derive(Debug, Clone, Default)]
pub struct FactIndex {
    entries: Vec<(f64, FactSource)>,
}

impl FactIndex {
    pub fn from_snapshot(snapshot: &FactSnapshot) -> Self {
        Self::from_value_sources(
            snapshot
                .value_sources
                .iter()
                .map(|(value, source)| (value.as_str(), source)),
        )
    }

    pub fn from_value_sources<'a>(
        value_sources: impl IntoIterator<Item = (&'a str, &'a FactSource)>,
    ) -> Self {
        let mut entries: Vec<(f64, FactSource)> = Vec::new();
        let mut positions: HashMap<u64, usize> = HashMap::new();

        for (raw, source) in value_sources {
            let Some(value) = parse_fact_number(raw) else {
                continue;
            };
            // -0.0 and 0.0 are one key
            let key = (if value == 0.0 { 0.0f64 } else { value }).to_bits();
            match positions.get(&key) {
                Some(&index) => entries[index].1 = source.clone(),
                None => {
                    positions.insert(key, entries.len());
                    entries.push((value, source.clone()));
                }
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct match first; only if none exists, a stored ratio scaled by 100.
    pub fn lookup(&self, value: f64) -> Option<(&FactSource, MatchKind)> {
        if let Some((_, source)) = self
            .entries
            .iter()
            .find(|(stored, _)| (stored - value).abs() < MATCH_TOLERANCE)
        {
            return Some((source, MatchKind::Direct));
        }
        self.entries
            .iter()
            .find(|(stored, _)| (stored * 100.0 - value).abs() < MATCH_TOLERANCE)
            .map(|(_, source)| (source, MatchKind::PercentScale))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub matched: Vec<FactMatch>,
    /// Tokens with no traceable source, as written in the text
    pub unmatched: Vec<String>,
}

pub fn match_text(text: &str, index: &FactIndex) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for token in extract_numeric_tokens(text) {
        match index.lookup(token.value) {
            Some((source, kind)) => outcome.matched.push(FactMatch {
                token: token.raw,
                value: token.value,
                source: source.clone(),
                kind,
            }),
            None => outcome.unmatched.push(token.raw),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use provenance_core::verdict::{FactSource, MatchKind};

    use super::{FactIndex, extract_numeric_tokens, match_text, parse_fact_number};

    fn index(facts: &[(&str, &str)]) -> FactIndex {
        let sources: Vec<(String, FactSource)> = facts
            .iter()
            .map(|(value, path)| (value.to_string(), FactSource::new("f.jsonl", *path)))
            .collect();
        FactIndex::from_value_sources(sources.iter().map(|(v, s)| (v.as_str(), s)))
    }

    #[test]
    fn tokens_keep_grouping_sign_and_span() {
        let tokens = extract_numeric_tokens("Revenue hit 1,800 million, down -12.5 from 2,034.75.");
        let raws: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["1,800", "-12.5", "2,034.75"]);
        assert_eq!(tokens[0].value, 1800.0);
        assert_eq!(tokens[1].value, -12.5);
        assert_eq!(tokens[2].value, 2034.75);
        assert_eq!(&"Revenue hit 1,800"[tokens[0].span_start..tokens[0].span_end], "1,800");
    }

    #[test]
    fn single_digit_tokens_are_list_markers() {
        let tokens = extract_numeric_tokens("1. Growth 2) Margin 3 items, -4, 5.5");
        let raws: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["5.5"]);
    }

    #[test]
    fn fact_values_lose_currency_and_percent_signs() {
        assert_eq!(parse_fact_number("$1,234.5"), Some(1234.5));
        assert_eq!(parse_fact_number("12.5%"), Some(12.5));
        assert_eq!(parse_fact_number(" 7 "), Some(7.0));
        assert_eq!(parse_fact_number("€99"), Some(99.0));
        assert_eq!(parse_fact_number("NaN"), None);
        assert_eq!(parse_fact_number("inf"), None);
        assert_eq!(parse_fact_number("true"), None);
        assert_eq!(parse_fact_number("Apple Inc."), None);
    }

    #[test]
    fn direct_match_reports_source() {
        let outcome = match_text("upside of 12.5%", &index(&[("12.5", "upside_percentage")]));
        assert!(outcome.unmatched.is_empty());
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].kind, MatchKind::Direct);
        assert_eq!(outcome.matched[0].source.path, "upside_percentage");
    }

    #[test]
    fn fraction_matches_through_percent_scale() {
        let outcome = match_text("upside of 12.5%", &index(&[("0.125", "upside_fraction")]));
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].kind, MatchKind::PercentScale);
        assert_eq!(
            outcome.matched[0].to_string(),
            "12.5 -> f.jsonl:upside_fraction (x100%)"
        );
    }

    #[test]
    fn direct_match_is_preferred_over_percent_scale() {
        let outcome = match_text(
            "margin 40.6",
            &index(&[("0.406", "ratio"), ("40.6", "pct")]),
        );
        assert_eq!(outcome.matched[0].kind, MatchKind::Direct);
        assert_eq!(outcome.matched[0].source.path, "pct");
    }

    #[test]
    fn tolerance_is_strictly_below_one_cent() {
        let facts = index(&[("10.00", "a")]);
        assert_eq!(match_text("10.005", &facts).matched.len(), 1);
        assert_eq!(match_text("10.02", &facts).unmatched, vec!["10.02"]);
    }

    #[test]
    fn unknown_numbers_are_reported_as_written() {
        let outcome = match_text("grew 37.2 percent to 1,800", &index(&[("1800", "rev_m")]));
        assert_eq!(outcome.unmatched, vec!["37.2"]);
        assert_eq!(outcome.matched[0].token, "1,800");
    }

    #[test]
    fn colliding_values_keep_the_later_source() {
        let facts = index(&[("1800", "first"), ("1,800.0", "second")]);
        assert_eq!(facts.len(), 1);
        assert_eq!(match_text("1800", &facts).matched[0].source.path, "second");
    }

    #[test]
    fn stored_values_written_with_grouping_still_match() {
        for (stored, text) in [("1234567", "1,234,567"), ("1234567", "1234567"), ("98.76", "98.76")] {
            let outcome = match_text(text, &index(&[(stored, "v")]));
            assert!(outcome.unmatched.is_empty(), "{stored} vs {text}");
        }
    }
}
