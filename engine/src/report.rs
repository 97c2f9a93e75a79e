use serde_json::{Number, Value};

use crate::aggregator::FactSnapshot;

const ABBREVIATED_KEYS: [&str; 9] = [
    "marketCap",
    "enterpriseValue",
    "totalRevenue",
    "totalCash",
    "totalDebt",
    "grossProfits",
    "ebitda",
    "freeCashflow",
    "operatingCashflow",
];
const PERCENT_KEY_HINTS: [&str; 6] = ["Percent", "percent", "Yield", "yield", "Margins", "margins"];

/// Human-readable view of the latest payload per tool, in tool-name order.
pub fn render_snapshot_markdown(snapshot: &FactSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} latest tool data\n", snapshot.entity_id));

    if snapshot.latest.is_empty() {
        out.push_str("\nNo tool records found inside the window.\n");
        return out;
    }

    for (tool, latest) in &snapshot.latest {
        out.push_str(&format!("\n## {tool}\n\n_source: {}_\n\n", latest.file));
        match &latest.payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    render_field(&mut out, key, value);
                }
            }
            Value::String(text) => {
                out.push_str(text);
                out.push('\n');
            }
            other => render_field(&mut out, "value", other),
        }
    }
    out
}

fn render_field(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) if items.is_empty() => {
            out.push_str(&format!("- **{key}**: []\n"));
        }
        Value::Array(items) => {
            out.push_str(&format!("- **{key}**: [{} items]\n", items.len()));
            for (position, item) in items.iter().enumerate() {
                match item {
                    Value::Object(fields) => {
                        out.push_str(&format!("  - item {}:\n", position + 1));
                        for (sub_key, sub_value) in fields {
                            out.push_str(&format!("    - {sub_key}: {}\n", format_nested(sub_value)));
                        }
                    }
                    other => {
                        out.push_str(&format!("  - {}\n", format_nested(other)));
                    }
                }
            }
        }
        Value::Object(fields) => {
            out.push_str(&format!("- **{key}**:\n"));
            for (sub_key, sub_value) in fields {
                out.push_str(&format!("  - {sub_key}: {}\n", format_nested(sub_value)));
            }
        }
        Value::Number(number) => {
            out.push_str(&format!("- **{key}**: {}\n", format_number(key, number)));
        }
        Value::String(text) => {
            out.push_str(&format!("- **{key}**: {text}\n"));
        }
        Value::Bool(flag) => {
            out.push_str(&format!("- **{key}**: {flag}\n"));
        }
    }
}

fn format_number(key: &str, number: &Number) -> String {
    if let Some(integer) = number.as_i64().filter(|_| !number.is_f64()) {
        return group_thousands(&integer.to_string());
    }
    if let Some(integer) = number.as_u64().filter(|_| !number.is_f64()) {
        return group_thousands(&integer.to_string());
    }
    let value = number.as_f64().unwrap_or_default();

    if ABBREVIATED_KEYS.contains(&key) {
        return abbreviate(value);
    }
    if PERCENT_KEY_HINTS.iter().any(|hint| key.contains(hint)) {
        return if value < 1.0 {
            format!("{:.2}%", value * 100.0)
        } else {
            format!("{value:.2}%")
        };
    }
    if value.abs() < 1.0 {
        format!("{value:.4}")
    } else {
        group_thousands(&format!("{value:.2}"))
    }
}

fn abbreviate(value: f64) -> String {
    if value > 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if value > 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value > 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        group_thousands(&format!("{value:.2}"))
    }
}

fn format_nested(value: &Value) -> String {
    match value {
        Value::Number(number) if number.is_f64() => {
            format!("{:.2}", number.as_f64().unwrap_or_default())
        }
        Value::Number(number) => group_thousands(&number.to_string()),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Insert `,` between thousands groups of the integer part of a rendered
/// number ("-1234567.50" -> "-1,234,567.50").
fn group_thousands(rendered: &str) -> String {
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (position, digit) in integer.chars().enumerate() {
        if position > 0 && (integer.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}
