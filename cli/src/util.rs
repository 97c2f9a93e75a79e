use std::path::{Path, PathBuf};

use provenance_engine::config::DEFAULT_WINDOW_MINUTES;
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const MIN_WINDOW_MINUTES: i64 = 1;
pub const MAX_WINDOW_MINUTES: i64 = 10_080;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub log_dir: PathBuf,
    pub window_minutes: u32,
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    std::process::exit(1);
}

/// Pretty-print a value to stdout. Returns the exit code to use.
pub fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(e) => exit_error(&format!("Failed to serialize output: {e}"), None),
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("provenance")
        .join("mcp_logs")
}

pub fn clamp_window_minutes(raw: Option<i64>) -> u32 {
    match raw {
        Some(minutes) => {
            let clamped = minutes.clamp(MIN_WINDOW_MINUTES, MAX_WINDOW_MINUTES);
            u32::try_from(clamped).unwrap_or(DEFAULT_WINDOW_MINUTES)
        }
        None => DEFAULT_WINDOW_MINUTES,
    }
}

/// Narrative text from `--text`, or from `--file` (stdin when "-").
pub fn read_text(text: Option<String>, file: Option<&Path>) -> Result<String, String> {
    match (text, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) if path == Path::new("-") => {
            std::io::read_to_string(std::io::stdin()).map_err(|e| format!("Failed to read stdin: {e}"))
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file '{}': {e}", path.display())),
        (Some(_), Some(_)) => Err("Use either --text or --file, not both".to_string()),
        (None, None) => Err("Provide the text with --text or --file".to_string()),
    }
}

pub fn parse_json_object(raw: &str, flag: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("{flag} must be a JSON object")),
        Err(e) => Err(format!("Invalid JSON in {flag}: {e}")),
    }
}

pub fn parse_json_value(raw: &str, flag: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid JSON in {flag}: {e}"))
}
