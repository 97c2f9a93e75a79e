use chrono::Utc;
use clap::Args;
use provenance_engine::{CallRecorder, CompletedCall, LogLayout, SessionContext};
use serde_json::{Map, Value, json};

use crate::util::{Context, exit_error, parse_json_object, parse_json_value, print_json};

#[derive(Args)]
pub struct RecordArgs {
    /// Tool name (e.g. "get_stock_info")
    #[arg(long)]
    pub tool: String,
    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// Tool response as JSON
    #[arg(long)]
    pub response: Option<String>,
    /// Error message; marks the call as failed
    #[arg(long)]
    pub error: Option<String>,
    /// Call duration in milliseconds
    #[arg(long)]
    pub duration_ms: Option<f64>,
    /// Entity to attribute the call to when the arguments carry none
    #[arg(long)]
    pub entity: Option<String>,
}

pub fn run(ctx: &Context, args: RecordArgs) -> i32 {
    let arguments = parse_json_object(&args.args, "--args")
        .unwrap_or_else(|e| exit_error(&e, Some("Example: --args '{\"ticker\":\"AAPL\"}'")));
    let response = args
        .response
        .as_deref()
        .map(|raw| parse_json_value(raw, "--response"))
        .transpose()
        .unwrap_or_else(|e| exit_error(&e, None));

    let session = match args.entity.as_deref() {
        Some(entity) => SessionContext::for_entity(entity),
        None => SessionContext::new(),
    };
    let call = completed_call(&args.tool, arguments, response, args.error, args.duration_ms);

    let recorder = CallRecorder::new(LogLayout::new(&ctx.log_dir));
    match recorder.try_record_at(&session, call, Utc::now()) {
        Ok(path) => print_json(&json!({
            "recorded": true,
            "path": path.display().to_string(),
        })),
        Err(e) => exit_error(
            &format!("Failed to record call: {e}"),
            Some("Check that --log-dir / PROVENANCE_LOG_DIR is writable"),
        ),
    }
}

fn completed_call(
    tool: &str,
    arguments: Map<String, Value>,
    response: Option<Value>,
    error: Option<String>,
    duration_ms: Option<f64>,
) -> CompletedCall {
    let call = match error {
        Some(error) => CompletedCall::failure(tool, arguments, error),
        None => CompletedCall::success(tool, arguments, response.unwrap_or(Value::Null)),
    };
    match duration_ms {
        Some(ms) => call.with_duration_ms(ms),
        None => call,
    }
}
