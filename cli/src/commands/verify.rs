use std::path::PathBuf;

use clap::Args;
use provenance_engine::config::{DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
use provenance_engine::{
    CallRecorder, CoverageValidator, LengthBounds, LogLayout, StepPolicy, VerifierConfig,
};

use crate::util::{Context, exit_error, print_json, read_text};

/// Exit code for a verdict that rejected the text
pub const EXIT_INVALID: i32 = 2;

#[derive(Args)]
pub struct VerifyArgs {
    /// Entity identifier (e.g. "AAPL")
    #[arg(long)]
    pub entity: String,
    /// Text to verify
    #[arg(long)]
    pub text: Option<String>,
    /// Read the text from a file ("-" for stdin)
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Minimum trimmed character count
    #[arg(long, env = "PROVENANCE_MIN_CHARS", default_value_t = DEFAULT_MIN_CHARS)]
    pub min_chars: usize,
    /// Maximum trimmed character count
    #[arg(long, env = "PROVENANCE_MAX_CHARS", default_value_t = DEFAULT_MAX_CHARS)]
    pub max_chars: usize,
    /// Fail the verdict when search/fetch tool calls are missing
    #[arg(long, env = "PROVENANCE_ENFORCE_STEPS")]
    pub enforce_steps: bool,
}

pub fn run(ctx: &Context, args: VerifyArgs) -> i32 {
    let text = read_text(args.text, args.file.as_deref())
        .unwrap_or_else(|e| exit_error(&e, Some("Pass --text \"...\" or --file path")));

    let bounds = LengthBounds::new(args.min_chars, args.max_chars).unwrap_or_else(|e| {
        exit_error(
            &e.to_string(),
            Some("Set --min-chars/--max-chars or PROVENANCE_MIN_CHARS/PROVENANCE_MAX_CHARS"),
        )
    });
    let config = VerifierConfig {
        window_minutes: ctx.window_minutes,
        length: bounds,
        steps: StepPolicy {
            enforce: args.enforce_steps,
            ..StepPolicy::default()
        },
    };

    let recorder = CallRecorder::new(LogLayout::new(&ctx.log_dir));
    let validator = CoverageValidator::new(recorder, config)
        .unwrap_or_else(|e| exit_error(&e.to_string(), None));

    let verdict = validator.validate_with_defaults(&text, &args.entity);
    let code = print_json(&verdict);
    if code == 0 && !verdict.overall_valid {
        EXIT_INVALID
    } else {
        code
    }
}
