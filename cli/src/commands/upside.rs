use clap::Args;
use provenance_engine::{CallRecorder, LogLayout, SessionContext, upside_potential};

use crate::util::{Context, exit_error, print_json};

#[derive(Args)]
pub struct UpsideArgs {
    /// Entity identifier (e.g. "AAPL")
    #[arg(long)]
    pub entity: String,
    /// Current price
    #[arg(long, allow_negative_numbers = true)]
    pub current: f64,
    /// Target price
    #[arg(long, allow_negative_numbers = true)]
    pub target: f64,
}

pub fn run(ctx: &Context, args: UpsideArgs) -> i32 {
    let recorder = CallRecorder::new(LogLayout::new(&ctx.log_dir));
    let session = SessionContext::for_entity(&args.entity);
    match upside_potential(&recorder, &session, args.current, args.target, &args.entity) {
        Ok(result) => print_json(&result),
        Err(e) => exit_error(&e.to_string(), Some("Both prices must be positive numbers")),
    }
}
