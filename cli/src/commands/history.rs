use clap::Args;
use provenance_engine::{Aggregator, LogLayout};

use crate::util::{Context, print_json};

#[derive(Args)]
pub struct HistoryArgs {
    /// Entity identifier (e.g. "AAPL")
    #[arg(long)]
    pub entity: String,
}

pub fn run(ctx: &Context, args: HistoryArgs) -> i32 {
    let aggregator = Aggregator::new(LogLayout::new(&ctx.log_dir));
    let history = aggregator.verification_history(&args.entity, ctx.window_minutes);
    print_json(&history)
}
