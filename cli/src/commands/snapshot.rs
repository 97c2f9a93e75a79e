use clap::{Args, ValueEnum};
use provenance_engine::{Aggregator, FactSnapshot, LogLayout, render_snapshot_markdown};
use serde_json::{Map, Value, json};

use crate::util::{Context, print_json};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SnapshotFormat {
    Json,
    Markdown,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Entity identifier (e.g. "AAPL")
    #[arg(long)]
    pub entity: String,
    /// Output format
    #[arg(long, value_enum, default_value_t = SnapshotFormat::Json)]
    pub format: SnapshotFormat,
}

pub fn run(ctx: &Context, args: SnapshotArgs) -> i32 {
    let aggregator = Aggregator::new(LogLayout::new(&ctx.log_dir));
    let snapshot = aggregator.aggregate(&args.entity, ctx.window_minutes);
    match args.format {
        SnapshotFormat::Json => print_json(&snapshot_json(&snapshot)),
        SnapshotFormat::Markdown => {
            print!("{}", render_snapshot_markdown(&snapshot));
            0
        }
    }
}

fn snapshot_json(snapshot: &FactSnapshot) -> Value {
    let mut tools = Map::new();
    for (tool, latest) in &snapshot.latest {
        tools.insert(
            tool.clone(),
            json!({
                "file": latest.file,
                "recorded_at": latest.recorded_at,
                "payload": latest.payload,
            }),
        );
    }
    let facts: Vec<Value> = snapshot
        .facts
        .iter()
        .map(|fact| {
            json!({
                "path": fact.path,
                "value": fact.value,
                "source": fact.source.to_string(),
            })
        })
        .collect();

    json!({
        "entity_id": snapshot.entity_id,
        "tools": tools,
        "facts": facts,
        "files": snapshot.file_names(),
        "suspicious_alerts": snapshot.suspicious_alerts,
        "stats": {
            "files_inspected": snapshot.stats.files_inspected,
            "files_unusable": snapshot.stats.files_unusable,
            "records_without_payload": snapshot.stats.records_without_payload,
        },
    })
}
