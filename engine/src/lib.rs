pub mod aggregator;
pub mod config;
pub mod flatten;
pub mod layout;
pub mod matcher;
pub mod middleware;
pub mod recorder;
pub mod report;
pub mod session;
pub mod tools;
pub mod validator;

pub use aggregator::{AggregateStats, Aggregator, FactSnapshot, FlatFact, LatestPayload};
pub use config::{LengthBounds, StepPolicy, VerifierConfig};
pub use layout::LogLayout;
pub use matcher::{FactIndex, MatchOutcome, NumericToken, extract_numeric_tokens, match_text};
pub use middleware::{RecordingMiddleware, inject_entity_parameter};
pub use recorder::{CallRecorder, CompletedCall};
pub use report::render_snapshot_markdown;
pub use session::SessionContext;
pub use tools::{UpsideResult, upside_potential};
pub use validator::CoverageValidator;
