//! Tools computed locally rather than fetched. They record themselves so
//! the numbers they produce are as traceable as any fetched fact.

use provenance_core::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::recorder::{CallRecorder, CompletedCall};
use crate::session::SessionContext;

pub const UPSIDE_TOOL_NAME: &str = "calculate_upside_potential";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsideResult {
    pub ticker: String,
    pub current_price: f64,
    pub target_price: f64,
    pub upside_percentage: f64,
    pub message: String,
}

pub fn round_to_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage move from `current_price` to `target_price`, rounded to two
/// decimals.
pub fn upside_potential(
    recorder: &CallRecorder,
    session: &SessionContext,
    current_price: f64,
    target_price: f64,
    entity_id: &str,
) -> Result<UpsideResult, ToolError> {
    let arguments = upside_arguments(current_price, target_price, entity_id);

    let computed = compute_upside(current_price, target_price).map(|upside| UpsideResult {
        ticker: entity_id.to_string(),
        current_price,
        target_price,
        upside_percentage: upside,
        message: format!("{upside:?}%"),
    });

    let call = match &computed {
        Ok(result) => match serde_json::to_value(result) {
            Ok(response) => CompletedCall::success(UPSIDE_TOOL_NAME, arguments, response),
            Err(err) => CompletedCall::failure(UPSIDE_TOOL_NAME, arguments, err.to_string()),
        },
        Err(err) => CompletedCall::failure(UPSIDE_TOOL_NAME, arguments, err.to_string()),
    };
    recorder.record(session, call.with_duration_ms(0.0));

    computed
}

fn compute_upside(current_price: f64, target_price: f64) -> Result<f64, ToolError> {
    if !current_price.is_finite() || !target_price.is_finite() {
        return Err(ToolError::NonFinitePrice);
    }
    if current_price <= 0.0 {
        return Err(ToolError::NonPositivePrice(current_price));
    }
    Ok(round_to_two(
        (target_price - current_price) / current_price * 100.0,
    ))
}

fn upside_arguments(current_price: f64, target_price: f64, entity_id: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("current_price".to_string(), json!(current_price));
    arguments.insert("target_price".to_string(), json!(target_price));
    arguments.insert("ticker".to_string(), json!(entity_id));
    arguments
}
