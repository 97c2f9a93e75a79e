use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use serde_json::{Map, Value, json};

use crate::recorder::{CallRecorder, CompletedCall};
use crate::session::SessionContext;

/// Context field injected into tool schemas so the model can say which
/// entity a call is about. Tools themselves never see it.
pub const CONTEXT_ARGUMENT: &str = "ticker";

const CONTEXT_ARGUMENT_DESCRIPTION: &str = "The ticker symbol this operation concerns (e.g., AAPL). \
     Always provide it when known so the call can be attributed.";

/// Wraps tool invocations so every completed call, success or failure, is
/// recorded. The wrapped call's result is returned untouched; recording
/// problems never reach it.
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    recorder: CallRecorder,
}

impl RecordingMiddleware {
    pub fn new(recorder: CallRecorder) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    pub fn invoke<F, E>(
        &self,
        session: &SessionContext,
        tool_name: &str,
        arguments: Map<String, Value>,
        call: F,
    ) -> Result<Value, E>
    where
        F: FnOnce(Map<String, Value>) -> Result<Value, E>,
        E: Display,
    {
        let started = Instant::now();
        let result = call(execution_arguments(&arguments));
        self.finish(session, tool_name, arguments, &result, started);
        result
    }

    pub async fn invoke_async<F, Fut, E>(
        &self,
        session: &SessionContext,
        tool_name: &str,
        arguments: Map<String, Value>,
        call: F,
    ) -> Result<Value, E>
    where
        F: FnOnce(Map<String, Value>) -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: Display,
    {
        let started = Instant::now();
        let result = call(execution_arguments(&arguments)).await;
        self.finish(session, tool_name, arguments, &result, started);
        result
    }

    fn finish<E: Display>(
        &self,
        session: &SessionContext,
        tool_name: &str,
        arguments: Map<String, Value>,
        result: &Result<Value, E>,
        started: Instant,
    ) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let call = match result {
            Ok(response) => CompletedCall::success(tool_name, arguments, response.clone()),
            Err(err) => CompletedCall::failure(tool_name, arguments, err.to_string()),
        };
        self.recorder
            .record(session, call.with_duration_ms(duration_ms));
    }
}

fn execution_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
    let mut execution = arguments.clone();
    execution.remove(CONTEXT_ARGUMENT);
    execution
}

/// Add the optional context argument to a tool's declared parameters.
/// Declarations without a `parameters.properties` object are returned as is.
pub fn inject_entity_parameter(mut declaration: Value) -> Value {
    if let Some(properties) = declaration
        .get_mut("parameters")
        .and_then(|parameters| parameters.get_mut("properties"))
        .and_then(Value::as_object_mut)
    {
        properties.insert(
            CONTEXT_ARGUMENT.to_string(),
            json!({
                "type": "string",
                "description": CONTEXT_ARGUMENT_DESCRIPTION,
            }),
        );
    }
    declaration
}
