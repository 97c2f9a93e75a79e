use std::sync::Mutex;

use provenance_core::records::UNKNOWN_ENTITY;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Argument keys that name the entity a tool call is about, in priority order.
pub const ENTITY_ARGUMENT_KEYS: [&str; 2] = ["ticker", "symbol"];

/// State of one conversation. Owns the "current entity" cursor so calls
/// without an explicit identifier (a URL fetch, a web search) are still
/// attributed to the entity under analysis. Create one per conversation
/// and drop it when the conversation ends; nothing leaks across sessions.
#[derive(Debug)]
pub struct SessionContext {
    id: Uuid,
    current_entity: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            current_entity: Mutex::new(None),
        }
    }

    /// Start a session already focused on `entity_id`.
    pub fn for_entity(entity_id: &str) -> Self {
        let session = Self::new();
        session.set_current_entity(entity_id);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_entity(&self) -> Option<String> {
        self.current_entity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_current_entity(&self, entity_id: &str) {
        let trimmed = entity_id.trim();
        if trimmed.is_empty() {
            return;
        }
        let mut cursor = self.current_entity.lock().unwrap_or_else(|e| e.into_inner());
        *cursor = Some(trimmed.to_string());
    }

    /// Entity a call with these arguments belongs to. An explicit
    /// identifier moves the cursor; otherwise the cursor is used, then
    /// `"unknown"`.
    pub fn resolve_entity(&self, arguments: &Map<String, Value>) -> String {
        if let Some(explicit) = explicit_entity(arguments) {
            self.set_current_entity(&explicit);
            return explicit;
        }
        self.current_entity()
            .unwrap_or_else(|| UNKNOWN_ENTITY.to_string())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

fn explicit_entity(arguments: &Map<String, Value>) -> Option<String> {
    ENTITY_ARGUMENT_KEYS.iter().find_map(|key| {
        arguments
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::SessionContext;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn explicit_identifier_wins_and_moves_cursor() {
        let session = SessionContext::new();
        assert_eq!(
            session.resolve_entity(&args(json!({"symbol": " AAPL "}))),
            "AAPL"
        );
        assert_eq!(session.current_entity().as_deref(), Some("AAPL"));

        assert_eq!(
            session.resolve_entity(&args(json!({"ticker": "MSFT", "symbol": "AAPL"}))),
            "MSFT"
        );
    }

    #[test]
    fn calls_without_identifier_fall_back_to_cursor() {
        let session = SessionContext::new();
        assert_eq!(
            session.resolve_entity(&args(json!({"url": "https://example.com"}))),
            "unknown"
        );

        session.resolve_entity(&args(json!({"ticker": "2330.TW"})));
        assert_eq!(
            session.resolve_entity(&args(json!({"url": "https://example.com"}))),
            "2330.TW"
        );
        assert_eq!(
            session.resolve_entity(&args(json!({"ticker": "   "}))),
            "2330.TW"
        );
    }

    #[test]
    fn sessions_do_not_share_cursors() {
        let first = SessionContext::for_entity("AAPL");
        let second = SessionContext::new();
        assert_eq!(first.current_entity().as_deref(), Some("AAPL"));
        assert_eq!(second.current_entity(), None);
        assert_ne!(first.id(), second.id());
    }
}
