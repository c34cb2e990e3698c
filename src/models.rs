//! Core data models for a routed turn

use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Category =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Policy,
    Commission,
    Contest,
    Ticket,
    Clarify,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Policy,
        Category::Commission,
        Category::Contest,
        Category::Ticket,
        Category::Clarify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Policy => "policy",
            Category::Commission => "commission",
            Category::Contest => "contest",
            Category::Ticket => "ticket",
            Category::Clarify => "clarify",
        }
    }

    /// Node name used as the origin label for the component handling this category
    pub fn handler_name(&self) -> &'static str {
        match self {
            Category::Policy => "policy_agent",
            Category::Commission => "commission_agent",
            Category::Contest => "contest_agent",
            Category::Ticket => "ticket_agent",
            Category::Clarify => "clarify_agent",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = OrchestrationError;

    /// Exact lookup against the label set; callers normalize first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| OrchestrationError::InvalidCategory(s.to_string()))
    }
}

/// Trim, lowercase and strip quoting/markdown the model sometimes wraps labels in
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`' || c == '.')
        .trim()
        .to_lowercase()
}

//
// ================= Conversation History =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

/// Prior exchanges owned by the caller. Passed through to the generation
/// oracle untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<HistoryMessage>);

impl ConversationHistory {
    pub fn new(messages: Vec<HistoryMessage>) -> Self {
        Self(messages)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[HistoryMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//
// ================= Request =================
//

/// One user turn. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    text: String,
    conversation_id: Uuid,
}

impl Request {
    pub fn new(text: impl Into<String>, conversation_id: Uuid) -> Self {
        Self {
            text: text.into(),
            conversation_id,
        }
    }

    /// Start a fresh conversation with a generated id
    pub fn fresh(text: impl Into<String>) -> Self {
        Self::new(text, Uuid::new_v4())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

//
// ================= Turn State =================
//

/// Mutable record threaded through one turn. Owned by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    pub category: Option<Category>,
    pub response_text: Option<String>,
    pub origin_label: &'static str,
    trace: Vec<String>,
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            origin_label: "turn_start",
            ..Default::default()
        }
    }

    /// Record an update from `origin`
    pub fn update(&mut self, origin: &'static str, note: impl Into<String>) {
        self.origin_label = origin;
        self.trace.push(format!("{}: {}", origin, note.into()));
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<String> {
        self.trace
    }
}

//
// ================= Results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerResult {
    pub category: Category,
    pub response_text: String,
}

impl HandlerResult {
    pub fn new(category: Category, response_text: impl Into<String>) -> Self {
        Self {
            category,
            response_text: response_text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TurnOutcome {
    Completed(HandlerResult),
    Failed { response_text: String },
    Rejected { label: String },
}

impl TurnOutcome {
    /// Text shown to the user, if the turn produced any
    pub fn response_text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed(result) => Some(&result.response_text),
            TurnOutcome::Failed { response_text } => Some(response_text),
            TurnOutcome::Rejected { .. } => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            TurnOutcome::Completed(result) => Some(result.category),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TurnOutcome::Completed(_) => "completed",
            TurnOutcome::Failed { .. } => "failed",
            TurnOutcome::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub conversation_id: Uuid,
    pub outcome: TurnOutcome,
    pub trace: Vec<String>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_known_labels() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_category_parse_rejects_unknown() {
        assert!("billing".parse::<Category>().is_err());
        assert!("Policy".parse::<Category>().is_err());
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  \"Policy\" "), "policy");
        assert_eq!(normalize_label("**ticket**"), "ticket");
        assert_eq!(normalize_label("clarify."), "clarify");
    }

    #[test]
    fn test_turn_state_tracks_origin() {
        let mut state = TurnState::new();
        assert_eq!(state.origin_label, "turn_start");

        state.update("initial_classifier", "category=policy");
        state.update("policy_agent", "responded");

        assert_eq!(state.origin_label, "policy_agent");
        assert_eq!(state.trace().len(), 2);
        assert!(state.trace()[0].starts_with("initial_classifier"));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = TurnOutcome::Completed(HandlerResult::new(Category::Ticket, "ok"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["category"], "ticket");

        let rejected = TurnOutcome::Rejected { label: "x".into() };
        assert!(rejected.response_text().is_none());
    }

    #[test]
    fn test_history_is_transparent_list() {
        let history: ConversationHistory = serde_json::from_str(
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#,
        )
        .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[1].role, Role::Assistant);
    }
}
