//! Contest handler: points the user at the contest submission form

use super::CategoryHandler;
use crate::error::OrchestrationError;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::oracle::{LanguageModel, Prompt, StructuredGenerator, StructuredOutput};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const CONTEST_RESPONSE_PREFIX: &str = "Please submit the contest form here: ";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestResponse {
    pub contest_url: String,
    pub contest_rules: String,
    pub response: String,
}

impl StructuredOutput for ContestResponse {
    fn schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "contestUrl": { "type": "STRING" },
                "contestRules": { "type": "STRING" },
                "response": { "type": "STRING" }
            },
            "required": ["contestUrl", "contestRules", "response"],
        })
    }
}

pub struct ContestHandler {
    generator: StructuredGenerator<ContestResponse>,
    rules: String,
}

impl ContestHandler {
    pub fn new(model: Arc<dyn LanguageModel>, rules: impl Into<String>) -> Self {
        Self {
            generator: StructuredGenerator::new(model),
            rules: rules.into(),
        }
    }

    /// Read the contest rules document once; it is immutable afterwards
    pub fn load(model: Arc<dyn LanguageModel>, rules_path: &Path) -> Result<Self> {
        let rules = std::fs::read_to_string(rules_path)?;
        info!(path = %rules_path.display(), bytes = rules.len(), "Loaded contest rules");
        Ok(Self::new(model, rules))
    }

    fn instruction(&self) -> String {
        format!(
            "You are a Sales Commissions expert. Users will ask you about how to start a sales contest.\n\
You will send them a URL for a Google form to submit.\n\
Please follow the contest rules as defined here:\n{}\n\
Please provide user instructions to fill out the Google form.",
            self.rules
        )
    }
}

#[async_trait::async_trait]
impl CategoryHandler for ContestHandler {
    fn category(&self) -> Category {
        Category::Contest
    }

    async fn handle(
        &self,
        request: &Request,
        _history: &ConversationHistory,
    ) -> Result<HandlerResult> {
        let prompt = Prompt::new(self.instruction(), request.text());

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::unavailable(self.name(), e))?;

        let url = answer.contest_url.trim();
        if url.is_empty() {
            return Err(OrchestrationError::unavailable(
                self.name(),
                OrchestrationError::LlmError("Model returned no contest URL".to_string()),
            ));
        }

        // Rules and instructions are not surfaced; only the URL is.
        debug!(rules_len = answer.contest_rules.len(), "Contest answer generated");

        Ok(HandlerResult::new(
            Category::Contest,
            format!("{}{}", CONTEST_RESPONSE_PREFIX, url),
        ))
    }
}
