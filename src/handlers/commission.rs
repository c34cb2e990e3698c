//! Commission handler: explains a commission figure for a deal

use super::{commission_instruction, CategoryHandler};
use crate::config::CommissionTerms;
use crate::error::OrchestrationError;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::oracle::{string_object_schema, LanguageModel, Prompt, StructuredGenerator, StructuredOutput};
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionResponse {
    pub commission: String,
    pub calculation: String,
    pub response: String,
}

impl StructuredOutput for CommissionResponse {
    fn schema() -> Value {
        string_object_schema(&["commission", "calculation", "response"])
    }
}

pub struct CommissionHandler {
    generator: StructuredGenerator<CommissionResponse>,
    terms: CommissionTerms,
}

impl CommissionHandler {
    pub fn new(model: Arc<dyn LanguageModel>, terms: CommissionTerms) -> Self {
        Self {
            generator: StructuredGenerator::new(model),
            terms,
        }
    }

    fn instruction(&self) -> String {
        format!(
            "{}\n\nPlease provide user commission as well as explain how you computed it.",
            commission_instruction(&self.terms)
        )
    }
}

/// Narrative first, then the calculation and the figure
pub fn render(answer: &CommissionResponse) -> String {
    format!(
        "{} \n\n Source: {}.\n Commission: {}",
        answer.response, answer.calculation, answer.commission
    )
}

#[async_trait::async_trait]
impl CategoryHandler for CommissionHandler {
    fn category(&self) -> Category {
        Category::Commission
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

        debug!(
            commission = %answer.commission,
            calculation = %answer.calculation,
            "Commission computed"
        );

        // The calculation text stays in the response body; category keeps the label.
        Ok(HandlerResult::new(Category::Commission, render(&answer)))
    }
}
