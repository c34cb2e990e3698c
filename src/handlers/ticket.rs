//! Ticket handler
//!
//! The generated ticket draft is only logged; the user always gets the fixed
//! pointer to the ticketing channel.

use super::{commission_instruction, CategoryHandler};
use crate::config::CommissionTerms;
use crate::error::OrchestrationError;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::oracle::{string_object_schema, LanguageModel, Prompt, StructuredGenerator, StructuredOutput};
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const TICKET_PLACEHOLDER: &str = "ServiceNow email address placeholder";

#[derive(Debug, Clone, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub response: String,
}

impl StructuredOutput for TicketResponse {
    fn schema() -> Value {
        string_object_schema(&["ticket", "response"])
    }
}

pub struct TicketHandler {
    generator: StructuredGenerator<TicketResponse>,
    terms: CommissionTerms,
}

impl TicketHandler {
    pub fn new(model: Arc<dyn LanguageModel>, terms: CommissionTerms) -> Self {
        Self {
            generator: StructuredGenerator::new(model),
            terms,
        }
    }

    fn instruction(&self) -> String {
        format!(
            "{}\n\nPlease provide a ticket identifier for the user's issue and a short response.",
            commission_instruction(&self.terms)
        )
    }
}

#[async_trait::async_trait]
impl CategoryHandler for TicketHandler {
    fn category(&self) -> Category {
        Category::Ticket
    }

    async fn handle(
        &self,
        request: &Request,
        _history: &ConversationHistory,
    ) -> Result<HandlerResult> {
        let prompt = Prompt::new(self.instruction(), request.text());

        let draft = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::unavailable(self.name(), e))?;

        info!(ticket = %draft.ticket, "Ticket draft generated");

        Ok(HandlerResult::new(Category::Ticket, TICKET_PLACEHOLDER))
    }
}
