//! Clarification state machine
//!
//! AskClarify → Reclassify → { Resolved, OfferTicket }
//! OfferTicket → { Escalated, Closed }
//!
//! Runs at most one reclassification per turn and never re-enters itself.
//! The classifier and handlers are injected, not reached through the
//! orchestrator.

use crate::classifier::Classifier;
use crate::error::OrchestrationError;
use crate::handlers::HandlerRegistry;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::oracle::{LanguageModel, Prompt};
use crate::router::{route, Route};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CLARIFY_PROMPT: &str = "I'm not sure I fully understood your request. \
Could you please clarify what you need help with?";

const TICKET_OFFER_PROMPT: &str = "I'm still having trouble understanding your request. \
Would you like to create a support ticket instead? Please respond with 'yes' or 'no'.";

pub const CLOSING_MESSAGE: &str = "Okay, feel free to reach out if you need further assistance.";

const NAME: &str = "clarify_agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarifyState {
    AskClarify,
    Reclassify,
    Resolved(Category),
    OfferTicket,
    Escalated,
    Closed,
}

/// Result of one clarification run
#[derive(Debug, Clone)]
pub struct Clarification {
    pub result: HandlerResult,
    pub question: String,
}

pub struct Clarifier {
    model: Arc<dyn LanguageModel>,
    classifier: Arc<Classifier>,
    handlers: Arc<HandlerRegistry>,
}

/// Case-insensitive "yes" anywhere in the answer; everything else declines
pub fn is_affirmative(answer: &str) -> bool {
    answer.to_lowercase().contains("yes")
}

impl Clarifier {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        classifier: Arc<Classifier>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            model,
            classifier,
            handlers,
        }
    }

    /// Run the machine from `AskClarify`.
    ///
    /// `clarified` is the text re-submitted for classification; callers
    /// without a second user message pass the original request. Every state
    /// entered is appended to `path`, including when a step fails.
    pub async fn clarify(
        &self,
        request: &Request,
        clarified: &Request,
        history: &ConversationHistory,
        path: &mut Vec<ClarifyState>,
    ) -> Result<Clarification> {
        let mut state = ClarifyState::AskClarify;
        let mut question = String::new();

        loop {
            path.push(state);
            debug!(?state, "Clarifier step");

            state = match state {
                ClarifyState::AskClarify => {
                    let prompt = Prompt::new(CLARIFY_PROMPT, request.text()).with_history(history);
                    question = self
                        .model
                        .generate(&prompt)
                        .await
                        .map_err(|e| OrchestrationError::unavailable(NAME, e))?;
                    info!(question = %question, "Asked user to clarify");
                    ClarifyState::Reclassify
                }

                ClarifyState::Reclassify => match self.classifier.classify(clarified.text()).await {
                    Ok(label) => match route(&label) {
                        Route::Handler(Category::Clarify) => ClarifyState::OfferTicket,
                        Route::Handler(category) => ClarifyState::Resolved(category),
                        Route::Reject => {
                            warn!(label = %label, "Reclassification produced an unknown category");
                            return Err(OrchestrationError::InvalidCategory(label));
                        }
                    },
                    Err(e) => {
                        warn!("Reclassification failed, treating as clarify: {}", e);
                        ClarifyState::OfferTicket
                    }
                },

                ClarifyState::Resolved(category) => {
                    let result = self.dispatch(category, clarified, history).await?;
                    return Ok(Clarification { result, question });
                }

                ClarifyState::OfferTicket => {
                    let prompt = Prompt::new(TICKET_OFFER_PROMPT, clarified.text());
                    let answer = self
                        .model
                        .generate(&prompt)
                        .await
                        .map_err(|e| OrchestrationError::unavailable(NAME, e))?;

                    if is_affirmative(&answer) {
                        ClarifyState::Escalated
                    } else {
                        ClarifyState::Closed
                    }
                }

                ClarifyState::Escalated => {
                    let result = self.dispatch(Category::Ticket, clarified, history).await?;
                    return Ok(Clarification { result, question });
                }

                ClarifyState::Closed => {
                    return Ok(Clarification {
                        result: HandlerResult::new(Category::Clarify, CLOSING_MESSAGE),
                        question,
                    });
                }
            };
        }
    }

    async fn dispatch(
        &self,
        category: Category,
        request: &Request,
        history: &ConversationHistory,
    ) -> Result<HandlerResult> {
        let handler = self.handlers.get(category).ok_or_else(|| {
            OrchestrationError::HandlerUnavailable {
                handler: category.handler_name().to_string(),
                cause: "not_registered",
                reason: "handler not registered".to_string(),
            }
        })?;
        handler.handle(request, history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommissionTerms;
    use crate::handlers::{CommissionHandler, TicketHandler, TICKET_PLACEHOLDER};
    use crate::oracle::mock::ScriptedModel;
    use serde_json::json;

    fn clarifier(model: Arc<ScriptedModel>) -> Clarifier {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(TicketHandler::new(model.clone(), CommissionTerms::default())));
        registry.register(Arc::new(CommissionHandler::new(
            model.clone(),
            CommissionTerms::default(),
        )));
        Clarifier::new(
            model.clone(),
            Arc::new(Classifier::new(model)),
            Arc::new(registry),
        )
    }

    async fn run(model: Arc<ScriptedModel>, text: &str) -> (Result<Clarification>, Vec<ClarifyState>) {
        let request = Request::fresh(text);
        let mut path = Vec::new();
        let outcome = clarifier(model)
            .clarify(&request, &request, &ConversationHistory::empty(), &mut path)
            .await;
        (outcome, path)
    }

    #[test]
    fn test_affirmative_matching() {
        assert!(is_affirmative("Yes, please."));
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("eyes"));
        assert!(!is_affirmative("No thanks"));
        assert!(!is_affirmative("sure"));
        assert!(!is_affirmative(""));
    }

    #[tokio::test]
    async fn test_resolved_dispatches_reclassified_handler() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Which deal do you mean?")
                .json(json!({"category": "commission"}))
                .json(json!({"commission": "$5", "calculation": "5%", "response": "ok"})),
        );

        let (outcome, path) = run(model.clone(), "my deal").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.result.category, Category::Commission);
        assert_eq!(outcome.question, "Which deal do you mean?");
        assert_eq!(
            path,
            vec![
                ClarifyState::AskClarify,
                ClarifyState::Reclassify,
                ClarifyState::Resolved(Category::Commission)
            ]
        );
        // clarifying question, reclassification, one handler generation
        assert_eq!(model.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_declined_offer_closes() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Could you clarify?")
                .json(json!({"category": "clarify"}))
                .text("No, I do not want a ticket."),
        );

        let (outcome, path) = run(model.clone(), "asdkjhaskjdh").await;
        let outcome = outcome.unwrap();

        assert_eq!(
            outcome.result,
            HandlerResult::new(
                Category::Clarify,
                "Okay, feel free to reach out if you need further assistance."
            )
        );
        assert_eq!(path.last(), Some(&ClarifyState::Closed));

        let offers = model
            .calls()
            .await
            .into_iter()
            .filter(|c| c.system == TICKET_OFFER_PROMPT)
            .count();
        assert_eq!(offers, 1);
    }

    #[tokio::test]
    async fn test_affirmed_offer_escalates_to_ticket() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Could you clarify?")
                .json(json!({"category": "clarify"}))
                .text("Yes")
                .json(json!({"ticket": "INC-9", "response": "Opened."})),
        );

        let (outcome, path) = run(model, "???").await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.result.category, Category::Ticket);
        assert_eq!(outcome.result.response_text, TICKET_PLACEHOLDER);
        assert_eq!(
            path,
            vec![
                ClarifyState::AskClarify,
                ClarifyState::Reclassify,
                ClarifyState::OfferTicket,
                ClarifyState::Escalated
            ]
        );
    }

    #[tokio::test]
    async fn test_reclassification_error_counts_as_clarify() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Could you clarify?")
                .json_failure("503")
                .text("maybe"),
        );

        let (outcome, path) = run(model, "hmm").await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.result.category, Category::Clarify);
        assert!(path.contains(&ClarifyState::OfferTicket));
    }

    #[tokio::test]
    async fn test_unknown_reclassification_is_rejected() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Could you clarify?")
                .json(json!({"category": "payroll"})),
        );

        let (outcome, path) = run(model, "hmm").await;
        let err = outcome.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidCategory(label) if label == "payroll"));
        assert_eq!(path, vec![ClarifyState::AskClarify, ClarifyState::Reclassify]);
    }

    #[tokio::test]
    async fn test_question_failure_is_unavailable() {
        let model = Arc::new(ScriptedModel::new().text_failure("503"));

        let (outcome, path) = run(model, "hmm").await;
        let err = outcome.unwrap_err();
        assert!(matches!(err, OrchestrationError::HandlerUnavailable { ref handler, .. } if handler == "clarify_agent"));
        assert_eq!(path, vec![ClarifyState::AskClarify]);
    }

    #[tokio::test]
    async fn test_unregistered_handler_is_unavailable() {
        let model = Arc::new(
            ScriptedModel::new()
                .text("Could you clarify?")
                .json(json!({"category": "policy"})),
        );

        let (outcome, path) = run(model, "leave?").await;
        assert!(outcome.unwrap_err().to_string().contains("policy_agent"));
        assert_eq!(path.last(), Some(&ClarifyState::Resolved(Category::Policy)));
    }
}
