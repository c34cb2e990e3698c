//! Main orchestrator - one routed turn
//!
//! CLASSIFY → ROUTE → HANDLE (→ CLARIFY → RECLASSIFY → HANDLE?) → COMPLETE

use crate::audit::{TurnLog, TurnRecord};
use crate::clarifier::Clarifier;
use crate::classifier::Classifier;
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::handlers::{
    CommissionHandler, ContestHandler, HandlerRegistry, PolicyHandler, TicketHandler,
};
use crate::models::{
    Category, ConversationHistory, HandlerResult, Request, TurnOutcome, TurnReport, TurnState,
};
use crate::oracle::{
    GeminiClient, LanguageModel, NullRetriever, Retriever, Timed, VectorIndexRetriever,
};
use crate::router::{route, Route};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shown whenever a handler could not produce an answer
pub const APOLOGY: &str =
    "I'm sorry, I wasn't able to complete your request right now. Please try again in a moment.";

const CLASSIFIER_NODE: &str = "initial_classifier";
const ROUTER_NODE: &str = "main_router";

/// Coordinates classifier, router, handlers and clarifier for each turn.
/// Holds no per-turn state; safe to share across concurrent turns.
pub struct Orchestrator {
    classifier: Arc<Classifier>,
    handlers: Arc<HandlerRegistry>,
    clarifier: Clarifier,
    turn_log: TurnLog,
}

impl Orchestrator {
    /// Classifier and clarifier share `model`; the clarifier gets the same
    /// registry the orchestrator dispatches to.
    pub fn new(model: Arc<dyn LanguageModel>, handlers: HandlerRegistry) -> Self {
        let handlers = Arc::new(handlers);
        let classifier = Arc::new(Classifier::new(model.clone()));
        let clarifier = Clarifier::new(model, classifier.clone(), handlers.clone());

        Self {
            classifier,
            handlers,
            clarifier,
            turn_log: TurnLog::new(),
        }
    }

    /// Wire live Gemini and vector index oracles, each call bounded by the
    /// configured timeout
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let gemini = Arc::new(GeminiClient::new(config)?);
        let model: Arc<dyn LanguageModel> =
            Arc::new(Timed::new(gemini.clone(), config.oracle_timeout));

        let retriever: Arc<dyn Retriever> = match VectorIndexRetriever::from_config(config, gemini)? {
            Some(index) => Arc::new(Timed::new(Arc::new(index), config.oracle_timeout)),
            None => {
                warn!("VECTOR_INDEX_HOST not set; policy answers will be ungrounded");
                Arc::new(NullRetriever)
            }
        };

        let contest = ContestHandler::load(model.clone(), &config.contest_rules_path)?;

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(
            PolicyHandler::new(model.clone(), retriever).with_top_k(config.retrieval_top_k),
        ));
        registry.register(Arc::new(CommissionHandler::new(model.clone(), config.commission)));
        registry.register(Arc::new(contest));
        registry.register(Arc::new(TicketHandler::new(model.clone(), config.commission)));

        info!(
            handlers = ?registry.categories(),
            turn_log_capacity = config.turn_log_capacity,
            "Orchestrator wired"
        );

        let mut orchestrator = Self::new(model, registry);
        orchestrator.turn_log = TurnLog::with_capacity(config.turn_log_capacity);
        Ok(orchestrator)
    }

    pub fn turn_log(&self) -> &TurnLog {
        &self.turn_log
    }

    /// Run one turn end to end. Never fails: oracle trouble becomes a
    /// `Failed` outcome, unknown categories a `Rejected` one.
    pub async fn run_turn(&self, request: &Request, history: &ConversationHistory) -> TurnReport {
        let start_time = Instant::now();
        let turn_id = Uuid::new_v4();
        let mut state = TurnState::new();

        info!(
            turn_id = %turn_id,
            conversation_id = %request.conversation_id(),
            history = history.len(),
            "Orchestrator: starting turn"
        );

        // === CLASSIFY ===
        let label = match self.classifier.classify(request.text()).await {
            Ok(label) => label,
            Err(e) => {
                warn!(turn_id = %turn_id, "Classification failed, routing to clarify: {}", e);
                Category::Clarify.as_str().to_string()
            }
        };
        state.update(CLASSIFIER_NODE, format!("category={}", label));

        // === ROUTE ===
        let outcome = match route(&label) {
            Route::Reject => {
                // TODO: answer rejected turns with a fallback apology instead of nothing
                warn!(turn_id = %turn_id, label = %label, "Unknown category, ending turn without a response");
                state.update(ROUTER_NODE, "reject");
                TurnOutcome::Rejected { label }
            }
            Route::Handler(category) => {
                state.category = Some(category);
                state.update(ROUTER_NODE, format!("dispatch={}", category.handler_name()));

                // === HANDLE ===
                let handled = self.dispatch(category, request, history, &mut state).await;
                self.finish(handled, &mut state, turn_id)
            }
        };

        let report = TurnReport {
            turn_id,
            conversation_id: request.conversation_id(),
            outcome,
            trace: state.into_trace(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };

        self.turn_log.record(TurnRecord::from_report(&report)).await;

        info!(
            turn_id = %turn_id,
            outcome = report.outcome.kind(),
            elapsed_ms = report.elapsed_ms,
            "Orchestrator: turn complete"
        );

        report
    }

    async fn dispatch(
        &self,
        category: Category,
        request: &Request,
        history: &ConversationHistory,
        state: &mut TurnState,
    ) -> Result<HandlerResult> {
        if category == Category::Clarify {
            let mut path = Vec::new();
            let clarified = self.clarifier.clarify(request, request, history, &mut path).await;
            for step in &path {
                state.update(Category::Clarify.handler_name(), format!("{:?}", step));
            }
            return clarified.map(|clarification| clarification.result);
        }

        let handler = self.handlers.get(category).ok_or_else(|| {
            OrchestrationError::HandlerUnavailable {
                handler: category.handler_name().to_string(),
                cause: "not_registered",
                reason: "handler not registered".to_string(),
            }
        })?;

        debug!(handler = handler.name(), "Dispatching to handler");
        let result = handler.handle(request, history).await?;
        state.update(handler.name(), "responded");
        Ok(result)
    }

    fn finish(
        &self,
        handled: Result<HandlerResult>,
        state: &mut TurnState,
        turn_id: Uuid,
    ) -> TurnOutcome {
        match handled {
            Ok(result) if !result.response_text.trim().is_empty() => {
                state.category = Some(result.category);
                state.response_text = Some(result.response_text.clone());
                TurnOutcome::Completed(result)
            }
            Ok(result) => {
                error!(turn_id = %turn_id, category = %result.category, "Handler returned an empty response");
                state.update("orchestrator", "failed: empty response");
                TurnOutcome::Failed {
                    response_text: APOLOGY.to_string(),
                }
            }
            Err(OrchestrationError::InvalidCategory(label)) => {
                warn!(turn_id = %turn_id, label = %label, "Clarifier produced an unknown category");
                state.update(ROUTER_NODE, "reject");
                TurnOutcome::Rejected { label }
            }
            Err(e) => {
                error!(turn_id = %turn_id, kind = e.kind(), "Handler failed: {}", e);
                state.update("orchestrator", format!("failed: {}", e.trace_summary()));
                TurnOutcome::Failed {
                    response_text: APOLOGY.to_string(),
                }
            }
        }
    }
}
