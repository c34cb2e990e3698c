//! Policy handler: retrieval-grounded answers about compensation policy

use super::CategoryHandler;
use crate::error::OrchestrationError;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::oracle::{LanguageModel, Prompt, Retriever};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const POLICY_PERSONA: &str = "You are a helpful and patient guide based in Silicon Valley.";
pub const DEFAULT_TOP_K: usize = 3;

pub struct PolicyHandler {
    model: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl PolicyHandler {
    pub fn new(model: Arc<dyn LanguageModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            model,
            retriever,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Embed passages verbatim ahead of the question.
/// With no passages the question goes out ungrounded.
pub fn grounding_prompt(passages: &[String], request_text: &str) -> String {
    if passages.is_empty() {
        return request_text.to_string();
    }

    let mut prompt = String::from("I have retrieved the following information related to your query:\n");
    for (i, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, passage));
    }
    prompt.push_str(&format!(
        "\nBased on this, here is the guidance related to your question: {}",
        request_text
    ));
    prompt
}

#[async_trait::async_trait]
impl CategoryHandler for PolicyHandler {
    fn category(&self) -> Category {
        Category::Policy
    }

    async fn handle(
        &self,
        request: &Request,
        history: &ConversationHistory,
    ) -> Result<HandlerResult> {
        let passages = self
            .retriever
            .retrieve(request.text(), self.top_k)
            .await
            .map_err(|e| OrchestrationError::unavailable(self.name(), e))?;

        if passages.is_empty() {
            info!("No policy passages retrieved, answering ungrounded");
        } else {
            debug!(count = passages.len(), "Grounding policy answer");
        }

        let prompt = Prompt::new(POLICY_PERSONA, grounding_prompt(&passages, request.text()))
            .with_history(history);

        let answer = self
            .model
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::unavailable(self.name(), e))?;

        Ok(HandlerResult::new(Category::Policy, answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoryMessage, Role};
    use crate::oracle::mock::{ScriptedModel, StaticRetriever};

    #[test]
    fn test_grounding_prompt_embeds_passages() {
        let passages = vec!["Leave pauses quota.".to_string(), "MCG lasts 90 days.".to_string()];
        let prompt = grounding_prompt(&passages, "What about leave?");

        assert!(prompt.contains("[1] Leave pauses quota."));
        assert!(prompt.contains("[2] MCG lasts 90 days."));
        assert!(prompt.ends_with("What about leave?"));
    }

    #[test]
    fn test_grounding_prompt_without_passages() {
        assert_eq!(grounding_prompt(&[], "What is a windfall?"), "What is a windfall?");
    }

    #[tokio::test]
    async fn test_policy_answer_is_grounded() {
        let model = Arc::new(ScriptedModel::new().text("Leave pauses your quota."));
        let retriever = Arc::new(StaticRetriever::new(vec![
            "p1".into(),
            "p2".into(),
            "p3".into(),
            "p4".into(),
        ]));
        let handler = PolicyHandler::new(model.clone(), retriever.clone());
        let history = ConversationHistory::new(vec![HistoryMessage {
            role: Role::User,
            content: "hi".into(),
        }]);

        let result = handler
            .handle(&Request::fresh("What happens on leave?"), &history)
            .await
            .unwrap();

        assert_eq!(result.category, Category::Policy);
        assert_eq!(result.response_text, "Leave pauses your quota.");
        assert_eq!(retriever.queries().await, vec![("What happens on leave?".to_string(), 3)]);

        let calls = model.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, POLICY_PERSONA);
        assert!(calls[0].user.contains("[3] p3"));
        assert!(!calls[0].user.contains("p4"));
        assert_eq!(calls[0].history_len, 1);
    }

    #[tokio::test]
    async fn test_zero_passages_still_generates() {
        let model = Arc::new(ScriptedModel::new().text("A windfall is an unusually large deal."));
        let handler = PolicyHandler::new(model.clone(), Arc::new(StaticRetriever::new(vec![])));

        let result = handler
            .handle(&Request::fresh("What is a windfall?"), &ConversationHistory::empty())
            .await
            .unwrap();

        assert_eq!(result.category, Category::Policy);
        assert!(!result.response_text.is_empty());
        assert_eq!(model.calls().await[0].user, "What is a windfall?");
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_unavailable() {
        let model = Arc::new(ScriptedModel::new().text("unused"));
        let handler = PolicyHandler::new(model.clone(), Arc::new(StaticRetriever::failing()));

        let err = handler
            .handle(&Request::fresh("policy?"), &ConversationHistory::empty())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::HandlerUnavailable { .. }));
        assert!(model.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_is_unavailable() {
        let model = Arc::new(ScriptedModel::new().text_failure("quota exceeded"));
        let handler = PolicyHandler::new(model, Arc::new(StaticRetriever::new(vec!["p".into()])));

        let err = handler
            .handle(&Request::fresh("policy?"), &ConversationHistory::empty())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("policy_agent"));
    }
}
