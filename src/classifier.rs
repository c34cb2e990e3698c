//! Request Classifier
//!
//! Maps the initial request text to a category label via the generation
//! oracle's structured output. The returned label is normalized but not
//! validated; the router decides whether it is a known category.

use crate::error::OrchestrationError;
use crate::models::{normalize_label, Category};
use crate::oracle::{LanguageModel, Prompt, StructuredGenerator, StructuredOutput};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFIER_PROMPT: &str = r#"You are an expert in sales operations with deep knowledge of sales compensation. Your job is to accurately classify customer requests into one of the following categories based on context and content, even if specific keywords are not used.

1) **policy**: Select this category if the request is related to any formal sales compensation rules or guidelines, even if the word "policy" is not mentioned. This includes topics like windfall, minimum commission guarantees, bonus structures, or leave-related questions.
   - Example: "What happens to my commission if I go on leave?" (This is about policy.)
   - Example: "Is there any guarantee for minimum commission guarantee or MCG?" (This is about policy.)
   - Example: "Can you tell me what is a windfall?" (This is about policy.)
   - Example: "What is a teaming agreement?" (This is about policy.)
   - Example: "What is a split or commission split?" (This is about policy.)

2) **commission**: Select this category if the request involves the calculation or details of the user's sales commission, such as earnings, rates, or specific deal-related inquiries.
   - Example: "How much commission will I earn on a $500,000 deal?" (This is about commission.)
   - Example: "What is the new commission rate?" (This is about commission.)

3) **contest**: Select this category if the request is about sales contests, such as rules, participation, or rewards.
   - Example: "How do I enter the Q3 sales contest?" (This is about contests.)
   - Example: "What are the rules for the upcoming contest?" (This is about contests.)

4) **ticket**: Select this category if the request involves issues or problems that need to be reported, such as system issues, payment errors, or situations where a service ticket is required.
   - Example: "I can't access my commission report." (This is about a ticket.)
   - Example: "My commission was calculated incorrectly." (This is about a ticket.)

5) **clarify**: Select this category if the request is unclear, ambiguous, or does not fit into the above categories.
   - Example: "Can you clarify your question?" (This is a request for clarification.)

Remember to consider the context and content of the request, even if specific keywords like 'policy' or 'commission' are not used.
Respond with a single field `category` holding exactly one of: policy, commission, contest, ticket, clarify."#;

/// Single-field structured result
#[derive(Debug, Deserialize)]
pub struct CategoryLabel {
    pub category: String,
}

impl StructuredOutput for CategoryLabel {
    fn schema() -> Value {
        let labels: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        json!({
            "type": "OBJECT",
            "properties": {
                "category": { "type": "STRING", "format": "enum", "enum": labels }
            },
            "required": ["category"],
        })
    }
}

pub struct Classifier {
    generator: StructuredGenerator<CategoryLabel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            generator: StructuredGenerator::new(model),
        }
    }

    pub fn instruction() -> &'static str {
        CLASSIFIER_PROMPT
    }

    /// Classify request text into a normalized label.
    ///
    /// Fails with `ClassificationError` when the oracle is unreachable or the
    /// structured result is malformed or blank.
    pub async fn classify(&self, request_text: &str) -> Result<String> {
        let prompt = Prompt::new(CLASSIFIER_PROMPT, request_text);

        let label = self.generator.generate(&prompt).await.map_err(|e| {
            warn!("Classification oracle failed: {}", e);
            OrchestrationError::ClassificationError(e.to_string())
        })?;

        let normalized = normalize_label(&label.category);
        if normalized.is_empty() {
            return Err(OrchestrationError::ClassificationError(
                "Oracle returned an empty category".to_string(),
            ));
        }

        debug!(category = %normalized, "Request classified");
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::ScriptedModel;

    fn classifier_with(model: ScriptedModel) -> (Classifier, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        (Classifier::new(model.clone()), model)
    }

    #[test]
    fn test_instruction_covers_implicit_keywords() {
        let prompt = Classifier::instruction();
        for category in Category::ALL {
            assert!(prompt.contains(&format!("**{}**", category.as_str())));
        }
        assert!(prompt.contains("windfall"));
        assert!(prompt.contains("What happens to my commission if I go on leave?"));
    }

    #[test]
    fn test_schema_constrains_labels() {
        let schema = CategoryLabel::schema();
        let allowed = schema["properties"]["category"]["enum"].as_array().unwrap();
        assert_eq!(allowed.len(), 5);
        assert!(allowed.contains(&json!("clarify")));
    }

    #[tokio::test]
    async fn test_classify_policy_request() {
        let (classifier, model) =
            classifier_with(ScriptedModel::new().json(json!({"category": "policy"})));

        let label = classifier
            .classify("What happens to my commission if I go on leave?")
            .await
            .unwrap();

        assert_eq!(label, "policy");
        let calls = model.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, CLASSIFIER_PROMPT);
        assert_eq!(calls[0].user, "What happens to my commission if I go on leave?");
    }

    #[tokio::test]
    async fn test_classify_normalizes_label() {
        let (classifier, _) =
            classifier_with(ScriptedModel::new().json(json!({"category": " \"Contest\" "})));
        assert_eq!(classifier.classify("q3 contest?").await.unwrap(), "contest");
    }

    #[tokio::test]
    async fn test_out_of_set_label_is_returned_for_routing() {
        let (classifier, _) =
            classifier_with(ScriptedModel::new().json(json!({"category": "billing"})));
        assert_eq!(classifier.classify("refund").await.unwrap(), "billing");
    }

    #[tokio::test]
    async fn test_unreachable_oracle_is_classification_error() {
        let (classifier, _) = classifier_with(ScriptedModel::new().json_failure("503"));
        let err = classifier.classify("hello").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ClassificationError(_)));
    }

    #[tokio::test]
    async fn test_malformed_or_blank_label_is_classification_error() {
        let (classifier, _) = classifier_with(
            ScriptedModel::new()
                .json(json!({"label": "policy"}))
                .json(json!({"category": "  "})),
        );
        assert!(matches!(
            classifier.classify("a").await.unwrap_err(),
            OrchestrationError::ClassificationError(_)
        ));
        assert!(matches!(
            classifier.classify("b").await.unwrap_err(),
            OrchestrationError::ClassificationError(_)
        ));
    }
}
