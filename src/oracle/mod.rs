//! Oracle contracts
//!
//! The core only talks to external services through these traits:
//! - `LanguageModel`: free-text and JSON-constrained generation
//! - `Retriever`: query → ranked passages
//!
//! Live adapters live in `gemini` and `retrieval`; `mock` holds scripted
//! doubles for development and tests.

use crate::error::OrchestrationError;
use crate::models::ConversationHistory;
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub mod gemini;
pub mod mock;
pub mod retrieval;

pub use gemini::GeminiClient;
pub use retrieval::{NullRetriever, VectorIndexRetriever};

/// One generation request: system instruction, optional prior exchanges, user text
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub history: ConversationHistory,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: ConversationHistory::empty(),
            user: user.into(),
        }
    }

    pub fn with_history(mut self, history: &ConversationHistory) -> Self {
        self.history = history.clone();
        self
    }
}

/// Text generation oracle
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Completion constrained to a JSON object matching `schema`
    async fn generate_json(&self, prompt: &Prompt, schema: &Value) -> Result<Value>;
}

/// Retrieval oracle over the pre-built knowledge corpus
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` passages, most relevant first. May be empty.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
}

/// A result shape the model can be asked to fill in
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Response schema in the OpenAPI subset Gemini accepts
    fn schema() -> Value;
}

/// Typed view over a `LanguageModel` for one result shape
pub struct StructuredGenerator<T> {
    model: Arc<dyn LanguageModel>,
    _shape: PhantomData<fn() -> T>,
}

impl<T: StructuredOutput> StructuredGenerator<T> {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            _shape: PhantomData,
        }
    }

    /// Either a value with every declared field, or a typed failure
    pub async fn generate(&self, prompt: &Prompt) -> Result<T> {
        let raw = self.model.generate_json(prompt, &T::schema()).await?;
        serde_json::from_value(raw).map_err(|e| {
            OrchestrationError::LlmError(format!("Structured output did not match schema: {}", e))
        })
    }
}

impl<T> Clone for StructuredGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            _shape: PhantomData,
        }
    }
}

/// Bounds every call of the wrapped oracle by `limit`
pub struct Timed<O: ?Sized> {
    inner: Arc<O>,
    limit: Duration,
}

impl<O: ?Sized> Timed<O> {
    pub fn new(inner: Arc<O>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

async fn bounded<F, T>(limit: Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>> + Send,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "Oracle call timed out");
            Err(OrchestrationError::OracleTimeout(limit))
        }
    }
}

#[async_trait]
impl<O: LanguageModel + ?Sized> LanguageModel for Timed<O> {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        bounded(self.limit, self.inner.generate(prompt)).await
    }

    async fn generate_json(&self, prompt: &Prompt, schema: &Value) -> Result<Value> {
        bounded(self.limit, self.inner.generate_json(prompt, schema)).await
    }
}

#[async_trait]
impl<O: Retriever + ?Sized> Retriever for Timed<O> {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        bounded(self.limit, self.inner.retrieve(query, top_k)).await
    }
}

/// Schema for an object whose listed fields are all required strings
pub fn string_object_schema(fields: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.to_string(), serde_json::json!({ "type": "STRING" })))
        .collect();

    serde_json::json!({
        "type": "OBJECT",
        "properties": properties,
        "required": fields,
    })
}

#[cfg(test)]
mod tests {
    use super::mock::{ScriptedModel, StaticRetriever};
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Pair {
        left: String,
        right: String,
    }

    impl StructuredOutput for Pair {
        fn schema() -> Value {
            string_object_schema(&["left", "right"])
        }
    }

    #[test]
    fn test_string_object_schema() {
        let schema = string_object_schema(&["a", "b"]);
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["a"]["type"], "STRING");
        assert_eq!(schema["required"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_structured_generator_deserializes() {
        let model = Arc::new(ScriptedModel::new().json(json!({"left": "l", "right": "r"})));
        let generator = StructuredGenerator::<Pair>::new(model.clone());

        let pair = generator.generate(&Prompt::new("sys", "user")).await.unwrap();
        assert_eq!(pair.left, "l");
        assert_eq!(pair.right, "r");

        let calls = model.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].schema.as_ref().unwrap()["required"], json!(["left", "right"]));
    }

    #[tokio::test]
    async fn test_structured_generator_reports_missing_field() {
        let model = Arc::new(ScriptedModel::new().json(json!({"left": "only"})));
        let generator = StructuredGenerator::<Pair>::new(model);

        let err = generator.generate(&Prompt::new("sys", "user")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::LlmError(_)));
    }

    #[tokio::test]
    async fn test_timed_model_expires() {
        let slow = Arc::new(
            ScriptedModel::new()
                .text("late")
                .with_delay(Duration::from_millis(500)),
        );
        let timed = Timed::new(slow, Duration::from_millis(20));

        let err = timed.generate(&Prompt::new("sys", "user")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::OracleTimeout(_)));
    }

    #[tokio::test]
    async fn test_timed_retriever_passes_through() {
        let retriever = Arc::new(StaticRetriever::new(vec!["a".into(), "b".into()]));
        let timed = Timed::new(retriever, Duration::from_secs(1));

        let passages = timed.retrieve("q", 1).await.unwrap();
        assert_eq!(passages, vec!["a".to_string()]);
    }
}
