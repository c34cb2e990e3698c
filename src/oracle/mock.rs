//! Scripted oracles for development & testing
//! Keeps the pipeline runnable without network access and records every call.

use super::{LanguageModel, Prompt, Retriever};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One observed call to a `ScriptedModel`
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
    pub history_len: usize,
    /// Present for structured calls
    pub schema: Option<Value>,
}

/// Replays queued replies in order. Text and JSON replies are queued
/// separately; an exhausted queue is an `LlmError`.
#[derive(Default)]
pub struct ScriptedModel {
    text_replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    json_replies: Mutex<VecDeque<std::result::Result<Value, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, reply: impl Into<String>) -> Self {
        self.text_replies.get_mut().push_back(Ok(reply.into()));
        self
    }

    pub fn text_failure(mut self, message: impl Into<String>) -> Self {
        self.text_replies.get_mut().push_back(Err(message.into()));
        self
    }

    pub fn json(mut self, reply: Value) -> Self {
        self.json_replies.get_mut().push_back(Ok(reply));
        self
    }

    pub fn json_failure(mut self, message: impl Into<String>) -> Self {
        self.json_replies.get_mut().push_back(Err(message.into()));
        self
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, prompt: &Prompt, schema: Option<&Value>) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().await.push(RecordedCall {
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            history_len: prompt.history.len(),
            schema: schema.cloned(),
        });
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.record(prompt, None).await;
        match self.text_replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(OrchestrationError::LlmError(message)),
            None => Err(OrchestrationError::LlmError(
                "No scripted text reply left".to_string(),
            )),
        }
    }

    async fn generate_json(&self, prompt: &Prompt, schema: &Value) -> Result<Value> {
        self.record(prompt, Some(schema)).await;
        match self.json_replies.lock().await.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(OrchestrationError::LlmError(message)),
            None => Err(OrchestrationError::LlmError(
                "No scripted JSON reply left".to_string(),
            )),
        }
    }
}

/// Returns a fixed passage list (truncated to `top_k`) or always fails
pub struct StaticRetriever {
    passages: Vec<String>,
    fail: bool,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<String>) -> Self {
        Self {
            passages,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            passages: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub async fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        self.queries.lock().await.push((query.to_string(), top_k));
        if self.fail {
            return Err(OrchestrationError::RetrievalError(
                "index unreachable".to_string(),
            ));
        }
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}
