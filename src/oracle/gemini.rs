//! Gemini API client
//!
//! Backs both the generation oracle (free text and JSON-constrained output)
//! and the query embedding used by retrieval.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, Prompt};
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::models::Role;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.oracle_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.clone(),
            model: config.gemini_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    fn ensure_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        model: &str,
        body: &B,
    ) -> Result<R> {
        self.ensure_key()?;

        let url = format!("{}/models/{}:{}", self.base_url, model, action);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        response.json::<R>().await.map_err(|e| {
            let e = e.without_url();
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })
    }

    async fn complete(&self, prompt: &Prompt, schema: Option<&Value>) -> Result<String> {
        let request = build_request(prompt, schema);

        debug!(
            model = %self.model,
            structured = schema.is_some(),
            history = prompt.history.len(),
            "Calling Gemini generateContent"
        );

        let response: GeminiResponse = self.post("generateContent", &self.model, &request).await?;
        let answer = first_candidate_text(&response)?;

        info!(
            finish_reason = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("unknown"),
            "Gemini response received"
        );

        Ok(answer)
    }

    /// Embed a query for vector search
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let response: EmbedResponse = self
            .post("embedContent", &self.embedding_model, &request)
            .await?;

        if response.embedding.values.is_empty() {
            return Err(OrchestrationError::LlmError(
                "Gemini returned an empty embedding".to_string(),
            ));
        }

        Ok(response.embedding.values)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.complete(prompt, None).await
    }

    async fn generate_json(&self, prompt: &Prompt, schema: &Value) -> Result<Value> {
        let text = self.complete(prompt, Some(schema)).await?;
        serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            OrchestrationError::LlmError(format!("Gemini returned non-JSON output: {}", e))
        })
    }
}

fn build_request(prompt: &Prompt, schema: Option<&Value>) -> GeminiRequest {
    let mut contents: Vec<Content> = prompt
        .history
        .messages()
        .iter()
        .map(|m| Content {
            role: Some(gemini_role(m.role).to_string()),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    contents.push(Content {
        role: Some("user".to_string()),
        parts: vec![Part {
            text: prompt.user.clone(),
        }],
    });

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type: schema.map(|_| "application/json".to_string()),
            response_schema: schema.cloned(),
        },
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: prompt.system.clone(),
            }],
        },
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn first_candidate_text(response: &GeminiResponse) -> Result<String> {
    response
        .candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .map(|p| p.text.clone())
        .ok_or_else(|| OrchestrationError::LlmError("Empty response from Gemini".to_string()))
}

/// Models occasionally wrap JSON in a ```json fence even in JSON mode
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationHistory, HistoryMessage};
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let history = ConversationHistory::new(vec![
            HistoryMessage {
                role: Role::User,
                content: "hi".into(),
            },
            HistoryMessage {
                role: Role::Assistant,
                content: "hello".into(),
            },
        ]);
        let prompt = Prompt::new("You are a guide", "What is a windfall?").with_history(&history);

        let json = serde_json::to_value(build_request(&prompt, None)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a guide");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "What is a windfall?");
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_structured_request_carries_schema() {
        let schema = json!({"type": "OBJECT"});
        let json = serde_json::to_value(build_request(&Prompt::new("s", "u"), Some(&schema))).unwrap();

        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"], schema);
    }

    #[test]
    fn test_response_parsing() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "answer"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3}
        }))
        .unwrap();

        assert_eq!(first_candidate_text(&response).unwrap(), "answer");
        assert_eq!(response.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_empty_candidates_is_error() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(first_candidate_text(&response).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = AgentConfig::from_lookup(|_| None).unwrap();
        let client = GeminiClient::new(&config).unwrap();

        let err = client.generate(&Prompt::new("s", "u")).await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_transport_error_omits_api_key() {
        let config = AgentConfig::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("SECRETKEY123".to_string()),
            "GEMINI_BASE_URL" => Some("http://127.0.0.1:1".to_string()),
            _ => None,
        })
        .unwrap();
        let client = GeminiClient::new(&config).unwrap();

        let err = client.generate(&Prompt::new("s", "u")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::LlmError(_)));
        assert!(!err.to_string().contains("SECRETKEY123"));
        assert!(!err.to_string().contains("127.0.0.1"));
    }
}
