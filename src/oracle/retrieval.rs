//! Retrieval oracle adapters
//!
//! `VectorIndexRetriever` embeds the query with Gemini and queries a hosted
//! vector index over REST; passages come from each match's `metadata.text`.

use super::{GeminiClient, Retriever};
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct VectorIndexRetriever {
    client: Client,
    host: String,
    api_key: String,
    namespace: String,
    embedder: Arc<GeminiClient>,
}

impl VectorIndexRetriever {
    /// `None` when no index host is configured
    pub fn from_config(config: &AgentConfig, embedder: Arc<GeminiClient>) -> Result<Option<Self>> {
        let Some(host) = config.vector_index_host.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(config.oracle_timeout)
            .build()?;

        Ok(Some(Self {
            client,
            host,
            api_key: config.vector_index_api_key.clone().unwrap_or_default(),
            namespace: config.vector_index_namespace.clone(),
            embedder,
        }))
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let vector = self.embedder.embed(query).await?;

        let body = QueryRequest {
            vector,
            top_k,
            namespace: &self.namespace,
            include_metadata: true,
        };

        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Vector index request failed: {}", e);
                OrchestrationError::RetrievalError(format!("Vector index request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::RetrievalError(format!(
                "Vector index returned {}: {}",
                status, text
            )));
        }

        let parsed: QueryResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            OrchestrationError::RetrievalError(format!("Invalid vector index response: {}", e))
        })?;

        let passages = passages_from(parsed);
        debug!(count = passages.len(), top_k, "Retrieved passages");
        Ok(passages)
    }
}

/// Used when no index is configured; policy answers go ungrounded
pub struct NullRetriever;

#[async_trait]
impl Retriever for NullRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<String>> {
        debug!("No vector index configured, returning no passages");
        Ok(Vec::new())
    }
}

fn passages_from(response: QueryResponse) -> Vec<String> {
    response
        .matches
        .into_iter()
        .filter_map(|m| m.metadata.and_then(|md| md.text))
        .filter(|text| !text.trim().is_empty())
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    metadata: Option<MatchMetadata>,
}

#[derive(Debug, Deserialize)]
struct MatchMetadata {
    text: Option<String>,
}
