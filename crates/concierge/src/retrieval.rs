use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Fixed reply when the similarity search returns no candidates
pub const NO_CONTEXT_FOUND: &str = "No se encontró contexto relevante en los documentos.";

/// How many chunks survive re-ranking
const RERANK_KEEP: usize = 3;

/// A candidate document chunk returned by the similarity search.
/// The relevance score is attached once, after re-ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub texto: String,
    #[serde(default)]
    pub relevance_score: Option<f32>,
}

/// Converts text into a fixed-size embedding vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Returns up to top_k nearest document chunks for a query vector
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn similar(&self, vector: &[f32], top_k: usize) -> Result<Vec<DocumentChunk>>;
}

/// Cross-encoder scoring of (query, candidate) pairs, one score per candidate
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>>;
}

/// The context retrieval and re-ranking pipeline:
/// embed -> similarity RPC -> cross-encoder score -> sort -> top-3 -> concat.
///
/// Errors from any stage propagate to the tool boundary, where the agent
/// loop converts them into an observation for the model.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn VectorSearch>,
    scorer: Arc<dyn Scorer>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn VectorSearch>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            embedder,
            search,
            scorer,
        }
    }

    pub async fn search_context(&self, query: &str, top_k: usize) -> Result<String> {
        tracing::info!(query, top_k, "retrieving document context");

        let vector = self.embedder.embed(query).await?;
        let mut chunks = self.search.similar(&vector, top_k).await?;

        if chunks.is_empty() {
            return Ok(NO_CONTEXT_FOUND.to_string());
        }

        let candidates: Vec<String> = chunks.iter().map(|c| c.texto.clone()).collect();
        let scores = self.scorer.score(query, &candidates).await?;
        if scores.len() != chunks.len() {
            return Err(anyhow!(
                "Scorer returned {} scores for {} candidates",
                scores.len(),
                chunks.len()
            ));
        }

        for (chunk, score) in chunks.iter_mut().zip(scores) {
            chunk.relevance_score = Some(score);
        }

        chunks.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        chunks.truncate(RERANK_KEEP);

        Ok(chunks.into_iter().map(|c| c.texto).collect())
    }
}

/// Embedding client over the hosted Gemini `embedContent` endpoint
pub struct GeminiEmbedder {
    client: Client,
    host: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(host: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            client,
            host,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.host.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({"content": {"parts": [{"text": text}]}}))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let values = body["embedding"]["values"]
            .as_array()
            .ok_or_else(|| anyhow!("No embedding values in response"))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Non-numeric embedding value"))
            })
            .collect()
    }
}

/// Similarity search against a managed backend exposed as a PostgREST RPC
pub struct RpcVectorSearch {
    client: Client,
    base_url: String,
    api_key: String,
    function: String,
}

impl RpcVectorSearch {
    pub fn new(base_url: String, api_key: String, function: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            function,
        })
    }
}

#[async_trait]
impl VectorSearch for RpcVectorSearch {
    async fn similar(&self, vector: &[f32], top_k: usize) -> Result<Vec<DocumentChunk>> {
        let url = format!(
            "{}/rest/v1/rpc/{}",
            self.base_url.trim_end_matches('/'),
            self.function
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({"query": vector, "top_k": top_k}))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// Re-ranking client over a hosted cross-encoder scoring endpoint
pub struct HttpScorer {
    client: Client,
    url: String,
}

impl HttpScorer {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({"query": query, "candidates": candidates}))
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let scores = body["scores"]
            .as_array()
            .ok_or_else(|| anyhow!("No scores in response"))?;

        scores
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Non-numeric score"))
            })
            .collect()
    }
}
