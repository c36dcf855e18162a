use std::sync::Arc;

use async_trait::async_trait;
use indoc::indoc;
use serde_json::json;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::retrieval::Retriever;

/// Name used when collecting document context from an agent run
pub const SEARCH_DOCUMENTS_TOOL: &str = "search_documents";

/// Retrieval-augmented document search bound to the agent.
///
/// Unlike the CRM tools, retrieval failures are returned as errors: the agent
/// loop turns them into an observation at the tool boundary.
pub struct DocumentSystem {
    retriever: Arc<Retriever>,
    top_k: usize,
    tools: Vec<Tool>,
}

impl DocumentSystem {
    pub fn new(retriever: Arc<Retriever>, top_k: usize) -> Self {
        let tools = vec![Tool::new(
            SEARCH_DOCUMENTS_TOOL,
            "Útil para buscar información en documentos. Devuelve el contexto relevante para responder una pregunta.",
            json!({
                "type": "object",
                "properties": {
                    "consulta": {
                        "type": "string",
                        "description": "La pregunta a responder con los documentos"
                    }
                },
                "required": ["consulta"]
            }),
        )];

        Self {
            retriever,
            top_k,
            tools,
        }
    }
}

#[async_trait]
impl System for DocumentSystem {
    fn name(&self) -> &str {
        "documents"
    }

    fn description(&self) -> &str {
        "Búsqueda de contexto en los documentos indexados"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Usa search_documents cuando la consulta pueda responderse con la
            documentación indexada. Cita el contexto devuelto, no lo inventes.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            SEARCH_DOCUMENTS_TOOL => {
                let consulta = tool_call.arguments["consulta"]
                    .as_str()
                    .ok_or_else(|| {
                        AgentError::InvalidParameters("'consulta' must be a string".to_string())
                    })?;

                let context = self
                    .retriever
                    .search_context(consulta, self.top_k)
                    .await
                    .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

                Ok(vec![Content::text(context)])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{DocumentChunk, Embedder, Scorer, VectorSearch, NO_CONTEXT_FOUND};
    use anyhow::Result;

    struct StubEmbedder;
    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }
    }

    struct StubSearch(Vec<DocumentChunk>);
    #[async_trait]
    impl VectorSearch for StubSearch {
        async fn similar(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<DocumentChunk>> {
            Ok(self.0.clone())
        }
    }

    struct StubScorer(Vec<f32>);
    #[async_trait]
    impl Scorer for StubScorer {
        async fn score(&self, _query: &str, _candidates: &[String]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn system(chunks: Vec<DocumentChunk>, scores: Vec<f32>) -> DocumentSystem {
        let retriever = Retriever::new(
            Arc::new(StubEmbedder),
            Arc::new(StubSearch(chunks)),
            Arc::new(StubScorer(scores)),
        );
        DocumentSystem::new(Arc::new(retriever), 10)
    }

    #[tokio::test]
    async fn test_search_documents_returns_context() {
        let system = system(
            vec![DocumentChunk {
                texto: "las ventas subieron".to_string(),
                relevance_score: None,
            }],
            vec![0.9],
        );

        let output = system
            .call(ToolCall::new(
                SEARCH_DOCUMENTS_TOOL,
                json!({"consulta": "ventas"}),
            ))
            .await
            .unwrap();
        assert_eq!(output[0].as_text(), Some("las ventas subieron"));
    }

    #[tokio::test]
    async fn test_search_documents_empty_index() {
        let system = system(vec![], vec![]);
        let output = system
            .call(ToolCall::new(
                SEARCH_DOCUMENTS_TOOL,
                json!({"consulta": "ventas"}),
            ))
            .await
            .unwrap();
        assert_eq!(output[0].as_text(), Some(NO_CONTEXT_FOUND));
    }

    #[tokio::test]
    async fn test_missing_consulta_is_invalid_parameters() {
        let system = system(vec![], vec![]);
        let result = system
            .call(ToolCall::new(SEARCH_DOCUMENTS_TOOL, json!({})))
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let system = system(vec![], vec![]);
        let result = system.call(ToolCall::new("nope", json!({}))).await;
        assert!(matches!(result, Err(AgentError::ToolNotFound(_))));
    }
}
