use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use concierge_core::domain::agent::PermissionSet;
use concierge_core::errors::ToolError;
use concierge_rag::{EmbeddingPort, VectorIndex};

use super::{ParamSpec, Tool, ToolContext, ToolSchema};

const DEFAULT_TOP_K: usize = 5;

const SCHEMA: ToolSchema = ToolSchema {
    name: "search_knowledge",
    description: "Search the business knowledge base for information relevant to the \
        customer's question: product details, pricing, business hours, policies, \
        services offered, FAQs.",
    params: &[
        ParamSpec::string("query", true, "Search query derived from the customer's question"),
        ParamSpec::integer("top_k", false, "Number of passages to return (default 5)"),
    ],
};

/// Read-only retrieval over the agent's vector collection.
pub struct SearchKnowledgeTool {
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndex>,
}

impl SearchKnowledgeTool {
    pub fn new(embedder: Arc<dyn EmbeddingPort>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn schema(&self) -> &ToolSchema {
        &SCHEMA
    }

    fn is_permitted(&self, _permissions: &PermissionSet) -> bool {
        true
    }

    async fn execute(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("").trim();
        if query.is_empty() {
            return Err(ToolError::validation("`query` must not be empty"));
        }
        let top_k = args
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_TOP_K)
            .clamp(1, 20);

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| ToolError::failed(format!("query embedding failed: {e}")))?;
        let hits = self
            .index
            .search(context.agent_id, &embedding, top_k)
            .await
            .map_err(|e| ToolError::failed(format!("knowledge search failed: {e}")))?;

        if hits.is_empty() {
            return Ok(json!({
                "result_count": 0,
                "message": "No relevant information found in the knowledge base.",
            }));
        }

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "text": hit.text,
                    "section": hit.section,
                    "source": hit.filename,
                    "score": (hit.score * 1000.0).round() / 1000.0,
                })
            })
            .collect();

        Ok(json!({ "result_count": results.len(), "results": results }))
    }
}
