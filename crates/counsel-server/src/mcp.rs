// crates/counsel-server/src/mcp.rs
// MCP server surface: deliberate + query_decisions over stdio

use crate::deliberation::DeliberationEngine;
use crate::graph::QueryEngine;
use counsel_types::DeliberateRequest;
use rmcp::{
    ErrorData, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Graph query request. Exactly one of `query_text`,
/// `find_contradictions`, or `decision_id` must be provided.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryDecisionsRequest {
    #[schemars(description = "Free-text query to find similar past decisions")]
    pub query_text: Option<String>,
    #[schemars(description = "Set true to scan for contradicting decisions")]
    pub find_contradictions: Option<bool>,
    #[schemars(description = "Fetch one decision (with stances) by id")]
    pub decision_id: Option<String>,
    #[schemars(description = "Max results (default 10)")]
    pub limit: Option<usize>,
    #[schemars(description = "Output format: summary|detailed|json|table")]
    pub format: Option<String>,
}

/// MCP server state.
#[derive(Clone)]
pub struct CounselServer {
    pub engine: Arc<DeliberationEngine>,
    pub query: Option<Arc<QueryEngine>>,
    tool_router: ToolRouter<Self>,
}

impl CounselServer {
    pub fn new(engine: Arc<DeliberationEngine>, query: Option<Arc<QueryEngine>>) -> Self {
        Self {
            engine,
            query,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl CounselServer {
    #[tool(
        description = "Run a multi-round deliberation among AI models and return the structured result (summary, votes, convergence)."
    )]
    async fn deliberate(
        &self,
        Parameters(req): Parameters<DeliberateRequest>,
    ) -> Result<String, String> {
        let result = self.engine.execute(req).await.map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
    }

    #[tool(
        description = "Query the decision graph: find similar past decisions, detect contradictions, or fetch one decision by id. Exactly one selector must be given."
    )]
    async fn query_decisions(
        &self,
        Parameters(req): Parameters<QueryDecisionsRequest>,
    ) -> Result<String, String> {
        let query = self
            .query
            .as_ref()
            .ok_or("decision graph is disabled in this server's configuration")?;

        let selectors = [
            req.query_text.is_some(),
            req.find_contradictions.unwrap_or(false),
            req.decision_id.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if selectors != 1 {
            return Err(
                "provide exactly one of query_text, find_contradictions, or decision_id".into(),
            );
        }

        let limit = req.limit.unwrap_or(10);
        let format = req.format.as_deref().unwrap_or("summary");

        if let Some(text) = &req.query_text {
            let results = query
                .search_similar(text, limit, None)
                .await
                .map_err(|e| e.to_string())?;
            return render_similar(&results, format).map_err(|e| e.to_string());
        }

        if req.find_contradictions.unwrap_or(false) {
            let contradictions = query
                .find_contradictions(0.5)
                .await
                .map_err(|e| e.to_string())?;
            return serde_json::to_string_pretty(&contradictions).map_err(|e| e.to_string());
        }

        let id = req.decision_id.as_deref().unwrap_or_default();
        let detail = query
            .get_decision_detail(id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("decision '{id}' not found"))?;
        serde_json::to_string_pretty(&detail).map_err(|e| e.to_string())
    }
}

fn render_similar(
    results: &[crate::graph::SimilarResult],
    format: &str,
) -> serde_json::Result<String> {
    match format {
        "json" | "detailed" => serde_json::to_string_pretty(results),
        "table" => {
            let mut out = String::from("| score | question | consensus |\n|---|---|---|\n");
            for r in results {
                out.push_str(&format!(
                    "| {:.2} | {} | {} |\n",
                    r.score, r.decision.question, r.decision.consensus
                ));
            }
            Ok(out)
        }
        // summary: minimal fields only
        _ => {
            let minimal: Vec<_> = results
                .iter()
                .map(|r| {
                    json!({
                        "id": r.decision.id,
                        "question": r.decision.question,
                        "consensus": r.decision.consensus,
                        "score": r.score,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&minimal)
        }
    }
}

impl ServerHandler for CounselServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "counsel".into(),
                title: Some("Counsel - Multi-Model Deliberation Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Counsel orchestrates structured debates among AI models and remembers \
                 past decisions in a queryable decision graph."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let tcc = ToolCallContext::new(self, request, context);
            self.tool_router.call(tcc).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_discriminators() {
        let req: QueryDecisionsRequest = serde_json::from_str(
            r#"{"query_text": "rust backend", "limit": 5}"#,
        )
        .unwrap();
        assert_eq!(req.query_text.as_deref(), Some("rust backend"));
        assert!(req.decision_id.is_none());
        assert!(req.find_contradictions.is_none());
    }

    #[test]
    fn test_render_similar_table() {
        let results = vec![];
        let out = render_similar(&results, "table").unwrap();
        assert!(out.starts_with("| score |"));
    }
}
