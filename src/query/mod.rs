//! Knowledge-base query orchestration: build the retrieval-and-generation
//! request, call the capability, reshape the answer and its citations.

pub mod errors;
mod extract;

pub use errors::QueryError;
pub use extract::extract_query_result;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::KnowledgeBaseSettings;
use crate::knowledge_base::RetrieveGenerate;
use crate::knowledge_base::prompt::answer_template;
use crate::knowledge_base::types::{InferenceParams, RetrievalGenerationConfig};

/// Substituted for any field the capability leaves out.
pub const NOT_AVAILABLE: &str = "N/A";
pub const DEFAULT_MAX_RESULTS: i64 = 3;

fn default_max_results() -> i64 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Number of passages to retrieve (default: 3)
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationRecord {
    pub content_snippet: String,
    pub source_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub citations: Vec<CitationRecord>,
}

/// Stateless between calls: holds only read-only settings and the client.
#[derive(Debug)]
pub struct QueryOrchestrator<C> {
    client: C,
    settings: KnowledgeBaseSettings,
    prompt_template: String,
}

impl<C: RetrieveGenerate> QueryOrchestrator<C> {
    pub fn new(client: C, settings: KnowledgeBaseSettings) -> Self {
        let prompt_template = answer_template(&settings.answer_language);
        Self {
            client,
            settings,
            prompt_template,
        }
    }

    pub fn build_config(&self, query: &str, number_of_results: u32) -> RetrievalGenerationConfig {
        RetrievalGenerationConfig {
            query: query.to_string(),
            knowledge_base_id: self.settings.knowledge_base_id.clone(),
            model_id: self.settings.model_id.clone(),
            number_of_results,
            inference: InferenceParams::default(),
            prompt_template: self.prompt_template.clone(),
            guardrail: self.settings.guardrail.clone(),
        }
    }

    pub async fn handle_query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        info!(query = %request.query, max_results = request.max_results, "knowledge base query received");

        let number_of_results = validate(&request).inspect_err(|e| {
            warn!(kind = e.kind(), detail = %e, "knowledge base query rejected");
        })?;
        let config = self.build_config(&request.query, number_of_results);

        info!(
            knowledge_base = %self.settings.knowledge_base_id,
            region = %self.settings.region,
            model = %self.settings.model_id,
            number_of_results,
            guardrail = self.settings.guardrail.is_some(),
            "resolved retrieve-and-generate configuration"
        );

        match self.client.invoke(&config).await {
            Ok(response) => {
                let result = extract_query_result(response);
                info!(citations = result.citations.len(), "knowledge base query succeeded");
                Ok(result)
            }
            Err(err) => {
                error!(error = %err, "retrieve-and-generate call failed");
                let classified = QueryError::from_invoke(err, &self.settings);
                error!(
                    kind = classified.kind(),
                    code = classified.upstream_code().unwrap_or("-"),
                    detail = %classified,
                    "knowledge base query failed"
                );
                Err(classified)
            }
        }
    }
}

fn validate(request: &QueryRequest) -> Result<u32, QueryError> {
    if request.query.trim().is_empty() {
        return Err(QueryError::InvalidInput("query must not be empty".into()));
    }
    u32::try_from(request.max_results)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            QueryError::InvalidInput(format!(
                "max_results must be a positive integer, got {}",
                request.max_results
            ))
        })
}
