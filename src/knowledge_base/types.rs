use serde::{Deserialize, Serialize};

/// Generation parameters sent with every retrieve-and-generate call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guardrail {
    pub id: String,
    pub version: String,
}

/// Everything the upstream capability needs for one query. Built per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalGenerationConfig {
    pub query: String,
    pub knowledge_base_id: String,
    pub model_id: String,
    pub number_of_results: u32,
    pub inference: InferenceParams,
    pub prompt_template: String,
    pub guardrail: Option<Guardrail>,
}

// --- outbound wire format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateRequest<'a> {
    pub input: Input<'a>,
    pub retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration<'a>,
}

#[derive(Debug, Serialize)]
pub struct Input<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateConfiguration<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub knowledge_base_configuration: KnowledgeBaseConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfiguration<'a> {
    pub knowledge_base_id: &'a str,
    pub model_arn: &'a str,
    pub retrieval_configuration: RetrievalConfiguration,
    pub generation_configuration: GenerationConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfiguration {
    pub vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchConfiguration {
    pub number_of_results: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfiguration<'a> {
    pub inference_config: InferenceConfig,
    pub prompt_template: PromptTemplate<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_configuration: Option<GuardrailConfiguration<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub text_inference_config: TextInferenceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate<'a> {
    pub text_prompt_template: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfiguration<'a> {
    pub guardrail_id: &'a str,
    pub guardrail_version: &'a str,
}

impl<'a> From<&'a RetrievalGenerationConfig> for RetrieveAndGenerateRequest<'a> {
    fn from(config: &'a RetrievalGenerationConfig) -> Self {
        Self {
            input: Input {
                text: &config.query,
            },
            retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration {
                kind: "KNOWLEDGE_BASE",
                knowledge_base_configuration: KnowledgeBaseConfiguration {
                    knowledge_base_id: &config.knowledge_base_id,
                    model_arn: &config.model_id,
                    retrieval_configuration: RetrievalConfiguration {
                        vector_search_configuration: VectorSearchConfiguration {
                            number_of_results: config.number_of_results,
                        },
                    },
                    generation_configuration: GenerationConfiguration {
                        inference_config: InferenceConfig {
                            text_inference_config: TextInferenceConfig {
                                max_tokens: config.inference.max_tokens,
                                temperature: config.inference.temperature,
                                top_p: config.inference.top_p,
                            },
                        },
                        prompt_template: PromptTemplate {
                            text_prompt_template: &config.prompt_template,
                        },
                        guardrail_configuration: config.guardrail.as_ref().map(|g| {
                            GuardrailConfiguration {
                                guardrail_id: &g.id,
                                guardrail_version: &g.version,
                            }
                        }),
                    },
                },
            },
        }
    }
}

// --- inbound wire format ---

/// Successful retrieve-and-generate payload. Every field is optional upstream.
#[derive(Debug, Default, Deserialize)]
pub struct RawUpstreamResponse {
    pub output: Option<Output>,
    pub citations: Option<Vec<Citation>>,
}

#[derive(Debug, Deserialize)]
pub struct Output {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub retrieved_references: Option<Vec<RetrievedReference>>,
}

#[derive(Debug, Deserialize)]
pub struct RetrievedReference {
    pub content: Option<ReferenceContent>,
    pub location: Option<ReferenceLocation>,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceContent {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLocation {
    pub s3_location: Option<S3Location>,
}

#[derive(Debug, Deserialize)]
pub struct S3Location {
    pub uri: Option<String>,
}

/// Structured failure body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(alias = "__type")]
    pub code: Option<String>,
    #[serde(alias = "Message")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(guardrail: Option<Guardrail>) -> RetrievalGenerationConfig {
        RetrievalGenerationConfig {
            query: "What is the minimum ceiling height?".into(),
            knowledge_base_id: "KB123".into(),
            model_id: "model-x".into(),
            number_of_results: 2,
            inference: InferenceParams::default(),
            prompt_template: "template $search_results$".into(),
            guardrail,
        }
    }

    #[test]
    fn request_serializes_camel_case_layout() {
        let cfg = config(None);
        let json = serde_json::to_value(RetrieveAndGenerateRequest::from(&cfg)).unwrap();

        assert_eq!(json["input"]["text"], "What is the minimum ceiling height?");
        let kb = &json["retrieveAndGenerateConfiguration"];
        assert_eq!(kb["type"], "KNOWLEDGE_BASE");
        let kb = &kb["knowledgeBaseConfiguration"];
        assert_eq!(kb["knowledgeBaseId"], "KB123");
        assert_eq!(kb["modelArn"], "model-x");
        assert_eq!(
            kb["retrievalConfiguration"]["vectorSearchConfiguration"]["numberOfResults"],
            2
        );
        let inference = &kb["generationConfiguration"]["inferenceConfig"]["textInferenceConfig"];
        assert_eq!(inference["maxTokens"], 1000);
        assert!((inference["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!((inference["topP"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(
            kb["generationConfiguration"]["promptTemplate"]["textPromptTemplate"],
            "template $search_results$"
        );
        assert!(kb["generationConfiguration"].get("guardrailConfiguration").is_none());
    }

    #[test]
    fn request_includes_guardrail_when_set() {
        let cfg = config(Some(Guardrail {
            id: "gr-1".into(),
            version: "2".into(),
        }));
        let json = serde_json::to_value(RetrieveAndGenerateRequest::from(&cfg)).unwrap();
        let guardrail = &json["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"]
            ["generationConfiguration"]["guardrailConfiguration"];
        assert_eq!(guardrail["guardrailId"], "gr-1");
        assert_eq!(guardrail["guardrailVersion"], "2");
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let body: RawUpstreamResponse = serde_json::from_str("{}").unwrap();
        assert!(body.output.is_none());
        assert!(body.citations.is_none());

        let body: RawUpstreamResponse = serde_json::from_value(serde_json::json!({
            "output": {},
            "citations": [{"retrievedReferences": [{"content": {}, "location": {"s3Location": {}}}]}]
        }))
        .unwrap();
        assert!(body.output.unwrap().text.is_none());
        let refs = body.citations.unwrap().remove(0).retrieved_references.unwrap();
        assert!(refs[0].content.as_ref().unwrap().text.is_none());
    }

    #[test]
    fn error_body_accepts_type_and_capitalized_message() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"__type":"AccessDeniedException","Message":"not allowed"}"#,
        )
        .unwrap();
        assert_eq!(body.code.as_deref(), Some("AccessDeniedException"));
        assert_eq!(body.message.as_deref(), Some("not allowed"));
    }
}
