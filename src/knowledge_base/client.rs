use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::types::{
    ApiErrorBody, RawUpstreamResponse, RetrievalGenerationConfig, RetrieveAndGenerateRequest,
};

/// Header some gateways use to carry the error code instead of the body.
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";
const THROTTLING_CODE: &str = "ThrottlingException";
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF_MS: u64 = 20_000;
const ERROR_SNIPPET_CHARS: usize = 200;

/// Knowledge-base ids are interpolated as a single path segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The capability answered with a failure carrying an error code.
    #[error("{code}: {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed upstream response: {0}")]
    Decode(String),
}

/// Narrow seam over the managed retrieval-and-generation capability.
/// `KnowledgeBaseClient` talks to the real service; tests substitute stubs.
pub trait RetrieveGenerate {
    fn invoke(
        &self,
        config: &RetrievalGenerationConfig,
    ) -> impl Future<Output = Result<RawUpstreamResponse, InvokeError>> + Send;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeBaseClient {
    http: Client,
    base_url: String,
    api_key: Option<ApiKey>,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl KnowledgeBaseClient {
    pub fn new(
        http: Client,
        endpoint: &url::Url,
        api_key: Option<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            http,
            base_url: endpoint.as_str().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(ApiKey),
            timeout,
            max_attempts: max_attempts.max(1),
            backoff: INITIAL_BACKOFF,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str, max_attempts: u32) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Some(ApiKey("test-key".to_string())),
            timeout: Duration::from_secs(5),
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    fn url_for(&self, knowledge_base_id: &str) -> String {
        let id = utf8_percent_encode(knowledge_base_id, SEGMENT_ENCODE_SET);
        format!("{}/knowledgebases/{id}/retrieveAndGenerate", self.base_url)
    }

    async fn retrieve_and_generate(
        &self,
        config: &RetrievalGenerationConfig,
    ) -> Result<RawUpstreamResponse, InvokeError> {
        let url = self.url_for(&config.knowledge_base_id);
        let body = RetrieveAndGenerateRequest::from(config);

        let mut request = self
            .http
            .post(&url)
            .header("User-Agent", crate::USER_AGENT)
            .json(&body)
            .timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(&key.0);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let header_code = response
                .headers()
                .get(ERROR_TYPE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(normalize_code);
            let text = response.text().await.unwrap_or_default();
            let failure = upstream_failure(status, header_code, &text);
            warn!(status = %status, error = %failure, "retrieve-and-generate failed");
            return Err(failure);
        }

        let text = response.text().await?;
        let parsed = serde_json::from_str::<RawUpstreamResponse>(&text)
            .map_err(|e| InvokeError::Decode(e.to_string()))?;
        debug!(knowledge_base = %config.knowledge_base_id, "retrieve-and-generate complete");
        Ok(parsed)
    }
}

impl RetrieveGenerate for KnowledgeBaseClient {
    async fn invoke(
        &self,
        config: &RetrievalGenerationConfig,
    ) -> Result<RawUpstreamResponse, InvokeError> {
        let mut attempt = 0;
        loop {
            match self.retrieve_and_generate(config).await {
                Err(e) if is_retriable(&e) && attempt + 1 < self.max_attempts => {
                    let delay = jittered_backoff(self.backoff, attempt);
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn is_retriable(e: &InvokeError) -> bool {
    match e {
        InvokeError::Upstream { status, code, .. } => {
            *status == 429 || (500..=599).contains(status) || code == THROTTLING_CODE
        }
        _ => false,
    }
}

/// Equal jitter backoff: base/2 + rand(0, base/2), base capped at `MAX_BACKOFF_MS`.
fn jittered_backoff(initial: Duration, attempt: u32) -> Duration {
    let base = (initial.as_millis() as u64)
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(MAX_BACKOFF_MS);
    let half = base / 2;
    Duration::from_millis(half + fastrand::u64(..half.max(1)))
}

/// Strips namespace (`ns#Code`) and trailing detail (`Code:detail`) decorations.
fn normalize_code(raw: &str) -> String {
    let code = raw.rsplit('#').next().unwrap_or(raw);
    let code = code.split(':').next().unwrap_or(code);
    code.trim().to_string()
}

fn upstream_failure(status: StatusCode, header_code: Option<String>, text: &str) -> InvokeError {
    let body = serde_json::from_str::<ApiErrorBody>(text).ok();
    let (body_code, body_message) = match body {
        Some(b) => (b.code, b.message),
        None => (None, None),
    };

    let code = body_code
        .map(|c| normalize_code(&c))
        .filter(|c| !c.is_empty())
        .or(header_code.filter(|c| !c.is_empty()))
        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));

    let message = body_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let snippet: String = text.trim().chars().take(ERROR_SNIPPET_CHARS).collect();
            if snippet.is_empty() {
                format!("HTTP {status}")
            } else {
                snippet
            }
        });

    InvokeError::Upstream {
        status: status.as_u16(),
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_code_strips_decorations() {
        assert_eq!(normalize_code("AccessDeniedException"), "AccessDeniedException");
        assert_eq!(
            normalize_code("com.example.service#ValidationException"),
            "ValidationException"
        );
        assert_eq!(
            normalize_code("ResourceNotFoundException:http://internal/"),
            "ResourceNotFoundException"
        );
    }

    #[test]
    fn failure_prefers_body_code_over_header() {
        let err = upstream_failure(
            StatusCode::FORBIDDEN,
            Some("FromHeader".into()),
            r#"{"code":"AccessDeniedException","message":"nope"}"#,
        );
        match err {
            InvokeError::Upstream {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDeniedException");
                assert_eq!(message, "nope");
            }
            other => panic!("expected Upstream, got: {other:?}"),
        }
    }

    #[test]
    fn failure_falls_back_to_header_then_status() {
        let err = upstream_failure(StatusCode::BAD_REQUEST, Some("ValidationException".into()), "");
        assert!(matches!(
            err,
            InvokeError::Upstream { ref code, ref message, .. }
                if code == "ValidationException" && message.contains("400")
        ));

        let err = upstream_failure(StatusCode::BAD_GATEWAY, None, "upstream exploded");
        assert!(matches!(
            err,
            InvokeError::Upstream { ref code, ref message, .. }
                if code == "HTTP_502" && message == "upstream exploded"
        ));
    }

    #[test]
    fn failure_snippet_is_char_bounded() {
        let long = "é".repeat(500);
        match upstream_failure(StatusCode::INTERNAL_SERVER_ERROR, None, &long) {
            InvokeError::Upstream { message, .. } => {
                assert_eq!(message.chars().count(), ERROR_SNIPPET_CHARS)
            }
            other => panic!("expected Upstream, got: {other:?}"),
        }
    }

    #[test]
    fn throttling_and_server_errors_are_retriable() {
        let upstream = |status: u16, code: &str| InvokeError::Upstream {
            status,
            code: code.into(),
            message: String::new(),
        };
        assert!(is_retriable(&upstream(429, "HTTP_429")));
        assert!(is_retriable(&upstream(400, THROTTLING_CODE)));
        assert!(is_retriable(&upstream(503, "ServiceUnavailableException")));
        assert!(!is_retriable(&upstream(403, "AccessDeniedException")));
        assert!(!is_retriable(&InvokeError::Decode("bad".into())));
    }

    #[test]
    fn backoff_stays_within_equal_jitter_bounds() {
        for attempt in 0..4 {
            let d = jittered_backoff(Duration::from_millis(100), attempt).as_millis() as u64;
            let base = 100 * 2u64.pow(attempt);
            assert!(d >= base / 2 && d < base, "attempt {attempt}: {d}ms");
        }
        let capped = jittered_backoff(Duration::from_millis(100), 60).as_millis() as u64;
        assert!(capped < MAX_BACKOFF_MS);
    }

    #[test]
    fn knowledge_base_id_is_encoded_as_one_segment() {
        let client = KnowledgeBaseClient::with_base_url(Client::new(), "http://localhost:1/", 1);
        assert_eq!(
            client.url_for("kb/../x y"),
            "http://localhost:1/knowledgebases/kb%2F..%2Fx%20y/retrieveAndGenerate"
        );
    }
}
