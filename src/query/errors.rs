use crate::config::KnowledgeBaseSettings;
use crate::knowledge_base::InvokeError;

/// Category of a failure reported by the retrieval-and-generation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    PermissionDenied,
    InvalidRequest,
    AuthenticationFailed,
    NotFound,
    ServiceError,
    Unknown,
}

/// Codes with a dedicated category. Anything else falls through to the
/// service-namespace check in [`classify_code`].
const KNOWN_CODES: &[(&str, UpstreamErrorKind)] = &[
    ("AccessDeniedException", UpstreamErrorKind::PermissionDenied),
    ("ValidationException", UpstreamErrorKind::InvalidRequest),
    ("UnrecognizedClientException", UpstreamErrorKind::AuthenticationFailed),
    ("InvalidSignatureException", UpstreamErrorKind::AuthenticationFailed),
    ("ExpiredTokenException", UpstreamErrorKind::AuthenticationFailed),
    ("ResourceNotFoundException", UpstreamErrorKind::NotFound),
];

pub fn classify_code(code: &str, service_prefix: &str) -> UpstreamErrorKind {
    KNOWN_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, kind)| *kind)
        .unwrap_or_else(|| {
            if !service_prefix.is_empty() && code.starts_with(service_prefix) {
                UpstreamErrorKind::ServiceError
            } else {
                UpstreamErrorKind::Unknown
            }
        })
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Permissions error: access denied. {message}")]
    PermissionDenied { code: String, message: String },

    #[error(
        "Validation error: check the generation model id ({model_id}) or request parameters. {message}"
    )]
    InvalidRequest {
        code: String,
        message: String,
        model_id: String,
    },

    #[error("Credentials error: invalid security token. {message}")]
    AuthenticationFailed { code: String, message: String },

    #[error("Knowledge base not found: {knowledge_base_id}. {message}")]
    NotFound {
        code: String,
        message: String,
        knowledge_base_id: String,
    },

    #[error("Upstream service error: {code} - {message}")]
    UpstreamService { code: String, message: String },

    #[error("Upstream API error: {code} - {message}")]
    UnknownUpstream { code: String, message: String },

    #[error("Internal server error processing knowledge base query: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn from_upstream(code: String, message: String, settings: &KnowledgeBaseSettings) -> Self {
        match classify_code(&code, &settings.service_error_prefix) {
            UpstreamErrorKind::PermissionDenied => QueryError::PermissionDenied { code, message },
            UpstreamErrorKind::InvalidRequest => QueryError::InvalidRequest {
                code,
                message,
                model_id: settings.model_id.clone(),
            },
            UpstreamErrorKind::AuthenticationFailed => {
                QueryError::AuthenticationFailed { code, message }
            }
            UpstreamErrorKind::NotFound => QueryError::NotFound {
                code,
                message,
                knowledge_base_id: settings.knowledge_base_id.clone(),
            },
            UpstreamErrorKind::ServiceError => QueryError::UpstreamService { code, message },
            UpstreamErrorKind::Unknown => QueryError::UnknownUpstream { code, message },
        }
    }

    /// Maps a client failure. Only upstream-reported failures keep their
    /// details; everything else is reduced to a summary.
    pub fn from_invoke(err: InvokeError, settings: &KnowledgeBaseSettings) -> Self {
        match err {
            InvokeError::Upstream { code, message, .. } => {
                Self::from_upstream(code, message, settings)
            }
            InvokeError::Network(e) if e.is_timeout() => {
                QueryError::Internal("upstream request timed out".into())
            }
            InvokeError::Network(e) if e.is_connect() => {
                QueryError::Internal("could not connect to the upstream service".into())
            }
            InvokeError::Network(_) => QueryError::Internal("upstream request failed".into()),
            InvokeError::Decode(_) => {
                QueryError::Internal("upstream returned a malformed response".into())
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::InvalidInput(_) => "InvalidInput",
            QueryError::PermissionDenied { .. } => "PermissionDenied",
            QueryError::InvalidRequest { .. } => "InvalidRequest",
            QueryError::AuthenticationFailed { .. } => "AuthenticationFailed",
            QueryError::NotFound { .. } => "NotFound",
            QueryError::UpstreamService { .. } => "UpstreamServiceError",
            QueryError::UnknownUpstream { .. } => "UnknownUpstreamError",
            QueryError::Internal(_) => "InternalError",
        }
    }

    pub fn upstream_code(&self) -> Option<&str> {
        match self {
            QueryError::PermissionDenied { code, .. }
            | QueryError::InvalidRequest { code, .. }
            | QueryError::AuthenticationFailed { code, .. }
            | QueryError::NotFound { code, .. }
            | QueryError::UpstreamService { code, .. }
            | QueryError::UnknownUpstream { code, .. } => Some(code),
            QueryError::InvalidInput(_) | QueryError::Internal(_) => None,
        }
    }
}
