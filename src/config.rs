use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use url::Url;

use crate::knowledge_base::prompt::DEFAULT_ANSWER_LANGUAGE;
use crate::knowledge_base::types::Guardrail;

/// Env file read before argument parsing; override with `KB_QUERY_ENV_FILE`.
const DEFAULT_ENV_FILE: &str = "param.env";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("{field} is out of range: {detail}")]
    OutOfRange {
        field: &'static str,
        detail: &'static str,
    },

    #[error("malformed env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

/// Knowledge-base HTTP query service.
///
/// Every flag can also be supplied through the environment variable shown in `--help`.
#[derive(Debug, Parser)]
#[command(name = "kb-query", version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "KB_QUERY_BIND", default_value = "0.0.0.0:5005")]
    pub bind: SocketAddr,

    /// Base URL of the retrieval-and-generation service
    #[arg(long, env = "KB_ENDPOINT")]
    pub endpoint: String,

    /// Bearer token for the retrieval-and-generation service
    #[arg(long, env = "KB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Region the knowledge base lives in
    #[arg(long, env = "AWS_REGION", default_value = "us-west-2")]
    pub region: String,

    #[arg(long, env = "KNOWLEDGE_BASE_ID")]
    pub knowledge_base_id: String,

    /// Model that writes the final answer
    #[arg(long, env = "GENERATION_MODEL_ID")]
    pub model_id: String,

    /// Guardrail applied to generation (omitted when unset)
    #[arg(long, env = "GUARDRAIL_ID")]
    pub guardrail_id: Option<String>,

    #[arg(long, env = "GUARDRAIL_VERSION", default_value = "1")]
    pub guardrail_version: String,

    /// Language the answer is written in
    #[arg(long, env = "ANSWER_LANGUAGE", default_value = DEFAULT_ANSWER_LANGUAGE)]
    pub answer_language: String,

    /// Error codes starting with this prefix are reported as upstream service errors
    #[arg(long, env = "SERVICE_ERROR_PREFIX", default_value = "Bedrock")]
    pub service_error_prefix: String,

    /// Per-request timeout for the upstream call, in seconds
    #[arg(long, env = "KB_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Attempts per upstream call, including the first (throttling and 5xx only)
    #[arg(long, env = "KB_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,
}

/// Process-wide knowledge-base settings. Read-only after startup.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseSettings {
    pub region: String,
    pub knowledge_base_id: String,
    pub model_id: String,
    pub answer_language: String,
    pub guardrail: Option<Guardrail>,
    pub service_error_prefix: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub upstream: UpstreamSettings,
    pub knowledge_base: KnowledgeBaseSettings,
}

impl Cli {
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        let endpoint = parse_endpoint(&self.endpoint)?;
        let knowledge_base_id = required(self.knowledge_base_id, "KNOWLEDGE_BASE_ID")?;
        let model_id = required(self.model_id, "GENERATION_MODEL_ID")?;
        let region = required(self.region, "AWS_REGION")?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeout_secs",
                detail: "expected at least 1 second",
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_attempts",
                detail: "expected at least 1 attempt",
            });
        }

        let guardrail = self
            .guardrail_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(|id| Guardrail {
                id,
                version: self.guardrail_version.trim().to_string(),
            });

        Ok(AppConfig {
            bind: self.bind,
            upstream: UpstreamSettings {
                endpoint,
                api_key: self.api_key,
                timeout: Duration::from_secs(self.timeout_secs),
                max_attempts: self.max_attempts,
            },
            knowledge_base: KnowledgeBaseSettings {
                region,
                knowledge_base_id,
                model_id,
                answer_language: self.answer_language.trim().to_string(),
                guardrail,
                service_error_prefix: self.service_error_prefix.trim().to_string(),
            },
        })
    }
}

impl AppConfig {
    /// Logs the resolved configuration without secrets.
    pub fn log_summary(&self) {
        info!(
            bind = %self.bind,
            endpoint = %self.upstream.endpoint,
            api_key = self.upstream.api_key.is_some(),
            timeout_secs = self.upstream.timeout.as_secs(),
            max_attempts = self.upstream.max_attempts,
            region = %self.knowledge_base.region,
            knowledge_base = %self.knowledge_base.knowledge_base_id,
            model = %self.knowledge_base.model_id,
            guardrail = ?self.knowledge_base.guardrail.as_ref().map(|g| &g.id),
            "configuration loaded"
        );
    }
}

/// Loads `KB_QUERY_ENV_FILE` (default `param.env`) into the process
/// environment. A missing file is fine; a malformed one is not.
pub fn load_env_file() -> Result<(), ConfigError> {
    let path = std::env::var("KB_QUERY_ENV_FILE").unwrap_or_else(|_| DEFAULT_ENV_FILE.into());
    match dotenvy::from_filename(&path) {
        Ok(loaded) => {
            info!(path = %loaded.display(), "loaded env file");
            Ok(())
        }
        Err(e) if e.not_found() => {
            warn!(%path, "no env file found, using process environment");
            Ok(())
        }
        Err(source) => Err(ConfigError::EnvFile { path, source }),
    }
}

fn required(value: String, name: &'static str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(value.to_string())
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        value: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(invalid("must start with http:// or https://".into())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings() -> KnowledgeBaseSettings {
        KnowledgeBaseSettings {
            region: "us-west-2".into(),
            knowledge_base_id: "KBTEST".into(),
            model_id: "test-model".into(),
            answer_language: "English".into(),
            guardrail: None,
            service_error_prefix: "Bedrock".into(),
        }
    }

    /// Parses a full flag set, replacing defaults with `overrides`.
    fn parse(overrides: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let mut flags = vec![
            ("--endpoint", "https://kb.example.com/"),
            ("--knowledge-base-id", "KB1"),
            ("--model-id", "model-1"),
            ("--region", "eu-central-1"),
        ];
        for &(flag, value) in overrides {
            match flags.iter_mut().find(|(f, _)| *f == flag) {
                Some(slot) => slot.1 = value,
                None => flags.push((flag, value)),
            }
        }
        let args =
            std::iter::once("kb-query").chain(flags.iter().flat_map(|&(f, v)| [f, v]));
        Cli::try_parse_from(args).unwrap().into_config()
    }

    #[test]
    fn resolves_explicit_flags() {
        let cfg = parse(&[("--bind", "127.0.0.1:8080"), ("--max-attempts", "5")]).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.upstream.endpoint.as_str(), "https://kb.example.com/");
        assert_eq!(cfg.upstream.max_attempts, 5);
        assert_eq!(cfg.knowledge_base.knowledge_base_id, "KB1");
        assert_eq!(cfg.knowledge_base.model_id, "model-1");
        assert_eq!(cfg.knowledge_base.region, "eu-central-1");
    }

    #[test]
    fn blank_knowledge_base_id_is_rejected() {
        let err = parse(&[("--knowledge-base-id", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KNOWLEDGE_BASE_ID")));
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let err = parse(&[("--endpoint", "ftp://kb.example.com")]).unwrap_err();
        assert!(err.to_string().contains("http://"), "got: {err}");

        let err = parse(&[("--endpoint", "not a url")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = parse(&[("--max-attempts", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn blank_guardrail_id_disables_guardrail() {
        let cfg = parse(&[("--guardrail-id", " ")]).unwrap();
        assert!(cfg.knowledge_base.guardrail.is_none());

        let cfg = parse(&[("--guardrail-id", "gr-1"), ("--guardrail-version", "3")]).unwrap();
        assert_eq!(
            cfg.knowledge_base.guardrail,
            Some(Guardrail {
                id: "gr-1".into(),
                version: "3".into(),
            })
        );
    }
}
