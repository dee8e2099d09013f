//! Error types for the deepbrief research core.
//!
//! Uses `thiserror` for public API error types. Most of these never reach the
//! caller of [`ResearchEngine::run`](crate::research::ResearchEngine::run):
//! pipeline stages catch them and route into their degrade paths. They
//! surface only at the fallible edges (configuration, provider construction,
//! cache maintenance).

use crate::budget::ProviderClass;
use std::path::PathBuf;

/// Top-level error type for the deepbrief core library.
#[derive(Debug, thiserror::Error)]
pub enum DeepBriefError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the external knowledge providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    ApiRequest { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} response parse error: {message}")]
    ResponseParse { provider: String, message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by {provider}, retry after {retry_after_secs}s")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    #[error("{class} call timed out after {timeout_ms}ms")]
    Timeout {
        class: ProviderClass,
        timeout_ms: u64,
    },
}

/// Failure to pull a structured payload out of model output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no {expected} found in model output")]
    NoPayload { expected: &'static str },

    #[error("malformed payload: {message}")]
    Malformed { message: String },

    #[error("payload parsed but contained no usable {what}")]
    Empty { what: &'static str },
}

/// Errors from the cache storage layer.
///
/// The gateway logs these and degrades to a miss; they are returned only by
/// maintenance operations such as [`CacheGateway::clear`](crate::cache::CacheGateway::clear).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache payload could not be encoded: {message}")]
    Encode { message: String },

    #[error("Cache store lock poisoned")]
    Poisoned,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Why a gated provider call did not produce a response.
///
/// `BudgetExhausted` and `DeadlineExceeded` are routing signals rather than
/// faults: the caller takes its cheaper branch.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("{0} budget exhausted")]
    BudgetExhausted(ProviderClass),

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl CallError {
    /// Whether this outcome is a budget or deadline signal rather than a fault.
    pub fn is_routing_signal(&self) -> bool {
        matches!(self, Self::BudgetExhausted(_) | Self::DeadlineExceeded)
    }
}

/// Why a synthesis tier gave up and handed over to the next one.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("provider call failed: {0}")]
    Call(#[from] CallError),

    #[error("structured report could not be parsed: {0}")]
    Parse(#[from] ParseError),

    #[error("no narrative text available to segment")]
    NoNarrative,
}

/// A type alias for results using the top-level `DeepBriefError`.
pub type Result<T> = std::result::Result<T, DeepBriefError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_provider() {
        let err = DeepBriefError::Provider(ProviderError::ApiRequest {
            provider: "tavily".into(),
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "Provider error: tavily request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = ProviderError::Timeout {
            class: ProviderClass::Answer,
            timeout_ms: 60_000,
        };
        assert_eq!(err.to_string(), "answer call timed out after 60000ms");
    }

    #[test]
    fn test_error_display_config() {
        let err = DeepBriefError::Config(ConfigError::EnvVarMissing {
            var: "TAVILY_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: TAVILY_API_KEY"
        );
    }

    #[test]
    fn test_call_error_routing_signal() {
        assert!(CallError::BudgetExhausted(ProviderClass::Search).is_routing_signal());
        assert!(CallError::DeadlineExceeded.is_routing_signal());

        let fault = CallError::Provider(ProviderError::AuthFailed {
            provider: "openrouter".into(),
        });
        assert!(!fault.is_routing_signal());
        assert_eq!(
            fault.to_string(),
            "Authentication failed for provider openrouter"
        );
    }

    #[test]
    fn test_synthesis_error_from_parse() {
        let err: SynthesisError = ParseError::NoPayload { expected: "object" }.into();
        assert_eq!(
            err.to_string(),
            "structured report could not be parsed: no object found in model output"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DeepBriefError = io_err.into();
        assert!(matches!(err, DeepBriefError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: DeepBriefError = serde_err.into();
        assert!(matches!(err, DeepBriefError::Serialization(_)));
    }
}
