//! Semantic answer judge backed by a chat-completions API.
//!
//! [`JudgeClient`] implements [`quiz_engine::SemanticJudge`], so it can be
//! plugged into a [`quiz_engine::Grader`] for tiers graded semantically.
//!
//! # Example
//!
//! ```
//! use quiz_judge::parse_verdict;
//!
//! assert!(parse_verdict("True.").unwrap());
//! assert!(!parse_verdict(" false").unwrap());
//! assert!(parse_verdict("maybe").is_err());
//! ```

mod client;

pub use client::JudgeClient;

use once_cell::sync::Lazy;
use quiz_engine::JudgeFailure;
use regex::Regex;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Category of a non-2xx reply from the judge API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Invalid or expired API key.
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// 5xx responses.
    Server,
    /// Anything else.
    Other,
}

impl ApiErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the API key in the configured environment variable",
            Self::RateLimit => "Wait and submit the answer again",
            Self::Server => "Retry later; the judge service may be experiencing issues",
            Self::Other => "Check the judge endpoint and model in quiz.json",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Errors from a judge call.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The API answered with a non-2xx status.
    #[error("Judge API error ({kind}, HTTP {status}): {message}\n\nSuggestion: {suggestion}")]
    Api {
        /// Error category.
        kind: ApiErrorKind,
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("Judge request failed: {0}\n\nSuggestion: Check your network connection")]
    Network(String),

    /// The request did not complete in time.
    #[error("Judge timed out after {seconds}s")]
    Timeout {
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// The reply did not start with `true` or `false`.
    #[error("Unexpected judge reply: '{0}'")]
    UnexpectedReply(String),

    /// No API key is available.
    #[error("Judge API key not set: environment variable '{env}' is missing or empty\n\nSuggestion: Export {env} or switch every tier to exact grading")]
    MissingApiKey {
        /// The environment variable that was read.
        env: String,
    },
}

impl JudgeError {
    /// Creates an `Api` error classified from the HTTP status.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        let kind = ApiErrorKind::from_status(status);
        Self::Api {
            kind,
            status,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a `MissingApiKey` error.
    #[must_use]
    pub fn missing_api_key(env: impl Into<String>) -> Self {
        Self::MissingApiKey { env: env.into() }
    }
}

impl From<JudgeError> for JudgeFailure {
    fn from(e: JudgeError) -> Self {
        match e {
            JudgeError::Timeout { seconds } => Self::Timeout { seconds },
            JudgeError::UnexpectedReply(reply) => Self::UnexpectedReply(reply),
            JudgeError::MissingApiKey { .. } => Self::NotConfigured,
            other => Self::Remote(other.to_string()),
        }
    }
}

/// Result type alias for judge operations.
pub type Result<T> = std::result::Result<T, JudgeError>;

// ============================================================================
// Prompt and Reply
// ============================================================================

/// Builds the validator prompt sent as the single user message.
#[must_use]
pub fn build_prompt(question: &str, canonical: &str, candidate: &str) -> String {
    format!(
        "You are an answer validator for a programming quiz.\n\
         \n\
         Question: \"{question}\"\n\
         Correct answer: \"{canonical}\"\n\
         Player's answer: \"{candidate}\"\n\
         \n\
         When deciding, consider:\n\
         1. Semantic similarity (same meaning in different words)\n\
         2. Common spelling mistakes\n\
         3. Alternative ways to phrase the same concept\n\
         4. Mathematical equivalence where it applies\n\
         \n\
         Respond only with \"true\" if the answer is correct or \"false\" if it is incorrect."
    )
}

static VERDICT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)^\s*["'`]?(true|false)\b"#).ok());

/// Reads a verdict from the model's reply.
///
/// Accepts a leading `true` or `false` in any case, optionally quoted and
/// followed by punctuation.
///
/// # Errors
///
/// Returns `JudgeError::UnexpectedReply` for anything else.
pub fn parse_verdict(reply: &str) -> Result<bool> {
    let unexpected = || JudgeError::UnexpectedReply(reply.trim().to_string());
    let Some(re) = VERDICT_RE.as_ref() else {
        return Err(unexpected());
    };

    re.captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().eq_ignore_ascii_case("true"))
        .ok_or_else(unexpected)
}
