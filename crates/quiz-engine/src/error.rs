//! Error types for the quiz round engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including round lifecycle violations, grading and XP delivery failures,
//! configuration loading, and question bank parsing.

use std::path::PathBuf;

use crate::question::Difficulty;
use crate::session::SessionStatus;

/// A specialized `Result` type for quiz engine operations.
pub type Result<T> = std::result::Result<T, QuizError>;

/// Errors that can occur while running quiz rounds.
///
/// Variants are organized by subsystem and include actionable suggestions
/// where possible.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    // ========================================================================
    // Round Lifecycle Errors
    // ========================================================================
    /// The question gateway returned no questions for the requested tier.
    ///
    /// The session never enters `Running`.
    #[error("No questions available for {difficulty} tier\n\nSuggestion: Add {difficulty} questions to the question bank or pick another tier")]
    EmptyQuestionSet {
        /// The requested tier.
        difficulty: Difficulty,
    },

    /// An answer was submitted, or the current question requested, outside
    /// of a running round.
    #[error("No active question: the round is {status}")]
    NoActiveQuestion {
        /// The session status at the time of the call.
        status: SessionStatus,
    },

    /// The question gateway failed to supply questions.
    #[error("Question gateway unavailable: {message}\n\nSuggestion: Check the question store and try starting the round again")]
    GatewayUnavailable {
        /// Description of the gateway failure.
        message: String,
    },

    // ========================================================================
    // Grading Errors
    // ========================================================================
    /// The semantic judge failed or timed out.
    ///
    /// Never resolved to a pass or a fail: the caller must offer a retry.
    #[error("Could not verify the answer: {message}\n\nSuggestion: Submit the answer again")]
    OracleUnavailable {
        /// Description of the judge failure.
        message: String,
    },

    // ========================================================================
    // XP Delivery Errors
    // ========================================================================
    /// XP write failed after all retries were exhausted.
    ///
    /// The correct answer stays recorded in the round.
    #[error("Failed to record XP after {attempts} attempt(s): {message}")]
    SinkWriteFailed {
        /// Number of delivery attempts made.
        attempts: usize,
        /// Description of the last failure.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your quiz.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Question Bank Errors
    // ========================================================================
    /// Question bank file was not found.
    #[error("Question bank not found: '{path}'\n\nSuggestion: Check the 'questionBank' field in quiz.json or pass --bank")]
    QuestionBankNotFound {
        /// Path where the bank was expected.
        path: PathBuf,
    },

    /// Question bank file exceeds the size limit.
    #[error("Question bank exceeds size limit (1024KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the bank into smaller files")]
    QuestionBankTooLarge {
        /// Path to the oversized bank.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Question bank file is not valid UTF-8.
    #[error("Question bank has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    QuestionBankEncodingError {
        /// Path to the bank with encoding issues.
        path: PathBuf,
    },

    /// Question bank content is malformed.
    #[error("Invalid question bank '{path}': {message}")]
    QuestionBankInvalid {
        /// Path to the bank.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Progress File Errors
    // ========================================================================
    /// Progress file could not be read or written.
    #[error("Progress file error '{path}': {message}\n\nSuggestion: Check write permissions, or remove the file to start a fresh profile")]
    ProgressFileError {
        /// Path to the progress file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuizError {
    /// Creates a new `EmptyQuestionSet` error.
    #[must_use]
    pub const fn empty_question_set(difficulty: Difficulty) -> Self {
        Self::EmptyQuestionSet { difficulty }
    }

    /// Creates a new `NoActiveQuestion` error.
    #[must_use]
    pub const fn no_active_question(status: SessionStatus) -> Self {
        Self::NoActiveQuestion { status }
    }

    /// Creates a new `GatewayUnavailable` error.
    #[must_use]
    pub fn gateway_unavailable(message: impl Into<String>) -> Self {
        Self::GatewayUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `OracleUnavailable` error.
    #[must_use]
    pub fn oracle_unavailable(message: impl Into<String>) -> Self {
        Self::OracleUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `SinkWriteFailed` error.
    #[must_use]
    pub fn sink_write_failed(attempts: usize, message: impl Into<String>) -> Self {
        Self::SinkWriteFailed {
            attempts,
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `QuestionBankNotFound` error.
    #[must_use]
    pub fn bank_not_found(path: impl Into<PathBuf>) -> Self {
        Self::QuestionBankNotFound { path: path.into() }
    }

    /// Creates a new `QuestionBankTooLarge` error.
    #[must_use]
    pub fn bank_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::QuestionBankTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `QuestionBankEncodingError`.
    #[must_use]
    pub fn bank_encoding(path: impl Into<PathBuf>) -> Self {
        Self::QuestionBankEncodingError { path: path.into() }
    }

    /// Creates a new `QuestionBankInvalid` error.
    #[must_use]
    pub fn bank_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::QuestionBankInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ProgressFileError`.
    #[must_use]
    pub fn progress_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProgressFileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the caller may retry the same operation.
    ///
    /// Oracle and gateway outages are transient; lifecycle violations are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::OracleUnavailable { .. }
                | Self::GatewayUnavailable { .. }
                | Self::SinkWriteFailed { .. }
        )
    }

    /// Returns `true` if this error indicates a caller programming error.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::NoActiveQuestion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_question_set_message() {
        let err = QuizError::empty_question_set(Difficulty::Advanced);
        let message = err.to_string();
        assert!(message.contains("No questions available for advanced tier"));
        assert!(message.contains("Suggestion"));
    }

    #[test]
    fn test_no_active_question_message() {
        let err = QuizError::no_active_question(SessionStatus::Over);
        assert_eq!(err.to_string(), "No active question: the round is over");
        assert!(err.is_misuse());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(QuizError::oracle_unavailable("timeout").is_transient());
        assert!(QuizError::gateway_unavailable("down").is_transient());
        assert!(QuizError::sink_write_failed(5, "down").is_transient());
        assert!(!QuizError::empty_question_set(Difficulty::Basic).is_transient());
        assert!(!QuizError::config_validation("bad", "fix").is_transient());
    }

    #[test]
    fn test_sink_write_failed_message() {
        let err = QuizError::sink_write_failed(7, "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to record XP after 7 attempt(s): connection refused"
        );
    }

    #[test]
    fn test_bank_too_large_message() {
        let err = QuizError::bank_too_large("/tmp/bank.json", 2048);
        let message = err.to_string();
        assert!(message.contains("/tmp/bank.json"));
        assert!(message.contains("2048KB"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: QuizError = io.into();
        assert!(matches!(err, QuizError::Io(_)));
    }
}
