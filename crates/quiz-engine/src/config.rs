//! Configuration for quiz rounds.
//!
//! Settings are read from `quiz.json` (camelCase keys). Every field has a
//! default, so a missing file or a partial file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};
use crate::oracle::GradingPolicy;
use crate::question::Difficulty;
use crate::retry::RetryConfig;

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "quiz.json";

fn default_question_bank() -> String {
    "questions.json".to_string()
}

const fn default_questions_per_round() -> usize {
    5
}

fn default_output_dir() -> String {
    ".".to_string()
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the question bank JSON file.
    #[serde(default = "default_question_bank")]
    pub question_bank: String,

    /// Number of questions requested per round.
    #[serde(default = "default_questions_per_round")]
    pub questions_per_round: usize,

    /// Countdown base per tier.
    #[serde(default)]
    pub countdown: CountdownConfig,

    /// Grading strategy per tier.
    #[serde(default)]
    pub grading: GradingPolicy,

    /// Remote semantic judge settings.
    #[serde(default)]
    pub judge: JudgeConfig,

    /// XP delivery settings.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Directory for round reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            question_bank: default_question_bank(),
            questions_per_round: default_questions_per_round(),
            countdown: CountdownConfig::default(),
            grading: GradingPolicy::default(),
            judge: JudgeConfig::default(),
            progress: ProgressConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads `quiz.json` from the current working directory, or defaults if
    /// there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON or
    /// invalid values.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            QuizError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `quiz.json` from `dir`, or defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON or
    /// invalid values.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigParseError` for unreadable files, invalid
    /// JSON or unknown enum values, and `QuizError::ConfigValidationError`
    /// for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(QuizError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuizError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigValidationError` naming the first invalid
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.questions_per_round == 0 {
            return Err(QuizError::config_validation(
                "questionsPerRound must be greater than 0",
                "Set questionsPerRound to at least 1 in your quiz.json",
            ));
        }

        for difficulty in Difficulty::ALL {
            if self.countdown.seconds_for(difficulty) == 0 {
                return Err(QuizError::config_validation(
                    format!("countdown.{difficulty} must be greater than 0"),
                    format!("Set countdown.{difficulty} to at least 1 second in your quiz.json"),
                ));
            }
        }

        let advanced = self.countdown.advanced;
        let longest_other = self.countdown.fundamentals.max(self.countdown.basic);
        if advanced <= longest_other {
            return Err(QuizError::config_validation(
                format!(
                    "countdown.advanced ({advanced}s) must be longer than countdown.fundamentals \
                     and countdown.basic ({longest_other}s)"
                ),
                format!(
                    "Set countdown.advanced to more than {longest_other} seconds in your quiz.json"
                ),
            ));
        }

        if self.judge.timeout_seconds == 0 {
            return Err(QuizError::config_validation(
                "judge.timeoutSeconds must be greater than 0",
                "Set judge.timeoutSeconds to at least 1 second in your quiz.json",
            ));
        }

        if !(self.judge.endpoint.starts_with("http://")
            || self.judge.endpoint.starts_with("https://"))
        {
            return Err(QuizError::config_validation(
                format!("judge.endpoint '{}' is not an HTTP URL", self.judge.endpoint),
                "Use a full http:// or https:// URL for judge.endpoint",
            ));
        }

        if self.judge.model.trim().is_empty() || self.judge.api_key_env.trim().is_empty() {
            return Err(QuizError::config_validation(
                "judge.model and judge.apiKeyEnv must not be empty",
                "Remove them from quiz.json to use the defaults",
            ));
        }

        if self.progress.max_attempts == 0 {
            return Err(QuizError::config_validation(
                "progress.maxAttempts must be greater than 0",
                "Set progress.maxAttempts to at least 1 in your quiz.json",
            ));
        }

        if self.progress.base_backoff_ms > self.progress.max_backoff_ms {
            return Err(QuizError::config_validation(
                "progress.baseBackoffMs must not exceed progress.maxBackoffMs",
                "Lower baseBackoffMs or raise maxBackoffMs in your quiz.json",
            ));
        }

        if self.question_bank.trim().is_empty() {
            return Err(QuizError::config_validation(
                "questionBank path must not be empty",
                "Provide a valid question bank path in your quiz.json",
            ));
        }

        if self.progress.file.trim().is_empty() {
            return Err(QuizError::config_validation(
                "progress.file must not be empty",
                "Provide a valid progress file path in your quiz.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(QuizError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your quiz.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Countdown
// ============================================================================

const fn default_fundamentals_seconds() -> u32 {
    60
}

const fn default_basic_seconds() -> u32 {
    60
}

const fn default_advanced_seconds() -> u32 {
    90
}

/// Countdown base in seconds per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownConfig {
    /// Fundamentals rounds.
    #[serde(default = "default_fundamentals_seconds")]
    pub fundamentals: u32,
    /// Basic rounds.
    #[serde(default = "default_basic_seconds")]
    pub basic: u32,
    /// Advanced rounds.
    #[serde(default = "default_advanced_seconds")]
    pub advanced: u32,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            fundamentals: default_fundamentals_seconds(),
            basic: default_basic_seconds(),
            advanced: default_advanced_seconds(),
        }
    }
}

impl CountdownConfig {
    /// Returns the countdown base for a tier.
    ///
    /// ```
    /// use quiz_engine::{config::CountdownConfig, Difficulty};
    ///
    /// let countdown = CountdownConfig::default();
    /// assert_eq!(countdown.seconds_for(Difficulty::Basic), 60);
    /// assert_eq!(countdown.seconds_for(Difficulty::Advanced), 90);
    /// ```
    #[must_use]
    pub const fn seconds_for(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Fundamentals => self.fundamentals,
            Difficulty::Basic => self.basic,
            Difficulty::Advanced => self.advanced,
        }
    }
}

// ============================================================================
// Judge
// ============================================================================

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_judge_timeout() -> u64 {
    10
}

/// Remote semantic judge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeConfig {
    /// Chat-completions endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Time allowed for one judge call, in seconds.
    #[serde(default = "default_judge_timeout")]
    pub timeout_seconds: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_judge_timeout(),
        }
    }
}

impl JudgeConfig {
    /// Reads the API key from the configured environment variable.
    ///
    /// Returns `None` if the variable is unset or blank.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ============================================================================
// Progress
// ============================================================================

fn default_progress_file() -> String {
    ".quiz/progress.json".to_string()
}

const fn default_max_attempts() -> usize {
    5
}

const fn default_base_backoff_ms() -> u64 {
    20
}

const fn default_max_backoff_ms() -> u64 {
    500
}

const fn default_jitter_ms() -> u64 {
    50
}

/// XP delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressConfig {
    /// Path to the JSON progress profile.
    #[serde(default = "default_progress_file")]
    pub file: String,

    /// Delivery attempts per award, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Wait before the first retry, in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Cap on the doubled backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Random extra wait per retry, in milliseconds. `0` disables jitter.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Deliver on a background task instead of awaiting each write.
    #[serde(default)]
    pub background_delivery: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            file: default_progress_file(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
            background_delivery: false,
        }
    }
}

impl ProgressConfig {
    /// Builds the retry policy for sink writes.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter_max: if self.jitter_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(self.jitter_ms))
            },
        }
    }
}
