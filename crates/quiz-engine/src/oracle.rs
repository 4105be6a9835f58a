//! Answer grading.
//!
//! Each question is graded with the [`GradingStrategy`] its tier maps to in
//! the [`GradingPolicy`]:
//!
//! - `Exact` compares normalized strings locally and never fails.
//! - `Semantic` asks a remote [`SemanticJudge`]; the call may suspend and may
//!   fail, in which case grading reports [`QuizError::OracleUnavailable`]
//!   instead of guessing a verdict.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QuizError, Result};
use crate::question::{Difficulty, Question};

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of grading one submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerVerdict {
    /// Whether the answer was accepted.
    pub is_correct: bool,
}

impl AnswerVerdict {
    /// An accepted answer.
    pub const CORRECT: Self = Self { is_correct: true };
    /// A rejected answer.
    pub const INCORRECT: Self = Self { is_correct: false };
}

impl From<bool> for AnswerVerdict {
    fn from(is_correct: bool) -> Self {
        Self { is_correct }
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// How answers of a tier are graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStrategy {
    /// Local normalized string comparison.
    Exact,
    /// Remote judge decides whether the meaning matches.
    Semantic,
}

impl GradingStrategy {
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "semantic" => Some(Self::Semantic),
            _ => None,
        }
    }

    /// Returns the lowercase name used in config files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for GradingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GradingStrategy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid grading strategy '{s}': expected one of 'exact', 'semantic'"
            ))
        })
    }
}

impl Serialize for GradingStrategy {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

const fn default_exact() -> GradingStrategy {
    GradingStrategy::Exact
}

const fn default_semantic() -> GradingStrategy {
    GradingStrategy::Semantic
}

/// Tier to strategy mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    /// Strategy for Fundamentals questions.
    #[serde(default = "default_exact")]
    pub fundamentals: GradingStrategy,
    /// Strategy for Basic questions.
    #[serde(default = "default_exact")]
    pub basic: GradingStrategy,
    /// Strategy for Advanced questions.
    #[serde(default = "default_semantic")]
    pub advanced: GradingStrategy,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            fundamentals: default_exact(),
            basic: default_exact(),
            advanced: default_semantic(),
        }
    }
}

impl GradingPolicy {
    /// Every tier graded the same way.
    #[must_use]
    pub const fn uniform(strategy: GradingStrategy) -> Self {
        Self {
            fundamentals: strategy,
            basic: strategy,
            advanced: strategy,
        }
    }

    /// Returns the strategy for a tier.
    #[must_use]
    pub const fn strategy_for(&self, difficulty: Difficulty) -> GradingStrategy {
        match difficulty {
            Difficulty::Fundamentals => self.fundamentals,
            Difficulty::Basic => self.basic,
            Difficulty::Advanced => self.advanced,
        }
    }

    /// Returns `true` if any tier needs a semantic judge.
    #[must_use]
    pub fn uses_semantic(&self) -> bool {
        Difficulty::ALL
            .iter()
            .any(|d| self.strategy_for(*d) == GradingStrategy::Semantic)
    }

    /// Replaces every semantic tier with exact grading.
    #[must_use]
    pub const fn without_semantic(self) -> Self {
        Self::uniform(GradingStrategy::Exact)
    }
}

// ============================================================================
// Exact strategy
// ============================================================================

/// Normalizes an answer for exact comparison: trims, collapses whitespace
/// runs to a single space and lowercases.
///
/// ```
/// use quiz_engine::oracle::normalize_answer;
///
/// assert_eq!(normalize_answer("  Hello   World \n"), "hello world");
/// ```
#[must_use]
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Exact strategy verdict. Blank candidates never match.
#[must_use]
pub fn exact_match(canonical: &str, candidate: &str) -> AnswerVerdict {
    let candidate = normalize_answer(candidate);
    if candidate.is_empty() {
        return AnswerVerdict::INCORRECT;
    }
    AnswerVerdict::from(candidate == normalize_answer(canonical))
}

// ============================================================================
// Semantic strategy
// ============================================================================

/// Why a semantic judge could not produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeFailure {
    /// The call did not finish in time.
    #[error("judge timed out after {seconds}s")]
    Timeout {
        /// The timeout that elapsed.
        seconds: u64,
    },
    /// The remote service reported an error or could not be reached.
    #[error("judge request failed: {0}")]
    Remote(String),
    /// The reply could not be read as a verdict.
    #[error("judge reply was not a verdict: {0}")]
    UnexpectedReply(String),
    /// No judge is configured for a semantic tier.
    #[error("no semantic judge is configured")]
    NotConfigured,
}

/// Remote grader for free-text answers.
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    /// Returns whether `candidate` is an acceptable answer to `prompt` given
    /// the `canonical` answer.
    async fn judge(
        &self,
        prompt: &str,
        canonical: &str,
        candidate: &str,
    ) -> std::result::Result<bool, JudgeFailure>;
}

// ============================================================================
// Grader
// ============================================================================

/// Default time allowed for one semantic judge call.
pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Grades answers using the strategy mapped to each question's tier.
#[derive(Clone)]
pub struct Grader {
    policy: GradingPolicy,
    judge: Option<Arc<dyn SemanticJudge>>,
    timeout: Duration,
}

impl std::fmt::Debug for Grader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grader")
            .field("policy", &self.policy)
            .field("has_judge", &self.judge.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self::exact_only()
    }
}

impl Grader {
    /// Creates a grader with the given policy and no judge.
    #[must_use]
    pub const fn new(policy: GradingPolicy) -> Self {
        Self {
            policy,
            judge: None,
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    /// A grader that grades every tier exactly.
    #[must_use]
    pub const fn exact_only() -> Self {
        Self::new(GradingPolicy::uniform(GradingStrategy::Exact))
    }

    /// Attaches the judge used for semantic tiers.
    #[must_use]
    pub fn with_judge(mut self, judge: Arc<dyn SemanticJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Sets the time allowed for one judge call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// Returns the strategy that applies to `question`.
    #[must_use]
    pub const fn strategy_for(&self, question: &Question) -> GradingStrategy {
        self.policy.strategy_for(question.difficulty)
    }

    /// Grades `candidate` against `question`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::OracleUnavailable` if the semantic judge fails,
    /// times out, or is missing.
    pub async fn grade(&self, question: &Question, candidate: &str) -> Result<AnswerVerdict> {
        let exact = exact_match(&question.canonical_answer, candidate);

        match self.strategy_for(question) {
            GradingStrategy::Exact => Ok(exact),
            GradingStrategy::Semantic => {
                if exact.is_correct {
                    debug!(question_id = %question.id, "Exact match, skipping judge");
                    return Ok(exact);
                }
                if normalize_answer(candidate).is_empty() {
                    return Ok(AnswerVerdict::INCORRECT);
                }
                self.judge_remotely(question, candidate)
                    .await
                    .map(AnswerVerdict::from)
                    .map_err(|e| {
                        warn!(question_id = %question.id, error = %e, "Semantic grading failed");
                        QuizError::oracle_unavailable(e.to_string())
                    })
            }
        }
    }

    async fn judge_remotely(
        &self,
        question: &Question,
        candidate: &str,
    ) -> std::result::Result<bool, JudgeFailure> {
        let judge = self.judge.as_ref().ok_or(JudgeFailure::NotConfigured)?;
        let call = judge.judge(&question.prompt, &question.canonical_answer, candidate);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(JudgeFailure::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}
