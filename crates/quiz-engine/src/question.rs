//! Question types and the question store gateway contract.
//!
//! Questions are immutable records owned by the question store; the engine
//! receives a shuffled, count-limited copy per round through
//! [`QuestionGateway::fetch`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Difficulty
// ============================================================================

/// Difficulty tier of a question or round.
///
/// Governs the question pool, scoring multiplier, countdown base and grading
/// strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// Entry tier (default).
    #[default]
    Fundamentals,
    /// Intermediate tier.
    Basic,
    /// Strict tier: a round ends on the first miss.
    Advanced,
}

impl Difficulty {
    /// All tiers, easiest first.
    pub const ALL: [Self; 3] = [Self::Fundamentals, Self::Basic, Self::Advanced];

    /// Parses a string into a `Difficulty`, case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use quiz_engine::Difficulty;
    ///
    /// assert_eq!(Difficulty::parse("ADVANCED"), Some(Difficulty::Advanced));
    /// assert_eq!(Difficulty::parse(" basic "), Some(Difficulty::Basic));
    /// assert_eq!(Difficulty::parse("expert"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fundamentals" => Some(Self::Fundamentals),
            "basic" => Some(Self::Basic),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the lowercase name used in config files and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fundamentals => "fundamentals",
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }

    /// Returns `true` for tiers where one incorrect answer ends the round.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        matches!(self, Self::Advanced)
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("invalid difficulty '{s}': expected one of 'fundamentals', 'basic', 'advanced'")
        })
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Question
// ============================================================================

/// A single quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique identifier within the question store.
    pub id: String,

    /// The question text shown to the player.
    pub prompt: String,

    /// The accepted answer.
    pub canonical_answer: String,

    /// Wrong options for multiple-choice tiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distractors: Vec<String>,

    /// Tier this question belongs to.
    pub difficulty: Difficulty,

    /// Study notes shown on lesson flash cards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Creates a free-text question with no distractors or explanation.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        canonical_answer: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            canonical_answer: canonical_answer.into(),
            distractors: Vec::new(),
            difficulty,
            explanation: None,
        }
    }

    /// Adds wrong options for multiple-choice play.
    #[must_use]
    pub fn with_distractors<I, S>(mut self, distractors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distractors = distractors.into_iter().map(Into::into).collect();
        self
    }

    /// Adds study notes for lesson flash cards.
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Returns `true` if the question is played as multiple choice.
    #[must_use]
    pub fn is_multiple_choice(&self) -> bool {
        !self.distractors.is_empty()
    }

    /// Returns the answer options: the canonical answer followed by the
    /// distractors. Empty for free-text questions.
    #[must_use]
    pub fn options(&self) -> Vec<String> {
        if self.distractors.is_empty() {
            return Vec::new();
        }
        std::iter::once(self.canonical_answer.clone())
            .chain(self.distractors.iter().cloned())
            .collect()
    }

    /// Returns this question as a lesson card, if it has an explanation.
    #[must_use]
    pub fn to_lesson(&self) -> Option<Lesson> {
        self.explanation.as_ref().map(|explanation| Lesson {
            prompt: self.prompt.clone(),
            explanation: explanation.clone(),
            difficulty: self.difficulty,
        })
    }
}

// ============================================================================
// Lesson
// ============================================================================

/// A flash card for studying outside of rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Front of the card.
    pub prompt: String,
    /// Back of the card.
    pub explanation: String,
    /// Tier of the underlying question.
    pub difficulty: Difficulty,
}

// ============================================================================
// Question Store Gateway
// ============================================================================

/// Failure reported by a question store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// Supplies questions for a round.
///
/// Implementations return a shuffled, deduplicated sequence of at most
/// `count` questions matching `difficulty`. Returning fewer (including none)
/// is allowed.
#[async_trait]
pub trait QuestionGateway: Send + Sync {
    /// Fetches up to `count` questions for `difficulty`.
    async fn fetch(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> std::result::Result<Vec<Question>, GatewayError>;
}

/// A gateway over a fixed list of questions, returned in order.
///
/// Useful for tests and demos where shuffling would get in the way.
#[derive(Debug, Clone, Default)]
pub struct StaticGateway {
    questions: Vec<Question>,
}

impl StaticGateway {
    /// Creates a gateway serving the given questions.
    #[must_use]
    pub const fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

#[async_trait]
impl QuestionGateway for StaticGateway {
    async fn fetch(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> std::result::Result<Vec<Question>, GatewayError> {
        Ok(self
            .questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .take(count)
            .cloned()
            .collect())
    }
}
