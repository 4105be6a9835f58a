//! File-backed question store.
//!
//! A question bank is a JSON document:
//!
//! ```json
//! { "questions": [ { "id": "q1", "prompt": "...", "canonicalAnswer": "...",
//!                    "difficulty": "basic", "distractors": ["..."] } ] }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuizError, Result};
use crate::question::{Difficulty, GatewayError, Lesson, Question, QuestionGateway};

/// Maximum allowed question bank size in bytes (1 MiB).
pub const MAX_BANK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct BankFile {
    questions: Vec<Question>,
}

/// Questions loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    path: PathBuf,
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Loads and validates a question bank.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::QuestionBankNotFound` if the file doesn't exist,
    /// `QuizError::QuestionBankTooLarge` if it exceeds 1 MiB,
    /// `QuizError::QuestionBankEncodingError` if it is not UTF-8, and
    /// `QuizError::QuestionBankInvalid` for malformed JSON, duplicate ids or
    /// blank fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                QuizError::bank_not_found(path)
            } else {
                QuizError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_BANK_SIZE {
            return Err(QuizError::bank_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                QuizError::bank_encoding(path)
            } else {
                QuizError::Io(e)
            }
        })?;

        let file: BankFile = serde_json::from_str(&content)
            .map_err(|e| QuizError::bank_invalid(path, e.to_string()))?;

        let bank = Self::from_questions(path, file.questions)?;
        debug!(path = %path.display(), questions = bank.len(), "Loaded question bank");
        Ok(bank)
    }

    /// Builds a bank from in-memory questions, applying the same validation
    /// as [`QuestionBank::load`].
    ///
    /// # Errors
    ///
    /// Returns `QuizError::QuestionBankInvalid` for duplicate ids or blank
    /// fields.
    pub fn from_questions(path: impl Into<PathBuf>, questions: Vec<Question>) -> Result<Self> {
        let path = path.into();
        let mut ids = HashSet::new();

        for (i, question) in questions.iter().enumerate() {
            if question.id.trim().is_empty() {
                return Err(QuizError::bank_invalid(
                    &path,
                    format!("question #{} has an empty id", i + 1),
                ));
            }
            if !ids.insert(question.id.as_str()) {
                return Err(QuizError::bank_invalid(
                    &path,
                    format!("duplicate question id '{}'", question.id),
                ));
            }
            if question.prompt.trim().is_empty() {
                return Err(QuizError::bank_invalid(
                    &path,
                    format!("question '{}' has an empty prompt", question.id),
                ));
            }
            if question.canonical_answer.trim().is_empty() {
                return Err(QuizError::bank_invalid(
                    &path,
                    format!("question '{}' has an empty canonicalAnswer", question.id),
                ));
            }
        }

        Ok(Self { path, questions })
    }

    /// Path the bank was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All questions, in file order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions in the bank.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Returns `true` if the bank has no questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Number of questions for a tier.
    #[must_use]
    pub fn count_for(&self, difficulty: Difficulty) -> usize {
        self.questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .count()
    }

    /// Up to `count` lesson cards for a tier, in file order.
    ///
    /// Questions without an explanation are skipped.
    #[must_use]
    pub fn lessons(&self, difficulty: Difficulty, count: usize) -> Vec<Lesson> {
        self.questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .filter_map(Question::to_lesson)
            .take(count)
            .collect()
    }
}

#[async_trait]
impl QuestionGateway for QuestionBank {
    async fn fetch(
        &self,
        difficulty: Difficulty,
        count: usize,
    ) -> std::result::Result<Vec<Question>, GatewayError> {
        let mut matching: Vec<Question> = self
            .questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .cloned()
            .collect();

        matching.shuffle(&mut rand::thread_rng());
        matching.truncate(count);
        Ok(matching)
    }
}
