//! Round reports
//!
//! Turns a finished [`Session`] into a [`RoundReport`] that can be written as
//! JSON for programmatic access or as Markdown for people.
//!
//! # Example
//!
//! ```rust
//! use quiz_engine::{Difficulty, Question, Session};
//! use quiz_report::{json::JsonGenerator, MarkdownGenerator, RoundReport};
//!
//! let mut session = Session::new(
//!     Difficulty::Basic,
//!     vec![Question::new("q1", "2 + 2?", "4", Difficulty::Basic)],
//!     60,
//! );
//! session.start().unwrap();
//!
//! let report = RoundReport::from_session(&session);
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"difficulty\": \"basic\""));
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.starts_with("# Quiz Round Report"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quiz_engine::{Difficulty, EndReason, Session, SessionStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::json::JsonGenerator;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// File name of the JSON report.
pub const JSON_REPORT_FILE: &str = "quiz-report.json";

/// File name of the Markdown report.
pub const MARKDOWN_REPORT_FILE: &str = "quiz-report.md";

// ============================================================================
// Report
// ============================================================================

/// Everything worth keeping about one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
    /// Session the report describes.
    pub session_id: Uuid,
    /// Tier played.
    pub difficulty: Difficulty,
    /// Status when the report was taken.
    pub status: SessionStatus,
    /// Why the round ended, if it did.
    pub end_reason: Option<EndReason>,
    /// Totals.
    pub summary: RoundSummary,
    /// Graded answers in the order they were recorded.
    pub timeline: Vec<AttemptEntry>,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// Totals for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    /// Questions in the round.
    pub total_questions: usize,
    /// Correct answers.
    pub correct: u32,
    /// Incorrect answers.
    pub incorrect: u32,
    /// Answers the judge could not verify.
    pub unverified: u32,
    /// Correct answers as a percentage of graded answers.
    pub accuracy_percent: f64,
    /// XP earned.
    pub xp_earned: u64,
    /// Countdown at the start of the round.
    pub countdown_total: u32,
    /// Countdown when the report was taken.
    pub seconds_remaining: u32,
    /// Wall-clock length of the round.
    pub duration_seconds: u64,
    /// When the round started.
    pub started_at: DateTime<Utc>,
    /// When the round ended.
    pub ended_at: Option<DateTime<Utc>>,
}

/// One graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntry {
    /// Index of the question in the round.
    pub question_index: usize,
    /// Question id.
    pub question_id: String,
    /// Question text.
    pub prompt: String,
    /// What the player answered.
    pub answer: String,
    /// The verdict.
    pub is_correct: bool,
    /// Countdown when the answer was submitted.
    pub seconds_remaining: u32,
    /// XP earned.
    pub xp_awarded: u64,
    /// When the verdict was recorded.
    pub timestamp: DateTime<Utc>,
}

impl RoundReport {
    /// Builds a report from a session snapshot.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let correct = session.correct_count();
        let incorrect = session.incorrect_count();
        let graded = correct + incorrect;
        let accuracy_percent = if graded == 0 {
            0.0
        } else {
            f64::from(correct) * 100.0 / f64::from(graded)
        };

        let finished = session.ended_at().unwrap_or_else(Utc::now);
        let duration_seconds =
            u64::try_from((finished - session.started_at()).num_seconds()).unwrap_or(0);

        let timeline = session
            .attempts()
            .iter()
            .map(|attempt| AttemptEntry {
                question_index: attempt.question_index,
                question_id: attempt.question_id.clone(),
                prompt: session
                    .questions()
                    .get(attempt.question_index)
                    .map(|q| q.prompt.clone())
                    .unwrap_or_default(),
                answer: attempt.candidate.clone(),
                is_correct: attempt.is_correct,
                seconds_remaining: attempt.seconds_remaining,
                xp_awarded: attempt.xp_awarded,
                timestamp: attempt.timestamp,
            })
            .collect();

        Self {
            session_id: session.id(),
            difficulty: session.difficulty(),
            status: session.status(),
            end_reason: session.end_reason(),
            summary: RoundSummary {
                total_questions: session.questions().len(),
                correct,
                incorrect,
                unverified: session.unverified_count(),
                accuracy_percent,
                xp_earned: session.xp_earned(),
                countdown_total: session.countdown_total(),
                seconds_remaining: session.seconds_remaining(),
                duration_seconds,
                started_at: session.started_at(),
                ended_at: session.ended_at(),
            },
            timeline,
            generated_at: Utc::now(),
        }
    }

    /// Returns `true` if every question was answered correctly.
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.summary.total_questions > 0
            && self.summary.incorrect == 0
            && usize::try_from(self.summary.correct)
                .is_ok_and(|c| c == self.summary.total_questions)
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Paths written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// The Markdown report.
    pub markdown: PathBuf,
    /// The JSON report.
    pub json: PathBuf,
}

/// Writes `quiz-report.md` and `quiz-report.json` into `output_dir`,
/// creating the directory if needed.
///
/// # Errors
///
/// Returns `ReportError::Io` if the directory or files cannot be written.
pub fn write_reports(report: &RoundReport, output_dir: &Path) -> Result<ReportPaths> {
    std::fs::create_dir_all(output_dir)?;

    let markdown = output_dir.join(MARKDOWN_REPORT_FILE);
    std::fs::write(&markdown, MarkdownGenerator::new(report).generate())?;

    let json = output_dir.join(JSON_REPORT_FILE);
    JsonGenerator::new(report).write_to_file(&json, true)?;

    Ok(ReportPaths { markdown, json })
}
