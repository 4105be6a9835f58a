//! Round state for the quiz session engine.
//!
//! A [`Session`] is a single-use state machine:
//!
//! - `NotStarted` -> `Running` when [`Session::start`] finds at least one question
//! - `Running` -> `Over` when the countdown hits zero, the last question is
//!   answered correctly, or an Advanced round sees its first miss
//!
//! `Over` is terminal. A new round always gets a new `Session`.
//!
//! Grading happens in two phases so the oracle call can run without holding
//! the session lock: [`Session::begin_submission`] captures the question and
//! the countdown at submission time, and [`Session::record_verdict`] applies
//! the verdict only if the round is still on that question.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{QuizError, Result};
use crate::oracle::AnswerVerdict;
use crate::question::{Difficulty, Question};
use crate::scoring::xp_delta;

/// A session shared between a countdown driver and an answer path.
pub type SharedSession = Arc<Mutex<Session>>;

// ============================================================================
// SessionStatus / EndReason
// ============================================================================

/// Lifecycle status of a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet started.
    #[default]
    NotStarted,
    /// Accepting ticks and answers.
    Running,
    /// Finished. Terminal.
    Over,
}

impl SessionStatus {
    /// Returns the lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Over => "over",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The countdown reached zero.
    TimeExpired,
    /// The last question was answered correctly.
    QuestionsExhausted,
    /// An Advanced round received an incorrect answer.
    StrictMiss,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TimeExpired => "time expired",
            Self::QuestionsExhausted => "all questions answered",
            Self::StrictMiss => "missed a question on a strict tier",
        };
        f.write_str(s)
    }
}

// ============================================================================
// AttemptRecord
// ============================================================================

/// A graded submission kept in the round history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Index of the question in the round.
    pub question_index: usize,
    /// Id of the question.
    pub question_id: String,
    /// What the player submitted.
    pub candidate: String,
    /// The verdict.
    pub is_correct: bool,
    /// Countdown value captured when the answer was submitted.
    pub seconds_remaining: u32,
    /// XP awarded (zero when incorrect).
    pub xp_awarded: u64,
    /// When the verdict was recorded.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Submission phases
// ============================================================================

/// State captured at the moment an answer is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    /// Session the answer belongs to.
    pub session_id: Uuid,
    /// Index of the question being answered.
    pub question_index: usize,
    /// The question being answered.
    pub question: Question,
    /// Countdown value at submission time; XP is computed from this.
    pub seconds_remaining: u32,
}

/// Result of applying a verdict to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    /// The verdict that was applied.
    pub verdict: AnswerVerdict,
    /// Index of the graded question.
    pub question_index: usize,
    /// XP earned by this answer.
    pub xp_awarded: u64,
    /// Session status after the answer.
    pub status: SessionStatus,
    /// Set when this answer ended the round.
    pub end_reason: Option<EndReason>,
}

// ============================================================================
// Views
// ============================================================================

/// What a player may see of a question. Never contains the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Index in the round.
    pub index: usize,
    /// Question id.
    pub id: String,
    /// Question text.
    pub prompt: String,
    /// Answer options, sorted; empty for free-text questions.
    pub options: Vec<String>,
    /// Tier of the question.
    pub difficulty: Difficulty,
}

impl QuestionView {
    fn new(index: usize, question: &Question) -> Self {
        let mut options = question.options();
        options.sort();
        Self {
            index,
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            options,
            difficulty: question.difficulty,
        }
    }
}

/// Player-facing snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session id.
    pub id: Uuid,
    /// Round tier.
    pub difficulty: Difficulty,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Why the round ended, once over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    /// Index of the current question.
    pub current_index: usize,
    /// Number of questions in the round.
    pub total_questions: usize,
    /// Countdown value.
    pub seconds_remaining: u32,
    /// Countdown value at the start of the round.
    pub countdown_total: u32,
    /// Correct answers so far.
    pub correct_count: u32,
    /// Incorrect answers so far.
    pub incorrect_count: u32,
    /// Submissions that could not be verified.
    pub unverified_count: u32,
    /// XP earned this round.
    pub xp_earned: u64,
    /// The current question while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<QuestionView>,
}

// ============================================================================
// Session
// ============================================================================

/// State of one quiz round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: Uuid,
    difficulty: Difficulty,
    questions: Vec<Question>,
    current_index: usize,
    seconds_remaining: u32,
    countdown_total: u32,
    correct_count: u32,
    incorrect_count: u32,
    unverified_count: u32,
    xp_earned: u64,
    status: SessionStatus,
    end_reason: Option<EndReason>,
    attempts: Vec<AttemptRecord>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a `NotStarted` session over `questions`.
    ///
    /// Duplicate question ids are dropped, keeping the first occurrence.
    ///
    /// # Examples
    ///
    /// ```
    /// use quiz_engine::{Difficulty, Question, Session, SessionStatus};
    ///
    /// let questions = vec![Question::new("q1", "2 + 2?", "4", Difficulty::Basic)];
    /// let session = Session::new(Difficulty::Basic, questions, 60);
    /// assert_eq!(session.status(), SessionStatus::NotStarted);
    /// assert_eq!(session.seconds_remaining(), 60);
    /// ```
    #[must_use]
    pub fn new(difficulty: Difficulty, questions: Vec<Question>, countdown_seconds: u32) -> Self {
        let mut seen = HashSet::new();
        let questions = questions
            .into_iter()
            .filter(|q| seen.insert(q.id.clone()))
            .collect();
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            difficulty,
            questions,
            current_index: 0,
            seconds_remaining: countdown_seconds,
            countdown_total: countdown_seconds,
            correct_count: 0,
            incorrect_count: 0,
            unverified_count: 0,
            xp_earned: 0,
            status: SessionStatus::NotStarted,
            end_reason: None,
            attempts: Vec::new(),
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Moves the session to `Running`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyQuestionSet` if there are no questions. The
    /// session stays `NotStarted`.
    pub fn start(&mut self) -> Result<()> {
        if self.questions.is_empty() {
            return Err(QuizError::empty_question_set(self.difficulty));
        }
        if self.status != SessionStatus::NotStarted {
            return Ok(());
        }

        self.status = SessionStatus::Running;
        self.started_at = Utc::now();
        self.touch();
        if self.seconds_remaining == 0 {
            self.finish(EndReason::TimeExpired);
        }
        Ok(())
    }

    /// Advances the countdown by one second.
    ///
    /// Returns `false` (and changes nothing) unless the session is running.
    pub fn tick(&mut self) -> bool {
        if self.status != SessionStatus::Running {
            return false;
        }
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        self.touch();
        if self.seconds_remaining == 0 {
            self.finish(EndReason::TimeExpired);
        }
        true
    }

    /// Returns the question awaiting an answer.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveQuestion` unless the session is running.
    pub fn current_question(&self) -> Result<&Question> {
        if self.status != SessionStatus::Running {
            return Err(QuizError::no_active_question(self.status));
        }
        self.questions
            .get(self.current_index)
            .ok_or_else(|| QuizError::no_active_question(self.status))
    }

    /// Captures the current question and countdown for grading.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveQuestion` unless the session is running.
    pub fn begin_submission(&self) -> Result<PendingSubmission> {
        let question = self.current_question()?;
        Ok(PendingSubmission {
            session_id: self.id,
            question_index: self.current_index,
            question: question.clone(),
            seconds_remaining: self.seconds_remaining,
        })
    }

    fn accepts(&self, pending: &PendingSubmission) -> bool {
        self.status == SessionStatus::Running
            && pending.session_id == self.id
            && pending.question_index == self.current_index
    }

    /// Applies a verdict produced for `pending`.
    ///
    /// Returns `None` without touching any state if the round ended or moved
    /// past the question while it was being graded.
    pub fn record_verdict(
        &mut self,
        pending: &PendingSubmission,
        candidate: &str,
        verdict: AnswerVerdict,
    ) -> Option<GradedAnswer> {
        if !self.accepts(pending) {
            return None;
        }

        let xp_awarded = if verdict.is_correct {
            xp_delta(self.difficulty, pending.seconds_remaining)
        } else {
            0
        };

        self.attempts.push(AttemptRecord {
            question_index: pending.question_index,
            question_id: pending.question.id.clone(),
            candidate: candidate.to_string(),
            is_correct: verdict.is_correct,
            seconds_remaining: pending.seconds_remaining,
            xp_awarded,
            timestamp: Utc::now(),
        });

        if verdict.is_correct {
            self.correct_count += 1;
            self.xp_earned += xp_awarded;
            self.current_index += 1;
            if self.current_index >= self.questions.len() {
                self.finish(EndReason::QuestionsExhausted);
            }
        } else {
            self.incorrect_count += 1;
            if self.difficulty.is_strict() {
                self.finish(EndReason::StrictMiss);
            }
        }
        self.touch();

        Some(GradedAnswer {
            verdict,
            question_index: pending.question_index,
            xp_awarded,
            status: self.status,
            end_reason: self.end_reason,
        })
    }

    /// Counts a submission the oracle could not verify.
    ///
    /// Returns `false` if the submission is stale.
    pub fn record_unverified(&mut self, pending: &PendingSubmission) -> bool {
        if !self.accepts(pending) {
            return false;
        }
        self.unverified_count += 1;
        self.touch();
        true
    }

    fn finish(&mut self, reason: EndReason) {
        self.status = SessionStatus::Over;
        self.end_reason = Some(reason);
        self.ended_at = Some(Utc::now());
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Wraps the session for sharing between tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Returns a player-facing snapshot.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let current_question = if self.status == SessionStatus::Running {
            self.questions
                .get(self.current_index)
                .map(|q| QuestionView::new(self.current_index, q))
        } else {
            None
        };

        SessionView {
            id: self.id,
            difficulty: self.difficulty,
            status: self.status,
            end_reason: self.end_reason,
            current_index: self.current_index,
            total_questions: self.questions.len(),
            seconds_remaining: self.seconds_remaining,
            countdown_total: self.countdown_total,
            correct_count: self.correct_count,
            incorrect_count: self.incorrect_count,
            unverified_count: self.unverified_count,
            xp_earned: self.xp_earned,
            current_question,
        }
    }

    /// Returns the current question as a player-facing view.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveQuestion` unless the session is running.
    pub fn current_question_view(&self) -> Result<QuestionView> {
        self.current_question()
            .map(|q| QuestionView::new(self.current_index, q))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Round tier.
    #[must_use]
    pub const fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Questions of the round, in play order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Index of the current question.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    /// Seconds left on the countdown.
    #[must_use]
    pub const fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    /// Countdown value the round started with.
    #[must_use]
    pub const fn countdown_total(&self) -> u32 {
        self.countdown_total
    }

    /// Number of correct answers.
    #[must_use]
    pub const fn correct_count(&self) -> u32 {
        self.correct_count
    }

    /// Number of incorrect answers.
    #[must_use]
    pub const fn incorrect_count(&self) -> u32 {
        self.incorrect_count
    }

    /// Number of submissions that could not be verified.
    #[must_use]
    pub const fn unverified_count(&self) -> u32 {
        self.unverified_count
    }

    /// XP earned in this round.
    #[must_use]
    pub const fn xp_earned(&self) -> u64 {
        self.xp_earned
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Why the round ended, once over.
    #[must_use]
    pub const fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Graded submissions, oldest first.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// When the round started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the session last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// When the round ended, once over.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns `true` while the round accepts answers.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Returns `true` once the round has ended.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.status == SessionStatus::Over
    }
}

// ============================================================================
// Tests
// ============================================================================
