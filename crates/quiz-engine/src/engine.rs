//! The quiz session engine.
//!
//! [`QuizEngine`] ties the collaborators together: it pulls questions from a
//! [`QuestionGateway`], grades answers with a [`Grader`], and hands XP awards
//! to a [`ProgressDispatcher`]. Round state lives in [`Session`]; the engine
//! holds no timers, so callers drive the countdown with [`Session::tick`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, CountdownConfig};
use crate::error::{QuizError, Result};
use crate::oracle::{AnswerVerdict, Grader, SemanticJudge};
use crate::progress::{DeliveryKey, DeliveryStatus, ProgressDispatcher, ProgressSink, XpAward};
use crate::question::{Difficulty, QuestionGateway};
use crate::session::{EndReason, Session, SessionStatus, SharedSession};

/// What happened to a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The answer was graded and applied to the round.
    #[serde(rename_all = "camelCase")]
    Graded {
        /// The verdict.
        verdict: AnswerVerdict,
        /// Index of the graded question.
        question_index: usize,
        /// XP earned (zero when incorrect).
        xp_awarded: u64,
        /// Round status after the answer.
        status: SessionStatus,
        /// Set when this answer ended the round.
        #[serde(skip_serializing_if = "Option::is_none")]
        end_reason: Option<EndReason>,
        /// XP delivery result for correct answers.
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery: Option<DeliveryStatus>,
    },
    /// The oracle could not verify the answer. Nothing changed; the player
    /// may submit again.
    Unverified {
        /// Why verification failed.
        message: String,
    },
    /// The round ended or moved on while the answer was being graded.
    Discarded,
}

impl AnswerOutcome {
    /// Returns the verdict if the answer was graded.
    #[must_use]
    pub const fn verdict(&self) -> Option<AnswerVerdict> {
        match self {
            Self::Graded { verdict, .. } => Some(*verdict),
            _ => None,
        }
    }

    /// Returns `true` if the answer was graded correct.
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        matches!(self, Self::Graded { verdict, .. } if verdict.is_correct)
    }

    /// Returns the XP delivery failure, if any.
    #[must_use]
    pub fn delivery_error(&self) -> Option<QuizError> {
        match self {
            Self::Graded {
                delivery: Some(delivery),
                ..
            } => delivery.as_error(),
            _ => None,
        }
    }
}

/// Runs quiz rounds.
#[derive(Clone)]
pub struct QuizEngine {
    gateway: Arc<dyn QuestionGateway>,
    grader: Grader,
    dispatcher: ProgressDispatcher,
    countdown: CountdownConfig,
}

impl std::fmt::Debug for QuizEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizEngine")
            .field("grader", &self.grader)
            .field("dispatcher", &self.dispatcher)
            .field("countdown", &self.countdown)
            .finish_non_exhaustive()
    }
}

impl QuizEngine {
    /// Creates an engine with the default countdown.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn QuestionGateway>,
        grader: Grader,
        dispatcher: ProgressDispatcher,
    ) -> Self {
        Self {
            gateway,
            grader,
            dispatcher,
            countdown: CountdownConfig::default(),
        }
    }

    /// Builds an engine from configuration.
    ///
    /// Semantic tiers are graded exactly when no judge is given.
    #[must_use]
    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn QuestionGateway>,
        judge: Option<Arc<dyn SemanticJudge>>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let grader = match judge {
            Some(judge) => Grader::new(config.grading)
                .with_judge(judge)
                .with_timeout(config.judge.timeout()),
            None => {
                if config.grading.uses_semantic() {
                    warn!(
                        api_key_env = %config.judge.api_key_env,
                        "No semantic judge available, grading every tier by exact match"
                    );
                }
                Grader::new(config.grading.without_semantic())
            }
        };

        let dispatcher = ProgressDispatcher::new(sink, config.progress.retry_config())
            .in_background(config.progress.background_delivery);

        Self::new(gateway, grader, dispatcher).with_countdown(config.countdown)
    }

    /// Sets the countdown base per tier.
    #[must_use]
    pub const fn with_countdown(mut self, countdown: CountdownConfig) -> Self {
        self.countdown = countdown;
        self
    }

    /// Returns the grader.
    #[must_use]
    pub const fn grader(&self) -> &Grader {
        &self.grader
    }

    /// Starts a new round.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::GatewayUnavailable` if the gateway fails and
    /// `QuizError::EmptyQuestionSet` if it has no questions for the tier.
    #[instrument(skip(self))]
    pub async fn start_session(
        &self,
        difficulty: Difficulty,
        requested_count: usize,
    ) -> Result<Session> {
        let mut questions = self
            .gateway
            .fetch(difficulty, requested_count)
            .await
            .map_err(|e| QuizError::gateway_unavailable(e.to_string()))?;

        if questions.len() > requested_count {
            warn!(
                returned = questions.len(),
                requested_count, "Gateway returned too many questions, truncating"
            );
            questions.truncate(requested_count);
        }

        let fetched = questions.len();
        let seconds = self.countdown.seconds_for(difficulty);
        let mut session = Session::new(difficulty, questions, seconds);
        if session.questions().len() < fetched {
            warn!(
                duplicates = fetched - session.questions().len(),
                "Gateway returned duplicate questions, dropped them"
            );
        }

        session.start()?;
        info!(
            session_id = %session.id(),
            questions = session.questions().len(),
            seconds = session.seconds_remaining(),
            "Round started"
        );
        Ok(session)
    }

    /// Waits for pending XP deliveries and retries failed ones.
    ///
    /// Returns the number of awards still undelivered.
    pub async fn flush_progress(&self) -> usize {
        self.dispatcher.flush().await
    }

    /// Grades `candidate` against the current question of `session`.
    ///
    /// The session lock is released while the oracle runs, so the countdown
    /// keeps ticking. XP is computed from the countdown captured at
    /// submission.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveQuestion` if the round is not running.
    /// Oracle failures are reported as [`AnswerOutcome::Unverified`], not as
    /// errors.
    #[instrument(skip(self, session, candidate))]
    pub async fn submit_answer(
        &self,
        session: &SharedSession,
        candidate: &str,
    ) -> Result<AnswerOutcome> {
        let pending = session.lock().await.begin_submission()?;
        let grading = self.grader.grade(&pending.question, candidate).await;

        let graded = {
            let mut session = session.lock().await;
            match grading {
                Ok(verdict) => session.record_verdict(&pending, candidate, verdict),
                Err(QuizError::OracleUnavailable { message }) => {
                    if session.record_unverified(&pending) {
                        return Ok(AnswerOutcome::Unverified { message });
                    }
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let Some(graded) = graded else {
            debug!(
                session_id = %pending.session_id,
                question_index = pending.question_index,
                "Round moved on while grading, verdict discarded"
            );
            return Ok(AnswerOutcome::Discarded);
        };

        info!(
            session_id = %pending.session_id,
            question_index = graded.question_index,
            correct = graded.verdict.is_correct,
            xp = graded.xp_awarded,
            status = %graded.status,
            "Answer graded"
        );

        let delivery = if graded.verdict.is_correct {
            let award = XpAward {
                key: DeliveryKey {
                    session_id: pending.session_id,
                    question_index: graded.question_index,
                },
                difficulty: pending.question.difficulty,
                delta: graded.xp_awarded,
            };
            Some(self.dispatcher.dispatch(award).await)
        } else {
            None
        };

        if graded.status == SessionStatus::Over {
            self.flush_progress().await;
        }

        Ok(AnswerOutcome::Graded {
            verdict: graded.verdict,
            question_index: graded.question_index,
            xp_awarded: graded.xp_awarded,
            status: graded.status,
            end_reason: graded.end_reason,
            delivery,
        })
    }
}
