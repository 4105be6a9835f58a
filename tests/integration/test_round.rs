//! Integration tests for complete quiz rounds.
//!
//! These tests drive the engine the way a host does: start a round, tick the
//! countdown, submit answers, and check what reaches the progress sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use quiz_engine::{
    xp_delta, AnswerOutcome, ApplyOutcome, Config, DeliveryKey, Difficulty, EndReason,
    FileProgressSink, Grader, GradingPolicy, GradingStrategy, InMemoryProgressSink, JudgeFailure,
    ProgressDispatcher, ProgressSink, QuestionBank, QuizEngine, QuizError, RetryConfig,
    Question, SemanticJudge, SessionStatus, SharedSession, SinkError, StaticGateway, XpAward,
};
use quiz_report::{write_reports, RoundReport};
use tokio::sync::Mutex;
use uuid::Uuid;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

/// Records every award the engine hands over.
#[derive(Default)]
struct RecordingSink {
    awards: Mutex<Vec<XpAward>>,
    inner: InMemoryProgressSink,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn apply_xp(&self, award: &XpAward) -> Result<ApplyOutcome, SinkError> {
        self.awards.lock().await.push(*award);
        self.inner.apply_xp(award).await
    }
}

/// Fails the first `failures` writes with a transient error.
struct UnreliableSink {
    failures: Mutex<usize>,
    inner: InMemoryProgressSink,
}

#[async_trait]
impl ProgressSink for UnreliableSink {
    async fn apply_xp(&self, award: &XpAward) -> Result<ApplyOutcome, SinkError> {
        let mut failures = self.failures.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(SinkError::Unavailable("connection reset".to_string()));
        }
        drop(failures);
        self.inner.apply_xp(award).await
    }
}

/// Accepts any answer that mentions "thread".
struct KeywordJudge;

#[async_trait]
impl SemanticJudge for KeywordJudge {
    async fn judge(
        &self,
        _prompt: &str,
        _canonical: &str,
        candidate: &str,
    ) -> Result<bool, JudgeFailure> {
        Ok(candidate.to_lowercase().contains("thread"))
    }
}

struct DownJudge;

#[async_trait]
impl SemanticJudge for DownJudge {
    async fn judge(
        &self,
        _prompt: &str,
        _canonical: &str,
        _candidate: &str,
    ) -> Result<bool, JudgeFailure> {
        Err(JudgeFailure::Remote("HTTP 503".to_string()))
    }
}

fn basic_questions(n: usize) -> Vec<Question> {
    (0..n)
        .map(|i| {
            Question::new(
                format!("b{i}"),
                format!("Question {i}?"),
                format!("answer {i}"),
                Difficulty::Basic,
            )
        })
        .collect()
}

fn engine_with(
    questions: Vec<Question>,
    grader: Grader,
    sink: Arc<dyn ProgressSink>,
) -> QuizEngine {
    QuizEngine::new(
        Arc::new(StaticGateway::new(questions)),
        grader,
        ProgressDispatcher::new(sink, RetryConfig::immediate(3)),
    )
}

async fn tick(session: &SharedSession, times: u32) {
    let mut session = session.lock().await;
    for _ in 0..times {
        session.tick();
    }
}

// ============================================================================
// Round lifecycle
// ============================================================================

#[tokio::test]
async fn test_basic_round_awards_xp_by_time_remaining() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine_with(basic_questions(3), Grader::exact_only(), sink.clone());

    let session = engine.start_session(Difficulty::Basic, 3).await.unwrap();
    assert_eq!(session.seconds_remaining(), 60);
    let session = session.into_shared();

    tick(&session, 20).await;
    let first = engine.submit_answer(&session, "answer 0").await.unwrap();
    tick(&session, 5).await;
    let second = engine.submit_answer(&session, "Answer 1").await.unwrap();
    tick(&session, 5).await;
    let third = engine.submit_answer(&session, "  answer 2 ").await.unwrap();

    for (outcome, xp) in [(&first, 2000), (&second, 1750), (&third, 1500)] {
        assert!(matches!(outcome, AnswerOutcome::Graded { xp_awarded, .. } if *xp_awarded == xp));
    }

    let deltas: Vec<u64> = sink.awards.lock().await.iter().map(|a| a.delta).collect();
    assert_eq!(deltas, vec![2000, 1750, 1500]);

    let session = session.lock().await;
    assert_eq!(session.status(), SessionStatus::Over);
    assert_eq!(session.end_reason(), Some(EndReason::QuestionsExhausted));
    assert_eq!(session.correct_count(), 3);
    assert_eq!(session.xp_earned(), 5250);
    assert_eq!(sink.inner.total_xp().await, 5250);
}

#[tokio::test]
async fn test_gateway_shortfall_shrinks_round() {
    let engine = engine_with(
        basic_questions(3),
        Grader::exact_only(),
        Arc::new(InMemoryProgressSink::new()),
    );
    let session = engine.start_session(Difficulty::Basic, 5).await.unwrap();
    assert_eq!(session.questions().len(), 3);
    assert_eq!(session.status(), SessionStatus::Running);
}

#[tokio::test]
async fn test_empty_tier_never_starts() {
    let engine = engine_with(
        basic_questions(3),
        Grader::exact_only(),
        Arc::new(InMemoryProgressSink::new()),
    );
    let err = engine.start_session(Difficulty::Advanced, 5).await.unwrap_err();
    assert!(matches!(
        err,
        QuizError::EmptyQuestionSet {
            difficulty: Difficulty::Advanced
        }
    ));
}

#[tokio::test]
async fn test_countdown_expiry_ends_round_and_rejects_answers() {
    let engine = engine_with(
        basic_questions(2),
        Grader::exact_only(),
        Arc::new(InMemoryProgressSink::new()),
    );
    let session = engine.start_session(Difficulty::Basic, 2).await.unwrap().into_shared();

    tick(&session, 59).await;
    assert_eq!(session.lock().await.seconds_remaining(), 1);
    tick(&session, 1).await;
    {
        let s = session.lock().await;
        assert_eq!(s.seconds_remaining(), 0);
        assert_eq!(s.end_reason(), Some(EndReason::TimeExpired));
    }

    // Further ticks are no-ops.
    assert!(!session.lock().await.tick());

    let err = engine.submit_answer(&session, "answer 0").await.unwrap_err();
    assert!(matches!(
        err,
        QuizError::NoActiveQuestion {
            status: SessionStatus::Over
        }
    ));
}

#[tokio::test]
async fn test_incorrect_basic_answer_keeps_question() {
    let engine = engine_with(
        basic_questions(2),
        Grader::exact_only(),
        Arc::new(InMemoryProgressSink::new()),
    );
    let session = engine.start_session(Difficulty::Basic, 2).await.unwrap().into_shared();

    let outcome = engine.submit_answer(&session, "wrong").await.unwrap();
    assert!(!outcome.is_correct());

    let s = session.lock().await;
    assert_eq!(s.status(), SessionStatus::Running);
    assert_eq!(s.current_index(), 0);
    assert_eq!(s.incorrect_count(), 1);
}

// ============================================================================
// Advanced tier
// ============================================================================

#[tokio::test]
async fn test_advanced_miss_ends_round() {
    let questions = vec![
        Question::new(
            "a1",
            "What does Send mean?",
            "movable across threads",
            Difficulty::Advanced,
        ),
        Question::new(
            "a2",
            "What does Sync mean?",
            "shareable across threads",
            Difficulty::Advanced,
        ),
    ];
    let engine = engine_with(
        questions,
        Grader::new(GradingPolicy::default()).with_judge(Arc::new(KeywordJudge)),
        Arc::new(InMemoryProgressSink::new()),
    );
    let session = engine
        .start_session(Difficulty::Advanced, 2)
        .await
        .unwrap()
        .into_shared();
    assert_eq!(session.lock().await.seconds_remaining(), 90);

    let first = engine.submit_answer(&session, "it can go to another thread").await.unwrap();
    assert!(first.is_correct());
    let expected = xp_delta(Difficulty::Advanced, 90);
    assert!(matches!(first, AnswerOutcome::Graded { xp_awarded, .. } if xp_awarded == expected));

    let second = engine.submit_answer(&session, "no idea").await.unwrap();
    assert!(matches!(
        second,
        AnswerOutcome::Graded {
            status: SessionStatus::Over,
            end_reason: Some(EndReason::StrictMiss),
            ..
        }
    ));
}

#[tokio::test]
async fn test_judge_outage_yields_unverified_and_allows_retry() {
    let questions = vec![Question::new(
        "a1",
        "What does Send mean?",
        "movable across threads",
        Difficulty::Advanced,
    )];
    let engine = engine_with(
        questions,
        Grader::new(GradingPolicy::uniform(GradingStrategy::Semantic))
            .with_judge(Arc::new(DownJudge)),
        Arc::new(InMemoryProgressSink::new()),
    );
    let session = engine
        .start_session(Difficulty::Advanced, 1)
        .await
        .unwrap()
        .into_shared();

    let outcome = engine.submit_answer(&session, "threads, roughly").await.unwrap();
    assert!(matches!(
        outcome,
        AnswerOutcome::Unverified { ref message } if message.contains("HTTP 503")
    ));

    {
        let s = session.lock().await;
        assert_eq!(s.status(), SessionStatus::Running);
        assert_eq!(s.incorrect_count(), 0);
        assert_eq!(s.unverified_count(), 1);
    }

    // An exact match never needs the judge.
    let retry = engine.submit_answer(&session, "Movable across threads").await.unwrap();
    assert!(retry.is_correct());
}

// ============================================================================
// XP delivery
// ============================================================================

#[tokio::test]
async fn test_replayed_award_is_not_double_credited() {
    let sink = InMemoryProgressSink::new();
    let award = XpAward {
        key: DeliveryKey {
            session_id: Uuid::new_v4(),
            question_index: 0,
        },
        difficulty: Difficulty::Basic,
        delta: 2000,
    };

    assert_eq!(sink.apply_xp(&award).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(sink.apply_xp(&award).await.unwrap(), ApplyOutcome::AlreadyApplied);
    assert_eq!(sink.total_xp().await, 2000);
}

#[tokio::test]
async fn test_transient_sink_failures_are_retried() {
    let sink = Arc::new(UnreliableSink {
        failures: Mutex::new(2),
        inner: InMemoryProgressSink::new(),
    });
    let engine = engine_with(basic_questions(1), Grader::exact_only(), sink.clone());
    let session = engine.start_session(Difficulty::Basic, 1).await.unwrap().into_shared();

    let outcome = engine.submit_answer(&session, "answer 0").await.unwrap();
    assert!(outcome.is_correct());
    assert!(outcome.delivery_error().is_none());
    assert_eq!(sink.inner.total_xp().await, 3000);
}

#[tokio::test]
async fn test_exhausted_delivery_keeps_correct_answer() {
    let sink = Arc::new(UnreliableSink {
        failures: Mutex::new(3),
        inner: InMemoryProgressSink::new(),
    });
    let engine = engine_with(basic_questions(2), Grader::exact_only(), sink.clone());
    let session = engine.start_session(Difficulty::Basic, 2).await.unwrap().into_shared();

    let outcome = engine.submit_answer(&session, "answer 0").await.unwrap();
    assert!(outcome.is_correct());
    assert!(matches!(
        outcome.delivery_error(),
        Some(QuizError::SinkWriteFailed { attempts: 3, .. })
    ));

    {
        let s = session.lock().await;
        assert_eq!(s.correct_count(), 1);
        assert_eq!(s.current_index(), 1);
    }
    assert_eq!(sink.inner.total_xp().await, 0);

    // The store is back: the earlier award goes out ahead of the next one.
    let outcome = engine.submit_answer(&session, "answer 1").await.unwrap();
    assert!(outcome.delivery_error().is_none());
    assert_eq!(sink.inner.total_xp().await, 6000);
    assert_eq!(engine.flush_progress().await, 0);
}

// ============================================================================
// File-backed round
// ============================================================================

#[tokio::test]
async fn test_fixture_round_with_file_sink_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from_file(&fixture("quiz.json")).unwrap();
    assert_eq!(config.questions_per_round, 3);
    assert_eq!(config.countdown.fundamentals, 30);

    let bank = QuestionBank::load(fixture(&config.question_bank)).unwrap();
    assert_eq!(bank.count_for(Difficulty::Fundamentals), 3);

    let progress_path = dir.path().join(&config.progress.file);
    let sink = Arc::new(FileProgressSink::open(&progress_path).unwrap());
    let engine = QuizEngine::from_config(&config, Arc::new(bank.clone()), None, sink.clone());

    let session = engine
        .start_session(Difficulty::Fundamentals, config.questions_per_round)
        .await
        .unwrap()
        .into_shared();

    loop {
        let answer = {
            let s = session.lock().await;
            let Ok(question) = s.current_question() else {
                break;
            };
            question.canonical_answer.clone()
        };
        tick(&session, 2).await;
        assert!(engine.submit_answer(&session, &answer).await.unwrap().is_correct());
    }

    let snapshot = session.lock().await.clone();
    assert_eq!(snapshot.end_reason(), Some(EndReason::QuestionsExhausted));
    // Fundamentals: 50 XP per second at 0.5x, answered at 28s, 26s and 24s.
    assert_eq!(snapshot.xp_earned(), 700 + 650 + 600);

    // The profile survives a reopen.
    let reopened = FileProgressSink::open(&progress_path).unwrap();
    assert_eq!(reopened.profile().await.xp, 1950);
    assert_eq!(reopened.profile().await.questions_answered, 3);

    let report = RoundReport::from_session(&snapshot);
    assert!(report.is_perfect());
    let paths = write_reports(&report, &dir.path().join(&config.output_dir)).unwrap();
    assert!(paths.markdown.exists());
    assert!(paths.json.exists());
}

#[test]
fn test_fixture_lessons() {
    let bank = QuestionBank::load(fixture("questions.json")).unwrap();
    let lessons = bank.lessons(Difficulty::Fundamentals, 10);
    assert_eq!(lessons.len(), 2);
    assert!(lessons[0].explanation.contains("`let`"));
}
