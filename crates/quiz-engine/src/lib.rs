//! Quiz Engine
//!
//! Runs timed quiz rounds: question selection, grading, scoring, XP
//! delivery, plus the HTTP API and WebSocket events that expose them.
//!
//! # Example
//!
//! ```
//! use quiz_engine::{xp_delta, Difficulty, Question, Session, SessionStatus};
//!
//! let questions = vec![Question::new("q1", "2 + 2?", "4", Difficulty::Basic)];
//! let mut session = Session::new(Difficulty::Basic, questions, 60);
//! session.start().unwrap();
//! assert_eq!(session.status(), SessionStatus::Running);
//! assert_eq!(xp_delta(Difficulty::Basic, 40), 2000);
//! ```

pub mod api;
pub mod bank;
pub mod config;
pub mod countdown;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod progress;
pub mod question;
pub mod retry;
pub mod scoring;
pub mod session;
pub mod websocket;

pub use api::{create_router, AnswerRequest, AppState, ErrorResponse, StartRoundRequest};
pub use bank::{QuestionBank, MAX_BANK_SIZE};
pub use config::{Config, CountdownConfig, JudgeConfig, ProgressConfig, CONFIG_FILE_NAME};
pub use countdown::{spawn_countdown, TICK_PERIOD};
pub use engine::{AnswerOutcome, QuizEngine};
pub use error::{QuizError, Result};
pub use oracle::{
    AnswerVerdict, Grader, GradingPolicy, GradingStrategy, JudgeFailure, SemanticJudge,
};
pub use progress::{
    ApplyOutcome, DeliveryKey, DeliveryStatus, FileProgressSink, InMemoryProgressSink,
    ProgressDispatcher, ProgressProfile, ProgressSink, SinkError, XpAward,
};
pub use question::{Difficulty, GatewayError, Lesson, Question, QuestionGateway, StaticGateway};
pub use retry::RetryConfig;
pub use scoring::{xp_delta, BASE_POINTS_PER_SECOND};
pub use session::{
    AttemptRecord, EndReason, QuestionView, Session, SessionStatus, SessionView, SharedSession,
};
pub use websocket::{EventBroadcaster, RoundEvent};
