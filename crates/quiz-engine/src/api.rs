//! HTTP API for playing rounds.
//!
//! The server hosts at most one round at a time and drives its countdown
//! with [`spawn_countdown`].
//!
//! # Endpoints
//!
//! - `POST /api/sessions` - Start a round (replaces any current round)
//! - `GET /api/session` - Current round snapshot
//! - `DELETE /api/session` - Leave the current round
//! - `GET /api/session/question` - Current question
//! - `POST /api/session/answer` - Submit an answer
//! - `GET /ws` - Live round events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quiz_engine::{
//!     create_router, AppState, Config, Grader, InMemoryProgressSink, ProgressDispatcher,
//!     QuizEngine, RetryConfig, StaticGateway,
//! };
//!
//! # async fn example() {
//! let engine = QuizEngine::new(
//!     Arc::new(StaticGateway::new(Vec::new())),
//!     Grader::exact_only(),
//!     ProgressDispatcher::new(Arc::new(InMemoryProgressSink::new()), RetryConfig::default()),
//! );
//! let router = create_router(AppState::new(engine, Config::default()));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::countdown::{spawn_countdown, TICK_PERIOD};
use crate::engine::{AnswerOutcome, QuizEngine};
use crate::error::QuizError;
use crate::question::Difficulty;
use crate::session::{QuestionView, Session, SessionStatus, SessionView, SharedSession};
use crate::websocket::{
    ws_handler, AnswerGradedPayload, AnswerUnverifiedPayload, EventBroadcaster, RoundEvent,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRoundRequest {
    /// Tier to play.
    pub difficulty: Difficulty,
    /// Number of questions; defaults to `questionsPerRound`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Request body for `POST /api/session/answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// The player's answer.
    pub answer: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

#[derive(Debug)]
struct ActiveRound {
    session: SharedSession,
    countdown: JoinHandle<()>,
}

/// Shared state for HTTP and WebSocket handlers.
#[derive(Debug)]
pub struct AppState {
    /// The engine running rounds.
    pub engine: QuizEngine,
    /// Configuration.
    pub config: Config,
    /// Event fan-out for WebSocket clients.
    pub broadcaster: EventBroadcaster,
    tick_period: Duration,
    round: Mutex<Option<ActiveRound>>,
}

impl AppState {
    /// Creates state with no round and a one-second countdown.
    #[must_use]
    pub fn new(engine: QuizEngine, config: Config) -> Self {
        Self {
            engine,
            config,
            broadcaster: EventBroadcaster::default(),
            tick_period: TICK_PERIOD,
            round: Mutex::new(None),
        }
    }

    /// Overrides the countdown period.
    #[must_use]
    pub const fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Snapshot of the current round, if any.
    pub async fn current_view(&self) -> Option<SessionView> {
        let session = self.current_session().await?;
        let view = session.lock().await.view();
        Some(view)
    }

    /// Handle to the current round, if any.
    pub async fn current_session(&self) -> Option<SharedSession> {
        self.round
            .lock()
            .await
            .as_ref()
            .map(|round| Arc::clone(&round.session))
    }

    async fn install(&self, session: Session) -> SessionView {
        let view = session.view();
        let session = session.into_shared();

        let mut round = self.round.lock().await;
        if let Some(previous) = round.take() {
            previous.countdown.abort();
            info!("Replaced the previous round");
        }

        self.broadcaster.send(RoundEvent::round_started(view.clone()));
        let countdown = spawn_countdown(
            Arc::clone(&session),
            self.broadcaster.clone(),
            self.tick_period,
        );
        *round = Some(ActiveRound { session, countdown });
        view
    }

    async fn leave(&self) -> bool {
        match self.round.lock().await.take() {
            Some(round) => {
                round.countdown.abort();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

#[derive(Debug)]
enum ApiError {
    NoRound,
    Quiz(QuizError),
}

impl From<QuizError> for ApiError {
    fn from(e: QuizError) -> Self {
        Self::Quiz(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NoRound => (StatusCode::NOT_FOUND, "No round in progress".to_string()),
            Self::Quiz(e) => {
                let status = match &e {
                    QuizError::EmptyQuestionSet { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    QuizError::GatewayUnavailable { .. } => StatusCode::BAD_GATEWAY,
                    QuizError::NoActiveQuestion { .. } => StatusCode::CONFLICT,
                    QuizError::OracleUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the router with the API routes, the WebSocket route, CORS and
/// request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(handle_start))
        .route("/session", get(handle_status).delete(handle_leave))
        .route("/session/question", get(handle_question))
        .route("/session/answer", post(handle_answer));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRoundRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let count = request.count.unwrap_or(state.config.questions_per_round);
    info!(difficulty = %request.difficulty, count, "Start round requested");

    let session = state
        .engine
        .start_session(request.difficulty, count)
        .await
        .map_err(|e| {
            warn!(error = %e, "Could not start round");
            e
        })?;

    let view = state.install(session).await;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, ApiError> {
    state.current_view().await.map(Json).ok_or(ApiError::NoRound)
}

async fn handle_leave(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    if state.leave().await {
        info!("Player left the round");
        state.engine.flush_progress().await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NoRound)
    }
}

async fn handle_question(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QuestionView>, ApiError> {
    let session = state.current_session().await.ok_or(ApiError::NoRound)?;
    let view = session.lock().await.current_question_view()?;
    Ok(Json(view))
}

async fn handle_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerOutcome>, ApiError> {
    let session = state.current_session().await.ok_or(ApiError::NoRound)?;
    let session_id = session.lock().await.id();

    let outcome = state.engine.submit_answer(&session, &request.answer).await?;

    match &outcome {
        AnswerOutcome::Graded {
            verdict,
            question_index,
            xp_awarded,
            status,
            ..
        } => {
            state
                .broadcaster
                .send(RoundEvent::AnswerGraded(AnswerGradedPayload {
                    session_id,
                    question_index: *question_index,
                    is_correct: verdict.is_correct,
                    xp_awarded: *xp_awarded,
                    status: *status,
                }));
            if *status == SessionStatus::Over {
                let view = session.lock().await.view();
                state.broadcaster.send(RoundEvent::round_over(view));
            }
            if let Some(e) = outcome.delivery_error() {
                state.broadcaster.send(RoundEvent::error(e.to_string()));
            }
        }
        AnswerOutcome::Unverified { message } => {
            state
                .broadcaster
                .send(RoundEvent::AnswerUnverified(AnswerUnverifiedPayload {
                    session_id,
                    message: message.clone(),
                }));
        }
        AnswerOutcome::Discarded => {}
    }

    Ok(Json(outcome))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use tower::util::ServiceExt;

    use super::*;
    use crate::oracle::Grader;
    use crate::progress::{InMemoryProgressSink, ProgressDispatcher};
    use crate::question::{GatewayError, Question, QuestionGateway, StaticGateway};
    use crate::retry::RetryConfig;

    fn questions() -> Vec<Question> {
        vec![
            Question::new("b1", "Capital of France?", "Paris", Difficulty::Basic)
                .with_distractors(["Lyon", "Nice"]),
            Question::new("b2", "Capital of Italy?", "Rome", Difficulty::Basic),
        ]
    }

    fn engine(gateway: Arc<dyn QuestionGateway>) -> QuizEngine {
        QuizEngine::new(
            gateway,
            Grader::exact_only(),
            ProgressDispatcher::new(
                Arc::new(InMemoryProgressSink::new()),
                RetryConfig::immediate(1),
            ),
        )
    }

    fn router() -> Router {
        let engine = engine(Arc::new(StaticGateway::new(questions())));
        let state =
            AppState::new(engine, Config::default()).with_tick_period(Duration::from_secs(3600));
        create_router(state)
    }

    struct DownGateway;

    #[async_trait]
    impl QuestionGateway for DownGateway {
        async fn fetch(&self, _d: Difficulty, _n: usize) -> Result<Vec<Question>, GatewayError> {
            Err(GatewayError("connection refused".to_string()))
        }
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        router.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // ------------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_round_returns_view_without_answers() {
        let router = router();
        let response = send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "basic", "count": 5 })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["totalQuestions"], 2);
        assert_eq!(body["secondsRemaining"], 60);
        assert!(!body.to_string().contains("canonicalAnswer"));
    }

    #[tokio::test]
    async fn test_start_round_with_empty_tier_is_unprocessable() {
        let router = router();
        let response = send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "advanced" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("No questions available for advanced tier"));
    }

    #[tokio::test]
    async fn test_start_round_with_gateway_down_is_bad_gateway() {
        let router = create_router(AppState::new(engine(Arc::new(DownGateway)), Config::default()));
        let response = send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "basic" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    // ------------------------------------------------------------------------
    // No round
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_endpoints_without_round_are_not_found() {
        let router = router();
        assert_eq!(
            send(&router, Method::GET, "/api/session", None).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&router, Method::GET, "/api/session/question", None)
                .await
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(
                &router,
                Method::POST,
                "/api/session/answer",
                Some(serde_json::json!({ "answer": "x" }))
            )
            .await
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&router, Method::DELETE, "/api/session", None)
                .await
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    // ------------------------------------------------------------------------
    // Playing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_question_then_answers_until_over() {
        let router = router();
        send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "basic" })),
        )
        .await;

        let question =
            json_body(send(&router, Method::GET, "/api/session/question", None).await).await;
        assert_eq!(question["index"], 0);
        assert_eq!(question["options"], serde_json::json!(["Lyon", "Nice", "Paris"]));

        let wrong = json_body(
            send(
                &router,
                Method::POST,
                "/api/session/answer",
                Some(serde_json::json!({ "answer": "Lyon" })),
            )
            .await,
        )
        .await;
        assert_eq!(wrong["outcome"], "graded");
        assert_eq!(wrong["verdict"]["isCorrect"], false);
        assert_eq!(wrong["xpAwarded"], 0);

        let right = json_body(
            send(
                &router,
                Method::POST,
                "/api/session/answer",
                Some(serde_json::json!({ "answer": "paris" })),
            )
            .await,
        )
        .await;
        assert_eq!(right["verdict"]["isCorrect"], true);
        assert_eq!(right["xpAwarded"], 3000);
        assert_eq!(right["delivery"]["state"], "delivered");

        let last = json_body(
            send(
                &router,
                Method::POST,
                "/api/session/answer",
                Some(serde_json::json!({ "answer": "Rome" })),
            )
            .await,
        )
        .await;
        assert_eq!(last["status"], "over");
        assert_eq!(last["endReason"], "questions_exhausted");

        let response = send(&router, Method::GET, "/api/session/question", None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["error"], "No active question: the round is over");

        let status = json_body(send(&router, Method::GET, "/api/session", None).await).await;
        assert_eq!(status["correctCount"], 2);
        assert_eq!(status["incorrectCount"], 1);
        assert_eq!(status["xpEarned"], 6000);
    }

    #[tokio::test]
    async fn test_leave_round() {
        let router = router();
        send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "basic" })),
        )
        .await;

        let response = send(&router, Method::DELETE, "/api/session", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            send(&router, Method::GET, "/api/session", None).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_invalid_difficulty_is_rejected() {
        let router = router();
        let response = send(
            &router,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({ "difficulty": "expert" })),
        )
        .await;
        assert!(response.status().is_client_error());
    }
}
