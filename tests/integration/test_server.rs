//! Integration tests for the play server.
//!
//! These tests run the real router on an ephemeral port and talk to it over
//! HTTP and WebSocket, the way a browser client would.

use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use quiz_engine::{
    create_router, AppState, Config, CountdownConfig, Difficulty, EndReason, InMemoryProgressSink,
    QuestionBank, QuizEngine, RoundEvent, SessionStatus,
};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn fixture_bank() -> QuestionBank {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/questions.json");
    QuestionBank::load(path).expect("Failed to load fixture bank")
}

fn app_state(countdown: CountdownConfig, tick_period: Duration) -> AppState {
    let config = Config {
        countdown,
        ..Config::default()
    };
    let engine = QuizEngine::from_config(
        &config,
        Arc::new(fixture_bank()),
        None,
        Arc::new(InMemoryProgressSink::new()),
    );
    AppState::new(engine, config).with_tick_period(tick_period)
}

/// A server whose countdown never ticks during a test.
fn frozen_state() -> AppState {
    app_state(CountdownConfig::default(), Duration::from_secs(3600))
}

/// Spawns the test server and returns its base address.
async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, handle)
}

async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next round event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> RoundEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Skips `tick` events.
async fn receive_non_tick(client: &mut WsClient) -> RoundEvent {
    loop {
        let event = receive_event(client).await;
        if !matches!(event, RoundEvent::Tick(_)) {
            return event;
        }
    }
}

async fn start_round(http: &reqwest::Client, addr: &str, body: Value) -> reqwest::Response {
    http.post(format!("http://{addr}/api/sessions"))
        .json(&body)
        .send()
        .await
        .expect("Request failed")
}

async fn answer(http: &reqwest::Client, addr: &str, text: &str) -> Value {
    http.post(format!("http://{addr}/api/session/answer"))
        .json(&json!({ "answer": text }))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON")
}

/// Looks up the canonical answer for the question currently shown.
async fn correct_answer(http: &reqwest::Client, addr: &str, bank: &QuestionBank) -> String {
    let question: Value = http
        .get(format!("http://{addr}/api/session/question"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    let id = question["id"].as_str().expect("Question without id");
    bank.questions()
        .iter()
        .find(|q| q.id == id)
        .map(|q| q.canonical_answer.clone())
        .expect("Question not in bank")
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test]
async fn test_full_round_over_http() {
    let (addr, _handle) = spawn_test_server(frozen_state()).await;
    let http = reqwest::Client::new();
    let bank = fixture_bank();

    let response = start_round(
        &http,
        &addr,
        json!({ "difficulty": "fundamentals", "count": 2 }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let view: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(view["totalQuestions"], 2);
    assert_eq!(view["secondsRemaining"], 60);
    assert_eq!(view["currentQuestion"]["options"].as_array().map(Vec::len), Some(4));

    let wrong = answer(&http, &addr, "definitely wrong").await;
    assert_eq!(wrong["outcome"], "graded");
    assert_eq!(wrong["verdict"]["isCorrect"], false);

    for _ in 0..2 {
        let text = correct_answer(&http, &addr, &bank).await;
        let outcome = answer(&http, &addr, &text).await;
        assert_eq!(outcome["verdict"]["isCorrect"], true);
        // Fundamentals at 60s: 50 * 60 * 0.5
        assert_eq!(outcome["xpAwarded"], 1500);
    }

    let status: Value = http
        .get(format!("http://{addr}/api/session"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(status["status"], "over");
    assert_eq!(status["endReason"], "questions_exhausted");
    assert_eq!(status["xpEarned"], 3000);

    let response = http
        .get(format!("http://{addr}/api/session/question"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_start_round_error_statuses() {
    let (addr, _handle) = spawn_test_server(frozen_state()).await;
    let http = reqwest::Client::new();

    let response = start_round(&http, &addr, json!({ "difficulty": "basic", "count": 0 })).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let response = http
        .get(format!("http://{addr}/api/session"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["error"], "No round in progress");
}

#[tokio::test]
async fn test_round_never_exposes_answers() {
    let (addr, _handle) = spawn_test_server(frozen_state()).await;
    let http = reqwest::Client::new();

    let view = start_round(&http, &addr, json!({ "difficulty": "basic" }))
        .await
        .text()
        .await
        .expect("No body");
    assert!(!view.contains("canonicalAnswer"));
    for q in fixture_bank().questions() {
        if q.difficulty == Difficulty::Basic {
            assert!(!view.contains(&format!("\"{}\"", q.canonical_answer)));
        }
    }
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_without_round() {
    let (addr, _handle) = spawn_test_server(frozen_state()).await;

    let mut client = connect_client(&addr).await;
    match receive_event(&mut client).await {
        RoundEvent::Connected(payload) => assert!(payload.session.is_none()),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_round_events_are_broadcast() {
    let (addr, _handle) = spawn_test_server(frozen_state()).await;
    let http = reqwest::Client::new();
    let bank = fixture_bank();

    let mut client1 = connect_client(&addr).await;
    let mut client2 = connect_client(&addr).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    start_round(&http, &addr, json!({ "difficulty": "basic", "count": 1 })).await;
    for client in [&mut client1, &mut client2] {
        match receive_non_tick(client).await {
            RoundEvent::RoundStarted(payload) => {
                assert_eq!(payload.session.status, SessionStatus::Running);
                assert_eq!(payload.session.total_questions, 1);
            }
            other => panic!("Expected RoundStarted event, got: {other:?}"),
        }
    }

    let text = correct_answer(&http, &addr, &bank).await;
    answer(&http, &addr, &text).await;

    match receive_non_tick(&mut client1).await {
        RoundEvent::AnswerGraded(payload) => {
            assert!(payload.is_correct);
            assert_eq!(payload.xp_awarded, 3000);
            assert_eq!(payload.status, SessionStatus::Over);
        }
        other => panic!("Expected AnswerGraded event, got: {other:?}"),
    }
    match receive_non_tick(&mut client1).await {
        RoundEvent::RoundOver(payload) => {
            assert_eq!(payload.session.end_reason, Some(EndReason::QuestionsExhausted));
        }
        other => panic!("Expected RoundOver event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_countdown_ticks_until_time_expires() {
    let countdown = CountdownConfig {
        fundamentals: 3,
        ..CountdownConfig::default()
    };
    let state = app_state(countdown, Duration::from_millis(20));
    let (addr, _handle) = spawn_test_server(state).await;
    let http = reqwest::Client::new();

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    start_round(&http, &addr, json!({ "difficulty": "fundamentals" })).await;
    assert!(matches!(receive_event(&mut client).await, RoundEvent::RoundStarted(_)));

    let mut remaining = Vec::new();
    loop {
        match receive_event(&mut client).await {
            RoundEvent::Tick(tick) => remaining.push(tick.seconds_remaining),
            RoundEvent::RoundOver(payload) => {
                assert_eq!(payload.session.end_reason, Some(EndReason::TimeExpired));
                break;
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }
    assert_eq!(remaining, vec![2, 1, 0]);

    let response = http
        .post(format!("http://{addr}/api/session/answer"))
        .json(&json!({ "answer": "let" }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_leaving_stops_the_countdown() {
    let state = app_state(CountdownConfig::default(), Duration::from_millis(20));
    let (addr, _handle) = spawn_test_server(state).await;
    let http = reqwest::Client::new();

    start_round(&http, &addr, json!({ "difficulty": "basic" })).await;
    let response = http
        .delete(format!("http://{addr}/api/session"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let mut client = connect_client(&addr).await;
    match receive_event(&mut client).await {
        RoundEvent::Connected(payload) => assert!(payload.session.is_none()),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
    let next = timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "No events expected after leaving");
}
