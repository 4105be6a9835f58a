//! Quiz CLI
//!
//! Plays rounds in the terminal, prints lesson cards, or serves the play API.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quiz_engine::{
    create_router, spawn_countdown, AnswerOutcome, AppState, Config, Difficulty, EventBroadcaster,
    FileProgressSink, InMemoryProgressSink, ProgressSink, QuestionBank, QuestionView, QuizEngine,
    RoundEvent, SemanticJudge, Session, SharedSession, TICK_PERIOD,
};
use quiz_judge::JudgeClient;
use quiz_report::{write_reports, RoundReport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Number of lesson cards shown by `learn` when `--count` is omitted.
const DEFAULT_LESSON_COUNT: usize = 10;

/// Quiz - timed rounds with XP
///
/// Answer questions against the clock; faster correct answers earn more XP.
#[derive(Parser, Debug)]
#[command(name = "quiz")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: quiz.json in current directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// Path to the question bank (overrides questionBank)
    #[arg(short, long, global = true, value_name = "FILE")]
    bank: Option<String>,

    /// Output directory for round reports
    #[arg(short, long, global = true, value_name = "DIR")]
    output_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a round in the terminal
    Play {
        /// Tier to play
        #[arg(short, long, default_value_t = Difficulty::Fundamentals)]
        difficulty: Difficulty,

        /// Number of questions (default: questionsPerRound)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Print lesson cards for a tier
    Learn {
        /// Tier to study
        #[arg(short, long, default_value_t = Difficulty::Fundamentals)]
        difficulty: Difficulty,

        /// Number of cards
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Run the HTTP and WebSocket play server
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, bank = ?args.bank, "Starting quiz");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref bank) = args.bank {
        config.question_bank.clone_from(bank);
    }
    if let Some(ref output_dir) = args.output_dir {
        config.output_dir.clone_from(output_dir);
    }

    // Re-validate after overrides
    config.validate()?;

    match args.command {
        Command::Play { difficulty, count } => play(config, difficulty, count).await,
        Command::Learn { difficulty, count } => {
            learn(&config, difficulty, count.unwrap_or(DEFAULT_LESSON_COUNT))
        }
        Command::Serve { port } => serve(config, port).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Builds the engine, attaching a remote judge when a semantic tier needs
/// one and an API key is available.
fn build_engine(config: &Config, bank: QuestionBank, sink: Arc<dyn ProgressSink>) -> QuizEngine {
    let judge: Option<Arc<dyn SemanticJudge>> = if config.grading.uses_semantic() {
        match JudgeClient::from_config(&config.judge) {
            Ok(client) => {
                tracing::info!(
                    endpoint = %client.endpoint(),
                    model = %config.judge.model,
                    "Semantic judge enabled"
                );
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Semantic judge unavailable");
                None
            }
        }
    } else {
        None
    };

    QuizEngine::from_config(config, Arc::new(bank), judge, sink)
}

// ============================================================================
// play
// ============================================================================

async fn play(config: Config, difficulty: Difficulty, count: Option<usize>) -> anyhow::Result<()> {
    let bank = QuestionBank::load(&config.question_bank)?;
    let sink = Arc::new(FileProgressSink::open(&config.progress.file)?);
    let engine = build_engine(&config, bank, Arc::clone(&sink) as Arc<dyn ProgressSink>);

    let count = count.unwrap_or(config.questions_per_round);
    let session = engine.start_session(difficulty, count).await?;
    print_round_intro(&session);

    let shared = session.into_shared();
    let broadcaster = EventBroadcaster::default();
    let events = broadcaster.subscribe();
    let countdown = spawn_countdown(Arc::clone(&shared), broadcaster, TICK_PERIOD);

    let result = answer_loop(&engine, &shared, events).await;
    countdown.abort();
    let undelivered = engine.flush_progress().await;
    result?;

    let session = shared.lock().await.clone();
    print_summary(&session);

    let report = RoundReport::from_session(&session);
    let paths = write_reports(&report, &PathBuf::from(&config.output_dir))?;
    println!();
    println!("Reports written:");
    println!("  Markdown report: {}", paths.markdown.display());
    println!("  JSON report: {}", paths.json.display());

    let profile = sink.profile().await;
    if undelivered > 0 {
        println!();
        println!("⚠️  {undelivered} XP award(s) could not be saved to the progress file");
    }
    println!();
    println!(
        "Total XP: {} ({} questions answered correctly)",
        profile.xp, profile.questions_answered
    );

    Ok(())
}

/// Reads answers from stdin until the round ends, stdin closes, or Ctrl+C.
async fn answer_loop(
    engine: &QuizEngine,
    session: &SharedSession,
    mut events: broadcast::Receiver<RoundEvent>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = PromptState::default();

    loop {
        let Ok(question) = session.lock().await.current_question_view() else {
            break;
        };
        let (new_question, needs_prompt) = prompt.refresh(question.index);
        if new_question {
            print_question(&question);
        }
        if needs_prompt {
            print!("> ");
            std::io::stdout().flush()?;
        }

        tokio::select! {
            line = lines.next_line() => {
                prompt.invalidate();
                let Some(line) = line? else {
                    println!();
                    println!("Input closed, leaving the round");
                    break;
                };
                let answer = resolve_answer(&question, &line);
                if answer.is_empty() {
                    continue;
                }
                let outcome = engine.submit_answer(session, &answer).await?;
                if print_outcome(&outcome) {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(RoundEvent::RoundOver(_)) => {
                        println!();
                        println!("⏰ Time's up!");
                        break;
                    }
                    Ok(RoundEvent::Tick(tick)) if tick.seconds_remaining % 10 == 0 => {
                        println!();
                        println!("⏳ {}s left", tick.seconds_remaining);
                        prompt.invalidate();
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, leaving the round");
                break;
            }
        }
    }

    Ok(())
}

/// Tracks what the terminal already shows so the prompt is not repeated.
#[derive(Debug, Default)]
struct PromptState {
    shown_question: Option<usize>,
    prompt_visible: bool,
}

impl PromptState {
    /// Returns whether the question and the prompt need printing.
    fn refresh(&mut self, question_index: usize) -> (bool, bool) {
        let new_question = self.shown_question != Some(question_index);
        if new_question {
            self.shown_question = Some(question_index);
            self.prompt_visible = false;
        }
        let needs_prompt = !self.prompt_visible;
        self.prompt_visible = true;
        (new_question, needs_prompt)
    }

    /// The prompt line was consumed by input or other output.
    fn invalidate(&mut self) {
        self.prompt_visible = false;
    }
}

/// Maps an option number to its text for multiple-choice questions.
///
/// Input matching an option verbatim is kept as typed, so numeric options
/// can be answered directly.
fn resolve_answer(question: &QuestionView, input: &str) -> String {
    let input = input.trim();
    if question
        .options
        .iter()
        .any(|option| option.trim().eq_ignore_ascii_case(input))
    {
        return input.to_string();
    }
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.options.get(i))
        .map_or_else(|| input.to_string(), Clone::clone)
}

/// Prints feedback for an answer; returns `true` if the round is over.
fn print_outcome(outcome: &AnswerOutcome) -> bool {
    match outcome {
        AnswerOutcome::Graded {
            verdict,
            xp_awarded,
            end_reason,
            ..
        } => {
            if verdict.is_correct {
                println!("✅ Correct! +{xp_awarded} XP");
            } else {
                println!("❌ Incorrect");
            }
            if let Some(e) = outcome.delivery_error() {
                println!("⚠️  {e}");
            }
            if let Some(reason) = end_reason {
                println!("Round over: {reason}");
                return true;
            }
            false
        }
        AnswerOutcome::Unverified { message } => {
            println!("⚠️  Could not verify your answer ({message}). Please try again.");
            false
        }
        AnswerOutcome::Discarded => {
            println!("Too late, the round has moved on");
            false
        }
    }
}

fn print_round_intro(session: &Session) {
    println!(
        "Starting a {} round: {} question(s), {}s on the clock",
        session.difficulty(),
        session.questions().len(),
        session.seconds_remaining()
    );
    if session.difficulty().is_strict() {
        println!("One wrong answer ends the round.");
    }
}

fn print_question(question: &QuestionView) {
    println!();
    println!("Question {}: {}", question.index + 1, question.prompt);
    for (i, option) in question.options.iter().enumerate() {
        println!("  {}. {option}", i + 1);
    }
}

fn print_summary(session: &Session) {
    println!();
    println!("=== Round Summary ===");
    println!("Tier: {}", session.difficulty());
    if let Some(reason) = session.end_reason() {
        println!("Ended: {reason}");
    }
    println!(
        "Correct: {}  Incorrect: {}  Unverified: {}",
        session.correct_count(),
        session.incorrect_count(),
        session.unverified_count()
    );
    println!("XP earned: {}", session.xp_earned());
}

// ============================================================================
// learn
// ============================================================================

fn learn(config: &Config, difficulty: Difficulty, count: usize) -> anyhow::Result<()> {
    let bank = QuestionBank::load(&config.question_bank)?;
    let lessons = bank.lessons(difficulty, count);

    if lessons.is_empty() {
        println!("No lessons available for the {difficulty} tier.");
        return Ok(());
    }

    println!("{} lesson(s) for the {difficulty} tier", lessons.len());
    for (i, lesson) in lessons.iter().enumerate() {
        println!();
        println!("[{}] {}", i + 1, lesson.prompt);
        println!("    {}", lesson.explanation);
    }
    Ok(())
}

// ============================================================================
// serve
// ============================================================================

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let bank = QuestionBank::load(&config.question_bank)?;
    println!(
        "Question bank loaded: {} ({} questions)",
        bank.path().display(),
        bank.len()
    );

    let engine = build_engine(&config, bank, Arc::new(InMemoryProgressSink::new()));
    let router = create_router(AppState::new(engine, config));

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(())
}
