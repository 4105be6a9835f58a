//! XP delivery to the user progress sink.
//!
//! Every correct answer produces one [`XpAward`] keyed by
//! `(session id, question index)`. Sinks must treat a replayed key as already
//! applied, which lets [`ProgressDispatcher`] retry transient failures without
//! double-crediting the player.
//!
//! Awards that still fail after the retry budget are kept by the dispatcher
//! and sent again before the next award and on [`ProgressDispatcher::flush`].

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::QuizError;
use crate::question::Difficulty;
use crate::retry::{retry_if, RetryConfig};

// ============================================================================
// Award
// ============================================================================

/// Idempotency key for one XP award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryKey {
    /// Session that produced the award.
    pub session_id: Uuid,
    /// Question the award is for.
    pub question_index: usize,
}

impl std::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.session_id, self.question_index)
    }
}

/// XP credited for one correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    /// Idempotency key.
    pub key: DeliveryKey,
    /// Tier of the round.
    pub difficulty: Difficulty,
    /// XP to add.
    pub delta: u64,
}

/// What the sink did with an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The award was credited.
    Applied,
    /// The key was seen before; nothing was credited.
    AlreadyApplied,
}

// ============================================================================
// Sink contract
// ============================================================================

/// Failure reported by a progress sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The store could not be reached; retrying may succeed.
    #[error("progress store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the award; retrying will not help.
    #[error("progress store rejected the award: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Returns `true` if the write may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Durable store of cumulative XP.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Credits `award` unless its key was already applied.
    async fn apply_xp(&self, award: &XpAward) -> Result<ApplyOutcome, SinkError>;
}

// ============================================================================
// Profile
// ============================================================================

/// Number of most recent sessions whose keys a profile remembers.
pub const TRACKED_SESSIONS: usize = 16;

/// Cumulative progress of one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressProfile {
    /// Total XP earned.
    pub xp: u64,
    /// Number of credited correct answers.
    pub questions_answered: u64,
    /// Keys already credited, for the tracked sessions only.
    #[serde(default)]
    pub applied_keys: HashSet<DeliveryKey>,
    /// Sessions with remembered keys, oldest first.
    #[serde(default)]
    pub recent_sessions: VecDeque<Uuid>,
}

impl ProgressProfile {
    fn apply(&mut self, award: &XpAward) -> ApplyOutcome {
        if !self.applied_keys.insert(award.key) {
            return ApplyOutcome::AlreadyApplied;
        }
        self.xp += award.delta;
        self.questions_answered += 1;
        self.track_session(award.key.session_id);
        ApplyOutcome::Applied
    }

    /// Forgets keys of sessions older than the last [`TRACKED_SESSIONS`].
    fn track_session(&mut self, session_id: Uuid) {
        if self.recent_sessions.contains(&session_id) {
            return;
        }
        self.recent_sessions.push_back(session_id);
        if self.recent_sessions.len() <= TRACKED_SESSIONS {
            return;
        }

        while self.recent_sessions.len() > TRACKED_SESSIONS {
            self.recent_sessions.pop_front();
        }
        let recent = &self.recent_sessions;
        self.applied_keys.retain(|key| recent.contains(&key.session_id));
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Sink that keeps the profile in memory.
#[derive(Debug, Default)]
pub struct InMemoryProgressSink {
    profile: Mutex<ProgressProfile>,
}

impl InMemoryProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current profile.
    pub async fn profile(&self) -> ProgressProfile {
        self.profile.lock().await.clone()
    }

    /// Total XP credited.
    pub async fn total_xp(&self) -> u64 {
        self.profile.lock().await.xp
    }
}

#[async_trait]
impl ProgressSink for InMemoryProgressSink {
    async fn apply_xp(&self, award: &XpAward) -> Result<ApplyOutcome, SinkError> {
        Ok(self.profile.lock().await.apply(award))
    }
}

// ============================================================================
// File sink
// ============================================================================

/// Sink that persists the profile as JSON.
///
/// The file is rewritten through a temporary sibling and a rename, so a crash
/// never leaves a half-written profile.
#[derive(Debug)]
pub struct FileProgressSink {
    path: PathBuf,
    profile: Mutex<ProgressProfile>,
}

impl FileProgressSink {
    /// Opens the profile at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ProgressFileError` if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let profile = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| QuizError::progress_file(&path, e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No progress file, starting fresh profile");
                ProgressProfile::default()
            }
            Err(e) => return Err(QuizError::progress_file(&path, e.to_string())),
        };

        Ok(Self {
            path,
            profile: Mutex::new(profile),
        })
    }

    /// Path of the profile file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the current profile.
    pub async fn profile(&self) -> ProgressProfile {
        self.profile.lock().await.clone()
    }

    async fn persist(&self, profile: &ProgressProfile) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ProgressSink for FileProgressSink {
    async fn apply_xp(&self, award: &XpAward) -> Result<ApplyOutcome, SinkError> {
        let mut profile = self.profile.lock().await;
        let mut updated = profile.clone();
        let outcome = updated.apply(award);
        if outcome == ApplyOutcome::AlreadyApplied {
            return Ok(outcome);
        }

        // Only commit in memory once the file write went through.
        self.persist(&updated).await?;
        *profile = updated;
        Ok(outcome)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Result of handing an award to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The sink acknowledged the award.
    Delivered {
        /// Attempts it took.
        attempts: usize,
    },
    /// The award was handed to a background task.
    Queued,
    /// Every attempt failed.
    Failed {
        /// Attempts made.
        attempts: usize,
        /// Last failure.
        message: String,
    },
}

impl DeliveryStatus {
    /// Converts a failed delivery into `QuizError::SinkWriteFailed`.
    #[must_use]
    pub fn as_error(&self) -> Option<QuizError> {
        match self {
            Self::Failed { attempts, message } => {
                Some(QuizError::sink_write_failed(*attempts, message.clone()))
            }
            _ => None,
        }
    }
}

/// Delivers awards to a sink with retries.
///
/// Clones share the queue of undelivered awards and the background tasks.
#[derive(Clone)]
pub struct ProgressDispatcher {
    sink: Arc<dyn ProgressSink>,
    retry: RetryConfig,
    background: bool,
    undelivered: Arc<Mutex<Vec<XpAward>>>,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl std::fmt::Debug for ProgressDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressDispatcher")
            .field("retry", &self.retry)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

impl ProgressDispatcher {
    /// Creates a dispatcher that awaits each delivery.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>, retry: RetryConfig) -> Self {
        Self {
            sink,
            retry,
            background: false,
            undelivered: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Spawns deliveries on the runtime instead of awaiting them.
    #[must_use]
    pub const fn in_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Delivers `award`, retrying transient failures.
    ///
    /// Awards left over from earlier failed deliveries are sent first.
    pub async fn dispatch(&self, award: XpAward) -> DeliveryStatus {
        if self.background {
            let this = self.clone();
            let mut in_flight = self.in_flight.lock().await;
            // Reap finished tasks.
            while let Some(Some(_)) = in_flight.join_next().now_or_never() {}
            in_flight.spawn(async move {
                this.redeliver().await;
                this.deliver(award).await;
            });
            return DeliveryStatus::Queued;
        }
        self.redeliver().await;
        self.deliver(award).await
    }

    /// Waits for background deliveries, then sends undelivered awards again.
    ///
    /// Returns the number of awards still undelivered.
    pub async fn flush(&self) -> usize {
        let mut in_flight = std::mem::take(&mut *self.in_flight.lock().await);
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background XP delivery task did not finish");
            }
        }

        let remaining = self.redeliver().await;
        if remaining > 0 {
            error!(remaining, "XP awards are still undelivered");
        }
        remaining
    }

    /// Number of awards waiting for another delivery attempt.
    pub async fn undelivered_count(&self) -> usize {
        self.undelivered.lock().await.len()
    }

    async fn redeliver(&self) -> usize {
        let awards = std::mem::take(&mut *self.undelivered.lock().await);
        if !awards.is_empty() {
            info!(count = awards.len(), "Retrying undelivered XP awards");
            for award in awards {
                self.deliver(award).await;
            }
        }
        self.undelivered.lock().await.len()
    }

    async fn deliver(&self, award: XpAward) -> DeliveryStatus {
        let mut attempts = 0;
        let result = retry_if(&self.retry, SinkError::is_transient, || {
            attempts += 1;
            let attempt = attempts;
            async move {
                let result = self.sink.apply_xp(&award).await;
                if let Err(e) = &result {
                    warn!(key = %award.key, attempt, error = %e, "XP write failed");
                }
                result
            }
        })
        .await;

        match result {
            Ok(outcome) => {
                if outcome == ApplyOutcome::AlreadyApplied {
                    debug!(key = %award.key, "XP award already applied");
                } else {
                    info!(key = %award.key, delta = award.delta, attempts, "XP recorded");
                }
                DeliveryStatus::Delivered { attempts }
            }
            Err(exhausted) => {
                if exhausted.last_error.is_transient() {
                    warn!(
                        key = %award.key,
                        delta = award.delta,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "XP delivery failed, keeping the award for a later retry"
                    );
                    self.undelivered.lock().await.push(award);
                } else {
                    error!(
                        key = %award.key,
                        delta = award.delta,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "Giving up on XP delivery"
                    );
                }
                DeliveryStatus::Failed {
                    attempts: exhausted.attempts,
                    message: exhausted.last_error.to_string(),
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
