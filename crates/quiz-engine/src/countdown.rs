//! Drives a session's countdown from a tokio interval.
//!
//! The engine owns no timers. Hosts that want a real-time countdown spawn
//! one of these per round; it ticks the shared session once per period,
//! publishes a `tick` event each time, and a `round_over` event if the tick
//! ended the round.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::session::SharedSession;
use crate::websocket::{EventBroadcaster, RoundEvent};

/// Real-time countdown period.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Spawns a task that ticks `session` every `period` until the round stops
/// running.
///
/// Abort the returned handle to stop it early.
pub fn spawn_countdown(
    session: SharedSession,
    broadcaster: EventBroadcaster,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let (id, seconds_remaining, ended) = {
                let mut session = session.lock().await;
                if !session.tick() {
                    debug!(
                        session_id = %session.id(),
                        "Round no longer running, countdown stopped"
                    );
                    break;
                }
                (
                    session.id(),
                    session.seconds_remaining(),
                    session.is_over().then(|| session.view()),
                )
            };

            broadcaster.send(RoundEvent::tick(id, seconds_remaining));
            if let Some(view) = ended {
                info!(session_id = %id, "Time expired, round over");
                broadcaster.send(RoundEvent::round_over(view));
                break;
            }
        }
    })
}
