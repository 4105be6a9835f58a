//! Difficulty-weighted XP scoring.
//!
//! `xp = seconds_remaining * BASE_POINTS_PER_SECOND * multiplier(difficulty)`
//!
//! Multipliers are kept in halves so every delta is a whole number.

use crate::question::Difficulty;

/// Points awarded per remaining second before the tier multiplier.
pub const BASE_POINTS_PER_SECOND: u64 = 50;

impl Difficulty {
    /// Tier multiplier expressed in halves (`0.5 -> 1`, `1.0 -> 2`, `1.5 -> 3`).
    const fn multiplier_halves(self) -> u64 {
        match self {
            Self::Fundamentals => 1,
            Self::Basic => 2,
            Self::Advanced => 3,
        }
    }

    /// Scoring multiplier for this tier.
    ///
    /// ```
    /// use quiz_engine::Difficulty;
    ///
    /// assert_eq!(Difficulty::Fundamentals.multiplier(), 0.5);
    /// assert_eq!(Difficulty::Basic.multiplier(), 1.0);
    /// assert_eq!(Difficulty::Advanced.multiplier(), 1.5);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn multiplier(self) -> f64 {
        self.multiplier_halves() as f64 / 2.0
    }
}

/// XP awarded for a correct answer given with `seconds_remaining` on the clock.
///
/// ```
/// use quiz_engine::{xp_delta, Difficulty};
///
/// assert_eq!(xp_delta(Difficulty::Basic, 40), 2000);
/// assert_eq!(xp_delta(Difficulty::Fundamentals, 40), 1000);
/// assert_eq!(xp_delta(Difficulty::Advanced, 40), 3000);
/// assert_eq!(xp_delta(Difficulty::Advanced, 0), 0);
/// ```
#[must_use]
pub const fn xp_delta(difficulty: Difficulty, seconds_remaining: u32) -> u64 {
    seconds_remaining as u64 * BASE_POINTS_PER_SECOND * difficulty.multiplier_halves() / 2
}
