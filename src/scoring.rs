//! Final scoring, computed once when a run completes.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

/// Per-session counters kept by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Actions submitted while running, valid or not.
    pub attempts: u32,
    /// Actions that passed safety and domain validation.
    pub correct: u32,
    /// Current run of consecutive correct actions.
    pub streak: u32,
    /// Longest streak of the run.
    pub best_streak: u32,
    /// Hints handed out.
    pub hints_used: u32,
}

impl SessionMetrics {
    /// Records one verdict.
    pub fn record(&mut self, is_valid: bool) {
        self.attempts += 1;
        if is_valid {
            self.correct += 1;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
        } else {
            self.streak = 0;
        }
    }

    /// Correct/attempt ratio in [0, 1]; zero before any attempt.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.correct) / f64::from(self.attempts)
    }
}

/// Itemized final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Points accrued by completed steps.
    pub base: f64,
    /// Bonus for finishing early.
    pub time_bonus: f64,
    /// Bonus for consecutive valid actions.
    pub streak_bonus: f64,
    /// Bonus proportional to accuracy.
    pub accuracy_bonus: f64,
    /// Scale applied for difficulty.
    pub difficulty_multiplier: f64,
    /// `1 - hints × penalty` before clamping. Negative once hints exceed
    /// `1 / penalty`.
    pub hint_multiplier: f64,
    /// Clamped at zero.
    pub total: f64,
}

impl ScoreBreakdown {
    /// True when the hint penalty alone drove the raw total below zero.
    #[must_use]
    pub fn hint_penalty_overflowed(&self) -> bool {
        self.hint_multiplier < 0.0
    }
}

/// `1 + (difficulty - 1) × step`.
#[must_use]
pub fn difficulty_multiplier(difficulty: u8, config: &ScoringConfig) -> f64 {
    1.0 + f64::from(difficulty.saturating_sub(1)) * config.difficulty_step
}

/// Computes the final score from the points earned during the run.
///
/// `base` is the run score; `elapsed_secs` is start to end.
#[must_use]
pub fn final_score(
    base: f64,
    elapsed_secs: f64,
    metrics: &SessionMetrics,
    difficulty: u8,
    config: &ScoringConfig,
) -> ScoreBreakdown {
    let multiplier = difficulty_multiplier(difficulty, config);

    let remaining = (config.time_limit_secs - elapsed_secs).max(0.0);
    let time_fraction = if config.time_limit_secs > 0.0 {
        (remaining / config.time_limit_secs).min(1.0)
    } else {
        0.0
    };
    let time_bonus = base * config.max_time_bonus_fraction * time_fraction;

    let streaks = if config.streak_length == 0 {
        0
    } else {
        metrics.best_streak / config.streak_length
    };
    let streak_bonus = f64::from(streaks) * config.streak_points * multiplier;

    let accuracy_bonus = base * config.max_accuracy_bonus_fraction * metrics.accuracy();

    let hint_multiplier = 1.0 - f64::from(metrics.hints_used) * config.hint_penalty;
    let raw = (base + time_bonus + streak_bonus + accuracy_bonus) * multiplier * hint_multiplier;

    ScoreBreakdown {
        base,
        time_bonus,
        streak_bonus,
        accuracy_bonus,
        difficulty_multiplier: multiplier,
        hint_multiplier,
        total: raw.max(0.0),
    }
}
