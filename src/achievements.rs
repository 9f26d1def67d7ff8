//! Achievement evaluation at the end of a run.
//!
//! Session rules read only the final metrics. History rules need totals that
//! span sessions; those are answered by a [`SessionHistory`] supplied by the
//! caller, and stay locked when the history cannot answer.

use serde::{Deserialize, Serialize};

use crate::scoring::{ScoreBreakdown, SessionMetrics};
use crate::step::Subject;

/// Achievements the kernel knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    /// Every submitted action was valid.
    PerfectAccuracy,
    /// Finished well inside the time allowance.
    SpeedRun,
    /// Reached a long run of consecutive valid actions.
    LongStreak,
    /// Final score above the high-score mark.
    HighScore,
    /// Finished without asking for a hint.
    NoHints,
    /// No rejected actions and no undo.
    FirstTry,
    /// Completed many runs in this subject.
    SubjectRegular,
    /// Completed many runs overall.
    Veteran,
}

impl Achievement {
    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerfectAccuracy => "perfect_accuracy",
            Self::SpeedRun => "speed_run",
            Self::LongStreak => "long_streak",
            Self::HighScore => "high_score",
            Self::NoHints => "no_hints",
            Self::FirstTry => "first_try",
            Self::SubjectRegular => "subject_regular",
            Self::Veteran => "veteran",
        }
    }
}

/// Final facts about one completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary<'a> {
    /// Subject of the run.
    pub subject: Subject,
    /// Counters gathered during the run.
    pub metrics: &'a SessionMetrics,
    /// Final score.
    pub score: &'a ScoreBreakdown,
    /// Wall time from start to completion (s).
    pub completion_secs: f64,
    /// Undo was never used.
    pub no_undo: bool,
}

/// Cross-session milestones a history store can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Enough completed runs in the run's subject.
    SubjectCompletions,
    /// Enough completed runs overall.
    TotalCompletions,
}

/// Cross-session totals kept outside the kernel.
///
/// The store owns the milestone thresholds. `None` means it has no answer,
/// which never unlocks anything.
pub trait SessionHistory: Send + Sync {
    /// Whether the learner has reached `milestone`, counting the run being
    /// evaluated.
    fn milestone_reached(&self, milestone: Milestone, subject: Subject) -> Option<bool>;
}

/// History store that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl SessionHistory for NoHistory {
    fn milestone_reached(&self, _milestone: Milestone, _subject: Subject) -> Option<bool> {
        None
    }
}

const SPEED_RUN_SECS: f64 = 120.0;
const LONG_STREAK: u32 = 20;
const HIGH_SCORE: f64 = 1000.0;

enum Rule {
    Session(fn(&SessionSummary<'_>) -> bool),
    History(Milestone),
}

fn perfect_accuracy(s: &SessionSummary<'_>) -> bool {
    s.metrics.attempts > 0 && s.metrics.correct == s.metrics.attempts
}

fn speed_run(s: &SessionSummary<'_>) -> bool {
    s.completion_secs < SPEED_RUN_SECS
}

fn long_streak(s: &SessionSummary<'_>) -> bool {
    s.metrics.best_streak >= LONG_STREAK
}

fn high_score(s: &SessionSummary<'_>) -> bool {
    s.score.total >= HIGH_SCORE
}

fn no_hints(s: &SessionSummary<'_>) -> bool {
    s.metrics.hints_used == 0
}

fn first_try(s: &SessionSummary<'_>) -> bool {
    s.no_undo && s.metrics.attempts == s.metrics.correct
}

static RULES: [(Achievement, Rule); 8] = [
    (Achievement::PerfectAccuracy, Rule::Session(perfect_accuracy)),
    (Achievement::SpeedRun, Rule::Session(speed_run)),
    (Achievement::LongStreak, Rule::Session(long_streak)),
    (Achievement::HighScore, Rule::Session(high_score)),
    (Achievement::NoHints, Rule::Session(no_hints)),
    (Achievement::FirstTry, Rule::Session(first_try)),
    (Achievement::SubjectRegular, Rule::History(Milestone::SubjectCompletions)),
    (Achievement::Veteran, Rule::History(Milestone::TotalCompletions)),
];

/// Returns the achievements `summary` satisfies, in rule order.
#[must_use]
pub fn evaluate(summary: &SessionSummary<'_>, history: &dyn SessionHistory) -> Vec<Achievement> {
    RULES
        .iter()
        .filter(|(_, rule)| match rule {
            Rule::Session(check) => check(summary),
            Rule::History(milestone) => history
                .milestone_reached(*milestone, summary.subject)
                .unwrap_or(false),
        })
        .map(|(achievement, _)| *achievement)
        .collect()
}
