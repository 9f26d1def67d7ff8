//! The authoritative snapshot of one experiment run.
//!
//! A `SimulationState` is never mutated after it has been published by the
//! orchestrator. Engines build the next snapshot from a clone of the current one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::UserAction;
use crate::variables::Variables;

/// A recorded observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// What was measured.
    pub name: String,
    /// Reading.
    pub value: f64,
    /// Unit, possibly empty.
    pub unit: String,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional learner note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Measurement {
    /// Measurement without a note.
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp,
            note: None,
        }
    }

    /// Attaches a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Snapshot of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Zero-based index of the active step; equals `total_steps` once complete.
    pub current_step: u32,
    /// Number of steps in the definition.
    pub total_steps: u32,
    /// Working variables of the active engine.
    pub variables: Variables,
    /// Recorded measurements, oldest first.
    pub measurements: Vec<Measurement>,
    /// Append-only audit trail of submitted actions.
    pub user_actions: Vec<UserAction>,
    /// Points accrued by completed steps.
    pub score: f64,
    /// Set once the last step completes.
    pub is_complete: bool,
    /// Set when the run is started.
    pub start_time: Option<DateTime<Utc>>,
    /// Set when the last step completes.
    pub end_time: Option<DateTime<Utc>>,
}

impl SimulationState {
    /// Fresh state for a sequence of `total_steps` steps.
    #[must_use]
    pub fn new(total_steps: u32) -> Self {
        Self {
            current_step: 0,
            total_steps,
            variables: Variables::new(),
            measurements: Vec::new(),
            user_actions: Vec::new(),
            score: 0.0,
            is_complete: false,
            start_time: None,
            end_time: None,
        }
    }

    /// Most recent measurement named `name` (case-insensitive).
    pub fn latest_measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements
            .iter()
            .rev()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Number of recorded actions that passed validation.
    #[must_use]
    pub fn valid_action_count(&self) -> usize {
        self.user_actions.iter().filter(|a| a.is_valid).count()
    }

    /// Elapsed seconds between start and end (or `now` while running).
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let end = self.end_time.unwrap_or(now);
        let millis = (end - start).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }
}
