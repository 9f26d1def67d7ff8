//! Subject engines.
//!
//! Each engine is a pure domain model: `validate` checks an action's
//! preconditions without touching state, `update` derives the next
//! snapshot with closed-form formulas, and `goal_met` decides whether the
//! active step's goal is satisfied. Engines never share mutable memory and
//! may run on any thread.

pub mod biology;
pub mod chemistry;
pub mod physics;

pub use biology::BiologyEngine;
pub use chemistry::ChemistryEngine;
pub use physics::PhysicsEngine;

use std::collections::BTreeMap;

use crate::action::{ActionKind, UserAction};
use crate::config::LabConfig;
use crate::error::ValidationError;
use crate::state::{Measurement, SimulationState};
use crate::step::{ExperimentStep, StepGoal, Subject};
use crate::validation::ValidationResult;
use crate::variables::VariableKey;

/// Room temperature assumed before the learner sets one (°C).
pub const AMBIENT_TEMPERATURE_C: f64 = 20.0;

/// The contract shared by every subject engine.
pub trait ExperimentEngine: Send + Sync {
    /// Subject this engine simulates.
    fn subject(&self) -> Subject;

    /// Checks preconditions. Never mutates anything.
    fn validate(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> ValidationResult;

    /// Derives the next state. Deterministic in `(action, state, step)`.
    ///
    /// Callers must only pass actions that `validate` accepted; anything
    /// else leaves the variables untouched.
    fn update(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> SimulationState;

    /// Whether `goal` holds after `action` produced `state`.
    ///
    /// Returns `None` for goals outside this engine's domain.
    fn goal_met(&self, goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool>;

    /// Whether this engine can evaluate `goal`.
    fn supports_goal(&self, goal: &StepGoal) -> bool;

    /// Zero-based index of the next step when the active step's goal is met.
    fn completion(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> Option<u32> {
        if state.current_step >= state.total_steps {
            return None;
        }
        self.goal_met(&step.goal, action, state)
            .unwrap_or(false)
            .then_some(state.current_step + 1)
    }
}

/// Closed dispatch over the three subject engines.
#[derive(Debug, Clone)]
pub enum Engine {
    /// Circuits and pendulums.
    Physics(PhysicsEngine),
    /// Solutions and titration.
    Chemistry(ChemistryEngine),
    /// Photosynthesis, enzymes, microscopy and ecosystems.
    Biology(BiologyEngine),
}

impl Engine {
    /// Engine for `subject` configured from `config`.
    #[must_use]
    pub fn for_subject(subject: Subject, config: &LabConfig) -> Self {
        match subject {
            Subject::Physics => Self::Physics(PhysicsEngine::new(config.physics.clone())),
            Subject::Chemistry => Self::Chemistry(ChemistryEngine::new(config.chemistry.clone())),
            Subject::Biology => Self::Biology(BiologyEngine::new(config.biology.clone())),
        }
    }

    fn inner(&self) -> &dyn ExperimentEngine {
        match self {
            Self::Physics(e) => e,
            Self::Chemistry(e) => e,
            Self::Biology(e) => e,
        }
    }

    /// Checks that every step's goal can be evaluated by this engine.
    pub fn check_steps(&self, steps: &[ExperimentStep]) -> Result<(), ValidationError> {
        for step in steps {
            if !self.supports_goal(&step.goal) {
                return Err(ValidationError::UnsupportedGoal {
                    step: step.step_number,
                    goal: step.goal.name().to_string(),
                    subject: self.subject().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl ExperimentEngine for Engine {
    fn subject(&self) -> Subject {
        self.inner().subject()
    }

    fn validate(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> ValidationResult {
        self.inner().validate(action, state, step)
    }

    fn update(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> SimulationState {
        self.inner().update(action, state, step)
    }

    fn goal_met(&self, goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool> {
        self.inner().goal_met(goal, action, state)
    }

    fn supports_goal(&self, goal: &StepGoal) -> bool {
        self.inner().supports_goal(goal)
    }
}

/// Folds a payload error into a rejection.
pub(crate) fn settle(result: Result<ValidationResult, ValidationError>) -> ValidationResult {
    result.unwrap_or_else(ValidationResult::from)
}

pub(crate) fn unavailable(kind: &str, subject: Subject) -> ValidationResult {
    ValidationResult::reject(format!("'{kind}' is not available in a {subject} experiment"))
}

/// Validation for kinds every subject accepts. `None` for subject-specific kinds.
pub(crate) fn validate_shared(
    kind: ActionKind,
    action: &UserAction,
    step: &ExperimentStep,
) -> Option<Result<ValidationResult, ValidationError>> {
    let result = match kind {
        ActionKind::Measurement => validate_measurement(action),
        ActionKind::SetTemperature => action
            .number("temperature")
            .map(|t| ValidationResult::ok(format!("Temperature set to {t:.1} °C"))),
        ActionKind::ConfirmStep => Ok(match step.goal {
            StepGoal::Confirm => ValidationResult::ok("Step confirmed"),
            _ => ValidationResult::reject("This step completes when its goal is reached"),
        }),
        _ => return None,
    };
    Some(result)
}

pub(crate) fn validate_measurement(action: &UserAction) -> Result<ValidationResult, ValidationError> {
    let name = action.text("name")?;
    let value = action.number("value")?;
    let unit = action.opt_text("unit").unwrap_or("");
    let feedback = format!("Recorded {name} = {value} {unit}");
    Ok(ValidationResult::ok(feedback.trim_end()))
}

/// Applies a shared kind to `next`. Returns false for subject-specific kinds.
pub(crate) fn apply_shared(kind: ActionKind, action: &UserAction, next: &mut SimulationState) -> bool {
    match kind {
        ActionKind::Measurement => {
            if let (Ok(name), Ok(value)) = (action.text("name"), action.number("value")) {
                let mut measurement = Measurement::new(
                    name,
                    value,
                    action.opt_text("unit").unwrap_or(""),
                    action.timestamp,
                );
                if let Some(note) = action.opt_text("note") {
                    measurement = measurement.with_note(note);
                }
                next.measurements.push(measurement);
            }
            true
        }
        ActionKind::SetTemperature => {
            if let Ok(t) = action.number("temperature") {
                next.variables.set(VariableKey::Temperature, t);
            }
            true
        }
        ActionKind::ConfirmStep => true,
        _ => false,
    }
}

/// Evaluates the goals every subject understands.
pub(crate) fn shared_goal_met(goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool> {
    match goal {
        StepGoal::Confirm => Some(action.action_kind() == Some(ActionKind::ConfirmStep)),
        StepGoal::Targets { values, tolerance } => Some(targets_met(values, *tolerance, state)),
        _ => None,
    }
}

/// True when every target variable is present and within `tolerance`.
pub fn targets_met(values: &BTreeMap<VariableKey, f64>, tolerance: f64, state: &SimulationState) -> bool {
    values.iter().all(|(key, target)| {
        state
            .variables
            .number(key)
            .is_some_and(|actual| (actual - target).abs() <= tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionInput;
    use chrono::Utc;
    use serde_json::json;

    fn action(kind: &str, data: serde_json::Value) -> UserAction {
        UserAction::record(ActionInput::new(kind, data), 0, Utc::now())
    }

    #[test]
    fn dispatch_matches_subject() {
        let config = LabConfig::default();
        for subject in [Subject::Physics, Subject::Chemistry, Subject::Biology] {
            assert_eq!(Engine::for_subject(subject, &config).subject(), subject);
        }
    }

    #[test]
    fn check_steps_rejects_foreign_goals() {
        let engine = Engine::for_subject(Subject::Physics, &LabConfig::default());
        let steps = vec![
            ExperimentStep::new(1, "wire it"),
            ExperimentStep::new(2, "titrate").with_goal(StepGoal::TargetPh { ph: 7.0 }),
        ];
        let err = engine.check_steps(&steps).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedGoal { step: 2, .. }));
    }

    #[test]
    fn measurement_requires_name_and_value() {
        let step = ExperimentStep::new(1, "measure");
        let r = settle(validate_shared(ActionKind::Measurement, &action("measurement", json!({"value": 1.0})), &step).unwrap());
        assert!(!r.is_valid);
        assert!(r.feedback.contains("name"));

        let ok = action("measurement", json!({"name": "current", "value": 1.2, "unit": "A", "note": "steady"}));
        assert!(settle(validate_shared(ActionKind::Measurement, &ok, &step).unwrap()).is_valid);

        let mut next = SimulationState::new(1);
        assert!(apply_shared(ActionKind::Measurement, &ok, &mut next));
        assert_eq!(next.measurements.len(), 1);
        assert_eq!(next.measurements[0].unit, "A");
        assert_eq!(next.measurements[0].note.as_deref(), Some("steady"));
        assert_eq!(next.measurements[0].timestamp, ok.timestamp);
    }

    #[test]
    fn confirm_only_valid_for_confirm_goal() {
        let confirm = action("confirm_step", json!({}));
        let plain = ExperimentStep::new(1, "read");
        assert!(settle(validate_shared(ActionKind::ConfirmStep, &confirm, &plain).unwrap()).is_valid);

        let goal = plain.clone().with_goal(StepGoal::MatchCurrent);
        assert!(!settle(validate_shared(ActionKind::ConfirmStep, &confirm, &goal).unwrap()).is_valid);
    }

    #[test]
    fn targets_require_every_value() {
        let mut state = SimulationState::new(1);
        state.variables.set(VariableKey::Voltage, 12.0);
        let mut values = BTreeMap::new();
        values.insert(VariableKey::Voltage, 12.005);
        assert!(targets_met(&values, 0.01, &state));
        values.insert(VariableKey::Resistance, 4.0);
        assert!(!targets_met(&values, 0.01, &state));
    }
}
