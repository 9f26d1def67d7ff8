//! Physics engine: DC circuits and the simple pendulum.

use std::f64::consts::PI;

use crate::action::{ActionKind, UserAction};
use crate::config::PhysicsConfig;
use crate::error::ValidationError;
use crate::state::SimulationState;
use crate::step::{ExperimentStep, StepGoal, Subject};
use crate::validation::ValidationResult;
use crate::variables::{VariableKey, Variables};

use super::{
    apply_shared, settle, shared_goal_met, unavailable, validate_measurement, validate_shared, ExperimentEngine,
};

/// Current and power through a resistor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circuit {
    /// Current (A).
    pub current: f64,
    /// Dissipated power (W).
    pub power: f64,
}

/// Ohm's law. `resistance` must be positive.
#[must_use]
pub fn ohms_law(voltage: f64, resistance: f64) -> Circuit {
    let current = voltage / resistance;
    Circuit {
        current,
        power: voltage * current,
    }
}

/// Small-angle period of a simple pendulum (s).
#[must_use]
pub fn pendulum_period(length_m: f64, gravity: f64) -> f64 {
    2.0 * PI * (length_m / gravity).sqrt()
}

const DEFAULT_RELEASE_ANGLE_DEG: f64 = 10.0;

/// Physics engine.
#[derive(Debug, Clone, Default)]
pub struct PhysicsEngine {
    config: PhysicsConfig,
}

impl PhysicsEngine {
    /// Engine using `config`.
    #[must_use]
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    fn check_angle(&self, angle: f64) -> Result<(), ValidationResult> {
        if angle < 0.0 {
            return Err(ValidationResult::reject("Release angle cannot be negative"));
        }
        if angle > self.config.max_release_angle_deg {
            return Err(ValidationResult::reject(format!(
                "Release angle {angle:.0}° exceeds {:.0}°; the small-angle approximation no longer holds",
                self.config.max_release_angle_deg
            )));
        }
        Ok(())
    }

    fn check(
        &self,
        kind: ActionKind,
        action: &UserAction,
        state: &SimulationState,
    ) -> Result<ValidationResult, ValidationError> {
        let vars = &state.variables;
        let result = match kind {
            ActionKind::SetVoltage => {
                let voltage = action.number("voltage")?;
                if voltage < 0.0 {
                    ValidationResult::reject("Voltage cannot be negative")
                } else if voltage > self.config.max_voltage_v {
                    ValidationResult::reject(format!(
                        "Voltage must not exceed {:.0} V",
                        self.config.max_voltage_v
                    ))
                } else {
                    ValidationResult::ok(format!("Voltage set to {voltage:.2} V"))
                }
            }
            ActionKind::SetResistance => {
                let resistance = action.number("resistance")?;
                if resistance <= 0.0 {
                    ValidationResult::reject("Resistance must be greater than 0 Ω")
                } else {
                    ValidationResult::ok(format!("Resistance set to {resistance:.2} Ω"))
                }
            }
            ActionKind::SetPendulum => {
                let length_cm = action.number("length_cm")?;
                let angle = action
                    .opt_number("angle_deg")?
                    .unwrap_or(DEFAULT_RELEASE_ANGLE_DEG);
                if length_cm <= 0.0 {
                    ValidationResult::reject("Pendulum length must be greater than 0 cm")
                } else if let Err(rejection) = self.check_angle(angle) {
                    rejection
                } else {
                    ValidationResult::ok(format!(
                        "Pendulum set to {length_cm:.1} cm at {angle:.0}°"
                    ))
                }
            }
            ActionKind::ReleasePendulum => {
                let angle = action.opt_number("angle_deg")?;
                if !vars.contains(&VariableKey::PendulumLength) {
                    ValidationResult::reject("Set up the pendulum before releasing it")
                } else if let Some(Err(rejection)) = angle.map(|a| self.check_angle(a)) {
                    rejection
                } else {
                    ValidationResult::ok("Pendulum released")
                }
            }
            ActionKind::Measurement => {
                let name = action.text("name")?.to_lowercase();
                let circuit_ready =
                    vars.contains(&VariableKey::Voltage) && vars.contains(&VariableKey::Resistance);
                if matches!(name.as_str(), "current" | "power") && !circuit_ready {
                    ValidationResult::reject("Complete the circuit (voltage and resistance) before measuring")
                } else if matches!(name.as_str(), "period" | "frequency")
                    && !vars.flag(&VariableKey::PendulumSwinging)
                {
                    ValidationResult::reject("Release the pendulum before timing it")
                } else {
                    return validate_measurement(action);
                }
            }
            _ => unavailable(&action.kind, Subject::Physics),
        };
        Ok(result)
    }
}

/// Recomputes current and power when the circuit is complete.
fn refresh_circuit(vars: &mut Variables) {
    let (Some(voltage), Some(resistance)) = (
        vars.number(&VariableKey::Voltage),
        vars.number(&VariableKey::Resistance),
    ) else {
        return;
    };
    if resistance <= 0.0 {
        return;
    }
    let circuit = ohms_law(voltage, resistance);
    vars.set(VariableKey::Current, circuit.current);
    vars.set(VariableKey::Power, circuit.power);
}

fn refresh_pendulum(vars: &mut Variables, gravity: f64) {
    let Some(length_m) = vars.number(&VariableKey::PendulumLength) else {
        return;
    };
    let period = pendulum_period(length_m, gravity);
    vars.set(VariableKey::Period, period);
    vars.set(VariableKey::Frequency, 1.0 / period);
}

/// True when `action` is itself a measurement of `name` that matches the
/// computed value. Earlier measurements never complete a goal.
fn measured_matches(
    action: &UserAction,
    state: &SimulationState,
    name: &str,
    computed: &VariableKey,
    tolerance: f64,
) -> bool {
    if action.action_kind() != Some(ActionKind::Measurement) {
        return false;
    }
    if !action.text("name").is_ok_and(|n| n.eq_ignore_ascii_case(name)) {
        return false;
    }
    let (Some(expected), Ok(value)) = (state.variables.number(computed), action.number("value")) else {
        return false;
    };
    (value - expected).abs() <= tolerance
}

impl ExperimentEngine for PhysicsEngine {
    fn subject(&self) -> Subject {
        Subject::Physics
    }

    fn validate(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> ValidationResult {
        let Some(kind) = action.action_kind() else {
            return ValidationResult::reject(format!("Unknown action type '{}'", action.kind));
        };
        match kind {
            ActionKind::SetVoltage
            | ActionKind::SetResistance
            | ActionKind::SetPendulum
            | ActionKind::ReleasePendulum
            | ActionKind::Measurement => settle(self.check(kind, action, state)),
            _ => match validate_shared(kind, action, step) {
                Some(result) => settle(result),
                None => unavailable(&action.kind, Subject::Physics),
            },
        }
    }

    fn update(&self, action: &UserAction, state: &SimulationState, _step: &ExperimentStep) -> SimulationState {
        let mut next = state.clone();
        let Some(kind) = action.action_kind() else {
            return next;
        };
        if apply_shared(kind, action, &mut next) {
            return next;
        }

        let vars = &mut next.variables;
        match kind {
            ActionKind::SetVoltage => {
                if let Ok(voltage) = action.number("voltage") {
                    vars.set(VariableKey::Voltage, voltage);
                    refresh_circuit(vars);
                }
            }
            ActionKind::SetResistance => {
                if let Ok(resistance) = action.number("resistance") {
                    vars.set(VariableKey::Resistance, resistance);
                    refresh_circuit(vars);
                }
            }
            ActionKind::SetPendulum => {
                if let Ok(length_cm) = action.number("length_cm") {
                    let angle = action
                        .opt_number("angle_deg")
                        .ok()
                        .flatten()
                        .unwrap_or(DEFAULT_RELEASE_ANGLE_DEG);
                    vars.set(VariableKey::PendulumLength, length_cm / 100.0);
                    vars.set(VariableKey::ReleaseAngle, angle);
                    vars.set(VariableKey::PendulumSwinging, false);
                    refresh_pendulum(vars, self.config.gravity);
                }
            }
            ActionKind::ReleasePendulum => {
                if let Ok(Some(angle)) = action.opt_number("angle_deg") {
                    vars.set(VariableKey::ReleaseAngle, angle);
                }
                vars.set(VariableKey::PendulumSwinging, true);
                refresh_pendulum(vars, self.config.gravity);
            }
            _ => {}
        }
        next
    }

    fn goal_met(&self, goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool> {
        match goal {
            StepGoal::MatchCurrent => Some(measured_matches(
                action,
                state,
                "current",
                &VariableKey::Current,
                self.config.current_tolerance_a,
            )),
            StepGoal::MatchPeriod => Some(measured_matches(
                action,
                state,
                "period",
                &VariableKey::Period,
                self.config.period_tolerance_s,
            )),
            _ => shared_goal_met(goal, action, state),
        }
    }

    fn supports_goal(&self, goal: &StepGoal) -> bool {
        matches!(
            goal,
            StepGoal::Confirm | StepGoal::Targets { .. } | StepGoal::MatchCurrent | StepGoal::MatchPeriod
        )
    }
}
