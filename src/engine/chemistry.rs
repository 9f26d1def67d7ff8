//! Chemistry engine: solution bookkeeping and acid-base neutralization.
//!
//! Every addition records the reagent's moles, neutralizes the acid and base
//! pools (in equivalents) summed over the reagents in the vessel, then
//! recomputes each reagent's concentration over the new total volume. Weak
//! acids and bases are treated as fully dissociated.

use crate::action::{ActionKind, UserAction};
use crate::config::ChemistryConfig;
use crate::error::ValidationError;
use crate::reagents;
use crate::state::SimulationState;
use crate::step::{ExperimentStep, StepGoal, Subject};
use crate::validation::ValidationResult;
use crate::variables::{VariableKey, Variables};

use super::{
    apply_shared, settle, shared_goal_met, unavailable, validate_measurement, validate_shared, ExperimentEngine,
};

/// Residual amounts below this are treated as fully consumed (mol).
const RESIDUAL_EPSILON: f64 = 1e-12;

/// Outcome of mixing an acid pool with a base pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neutralization {
    /// Equivalents consumed from each pool, and salt formed (mol).
    pub neutralized: f64,
    /// Acid equivalents left over (mol).
    pub excess_acid: f64,
    /// Base equivalents left over (mol).
    pub excess_base: f64,
    /// Resulting pH; 7 when balanced or empty.
    pub ph: f64,
}

/// Neutralizes `acid_moles` against `base_moles` in `volume_l` of solution.
///
/// Consumes `min(acid, base)` from each pool and produces as much salt.
#[must_use]
pub fn neutralize(acid_moles: f64, base_moles: f64, volume_l: f64) -> Neutralization {
    let neutralized = acid_moles.min(base_moles).max(0.0);
    let mut excess_acid = acid_moles - neutralized;
    let mut excess_base = base_moles - neutralized;
    if excess_acid < RESIDUAL_EPSILON {
        excess_acid = 0.0;
    }
    if excess_base < RESIDUAL_EPSILON {
        excess_base = 0.0;
    }

    let ph = if volume_l <= 0.0 {
        7.0
    } else if excess_acid > 0.0 {
        -(excess_acid / volume_l).log10()
    } else if excess_base > 0.0 {
        14.0 + (excess_base / volume_l).log10()
    } else {
        7.0
    };

    Neutralization {
        neutralized,
        excess_acid,
        excess_base,
        ph,
    }
}

/// Chemistry engine.
#[derive(Debug, Clone, Default)]
pub struct ChemistryEngine {
    config: ChemistryConfig,
}

impl ChemistryEngine {
    /// Engine using `config`.
    #[must_use]
    pub fn new(config: ChemistryConfig) -> Self {
        Self { config }
    }

    fn check_addition(
        &self,
        action: &UserAction,
        state: &SimulationState,
        step: &ExperimentStep,
    ) -> Result<ValidationResult, ValidationError> {
        let reagent = action.text("reagent")?;
        let volume_ml = action.number("volume_ml")?;
        let concentration = action.number("concentration")?;

        if !step.allows_reagent(reagent) {
            return Ok(ValidationResult::reject(format!(
                "'{reagent}' is not used in this step"
            )));
        }
        if volume_ml <= 0.0 {
            return Ok(ValidationResult::reject("Volume must be greater than 0 mL"));
        }
        if concentration < 0.0 || concentration > self.config.max_stock_concentration_m {
            return Err(ValidationError::invalid(
                "concentration",
                format!(
                    "must be within [0, {}] mol/L",
                    self.config.max_stock_concentration_m
                ),
            ));
        }

        let vars = &state.variables;
        let current_l = vars.number_or(&VariableKey::SolutionVolume, 0.0);
        let new_l = current_l + volume_ml / 1000.0;
        if new_l > self.config.max_volume_l + RESIDUAL_EPSILON {
            return Ok(ValidationResult::reject(format!(
                "Adding {volume_ml:.1} mL would exceed the vessel capacity of {:.0} mL",
                self.config.max_volume_l * 1000.0
            )));
        }

        let class = reagents::classify(reagent);
        if current_l > 0.0 {
            let threshold = self.config.concentrated_threshold_m;
            let base_m = vars.number_or(&VariableKey::BaseMoles, 0.0) / current_l;
            let acid_m = vars.number_or(&VariableKey::AcidMoles, 0.0) / current_l;
            if class.is_acid() && base_m >= threshold {
                return Ok(ValidationResult::hazard(
                    "Dilute the base before adding acid",
                    format!("Adding acid to a concentrated base ({base_m:.2} M) can splatter"),
                ));
            }
            if class.is_base() && acid_m >= threshold {
                return Ok(ValidationResult::hazard(
                    "Dilute the acid before adding base",
                    format!("Adding base to a concentrated acid ({acid_m:.2} M) can splatter"),
                ));
            }
        }

        Ok(ValidationResult::ok(format!(
            "Added {volume_ml:.1} mL of {concentration} M {reagent}"
        )))
    }
}

/// Applies one addition to `vars`.
///
/// Neutralized equivalents are consumed from every acid and base reagent in
/// proportion to its share of the pool. Consumed reagents keep a zero
/// `Moles` entry so the vessel remembers what was ever added.
fn add_reagent(vars: &mut Variables, reagent: &str, volume_ml: f64, concentration: f64) {
    let added_l = volume_ml / 1000.0;
    let volume_l = vars.number_or(&VariableKey::SolutionVolume, 0.0) + added_l;
    vars.set(VariableKey::SolutionVolume, volume_l);

    let moles_key = VariableKey::moles(reagent);
    let moles = vars.number_or(&moles_key, 0.0) + added_l * concentration;
    vars.set(moles_key, moles);

    let mut amounts: Vec<(String, f64)> = vars
        .iter()
        .filter_map(|(key, value)| match key {
            VariableKey::Moles(name) => value.as_number().map(|m| (name.clone(), m)),
            _ => None,
        })
        .collect();

    let (acid, base) = amounts.iter().fold((0.0, 0.0), |(acid, base), (name, moles)| {
        let info = reagents::lookup(name);
        if info.class.is_acid() {
            (acid + moles * info.equivalents, base)
        } else if info.class.is_base() {
            (acid, base + moles * info.equivalents)
        } else {
            (acid, base)
        }
    });

    let result = neutralize(acid, base, volume_l);
    if result.neutralized > 0.0 {
        let acid_left = if acid > 0.0 { result.excess_acid / acid } else { 1.0 };
        let base_left = if base > 0.0 { result.excess_base / base } else { 1.0 };
        for (name, moles) in &mut amounts {
            let class = reagents::classify(name);
            let left = if class.is_acid() {
                acid_left
            } else if class.is_base() {
                base_left
            } else {
                continue;
            };
            *moles *= left;
            if *moles < RESIDUAL_EPSILON {
                *moles = 0.0;
            }
            vars.set(VariableKey::Moles(name.clone()), *moles);
        }
    }

    for (name, moles) in amounts {
        vars.set(VariableKey::Concentration(name), moles / volume_l);
    }

    let salt = vars.number_or(&VariableKey::SaltMoles, 0.0) + result.neutralized;
    vars.set(VariableKey::AcidMoles, result.excess_acid);
    vars.set(VariableKey::BaseMoles, result.excess_base);
    vars.set(VariableKey::SaltMoles, salt);
    vars.set(VariableKey::Ph, result.ph);
}

impl ExperimentEngine for ChemistryEngine {
    fn subject(&self) -> Subject {
        Subject::Chemistry
    }

    fn validate(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> ValidationResult {
        let Some(kind) = action.action_kind() else {
            return ValidationResult::reject(format!("Unknown action type '{}'", action.kind));
        };
        match kind {
            ActionKind::AddReagent => settle(self.check_addition(action, state, step)),
            ActionKind::Measurement => {
                let needs_solution = action
                    .opt_text("name")
                    .is_some_and(|name| name.eq_ignore_ascii_case("ph"));
                if needs_solution && !state.variables.contains(&VariableKey::SolutionVolume) {
                    ValidationResult::reject("There is no solution to measure yet")
                } else {
                    settle(validate_measurement(action))
                }
            }
            _ => match validate_shared(kind, action, step) {
                Some(result) => settle(result),
                None => unavailable(&action.kind, Subject::Chemistry),
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
        if kind == ActionKind::AddReagent {
            if let (Ok(reagent), Ok(volume_ml), Ok(concentration)) = (
                action.text("reagent"),
                action.number("volume_ml"),
                action.number("concentration"),
            ) {
                add_reagent(&mut next.variables, reagent, volume_ml, concentration);
            }
        }
        next
    }

    fn goal_met(&self, goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool> {
        match goal {
            StepGoal::TargetPh { ph } => Some(
                state
                    .variables
                    .number(&VariableKey::Ph)
                    .is_some_and(|actual| (actual - ph).abs() <= self.config.ph_tolerance),
            ),
            _ => shared_goal_met(goal, action, state),
        }
    }

    fn supports_goal(&self, goal: &StepGoal) -> bool {
        matches!(
            goal,
            StepGoal::Confirm | StepGoal::Targets { .. } | StepGoal::TargetPh { .. }
        )
    }
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

    fn add(reagent: &str, volume_ml: f64, concentration: f64) -> UserAction {
        action(
            "add_reagent",
            json!({"reagent": reagent, "volume_ml": volume_ml, "concentration": concentration}),
        )
    }

    fn step() -> ExperimentStep {
        ExperimentStep::new(1, "titrate")
    }

    fn apply(engine: &ChemistryEngine, state: &SimulationState, a: &UserAction) -> SimulationState {
        let verdict = engine.validate(a, state, &step());
        assert!(verdict.is_valid, "{}", verdict.feedback);
        engine.update(a, state, &step())
    }

    #[test]
    fn neutralization_with_excess_acid() {
        let n = neutralize(0.05, 0.03, 0.1);
        assert!((n.neutralized - 0.03).abs() < 1e-12);
        assert!((n.excess_acid - 0.02).abs() < 1e-12);
        assert_eq!(n.excess_base, 0.0);
        assert!((n.ph - 0.70).abs() < 0.005, "pH was {}", n.ph);
    }

    #[test]
    fn neutralization_with_excess_base_and_balance() {
        let n = neutralize(0.01, 0.02, 1.0);
        assert!((n.ph - 12.0).abs() < 1e-9);

        let n = neutralize(0.02, 0.02, 0.5);
        assert_eq!(n.ph, 7.0);
        assert_eq!(n.excess_acid, 0.0);
        assert_eq!(n.excess_base, 0.0);
    }

    #[test]
    fn concentration_bookkeeping() {
        let engine = ChemistryEngine::default();
        let s = SimulationState::new(1);
        let s = apply(&engine, &s, &add("NaCl", 100.0, 1.0));
        assert_eq!(s.variables.number(&VariableKey::concentration("nacl")), Some(1.0));

        let s = apply(&engine, &s, &add("water", 100.0, 0.0));
        let vol = s.variables.number(&VariableKey::SolutionVolume).unwrap();
        assert!((vol - 0.2).abs() < 1e-12);
        let c = s.variables.number(&VariableKey::concentration("nacl")).unwrap();
        assert!((c - 0.5).abs() < 1e-12);
        assert_eq!(s.variables.number(&VariableKey::Ph), Some(7.0));
    }

    #[test]
    fn titration_tracks_ph_and_salt() {
        let engine = ChemistryEngine::default();
        let s = SimulationState::new(1);
        // 50 mL of 0.5 M HCl then 30 mL of 0.5 M NaOH, in 80 mL total.
        let s = apply(&engine, &s, &add("HCl", 50.0, 0.5));
        let s = apply(&engine, &s, &add("NaOH", 30.0, 0.5));
        let vars = &s.variables;
        let salt = vars.number(&VariableKey::SaltMoles).unwrap();
        let acid = vars.number(&VariableKey::AcidMoles).unwrap();
        assert!((salt - 0.015).abs() < 1e-12);
        assert!((acid - 0.01).abs() < 1e-12);
        let expected = -(0.01_f64 / 0.08).log10();
        assert!((vars.number(&VariableKey::Ph).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn equal_acid_and_base_leave_no_reagent_behind() {
        let engine = ChemistryEngine::default();
        let s = apply(&engine, &SimulationState::new(1), &add("HCl", 50.0, 0.5));
        let s = apply(&engine, &s, &add("NaOH", 50.0, 0.5));
        let vars = &s.variables;
        assert_eq!(vars.number(&VariableKey::concentration("hcl")), Some(0.0));
        assert_eq!(vars.number(&VariableKey::concentration("naoh")), Some(0.0));
        assert_eq!(vars.number(&VariableKey::moles("hcl")), Some(0.0));
        assert_eq!(vars.reagents_present().count(), 0);
        assert_eq!(vars.reagents_added().collect::<Vec<_>>(), vec!["hcl", "naoh"]);
        assert_eq!(vars.number(&VariableKey::Ph), Some(7.0));
        assert!((vars.number(&VariableKey::SaltMoles).unwrap() - 0.025).abs() < 1e-12);
    }

    #[test]
    fn neutralization_consumes_acids_pro_rata() {
        let engine = ChemistryEngine::default();
        // 0.01 mol HCl (0.01 eq) and 0.01 mol H2SO4 (0.02 eq) against 0.015 eq NaOH.
        let s = apply(&engine, &SimulationState::new(1), &add("HCl", 20.0, 0.5));
        let s = apply(&engine, &s, &add("H2SO4", 20.0, 0.5));
        let s = apply(&engine, &s, &add("NaOH", 30.0, 0.5));
        let vars = &s.variables;
        let hcl = vars.number(&VariableKey::moles("hcl")).unwrap();
        let h2so4 = vars.number(&VariableKey::moles("h2so4")).unwrap();
        assert!((hcl - 0.005).abs() < 1e-12, "hcl was {hcl}");
        assert!((h2so4 - 0.005).abs() < 1e-12, "h2so4 was {h2so4}");
        assert_eq!(vars.number(&VariableKey::moles("naoh")), Some(0.0));
        assert!((vars.number(&VariableKey::AcidMoles).unwrap() - 0.015).abs() < 1e-12);
        let c = vars.number(&VariableKey::concentration("hcl")).unwrap();
        assert!((c - 0.005 / 0.07).abs() < 1e-9);
        assert_eq!(vars.reagents_present().collect::<Vec<_>>(), vec!["h2so4", "hcl"]);
    }

    #[test]
    fn rejects_reagents_outside_allow_list() {
        let engine = ChemistryEngine::default();
        let restricted = step().with_allowed_reagents(["HCl"]);
        let r = engine.validate(&add("NaOH", 10.0, 0.1), &SimulationState::new(1), &restricted);
        assert!(!r.is_valid);
        assert!(engine.validate(&add("hcl", 10.0, 0.1), &SimulationState::new(1), &restricted).is_valid);
    }

    #[test]
    fn rejects_overfilling_the_vessel() {
        let engine = ChemistryEngine::default();
        let s = apply(&engine, &SimulationState::new(1), &add("water", 400.0, 0.0));
        let r = engine.validate(&add("water", 150.0, 0.0), &s, &step());
        assert!(!r.is_valid);
        assert!(r.feedback.contains("capacity"));
        assert!(engine.validate(&add("water", 100.0, 0.0), &s, &step()).is_valid);
    }

    #[test]
    fn flags_acid_into_concentrated_base() {
        let engine = ChemistryEngine::default();
        let s = apply(&engine, &SimulationState::new(1), &add("NaOH", 50.0, 2.0));
        let r = engine.validate(&add("HCl", 5.0, 0.1), &s, &step());
        assert!(!r.is_valid);
        assert!(r.is_hazard());
    }

    #[test]
    fn malformed_payload_is_a_validation_failure() {
        let engine = ChemistryEngine::default();
        let r = engine.validate(
            &action("add_reagent", json!({"reagent": "HCl", "volume_ml": "ten"})),
            &SimulationState::new(1),
            &step(),
        );
        assert!(!r.is_valid);
        assert!(r.feedback.contains("volume_ml"));
    }

    #[test]
    fn target_ph_goal_uses_tolerance() {
        let engine = ChemistryEngine::default();
        let goal = StepGoal::TargetPh { ph: 7.0 };
        let confirm = action("measurement", json!({"name": "ph", "value": 7.0}));
        let mut s = SimulationState::new(1);
        s.variables.set(VariableKey::Ph, 7.08);
        assert_eq!(engine.goal_met(&goal, &confirm, &s), Some(true));
        s.variables.set(VariableKey::Ph, 7.2);
        assert_eq!(engine.goal_met(&goal, &confirm, &s), Some(false));
        assert_eq!(engine.goal_met(&StepGoal::MatchCurrent, &confirm, &s), None);
    }

    #[test]
    fn ph_measurement_needs_solution() {
        let engine = ChemistryEngine::default();
        let m = action("measurement", json!({"name": "pH", "value": 7.0}));
        assert!(!engine.validate(&m, &SimulationState::new(1), &step()).is_valid);
    }
}
