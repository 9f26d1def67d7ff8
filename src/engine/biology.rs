//! Biology engine: photosynthesis, enzyme kinetics, microscopy and ecosystems.

use crate::action::{ActionKind, UserAction};
use crate::config::BiologyConfig;
use crate::error::ValidationError;
use crate::state::SimulationState;
use crate::step::{ExperimentStep, StepGoal, Subject};
use crate::validation::ValidationResult;
use crate::variables::{normalize_name, VariableKey, Variables};

use super::{
    apply_shared, settle, shared_goal_met, unavailable, validate_measurement, validate_shared, ExperimentEngine,
    AMBIENT_TEMPERATURE_C,
};

/// Triangular temperature penalty peaking at `optimal`.
///
/// Full credit within the full-credit band, linear decay to the floor at
/// the decay band, floor beyond.
#[must_use]
pub fn temperature_factor(temperature: f64, optimal: f64, config: &BiologyConfig) -> f64 {
    let diff = (temperature - optimal).abs();
    if diff <= config.full_credit_band_c {
        return 1.0;
    }
    if diff >= config.decay_band_c {
        return config.temp_factor_floor;
    }
    let span = config.decay_band_c - config.full_credit_band_c;
    let progress = (diff - config.full_credit_band_c) / span;
    1.0 - progress * (1.0 - config.temp_factor_floor)
}

/// Photosynthesis rate on a 0-100 scale.
#[must_use]
pub fn photosynthesis_rate(light_intensity: f64, temperature: f64, config: &BiologyConfig) -> f64 {
    let light_factor = light_intensity / 100.0;
    let temp_factor = temperature_factor(temperature, config.photosynthesis_optimal_c, config);
    light_factor * temp_factor * 100.0
}

/// Michaelis-Menten velocity scaled by the enzyme's temperature factor.
#[must_use]
pub fn enzyme_velocity(substrate: f64, temperature: f64, config: &BiologyConfig) -> f64 {
    let temp_factor = temperature_factor(temperature, config.enzyme_optimal_c, config);
    config.default_vmax * substrate * temp_factor / (config.default_km + substrate)
}

/// Ecosystem health (0-100) as Shannon evenness of the populations.
///
/// Zero when there are no populations or any population has died out.
#[must_use]
pub fn ecosystem_health(populations: &[f64]) -> f64 {
    if populations.is_empty() || populations.iter().any(|&n| n <= 0.0) {
        return 0.0;
    }
    if populations.len() == 1 {
        return 100.0;
    }
    let total: f64 = populations.iter().sum();
    let entropy: f64 = populations
        .iter()
        .map(|&n| {
            let p = n / total;
            -p * p.ln()
        })
        .sum();
    100.0 * entropy / (populations.len() as f64).ln()
}

/// One generation of logistic growth, rounded to whole individuals.
#[must_use]
pub fn logistic_step(population: f64, growth_rate: f64, capacity: f64) -> f64 {
    let next = population + growth_rate * population * (1.0 - population / capacity);
    next.round().max(0.0)
}

/// Biology engine.
#[derive(Debug, Clone, Default)]
pub struct BiologyEngine {
    config: BiologyConfig,
}

impl BiologyEngine {
    /// Engine using `config`.
    #[must_use]
    pub fn new(config: BiologyConfig) -> Self {
        Self { config }
    }

    fn required_magnification(&self, structure: &str) -> Option<f64> {
        self.config
            .structure_magnifications
            .iter()
            .find(|(name, _)| normalize_name(name) == structure)
            .map(|(_, mag)| *mag)
    }

    fn check(
        &self,
        kind: ActionKind,
        action: &UserAction,
        state: &SimulationState,
    ) -> Result<ValidationResult, ValidationError> {
        let vars = &state.variables;
        let result = match kind {
            ActionKind::SetLight => {
                let intensity = action.number("intensity")?;
                if !(0.0..=self.config.max_light_intensity).contains(&intensity) {
                    ValidationResult::reject(format!(
                        "Light intensity must be between 0 and {:.0}",
                        self.config.max_light_intensity
                    ))
                } else {
                    ValidationResult::ok(format!("Light intensity set to {intensity:.0}"))
                }
            }
            ActionKind::AddSubstrate => {
                let concentration = action.number("concentration")?;
                if concentration <= 0.0 {
                    ValidationResult::reject("Substrate concentration must be greater than 0")
                } else {
                    ValidationResult::ok(format!("Substrate at {concentration} mM"))
                }
            }
            ActionKind::SetMagnification => {
                let magnification = action.number("magnification")?;
                if magnification <= 0.0 || magnification > self.config.max_magnification {
                    ValidationResult::reject(format!(
                        "Magnification must be between 0 and {:.0}x",
                        self.config.max_magnification
                    ))
                } else {
                    ValidationResult::ok(format!("Magnification set to {magnification:.0}x"))
                }
            }
            ActionKind::FocusMicroscope => {
                if vars.contains(&VariableKey::Magnification) {
                    ValidationResult::ok("Microscope in focus")
                } else {
                    ValidationResult::reject("Choose an objective before focusing")
                }
            }
            ActionKind::Observe => {
                let structure = normalize_name(action.text("structure")?);
                let magnification = vars.number_or(&VariableKey::Magnification, 0.0);
                match self.required_magnification(&structure) {
                    None => ValidationResult::reject(format!("'{structure}' cannot be observed here")),
                    Some(required) if magnification < required => ValidationResult::reject(format!(
                        "{magnification:.0}x is too low to resolve {structure}; use at least {required:.0}x"
                    )),
                    Some(_) if !vars.flag(&VariableKey::InFocus) => {
                        ValidationResult::reject("Focus the microscope first")
                    }
                    Some(_) => ValidationResult::ok(format!("Observed {structure}")),
                }
            }
            ActionKind::SetPopulation => {
                let species = action.text("species")?;
                let count = action.number("count")?;
                if count < 0.0 {
                    ValidationResult::reject("Population cannot be negative")
                } else {
                    ValidationResult::ok(format!("{species} population set to {count:.0}"))
                }
            }
            ActionKind::AdvanceEcosystem => {
                if vars.populations().next().is_some() {
                    ValidationResult::ok("Ecosystem advanced one generation")
                } else {
                    ValidationResult::reject("Add at least one population first")
                }
            }
            ActionKind::Measurement => {
                let name = normalize_name(action.text("name")?);
                let needs_focus = self
                    .config
                    .microscopy_measurements
                    .iter()
                    .any(|m| normalize_name(m) == name);
                if needs_focus && !vars.flag(&VariableKey::InFocus) {
                    ValidationResult::reject("Focus the microscope before taking this measurement")
                } else {
                    return validate_measurement(action);
                }
            }
            _ => unavailable(&action.kind, Subject::Biology),
        };
        Ok(result)
    }

    /// Recomputes rate, velocity and health from the current inputs.
    fn refresh(&self, vars: &mut Variables) {
        let temperature = vars.number_or(&VariableKey::Temperature, AMBIENT_TEMPERATURE_C);
        if let Some(light) = vars.number(&VariableKey::LightIntensity) {
            vars.set(
                VariableKey::PhotosynthesisRate,
                photosynthesis_rate(light, temperature, &self.config),
            );
        }
        if let Some(substrate) = vars.number(&VariableKey::SubstrateConcentration) {
            vars.set(
                VariableKey::EnzymeVelocity,
                enzyme_velocity(substrate, temperature, &self.config),
            );
        }
        let populations: Vec<f64> = vars.populations().map(|(_, n)| n).collect();
        if !populations.is_empty() {
            vars.set(VariableKey::EcosystemHealth, ecosystem_health(&populations));
        }
    }

    fn advance_ecosystem(&self, vars: &mut Variables) {
        let grown: Vec<(String, f64)> = vars
            .populations()
            .map(|(species, n)| {
                let next = logistic_step(n, self.config.growth_rate, self.config.carrying_capacity);
                (species.to_string(), next)
            })
            .collect();
        for (species, n) in &grown {
            vars.set(VariableKey::Population(species.clone()), *n);
        }

        let populations: Vec<f64> = grown.iter().map(|(_, n)| *n).collect();
        let health = ecosystem_health(&populations);
        let alive = populations.iter().all(|&n| n > 0.0);
        let streak = if alive && health >= self.config.health_threshold {
            vars.number_or(&VariableKey::HealthyStreak, 0.0) + 1.0
        } else {
            0.0
        };
        vars.set(VariableKey::EcosystemHealth, health);
        vars.set(VariableKey::HealthyStreak, streak);
    }
}

impl ExperimentEngine for BiologyEngine {
    fn subject(&self) -> Subject {
        Subject::Biology
    }

    fn validate(&self, action: &UserAction, state: &SimulationState, step: &ExperimentStep) -> ValidationResult {
        let Some(kind) = action.action_kind() else {
            return ValidationResult::reject(format!("Unknown action type '{}'", action.kind));
        };
        match kind {
            ActionKind::SetLight
            | ActionKind::AddSubstrate
            | ActionKind::SetMagnification
            | ActionKind::FocusMicroscope
            | ActionKind::Observe
            | ActionKind::SetPopulation
            | ActionKind::AdvanceEcosystem
            | ActionKind::Measurement => settle(self.check(kind, action, state)),
            _ => match validate_shared(kind, action, step) {
                Some(result) => settle(result),
                None => unavailable(&action.kind, Subject::Biology),
            },
        }
    }

    fn update(&self, action: &UserAction, state: &SimulationState, _step: &ExperimentStep) -> SimulationState {
        let mut next = state.clone();
        let Some(kind) = action.action_kind() else {
            return next;
        };
        if apply_shared(kind, action, &mut next) {
            if kind == ActionKind::SetTemperature {
                self.refresh(&mut next.variables);
            }
            return next;
        }

        let vars = &mut next.variables;
        match kind {
            ActionKind::SetLight => {
                if let Ok(intensity) = action.number("intensity") {
                    vars.set(VariableKey::LightIntensity, intensity);
                }
            }
            ActionKind::AddSubstrate => {
                if let Ok(concentration) = action.number("concentration") {
                    vars.set(VariableKey::SubstrateConcentration, concentration);
                }
            }
            ActionKind::SetMagnification => {
                if let Ok(magnification) = action.number("magnification") {
                    vars.set(VariableKey::Magnification, magnification);
                    vars.set(VariableKey::InFocus, false);
                }
            }
            ActionKind::FocusMicroscope => vars.set(VariableKey::InFocus, true),
            ActionKind::Observe => {
                if let Ok(structure) = action.text("structure") {
                    vars.set(VariableKey::observed(structure), true);
                }
            }
            ActionKind::SetPopulation => {
                if let (Ok(species), Ok(count)) = (action.text("species"), action.number("count")) {
                    vars.set(VariableKey::population(species), count.round());
                    vars.set(VariableKey::HealthyStreak, 0.0);
                }
            }
            ActionKind::AdvanceEcosystem => {
                self.advance_ecosystem(vars);
                return next;
            }
            _ => return next,
        }
        self.refresh(vars);
        next
    }

    fn goal_met(&self, goal: &StepGoal, action: &UserAction, state: &SimulationState) -> Option<bool> {
        let vars = &state.variables;
        match goal {
            StepGoal::ObserveStructure { structure } => Some(vars.flag(&VariableKey::observed(structure))),
            StepGoal::SustainEcosystem => {
                let streak = vars.number_or(&VariableKey::HealthyStreak, 0.0);
                let mut populations = vars.populations().peekable();
                let alive = populations.peek().is_some() && populations.all(|(_, n)| n > 0.0);
                Some(alive && streak >= f64::from(self.config.sustain_updates))
            }
            _ => shared_goal_met(goal, action, state),
        }
    }

    fn supports_goal(&self, goal: &StepGoal) -> bool {
        matches!(
            goal,
            StepGoal::Confirm
                | StepGoal::Targets { .. }
                | StepGoal::ObserveStructure { .. }
                | StepGoal::SustainEcosystem
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

    fn step() -> ExperimentStep {
        ExperimentStep::new(1, "observe")
    }

    fn apply(engine: &BiologyEngine, state: &SimulationState, kind: &str, data: serde_json::Value) -> SimulationState {
        let a = action(kind, data);
        let verdict = engine.validate(&a, state, &step());
        assert!(verdict.is_valid, "{kind}: {}", verdict.feedback);
        engine.update(&a, state, &step())
    }

    #[test]
    fn temperature_factor_is_triangular() {
        let config = BiologyConfig::default();
        assert_eq!(temperature_factor(25.0, 25.0, &config), 1.0);
        assert_eq!(temperature_factor(30.0, 25.0, &config), 1.0);
        assert!((temperature_factor(35.0, 25.0, &config) - 0.55).abs() < 1e-12);
        assert!((temperature_factor(15.0, 25.0, &config) - 0.55).abs() < 1e-12);
        assert_eq!(temperature_factor(40.0, 25.0, &config), 0.1);
        assert_eq!(temperature_factor(-20.0, 25.0, &config), 0.1);
    }

    #[test]
    fn photosynthesis_rate_formula() {
        let config = BiologyConfig::default();
        assert!((photosynthesis_rate(80.0, 25.0, &config) - 80.0).abs() < 1e-12);
        assert!((photosynthesis_rate(80.0, 35.0, &config) - 44.0).abs() < 1e-9);
        assert_eq!(photosynthesis_rate(0.0, 25.0, &config), 0.0);
    }

    #[test]
    fn michaelis_menten_velocity() {
        let config = BiologyConfig::default();
        // At [S] = km the velocity is half of vmax.
        assert!((enzyme_velocity(5.0, 37.0, &config) - 50.0).abs() < 1e-12);
        let cold = enzyme_velocity(5.0, 17.0, &config);
        assert!((cold - 50.0 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn light_and_temperature_drive_rate() {
        let engine = BiologyEngine::default();
        let s = apply(&engine, &SimulationState::new(1), "set_light", json!({"intensity": 60.0}));
        assert!((s.variables.number(&VariableKey::PhotosynthesisRate).unwrap() - 60.0).abs() < 1e-12);
        let s = apply(&engine, &s, "set_temperature", json!({"temperature": 35.0}));
        assert!((s.variables.number(&VariableKey::PhotosynthesisRate).unwrap() - 33.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_substrate() {
        let engine = BiologyEngine::default();
        let r = engine.validate(&action("add_substrate", json!({"concentration": 0.0})), &SimulationState::new(1), &step());
        assert!(!r.is_valid);
    }

    #[test]
    fn observation_needs_magnification_and_focus() {
        let engine = BiologyEngine::default();
        let s = apply(&engine, &SimulationState::new(1), "set_magnification", json!({"magnification": 100.0}));
        let observe = action("observe", json!({"structure": "Chloroplast"}));
        let r = engine.validate(&observe, &s, &step());
        assert!(!r.is_valid);
        assert!(r.feedback.contains("too low"));

        let s = apply(&engine, &s, "set_magnification", json!({"magnification": 400.0}));
        let r = engine.validate(&observe, &s, &step());
        assert!(r.feedback.contains("Focus"));

        let s = apply(&engine, &s, "focus_microscope", json!({}));
        let s = apply(&engine, &s, "observe", json!({"structure": "Chloroplast"}));
        let goal = StepGoal::ObserveStructure { structure: "chloroplast".to_string() };
        assert_eq!(engine.goal_met(&goal, &observe, &s), Some(true));
    }

    #[test]
    fn changing_magnification_loses_focus() {
        let engine = BiologyEngine::default();
        let s = apply(&engine, &SimulationState::new(1), "set_magnification", json!({"magnification": 40.0}));
        let s = apply(&engine, &s, "focus_microscope", json!({}));
        assert!(s.variables.flag(&VariableKey::InFocus));
        let s = apply(&engine, &s, "set_magnification", json!({"magnification": 100.0}));
        assert!(!s.variables.flag(&VariableKey::InFocus));

        let count = action("measurement", json!({"name": "cell_count", "value": 12}));
        assert!(!engine.validate(&count, &s, &step()).is_valid);
    }

    #[test]
    fn ecosystem_health_is_evenness() {
        assert_eq!(ecosystem_health(&[]), 0.0);
        assert_eq!(ecosystem_health(&[10.0, 0.0]), 0.0);
        assert!((ecosystem_health(&[50.0, 50.0]) - 100.0).abs() < 1e-9);
        let skewed = ecosystem_health(&[990.0, 10.0]);
        assert!(skewed < 20.0, "skewed health {skewed}");
    }

    #[test]
    fn logistic_growth_rounds_and_saturates() {
        assert_eq!(logistic_step(100.0, 0.1, 1000.0), 109.0);
        assert_eq!(logistic_step(1000.0, 0.1, 1000.0), 1000.0);
        assert_eq!(logistic_step(0.0, 0.1, 1000.0), 0.0);
    }

    #[test]
    fn sustained_ecosystem_completes_goal() {
        let engine = BiologyEngine::default();
        let mut s = SimulationState::new(1);
        s = apply(&engine, &s, "set_population", json!({"species": "rabbits", "count": 200}));
        s = apply(&engine, &s, "set_population", json!({"species": "foxes", "count": 150}));
        let advance = action("advance_ecosystem", json!({}));
        for generation in 1..=3 {
            assert_eq!(
                engine.goal_met(&StepGoal::SustainEcosystem, &advance, &s),
                Some(false),
                "completed early at generation {generation}"
            );
            s = apply(&engine, &s, "advance_ecosystem", json!({}));
        }
        assert_eq!(engine.goal_met(&StepGoal::SustainEcosystem, &advance, &s), Some(true));
    }

    #[test]
    fn extinct_population_breaks_streak() {
        let engine = BiologyEngine::default();
        let mut s = SimulationState::new(1);
        s = apply(&engine, &s, "set_population", json!({"species": "rabbits", "count": 200}));
        s = apply(&engine, &s, "set_population", json!({"species": "foxes", "count": 0}));
        s = apply(&engine, &s, "advance_ecosystem", json!({}));
        assert_eq!(s.variables.number(&VariableKey::HealthyStreak), Some(0.0));
        assert_eq!(s.variables.number(&VariableKey::EcosystemHealth), Some(0.0));
    }
}
