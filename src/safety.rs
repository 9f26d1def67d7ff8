//! Hazard detection, independent of domain correctness.
//!
//! Two rule sets run in a fixed order and the first hit is reported:
//! the active step's declared safety notes, then a table of universally
//! dangerous conditions. The checker is total and never mutates state.

use std::sync::OnceLock;

use regex::Regex;

use crate::action::{ActionKind, UserAction};
use crate::config::SafetyConfig;
use crate::reagents::{self, ReagentClass};
use crate::state::SimulationState;
use crate::step::ExperimentStep;
use crate::validation::ValidationResult;
use crate::variables::VariableKey;

fn heat_note() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)heat|temperature").expect("static regex"))
}

fn mixing_note() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(mix|combin)").expect("static regex"))
}

fn electrical_note() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)electric|voltage|shock").expect("static regex"))
}

/// A universally dangerous condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    /// Bleach with ammonia.
    ToxicGas,
    /// Concentrated strong acid with strong base.
    ViolentNeutralization,
    /// Peroxide with organic material.
    OxidizerWithOrganic,
    /// Power above the limit.
    ElectricalOverload,
    /// Temperature outside the safe window.
    TemperatureOutOfRange,
    /// Pressure above the limit.
    Overpressure,
}

impl Hazard {
    /// Human-readable warning naming the hazard.
    #[must_use]
    pub const fn warning(&self) -> &'static str {
        match self {
            Self::ToxicGas => "Mixing bleach and ammonia releases toxic chloramine gas",
            Self::ViolentNeutralization => {
                "Concentrated strong acid and strong base react violently and may boil over"
            }
            Self::OxidizerWithOrganic => "Peroxide with organic material can ignite or explode",
            Self::ElectricalOverload => "Electrical power exceeds the safe limit; risk of fire or shock",
            Self::TemperatureOutOfRange => "Temperature is outside the safe operating range",
            Self::Overpressure => "Pressure exceeds the safe limit; the vessel may rupture",
        }
    }
}

/// Pure rule evaluator for learner actions.
#[derive(Debug, Clone, Default)]
pub struct SafetyChecker {
    config: SafetyConfig,
}

fn number(action: &UserAction, field: &str) -> Option<f64> {
    action.opt_number(field).ok().flatten()
}

impl SafetyChecker {
    /// Checker with the given limits.
    #[must_use]
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    /// Limits in use.
    #[must_use]
    pub const fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Checks `action` against the step's notes and the hazard table.
    pub fn check(&self, action: &UserAction, step: &ExperimentStep, state: &SimulationState) -> ValidationResult {
        if let Some(note) = self.matching_note(action, step) {
            log::warn!(
                target: "labsim::safety",
                "action {} ({}) matched safety note: {note}",
                action.id,
                action.kind
            );
            return ValidationResult::hazard(
                "Safety violation: this action conflicts with the step's safety notes",
                format!("Safety note: {note}"),
            );
        }

        if let Some(hazard) = self.hazard(action, state) {
            log::warn!(
                target: "labsim::safety",
                "action {} ({}) rejected: {:?}",
                action.id,
                action.kind,
                hazard
            );
            return ValidationResult::hazard(
                "Safety violation: action blocked",
                hazard.warning(),
            );
        }

        ValidationResult::ok("Safety check passed")
    }

    /// First declared safety note the action runs into.
    pub fn matching_note<'s>(&self, action: &UserAction, step: &'s ExperimentStep) -> Option<&'s str> {
        let hot = number(action, "temperature").is_some_and(|t| t > self.config.note_temperature_c);
        let high_voltage = number(action, "voltage").is_some_and(|v| v > self.config.note_voltage_v);
        let reagent = (action.action_kind() == Some(ActionKind::AddReagent))
            .then(|| action.opt_text("reagent").map(str::to_lowercase))
            .map(|name| name.unwrap_or_default());

        step.safety_notes
            .iter()
            .find(|note| {
                if hot && heat_note().is_match(note) {
                    return true;
                }
                if let Some(name) = &reagent {
                    if mixing_note().is_match(note) {
                        return true;
                    }
                    if !name.is_empty() && note.to_lowercase().contains(name.as_str()) {
                        return true;
                    }
                }
                high_voltage && electrical_note().is_match(note)
            })
            .map(String::as_str)
    }

    /// First universal hazard the action triggers.
    pub fn hazard(&self, action: &UserAction, state: &SimulationState) -> Option<Hazard> {
        if action.action_kind() == Some(ActionKind::AddReagent) {
            if let Some(hazard) = self.chemical_hazard(action, state) {
                return Some(hazard);
            }
        }

        if let Some(power) = electrical_power(action, state) {
            if power > self.config.max_power_w {
                return Some(Hazard::ElectricalOverload);
            }
        }

        if let Some(t) = number(action, "temperature") {
            if t < self.config.min_temperature_c || t > self.config.max_temperature_c {
                return Some(Hazard::TemperatureOutOfRange);
            }
        }

        if number(action, "pressure").is_some_and(|p| p > self.config.max_pressure_atm) {
            return Some(Hazard::Overpressure);
        }

        None
    }

    fn chemical_hazard(&self, action: &UserAction, state: &SimulationState) -> Option<Hazard> {
        let added = action.opt_text("reagent")?;
        let added_info = reagents::lookup(added);
        let added_concentration = number(action, "concentration").unwrap_or(0.0);

        // Neutralized ammonia still counts.
        let toxic = state.variables.reagents_added().any(|earlier| {
            let earlier_info = reagents::lookup(earlier);
            (added_info.class == ReagentClass::Bleach && earlier_info.is_ammonia)
                || (added_info.is_ammonia && earlier_info.class == ReagentClass::Bleach)
        });
        if toxic {
            return Some(Hazard::ToxicGas);
        }

        for present in state.variables.reagents_present() {
            let present_info = reagents::lookup(present);
            let acid_base = matches!(
                (added_info.class, present_info.class),
                (ReagentClass::StrongAcid, ReagentClass::StrongBase)
                    | (ReagentClass::StrongBase, ReagentClass::StrongAcid)
            );
            if acid_base {
                let present_concentration = state
                    .variables
                    .number_or(&VariableKey::concentration(present), 0.0);
                let threshold = self.config.violent_neutralization_m;
                if added_concentration >= threshold || present_concentration >= threshold {
                    return Some(Hazard::ViolentNeutralization);
                }
            }

            let oxidizer_organic = matches!(
                (added_info.class, present_info.class),
                (ReagentClass::Peroxide, ReagentClass::Organic)
                    | (ReagentClass::Organic, ReagentClass::Peroxide)
            );
            if oxidizer_organic {
                return Some(Hazard::OxidizerWithOrganic);
            }
        }
        None
    }
}

/// Power implied by the action, when it touches an electrical quantity.
fn electrical_power(action: &UserAction, state: &SimulationState) -> Option<f64> {
    let voltage = number(action, "voltage");
    let current = number(action, "current");
    let resistance = number(action, "resistance");
    if voltage.is_none() && current.is_none() && resistance.is_none() {
        return None;
    }

    let vars = &state.variables;
    let voltage = voltage.or_else(|| vars.number(&VariableKey::Voltage))?;
    let current = match current {
        Some(i) => i,
        None => {
            let r = resistance.or_else(|| vars.number(&VariableKey::Resistance))?;
            if r <= 0.0 {
                return None;
            }
            voltage / r
        }
    };
    Some((voltage * current).abs())
}
