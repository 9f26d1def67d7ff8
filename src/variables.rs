//! Typed simulation variables.
//!
//! The simulation keeps one working scratch space shared by every subject,
//! keyed by an enumeration of the quantities the engines know about. Keys
//! for reagents, species and microscope structures carry a normalized name.
//! On the wire keys are plain strings (`voltage`, `moles:hcl`,
//! `population:rabbits`), so snapshots stay readable by the presentation layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::VariableValue;

/// Names every quantity an engine may store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VariableKey {
    // Shared
    /// Ambient temperature (°C).
    Temperature,
    /// Pressure (atm).
    Pressure,

    // Physics
    /// Supply voltage (V).
    Voltage,
    /// Circuit resistance (Ω).
    Resistance,
    /// Computed current (A).
    Current,
    /// Computed power (W).
    Power,
    /// Pendulum length (m).
    PendulumLength,
    /// Release angle (degrees).
    ReleaseAngle,
    /// Computed period (s).
    Period,
    /// Computed frequency (Hz).
    Frequency,
    /// Whether the pendulum was released.
    PendulumSwinging,

    // Chemistry
    /// Vessel contents (L).
    SolutionVolume,
    /// Unneutralized acid equivalents (mol).
    AcidMoles,
    /// Unneutralized base equivalents (mol).
    BaseMoles,
    /// Salt formed so far (mol).
    SaltMoles,
    /// Solution pH.
    Ph,
    /// Moles of one reagent; zero once consumed.
    Moles(String),
    /// Molar concentration of one reagent.
    Concentration(String),

    // Biology
    /// Light on the plant.
    LightIntensity,
    /// Computed photosynthesis rate.
    PhotosynthesisRate,
    /// Enzyme substrate concentration.
    SubstrateConcentration,
    /// Computed reaction velocity.
    EnzymeVelocity,
    /// Microscope magnification.
    Magnification,
    /// Whether the microscope is focused.
    InFocus,
    /// A structure seen under the microscope.
    Observed(String),
    /// Population of one species.
    Population(String),
    /// Ecosystem health from 0 to 100.
    EcosystemHealth,
    /// Consecutive healthy generations.
    HealthyStreak,
}

const SIMPLE_KEYS: &[(&str, VariableKey)] = &[
    ("temperature", VariableKey::Temperature),
    ("pressure", VariableKey::Pressure),
    ("voltage", VariableKey::Voltage),
    ("resistance", VariableKey::Resistance),
    ("current", VariableKey::Current),
    ("power", VariableKey::Power),
    ("pendulum_length", VariableKey::PendulumLength),
    ("release_angle", VariableKey::ReleaseAngle),
    ("period", VariableKey::Period),
    ("frequency", VariableKey::Frequency),
    ("pendulum_swinging", VariableKey::PendulumSwinging),
    ("solution_volume", VariableKey::SolutionVolume),
    ("acid_moles", VariableKey::AcidMoles),
    ("base_moles", VariableKey::BaseMoles),
    ("salt_moles", VariableKey::SaltMoles),
    ("ph", VariableKey::Ph),
    ("light_intensity", VariableKey::LightIntensity),
    ("photosynthesis_rate", VariableKey::PhotosynthesisRate),
    ("substrate_concentration", VariableKey::SubstrateConcentration),
    ("enzyme_velocity", VariableKey::EnzymeVelocity),
    ("magnification", VariableKey::Magnification),
    ("in_focus", VariableKey::InFocus),
    ("ecosystem_health", VariableKey::EcosystemHealth),
    ("healthy_streak", VariableKey::HealthyStreak),
];

/// Normalizes a reagent, species or structure name for use in a key.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl VariableKey {
    /// Key for the moles of a reagent present in solution.
    pub fn moles(reagent: &str) -> Self {
        Self::Moles(normalize_name(reagent))
    }

    /// Key for the molar concentration of a reagent.
    pub fn concentration(reagent: &str) -> Self {
        Self::Concentration(normalize_name(reagent))
    }

    /// Key for a species population count.
    pub fn population(species: &str) -> Self {
        Self::Population(normalize_name(species))
    }

    /// Key recording that a microscope structure was observed.
    pub fn observed(structure: &str) -> Self {
        Self::Observed(normalize_name(structure))
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moles(name) => write!(f, "moles:{name}"),
            Self::Concentration(name) => write!(f, "concentration:{name}"),
            Self::Observed(name) => write!(f, "observed:{name}"),
            Self::Population(name) => write!(f, "population:{name}"),
            simple => {
                let name = SIMPLE_KEYS
                    .iter()
                    .find(|(_, key)| key == simple)
                    .map_or("unknown", |(name, _)| *name);
                f.write_str(name)
            }
        }
    }
}

impl FromStr for VariableKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((prefix, name)) = s.split_once(':') {
            let name = normalize_name(name);
            if name.is_empty() {
                return Err(ValidationError::invalid("variable", format!("'{s}' has an empty name")));
            }
            return match prefix {
                "moles" => Ok(Self::Moles(name)),
                "concentration" => Ok(Self::Concentration(name)),
                "observed" => Ok(Self::Observed(name)),
                "population" => Ok(Self::Population(name)),
                _ => Err(ValidationError::invalid("variable", format!("unknown variable '{s}'"))),
            };
        }
        SIMPLE_KEYS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, key)| key.clone())
            .ok_or_else(|| ValidationError::invalid("variable", format!("unknown variable '{s}'")))
    }
}

impl From<VariableKey> for String {
    fn from(key: VariableKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for VariableKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The variable scratch space of one simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<VariableKey, VariableValue>);

impl Variables {
    /// Empty variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, if set.
    pub fn get(&self, key: &VariableKey) -> Option<VariableValue> {
        self.0.get(key).copied()
    }

    /// Numeric value of `key`, if present and numeric.
    pub fn number(&self, key: &VariableKey) -> Option<f64> {
        self.get(key).and_then(|v| v.as_number())
    }

    /// Numeric value of `key`, or `default` when absent.
    pub fn number_or(&self, key: &VariableKey, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    /// Flag value of `key`; absent flags read as false.
    pub fn flag(&self, key: &VariableKey) -> bool {
        self.get(key).and_then(|v| v.as_flag()).unwrap_or(false)
    }

    /// Sets `key`, replacing any earlier value.
    pub fn set(&mut self, key: VariableKey, value: impl Into<VariableValue>) {
        self.0.insert(key, value.into());
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &VariableKey) -> Option<VariableValue> {
        self.0.remove(key)
    }

    /// Whether `key` is set.
    pub fn contains(&self, key: &VariableKey) -> bool {
        self.0.contains_key(key)
    }

    /// Number of variables set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&VariableKey, &VariableValue)> {
        self.0.iter()
    }

    /// Reagents with a positive amount in solution.
    pub fn reagents_present(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|(key, value)| match key {
            VariableKey::Moles(name) if value.as_number().is_some_and(|m| m > 0.0) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Every reagent ever added to the vessel, including fully consumed ones.
    pub fn reagents_added(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(|key| match key {
            VariableKey::Moles(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Population counts keyed by species name.
    pub fn populations(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().filter_map(|(key, value)| match key {
            VariableKey::Population(name) => value.as_number().map(|n| (name.as_str(), n)),
            _ => None,
        })
    }
}
