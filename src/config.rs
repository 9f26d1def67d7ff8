//! Kernel configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration. Call [`LabConfig::validate`] before handing a config to
//! the orchestrator (the orchestrator does this itself).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LabResult, ValidationError};

/// Limits used by the Safety Checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Temperatures above this match heat-related safety notes (°C).
    pub note_temperature_c: f64,
    /// Voltages above this match electrical safety notes (V).
    pub note_voltage_v: f64,
    /// Electrical power limit (W).
    pub max_power_w: f64,
    /// Lowest safe temperature (°C).
    pub min_temperature_c: f64,
    /// Highest safe temperature (°C).
    pub max_temperature_c: f64,
    /// Pressure limit (atm).
    pub max_pressure_atm: f64,
    /// Strong acid/base concentration at which mixing becomes violent (mol/L).
    pub violent_neutralization_m: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            note_temperature_c: 100.0,
            note_voltage_v: 50.0,
            max_power_w: 1000.0,
            min_temperature_c: -50.0,
            max_temperature_c: 200.0,
            max_pressure_atm: 10.0,
            violent_neutralization_m: 6.0,
        }
    }
}

/// Physics engine constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravitational acceleration (m/s²).
    pub gravity: f64,
    /// Highest supply voltage the bench accepts (V).
    pub max_voltage_v: f64,
    /// Small-angle approximation limit (degrees).
    pub max_release_angle_deg: f64,
    /// Absolute tolerance when comparing measured and computed current (A).
    pub current_tolerance_a: f64,
    /// Absolute tolerance when comparing measured and computed period (s).
    pub period_tolerance_s: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            max_voltage_v: 50.0,
            max_release_angle_deg: 45.0,
            current_tolerance_a: 0.01,
            period_tolerance_s: 0.05,
        }
    }
}

/// Chemistry engine constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemistryConfig {
    /// Capacity of the reaction vessel (L).
    pub max_volume_l: f64,
    /// Absolute tolerance for pH goals.
    pub ph_tolerance: f64,
    /// Adding an acid into a base at or above this concentration (or the
    /// reverse) is refused by the engine (mol/L).
    pub concentrated_threshold_m: f64,
    /// Upper bound for a stock solution's concentration (mol/L).
    pub max_stock_concentration_m: f64,
}

impl Default for ChemistryConfig {
    fn default() -> Self {
        Self {
            max_volume_l: 0.5,
            ph_tolerance: 0.1,
            concentrated_threshold_m: 1.0,
            max_stock_concentration_m: 18.0,
        }
    }
}

/// Biology engine constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiologyConfig {
    /// Optimal temperature for photosynthesis (°C).
    pub photosynthesis_optimal_c: f64,
    /// Optimal temperature for enzyme activity (°C).
    pub enzyme_optimal_c: f64,
    /// Full temperature credit within ± this band (°C).
    pub full_credit_band_c: f64,
    /// Temperature factor reaches the floor at ± this band (°C).
    pub decay_band_c: f64,
    /// Lowest temperature factor, reached outside the decay band.
    pub temp_factor_floor: f64,
    /// Brightest light setting.
    pub max_light_intensity: f64,
    /// Maximum enzyme velocity.
    pub default_vmax: f64,
    /// Michaelis constant.
    pub default_km: f64,
    /// Strongest microscope objective.
    pub max_magnification: f64,
    /// Minimum magnification needed to resolve each structure.
    pub structure_magnifications: BTreeMap<String, f64>,
    /// Measurements that require the microscope to be in focus.
    pub microscopy_measurements: Vec<String>,
    /// Per-generation logistic growth rate.
    pub growth_rate: f64,
    /// Population ceiling for logistic growth.
    pub carrying_capacity: f64,
    /// Ecosystem health counted as healthy (0 to 100).
    pub health_threshold: f64,
    /// Consecutive healthy generations needed to complete a sustain goal.
    pub sustain_updates: u32,
}

impl Default for BiologyConfig {
    fn default() -> Self {
        let structure_magnifications = [
            ("cell", 40.0),
            ("cell_wall", 40.0),
            ("nucleus", 100.0),
            ("stomata", 100.0),
            ("chloroplast", 400.0),
            ("mitochondria", 1000.0),
        ]
        .into_iter()
        .map(|(name, mag)| (name.to_string(), mag))
        .collect();

        Self {
            photosynthesis_optimal_c: 25.0,
            enzyme_optimal_c: 37.0,
            full_credit_band_c: 5.0,
            decay_band_c: 15.0,
            temp_factor_floor: 0.1,
            max_light_intensity: 100.0,
            default_vmax: 100.0,
            default_km: 5.0,
            max_magnification: 1500.0,
            structure_magnifications,
            microscopy_measurements: vec![
                "cell_count".to_string(),
                "cell_size".to_string(),
                "stomata_count".to_string(),
            ],
            growth_rate: 0.1,
            carrying_capacity: 1000.0,
            health_threshold: 70.0,
            sustain_updates: 3,
        }
    }
}

/// End-of-session scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points awarded by the engine whenever a step completes.
    pub points_per_step: f64,
    /// Time allowance for the time bonus (s).
    pub time_limit_secs: f64,
    /// Time bonus cap as a fraction of the base score.
    pub max_time_bonus_fraction: f64,
    /// Streak length that earns one streak award.
    pub streak_length: u32,
    /// Points per streak award.
    pub streak_points: f64,
    /// Accuracy bonus cap as a fraction of the base score.
    pub max_accuracy_bonus_fraction: f64,
    /// Multiplier gained per difficulty level above 1.
    pub difficulty_step: f64,
    /// Fraction of the total removed per hint.
    pub hint_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points_per_step: 100.0,
            time_limit_secs: 600.0,
            max_time_bonus_fraction: 0.25,
            streak_length: 5,
            streak_points: 5.0,
            max_accuracy_bonus_fraction: 0.2,
            difficulty_step: 0.2,
            hint_penalty: 0.10,
        }
    }
}

/// Full kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Safety Checker limits.
    pub safety: SafetyConfig,
    /// Physics engine constants.
    pub physics: PhysicsConfig,
    /// Chemistry engine constants.
    pub chemistry: ChemistryConfig,
    /// Biology engine constants.
    pub biology: BiologyConfig,
    /// Scoring constants.
    pub scoring: ScoringConfig,
}

fn positive(name: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfig {
            reason: format!("{name} must be > 0 (got {value})"),
        })
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfig {
            reason: format!("{name} must be >= 0 (got {value})"),
        })
    }
}

impl LabConfig {
    /// Parses a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(s: &str) -> LabResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects non-positive limits and inverted ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let s = &self.safety;
        positive("safety.max_power_w", s.max_power_w)?;
        positive("safety.max_pressure_atm", s.max_pressure_atm)?;
        positive("safety.violent_neutralization_m", s.violent_neutralization_m)?;
        if !(s.min_temperature_c < s.max_temperature_c) {
            return Err(ValidationError::InvalidConfig {
                reason: "safety.min_temperature_c must be below safety.max_temperature_c".to_string(),
            });
        }

        let p = &self.physics;
        positive("physics.gravity", p.gravity)?;
        positive("physics.max_voltage_v", p.max_voltage_v)?;
        positive("physics.max_release_angle_deg", p.max_release_angle_deg)?;
        non_negative("physics.current_tolerance_a", p.current_tolerance_a)?;
        non_negative("physics.period_tolerance_s", p.period_tolerance_s)?;

        let c = &self.chemistry;
        positive("chemistry.max_volume_l", c.max_volume_l)?;
        non_negative("chemistry.ph_tolerance", c.ph_tolerance)?;
        positive("chemistry.concentrated_threshold_m", c.concentrated_threshold_m)?;
        positive("chemistry.max_stock_concentration_m", c.max_stock_concentration_m)?;

        let b = &self.biology;
        non_negative("biology.full_credit_band_c", b.full_credit_band_c)?;
        if !(b.decay_band_c > b.full_credit_band_c) {
            return Err(ValidationError::InvalidConfig {
                reason: "biology.decay_band_c must exceed biology.full_credit_band_c".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&b.temp_factor_floor) {
            return Err(ValidationError::InvalidConfig {
                reason: "biology.temp_factor_floor must be within [0, 1]".to_string(),
            });
        }
        positive("biology.max_light_intensity", b.max_light_intensity)?;
        positive("biology.default_vmax", b.default_vmax)?;
        positive("biology.default_km", b.default_km)?;
        positive("biology.max_magnification", b.max_magnification)?;
        non_negative("biology.growth_rate", b.growth_rate)?;
        positive("biology.carrying_capacity", b.carrying_capacity)?;
        if b.sustain_updates == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "biology.sustain_updates must be > 0".to_string(),
            });
        }

        let sc = &self.scoring;
        non_negative("scoring.points_per_step", sc.points_per_step)?;
        positive("scoring.time_limit_secs", sc.time_limit_secs)?;
        non_negative("scoring.hint_penalty", sc.hint_penalty)?;
        if sc.streak_length == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "scoring.streak_length must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
