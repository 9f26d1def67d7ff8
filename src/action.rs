//! Learner actions.
//!
//! An [`ActionInput`] is what the capture layer (UI, voice, avatar) hands
//! over: a kind tag plus a structured JSON payload. The orchestrator stamps
//! it into an immutable [`UserAction`] record before running the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Stable identifier for a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Creates a new random action ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of action kinds the kernel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // Shared
    /// Record a named reading.
    Measurement,
    /// Set the ambient temperature.
    SetTemperature,
    /// Confirm the active step is done.
    ConfirmStep,
    /// Revert the last valid action of the step.
    Undo,

    // Physics
    /// Set the supply voltage.
    SetVoltage,
    /// Set the circuit resistance.
    SetResistance,
    /// Set pendulum length and release angle.
    SetPendulum,
    /// Start the pendulum swinging.
    ReleasePendulum,

    // Chemistry
    /// Add a volume of reagent stock to the vessel.
    AddReagent,

    // Biology
    /// Set the light intensity on the plant.
    SetLight,
    /// Set the enzyme substrate concentration.
    AddSubstrate,
    /// Change the microscope objective.
    SetMagnification,
    /// Bring the specimen into focus.
    FocusMicroscope,
    /// Look for a structure under the microscope.
    Observe,
    /// Set a species population.
    SetPopulation,
    /// Step the ecosystem forward one generation.
    AdvanceEcosystem,
}

impl ActionKind {
    const ALL: [Self; 16] = [
        Self::Measurement,
        Self::SetTemperature,
        Self::ConfirmStep,
        Self::Undo,
        Self::SetVoltage,
        Self::SetResistance,
        Self::SetPendulum,
        Self::ReleasePendulum,
        Self::AddReagent,
        Self::SetLight,
        Self::AddSubstrate,
        Self::SetMagnification,
        Self::FocusMicroscope,
        Self::Observe,
        Self::SetPopulation,
        Self::AdvanceEcosystem,
    ];

    /// Wire tag of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Measurement => "measurement",
            Self::SetTemperature => "set_temperature",
            Self::ConfirmStep => "confirm_step",
            Self::Undo => "undo",
            Self::SetVoltage => "set_voltage",
            Self::SetResistance => "set_resistance",
            Self::SetPendulum => "set_pendulum",
            Self::ReleasePendulum => "release_pendulum",
            Self::AddReagent => "add_reagent",
            Self::SetLight => "set_light",
            Self::AddSubstrate => "add_substrate",
            Self::SetMagnification => "set_magnification",
            Self::FocusMicroscope => "focus_microscope",
            Self::Observe => "observe",
            Self::SetPopulation => "set_population",
            Self::AdvanceEcosystem => "advance_ecosystem",
        }
    }

    /// Parses a wire tag. Unknown tags yield `None`.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw action as emitted by the capture layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    /// Kind tag, e.g. `add_reagent`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ActionInput {
    /// Action of `kind` carrying `data`.
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Action with an empty payload.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// An action recorded in the audit trail.
///
/// Once appended to [`SimulationState::user_actions`](crate::state::SimulationState)
/// a record is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    /// Unique id of this submission.
    pub id: ActionId,
    /// Kind tag as submitted, known or not.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload as submitted.
    pub data: serde_json::Value,
    /// Zero-based index of the step that was active.
    pub step_number: u32,
    /// When the orchestrator received the action.
    pub timestamp: DateTime<Utc>,
    /// Whether the action passed safety and domain validation.
    pub is_valid: bool,
}

impl UserAction {
    /// Stamps an input into a record. Validity is decided by the pipeline.
    pub fn record(input: ActionInput, step_number: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: ActionId::new(),
            kind: input.kind,
            data: input.data,
            step_number,
            timestamp,
            is_valid: false,
        }
    }

    /// The parsed kind, if the tag is known.
    #[must_use]
    pub fn action_kind(&self) -> Option<ActionKind> {
        ActionKind::parse(&self.kind)
    }

    /// Copy of this record with its verdict attached.
    #[must_use]
    pub fn with_validity(mut self, is_valid: bool) -> Self {
        self.is_valid = is_valid;
        self
    }

    fn field(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    /// Required finite number.
    pub fn number(&self, field: &str) -> Result<f64, ValidationError> {
        self.opt_number(field)?
            .ok_or_else(|| ValidationError::missing(field))
    }

    /// Optional finite number. Numeric strings are accepted.
    pub fn opt_number(&self, field: &str) -> Result<Option<f64>, ValidationError> {
        let Some(raw) = self.field(field) else {
            return Ok(None);
        };
        let value = match raw {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ValidationError::invalid(field, "expected a finite number")),
        }
    }

    /// Required non-empty text.
    pub fn text(&self, field: &str) -> Result<&str, ValidationError> {
        match self.field(field) {
            None => Err(ValidationError::missing(field)),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
            Some(serde_json::Value::String(_)) => Err(ValidationError::missing(field)),
            Some(_) => Err(ValidationError::invalid(field, "expected text")),
        }
    }

    /// Optional text; empty strings read as absent.
    pub fn opt_text(&self, field: &str) -> Option<&str> {
        self.field(field)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
