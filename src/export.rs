//! Flat measurement export for data-export and persistence layers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, LabResult, ValidationError};
use crate::state::Measurement;

/// One measurement as a flat record. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Measurement name.
    pub name: String,
    /// Recorded value.
    pub value: f64,
    /// Unit, possibly empty.
    pub unit: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Free-text note; empty when none.
    #[serde(default)]
    pub note: String,
}

impl From<&Measurement> for MeasurementRecord {
    fn from(m: &Measurement) -> Self {
        Self {
            name: m.name.clone(),
            value: m.value,
            unit: m.unit.clone(),
            timestamp: m.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            note: m.note.clone().unwrap_or_default(),
        }
    }
}

impl TryFrom<MeasurementRecord> for Measurement {
    type Error = ValidationError;

    fn try_from(record: MeasurementRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| ValidationError::invalid("timestamp", e.to_string()))?
            .with_timezone(&Utc);
        let mut measurement = Measurement::new(record.name, record.value, record.unit, timestamp);
        if !record.note.is_empty() {
            measurement = measurement.with_note(record.note);
        }
        Ok(measurement)
    }
}

/// Flattens measurements, preserving order.
#[must_use]
pub fn to_records(measurements: &[Measurement]) -> Vec<MeasurementRecord> {
    measurements.iter().map(MeasurementRecord::from).collect()
}

/// Rebuilds measurements from records, preserving order.
pub fn from_records(records: Vec<MeasurementRecord>) -> Result<Vec<Measurement>, ValidationError> {
    records.into_iter().map(Measurement::try_from).collect()
}

/// Encodes measurements as a JSON array of records.
pub fn to_json(measurements: &[Measurement]) -> LabResult<String> {
    serde_json::to_string_pretty(&to_records(measurements)).map_err(|e| {
        ExecutionError::Serialization {
            message: e.to_string(),
        }
        .into()
    })
}

/// Decodes a JSON array of records.
pub fn from_json(json: &str) -> LabResult<Vec<Measurement>> {
    let records: Vec<MeasurementRecord> =
        serde_json::from_str(json).map_err(|e| ExecutionError::Serialization {
            message: e.to_string(),
        })?;
    Ok(from_records(records)?)
}
