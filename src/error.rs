//! Error types for labsim.
//!
//! Errors are strongly typed using thiserror. Learner actions never surface
//! as `Err`: the orchestrator folds payload problems into a rejected
//! [`ValidationResult`](crate::validation::ValidationResult). `Result` is
//! reserved for lifecycle calls, definition/config loading and export.

use thiserror::Error;

use crate::orchestrator::RunStatus;

/// Validation errors that occur during input validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required payload or definition field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field is present but unusable.
    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A definition without steps.
    #[error("Experiment '{name}' has no steps")]
    EmptyStepSequence {
        /// Experiment name.
        name: String,
    },

    /// Step numbers are not 1..=n in order.
    #[error("Step numbers must run 1..={expected_total} in order; found {found} at position {position}")]
    StepOutOfOrder {
        /// Zero-based position in the sequence.
        position: usize,
        /// Step number found there.
        found: u32,
        /// Number of steps.
        expected_total: usize,
    },

    /// A step goal the subject's engine cannot evaluate.
    #[error("Step {step} uses goal '{goal}', which {subject} experiments cannot evaluate")]
    UnsupportedGoal {
        /// Offending step number.
        step: u32,
        /// Goal tag.
        goal: String,
        /// Subject of the definition.
        subject: String,
    },

    /// Difficulty outside 1 to 5.
    #[error("Difficulty {value} is out of range [1, 5]")]
    DifficultyOutOfRange {
        /// Difficulty given.
        value: u8,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::InvalidField`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Execution errors raised by the orchestrator's lifecycle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// A lifecycle call not allowed in the current status.
    #[error("Cannot {operation} while the simulation is {status}")]
    InvalidTransition {
        /// Lifecycle call attempted.
        operation: &'static str,
        /// Status at the time.
        status: RunStatus,
    },

    /// Undo with no earlier snapshot in the step.
    #[error("Nothing to undo in the current step")]
    NothingToUndo,

    /// Encoding or decoding failed.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Underlying error message.
        message: String,
    },

    /// The event stream lost its publisher.
    #[error("Event stream disconnected")]
    Disconnected,

    /// No event arrived in time.
    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        /// How long the caller waited (ms).
        duration_ms: u64,
    },
}

/// Top-level error type for labsim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LabError {
    /// Bad input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A failed operation.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Broken internal invariant.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl LabError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for labsim operations.
pub type LabResult<T> = Result<T, LabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ValidationError::missing("voltage");
        let msg = format!("{err}");
        assert!(msg.contains("voltage"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_invalid_field_message() {
        let err = ValidationError::invalid("resistance", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Field 'resistance' is invalid: must be greater than 0"
        );
    }

    #[test]
    fn test_invalid_transition_names_status() {
        let err = ExecutionError::InvalidTransition {
            operation: "pause",
            status: RunStatus::NotStarted,
        };
        let msg = format!("{err}");
        assert!(msg.contains("pause"));
        assert!(msg.contains("not started"));
    }

    #[test]
    fn test_lab_error_from_validation() {
        let err: LabError = ValidationError::DifficultyOutOfRange { value: 9 }.into();
        assert!(err.is_validation());
        assert!(!err.is_execution());
    }

    #[test]
    fn test_lab_error_from_execution() {
        let err: LabError = ExecutionError::NothingToUndo.into();
        assert!(err.is_execution());
        assert!(format!("{err}").contains("undo"));
    }

    #[test]
    fn test_lab_error_internal() {
        let err = LabError::internal("state lock poisoned");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("poisoned"));
    }
}
