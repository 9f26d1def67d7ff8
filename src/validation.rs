//! The single outcome channel between checkers, engines and the presentation layer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Outcome of checking or applying one action. Carries no side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the action was accepted.
    pub is_valid: bool,
    /// Message for the learner.
    pub feedback: String,
    /// Hazard that blocked the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_warning: Option<String>,
    /// Points earned by this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_delta: Option<f64>,
    /// Zero-based step index to advance to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<u32>,
}

impl ValidationResult {
    /// Accepted outcome.
    pub fn ok(feedback: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            feedback: feedback.into(),
            safety_warning: None,
            score_delta: None,
            next_step: None,
        }
    }

    /// Rejected outcome without a hazard.
    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            feedback: feedback.into(),
            safety_warning: None,
            score_delta: None,
            next_step: None,
        }
    }

    /// Rejected outcome naming a hazard.
    pub fn hazard(feedback: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            safety_warning: Some(warning.into()),
            ..Self::reject(feedback)
        }
    }

    /// Sets the points earned.
    #[must_use]
    pub fn with_score_delta(mut self, delta: f64) -> Self {
        self.score_delta = Some(delta);
        self
    }

    /// Sets the step to advance to.
    #[must_use]
    pub fn with_next_step(mut self, step: u32) -> Self {
        self.next_step = Some(step);
        self
    }

    /// Replaces the feedback.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    /// True when the result carries a safety warning.
    #[must_use]
    pub const fn is_hazard(&self) -> bool {
        self.safety_warning.is_some()
    }
}

impl From<ValidationError> for ValidationResult {
    fn from(err: ValidationError) -> Self {
        Self::reject(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hazard_is_invalid_with_warning() {
        let r = ValidationResult::hazard("Safety violation", "Toxic gas");
        assert!(!r.is_valid);
        assert!(r.is_hazard());
        assert_eq!(r.safety_warning.as_deref(), Some("Toxic gas"));
    }

    #[test]
    fn payload_errors_become_rejections() {
        let r: ValidationResult = ValidationError::missing("voltage").into();
        assert!(!r.is_valid);
        assert!(r.feedback.contains("voltage"));
        assert!(!r.is_hazard());
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let json = serde_json::to_value(ValidationResult::ok("done")).unwrap();
        assert_eq!(json, serde_json::json!({"is_valid": true, "feedback": "done"}));

        let json = serde_json::to_value(ValidationResult::ok("done").with_next_step(2)).unwrap();
        assert_eq!(json["next_step"], 2);
    }
}
