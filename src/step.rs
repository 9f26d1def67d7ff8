//! Experiment content consumed from the step content provider.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LabError, LabResult, ValidationError};
use crate::variables::VariableKey;

/// Subject of an experiment. Selects the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// Circuits and pendulums.
    Physics,
    /// Solutions and titration.
    Chemistry,
    /// Plants, enzymes, cells and ecosystems.
    Biology,
}

impl Subject {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion criterion of a step. Each engine evaluates the goals of its domain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepGoal {
    /// Completes when the learner confirms the step.
    #[default]
    Confirm,

    /// Every listed variable is within `tolerance` of its target.
    Targets {
        /// Target value per variable.
        values: BTreeMap<VariableKey, f64>,
        /// Absolute tolerance for every target.
        #[serde(default = "default_target_tolerance")]
        tolerance: f64,
    },

    /// A current measurement matches the computed circuit current.
    MatchCurrent,

    /// A period measurement matches the computed pendulum period.
    MatchPeriod,

    /// Solution pH reaches the target.
    TargetPh {
        /// Target pH.
        ph: f64,
    },

    /// The named structure has been observed under the microscope.
    ObserveStructure {
        /// Structure name, e.g. `chloroplast`.
        structure: String,
    },

    /// Ecosystem health stays above threshold with every population alive.
    SustainEcosystem,
}

fn default_target_tolerance() -> f64 {
    0.01
}

impl StepGoal {
    /// Short tag used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Targets { .. } => "targets",
            Self::MatchCurrent => "match_current",
            Self::MatchPeriod => "match_period",
            Self::TargetPh { .. } => "target_ph",
            Self::ObserveStructure { .. } => "observe_structure",
            Self::SustainEcosystem => "sustain_ecosystem",
        }
    }
}

/// One step of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStep {
    /// One-based position in the sequence.
    pub step_number: u32,
    /// What the learner is asked to do.
    pub instructions: String,
    /// Notes the Safety Checker enforces.
    #[serde(default)]
    pub safety_notes: Vec<String>,
    /// What the learner should see.
    #[serde(default)]
    pub expected_results: String,
    /// Reagents the learner may add in this step. Empty means no restriction.
    #[serde(default)]
    pub allowed_reagents: Vec<String>,
    /// Hints handed out in order.
    #[serde(default)]
    pub hints: Vec<String>,
    /// When the step completes.
    #[serde(default)]
    pub goal: StepGoal,
}

impl ExperimentStep {
    /// Step with instructions and a confirm goal.
    pub fn new(step_number: u32, instructions: impl Into<String>) -> Self {
        Self {
            step_number,
            instructions: instructions.into(),
            safety_notes: Vec::new(),
            expected_results: String::new(),
            allowed_reagents: Vec::new(),
            hints: Vec::new(),
            goal: StepGoal::Confirm,
        }
    }

    /// Sets the completion goal.
    #[must_use]
    pub fn with_goal(mut self, goal: StepGoal) -> Self {
        self.goal = goal;
        self
    }

    /// Adds a safety note.
    #[must_use]
    pub fn with_safety_note(mut self, note: impl Into<String>) -> Self {
        self.safety_notes.push(note.into());
        self
    }

    /// Restricts the reagents the step accepts.
    #[must_use]
    pub fn with_allowed_reagents<I, S>(mut self, reagents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_reagents = reagents.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Whether `reagent` passes the allow-list (case-insensitive).
    #[must_use]
    pub fn allows_reagent(&self, reagent: &str) -> bool {
        self.allowed_reagents.is_empty()
            || self
                .allowed_reagents
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(reagent.trim()))
    }
}

/// A named experiment: subject, difficulty and ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    /// Display name.
    pub name: String,
    /// Selects the engine.
    pub subject: Subject,
    /// Difficulty from 1 to 5.
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    /// Steps in order.
    pub steps: Vec<ExperimentStep>,
}

fn default_difficulty() -> u8 {
    1
}

impl ExperimentDefinition {
    /// Definition at difficulty 1.
    pub fn new(name: impl Into<String>, subject: Subject, steps: Vec<ExperimentStep>) -> Self {
        Self {
            name: name.into(),
            subject,
            difficulty: default_difficulty(),
            steps,
        }
    }

    /// Sets the difficulty.
    #[must_use]
    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Parses a definition from JSON and validates its shape.
    pub fn from_json(s: &str) -> LabResult<Self> {
        let def: Self = serde_json::from_str(s)
            .map_err(|e| LabError::from(ValidationError::invalid("definition", e.to_string())))?;
        def.validate()?;
        Ok(def)
    }

    /// Structural checks: non-empty, contiguous 1..=n numbering, difficulty in range.
    ///
    /// Subject/goal compatibility is checked by the engine when the
    /// orchestrator is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyStepSequence {
                name: self.name.clone(),
            });
        }
        if !(1..=5).contains(&self.difficulty) {
            return Err(ValidationError::DifficultyOutOfRange {
                value: self.difficulty,
            });
        }
        for (position, step) in self.steps.iter().enumerate() {
            if step.step_number as usize != position + 1 {
                return Err(ValidationError::StepOutOfOrder {
                    position,
                    found: step.step_number,
                    expected_total: self.steps.len(),
                });
            }
        }
        Ok(())
    }

    /// Number of steps as stored in the simulation state.
    #[must_use]
    pub fn total_steps(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_defaults_fill_optional_fields() {
        let step: ExperimentStep = serde_json::from_value(json!({
            "step_number": 1,
            "instructions": "Connect the battery"
        }))
        .unwrap();
        assert!(step.safety_notes.is_empty());
        assert_eq!(step.goal, StepGoal::Confirm);
        assert!(step.allows_reagent("anything"));
    }

    #[test]
    fn goal_parses_tagged_variants() {
        let goal: StepGoal = serde_json::from_value(json!({
            "type": "targets",
            "values": {"ph": 7.0, "moles:hcl": 0.0}
        }))
        .unwrap();
        let StepGoal::Targets { values, tolerance } = goal else {
            panic!("expected targets goal");
        };
        assert_eq!(values.get(&VariableKey::Ph), Some(&7.0));
        assert_eq!(tolerance, 0.01);

        let goal: StepGoal = serde_json::from_value(json!({"type": "target_ph", "ph": 7.0})).unwrap();
        assert_eq!(goal, StepGoal::TargetPh { ph: 7.0 });
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let step = ExperimentStep::new(1, "Titrate").with_allowed_reagents(["HCl", "NaOH"]);
        assert!(step.allows_reagent("hcl"));
        assert!(!step.allows_reagent("bleach"));
    }

    #[test]
    fn definition_rejects_empty_and_misnumbered_steps() {
        let empty = ExperimentDefinition::new("empty", Subject::Physics, vec![]);
        assert!(matches!(
            empty.validate(),
            Err(ValidationError::EmptyStepSequence { .. })
        ));

        let gap = ExperimentDefinition::new(
            "gap",
            Subject::Physics,
            vec![ExperimentStep::new(1, "a"), ExperimentStep::new(3, "b")],
        );
        assert!(matches!(
            gap.validate(),
            Err(ValidationError::StepOutOfOrder { position: 1, found: 3, .. })
        ));
    }

    #[test]
    fn definition_rejects_out_of_range_difficulty() {
        let def = ExperimentDefinition::new("d", Subject::Biology, vec![ExperimentStep::new(1, "a")])
            .with_difficulty(0);
        assert!(def.validate().is_err());
    }

    #[test]
    fn definition_from_json() {
        let def = ExperimentDefinition::from_json(
            r#"{
                "name": "Ohm's law",
                "subject": "physics",
                "difficulty": 2,
                "steps": [
                    {"step_number": 1, "instructions": "Set 12 V", "safety_notes": ["Avoid shock"]},
                    {"step_number": 2, "instructions": "Measure", "goal": {"type": "match_current"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(def.subject, Subject::Physics);
        assert_eq!(def.total_steps(), 2);
        assert_eq!(def.steps[1].goal, StepGoal::MatchCurrent);
    }
}
