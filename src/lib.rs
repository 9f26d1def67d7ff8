//! # labsim - Virtual Laboratory Simulation Kernel
//!
//! labsim runs step-by-step science experiments (physics, chemistry,
//! biology). A learner submits actions; each one is screened for hazards,
//! checked against the subject's domain rules, and applied with closed-form
//! formulas to produce the next immutable snapshot of the run.
//!
//! ## Core Concepts
//!
//! - **SimulationState**: the authoritative snapshot of one run
//! - **UserAction**: one recorded attempt by the learner
//! - **SafetyChecker**: hazard detection independent of domain correctness
//! - **Engine**: the physics, chemistry or biology validator and updater
//! - **Orchestrator**: the state machine sequencing checker, engine and scoring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use labsim::{ActionInput, ExperimentDefinition, ExperimentStep, LabConfig, Orchestrator, Subject};
//! use serde_json::json;
//!
//! let definition = ExperimentDefinition::new(
//!     "Ohm's law",
//!     Subject::Physics,
//!     vec![ExperimentStep::new(1, "Set the supply to 12 V")],
//! );
//! let mut lab = Orchestrator::new(definition, LabConfig::default())?;
//! lab.start()?;
//! let verdict = lab.submit(ActionInput::new("set_voltage", json!({ "voltage": 12.0 })));
//! assert!(verdict.is_valid);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

// Core types
pub mod action;
pub mod error;
pub mod state;
pub mod step;
pub mod validation;
pub mod value;
pub mod variables;

// Domain rules
pub mod config;
pub mod engine;
pub mod reagents;
pub mod safety;

// Run lifecycle
pub mod achievements;
pub mod clock;
pub mod export;
pub mod orchestrator;
pub mod scoring;

// Re-export primary types at crate root for convenience
pub use achievements::{Achievement, Milestone, NoHistory, SessionHistory};
pub use action::{ActionId, ActionInput, ActionKind, UserAction};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LabConfig;
pub use engine::{Engine, ExperimentEngine};
pub use error::{ExecutionError, LabError, LabResult, ValidationError};
pub use export::MeasurementRecord;
pub use orchestrator::{EventStream, LabEvent, Orchestrator, RunStatus, SessionResult, StateHandle};
pub use safety::{Hazard, SafetyChecker};
pub use scoring::{ScoreBreakdown, SessionMetrics};
pub use state::{Measurement, SimulationState};
pub use step::{ExperimentDefinition, ExperimentStep, StepGoal, Subject};
pub use validation::ValidationResult;
pub use value::VariableValue;
pub use variables::{VariableKey, Variables};
