//! The experiment state machine.
//!
//! The orchestrator is the single writer of [`SimulationState`]. Each
//! submitted action runs through the Safety Checker, then the subject
//! engine's `validate` and `update`, and the resulting snapshot is adopted
//! with one pointer swap so readers holding a [`StateHandle`] never see a
//! half-applied update.
//!
//! ```text
//! NotStarted --start--> Running <--pause/resume--> Paused
//!                          |
//!                   final step met
//!                          v
//!                       Complete
//! ```

mod events;

pub use events::{EventStream, LabEvent};

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::{self, Achievement, NoHistory, SessionHistory, SessionSummary};
use crate::action::{ActionInput, ActionKind, UserAction};
use crate::clock::{Clock, SystemClock};
use crate::config::LabConfig;
use crate::engine::{Engine, ExperimentEngine};
use crate::error::{ExecutionError, LabResult};
use crate::safety::SafetyChecker;
use crate::scoring::{self, ScoreBreakdown, SessionMetrics};
use crate::state::{Measurement, SimulationState};
use crate::step::{ExperimentDefinition, ExperimentStep};
use crate::validation::ValidationResult;

use events::EventBus;

const LOG_TARGET: &str = "labsim::orchestrator";

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created or reset; waiting for `start`.
    NotStarted,
    /// Accepting actions.
    Running,
    /// Frozen until `resume`.
    Paused,
    /// Every step done.
    Complete,
}

impl RunStatus {
    /// Actions are only accepted while running.
    #[must_use]
    pub const fn accepts_actions(self) -> bool {
        matches!(self, Self::Running)
    }

    /// No further transitions except reset.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Complete => "complete",
        })
    }
}

/// Shared read access to the latest published snapshot.
///
/// Cloning the handle is cheap; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct StateHandle {
    current: Arc<RwLock<Arc<SimulationState>>>,
}

impl StateHandle {
    fn new(state: SimulationState) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// The latest snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<SimulationState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, state: Arc<SimulationState>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// End-of-session report handed to assessment and persistence layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Total after bonuses and penalties.
    pub final_score: f64,
    /// Itemized score.
    pub breakdown: ScoreBreakdown,
    /// Time from start to completion (s).
    pub completion_secs: f64,
    /// Every measurement recorded in the run.
    pub measurements: Vec<Measurement>,
    /// Achievements unlocked by this run.
    pub achievements: Vec<Achievement>,
    /// Attempt and streak counters.
    pub metrics: SessionMetrics,
    /// Closing message for the learner.
    pub feedback: String,
}

/// Drives one experiment run.
pub struct Orchestrator {
    definition: ExperimentDefinition,
    config: LabConfig,
    engine: Engine,
    safety: SafetyChecker,
    status: RunStatus,
    state: StateHandle,
    /// Snapshots preceding each valid action of the current step.
    undo_stack: Vec<Arc<SimulationState>>,
    undo_used: bool,
    metrics: SessionMetrics,
    hints_given: usize,
    clock: Arc<dyn Clock>,
    history: Arc<dyn SessionHistory>,
    events: EventBus,
    result: Option<SessionResult>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("experiment", &self.definition.name)
            .field("subject", &self.definition.subject)
            .field("status", &self.status)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Loads `definition` under `config`.
    ///
    /// # Errors
    ///
    /// Rejects an invalid config, an invalid step sequence, or a step goal
    /// the subject's engine cannot evaluate.
    pub fn new(definition: ExperimentDefinition, config: LabConfig) -> LabResult<Self> {
        config.validate()?;
        definition.validate()?;
        let engine = Engine::for_subject(definition.subject, &config);
        engine.check_steps(&definition.steps)?;

        let state = StateHandle::new(SimulationState::new(definition.total_steps()));
        log::info!(
            target: LOG_TARGET,
            "loaded '{}' ({}, {} steps, difficulty {})",
            definition.name,
            definition.subject,
            definition.total_steps(),
            definition.difficulty
        );

        Ok(Self {
            safety: SafetyChecker::new(config.safety.clone()),
            definition,
            config,
            engine,
            status: RunStatus::NotStarted,
            state,
            undo_stack: Vec::new(),
            undo_used: false,
            metrics: SessionMetrics::default(),
            hints_given: 0,
            clock: Arc::new(SystemClock),
            history: Arc::new(NoHistory),
            events: EventBus::default(),
            result: None,
        })
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Supplies cross-session history for achievement rules.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn SessionHistory>) -> Self {
        self.history = history;
        self
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// The experiment being run.
    #[must_use]
    pub fn definition(&self) -> &ExperimentDefinition {
        &self.definition
    }

    /// Counters so far.
    #[must_use]
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SimulationState> {
        self.state.load()
    }

    /// A read handle that stays current across updates.
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// The active step, or `None` once complete.
    #[must_use]
    pub fn current_step(&self) -> Option<&ExperimentStep> {
        let index = self.state.load().current_step as usize;
        self.definition.steps.get(index)
    }

    /// Final report, available once the run is complete.
    #[must_use]
    pub fn session_result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// Subscribes to lifecycle and pipeline events.
    pub fn subscribe(&mut self, capacity: usize) -> EventStream {
        self.events.subscribe(capacity)
    }

    /// Live subscribers, as of the last publish.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.len()
    }

    /// NotStarted → Running.
    pub fn start(&mut self) -> LabResult<()> {
        self.require(RunStatus::NotStarted, "start")?;
        let mut next = (*self.state.load()).clone();
        next.start_time = Some(self.clock.now());
        self.state.store(Arc::new(next));
        self.transition(RunStatus::Running);
        Ok(())
    }

    /// Running → Paused.
    pub fn pause(&mut self) -> LabResult<()> {
        self.require(RunStatus::Running, "pause")?;
        self.transition(RunStatus::Paused);
        Ok(())
    }

    /// Paused → Running.
    pub fn resume(&mut self) -> LabResult<()> {
        self.require(RunStatus::Paused, "resume")?;
        self.transition(RunStatus::Running);
        Ok(())
    }

    /// Discards the run and returns to a fresh, not-started state.
    pub fn reset(&mut self) {
        self.state
            .store(Arc::new(SimulationState::new(self.definition.total_steps())));
        self.undo_stack.clear();
        self.undo_used = false;
        self.metrics = SessionMetrics::default();
        self.hints_given = 0;
        self.result = None;
        log::info!(target: LOG_TARGET, "reset '{}'", self.definition.name);
        if self.status != RunStatus::NotStarted {
            self.transition(RunStatus::NotStarted);
        }
    }

    /// Restores the snapshot preceding the last valid action of this step.
    ///
    /// The action log is append-only, so the restored snapshot keeps every
    /// action logged so far plus the undo itself.
    ///
    /// # Errors
    ///
    /// Fails when not running or when the current step has nothing to undo.
    pub fn undo(&mut self) -> LabResult<()> {
        self.require(RunStatus::Running, "undo")?;
        let current = self.state.load();
        let action = UserAction::record(ActionInput::bare("undo"), current.current_step, self.clock.now());
        self.apply_undo(&current, action).map(|_| ())
    }

    /// Reveals the next unused hint of the active step.
    ///
    /// Returns `None` when the step has no hints left; only revealed hints
    /// count toward the hint penalty.
    pub fn use_hint(&mut self) -> LabResult<Option<String>> {
        self.require(RunStatus::Running, "use a hint")?;
        let hint = self
            .current_step()
            .and_then(|step| step.hints.get(self.hints_given))
            .cloned();
        if hint.is_some() {
            self.hints_given += 1;
            self.metrics.hints_used += 1;
            log::debug!(target: LOG_TARGET, "hint {} revealed", self.metrics.hints_used);
        }
        Ok(hint)
    }

    /// Runs one action through the pipeline.
    ///
    /// Never fails: every outcome, including malformed payloads, comes back
    /// as a [`ValidationResult`].
    pub fn submit(&mut self, input: ActionInput) -> ValidationResult {
        if !self.status.accepts_actions() {
            let feedback = match self.status {
                RunStatus::Paused => "Simulation paused",
                RunStatus::NotStarted => "Simulation has not started",
                RunStatus::Complete | RunStatus::Running => "Simulation is complete",
            };
            log::debug!(target: LOG_TARGET, "rejected '{}': {feedback}", input.kind);
            return ValidationResult::reject(feedback);
        }

        let current = self.state.load();
        let action = UserAction::record(input, current.current_step, self.clock.now());

        let Some(kind) = action.action_kind() else {
            let verdict = ValidationResult::reject(format!("Unknown action type '{}'", action.kind));
            self.log_invalid(&current, action);
            return verdict;
        };
        if kind == ActionKind::Undo {
            return match self.apply_undo(&current, action.clone()) {
                Ok(verdict) => verdict,
                Err(err) => {
                    self.log_invalid(&current, action);
                    ValidationResult::reject(err.to_string())
                }
            };
        }

        // Running implies an active step.
        let Some(step) = self.definition.steps.get(current.current_step as usize) else {
            return ValidationResult::reject("Simulation is complete");
        };

        let safety = self.safety.check(&action, step, &current);
        if !safety.is_valid {
            self.log_invalid(&current, action);
            return safety;
        }
        let verdict = self.engine.validate(&action, &current, step);
        if !verdict.is_valid {
            self.log_invalid(&current, action);
            return verdict;
        }

        let mut next = self.engine.update(&action, &current, step);
        let completion = self.engine.completion(&action, &next, step);
        let action_id = action.id;
        let kind_tag = action.kind.clone();
        next.user_actions.push(action.with_validity(true));
        self.metrics.record(true);

        let verdict = match completion {
            Some(next_step) => {
                let points = self.config.scoring.points_per_step;
                next.score += points;
                next.current_step = next_step;
                self.undo_stack.clear();
                self.hints_given = 0;
                verdict.with_next_step(next_step).with_score_delta(points)
            }
            None => {
                self.undo_stack.push(Arc::clone(&current));
                verdict
            }
        };

        let finished = next.current_step >= next.total_steps;
        if finished {
            next.is_complete = true;
            next.end_time = Some(self.clock.now());
        }
        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));

        log::debug!(target: LOG_TARGET, "accepted '{kind_tag}' in step {}", current.current_step + 1);
        self.events.publish(&LabEvent::ActionProcessed {
            action_id,
            kind: kind_tag,
            is_valid: true,
            step: current.current_step,
        });
        if let Some(next_step) = completion {
            log::info!(target: LOG_TARGET, "step {} complete", current.current_step + 1);
            self.events.publish(&LabEvent::StepAdvanced {
                from: current.current_step,
                to: next_step,
            });
        }
        if finished {
            self.complete(&next);
        }
        verdict
    }

    fn require(&self, expected: RunStatus, operation: &'static str) -> LabResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(ExecutionError::InvalidTransition {
                operation,
                status: self.status,
            }
            .into())
        }
    }

    fn transition(&mut self, to: RunStatus) {
        let from = self.status;
        self.status = to;
        log::info!(target: LOG_TARGET, "{from} -> {to}");
        self.events.publish(&LabEvent::StatusChanged { from, to });
    }

    /// Appends a rejected action to the audit trail; nothing else changes.
    fn log_invalid(&mut self, current: &SimulationState, action: UserAction) {
        let mut next = current.clone();
        let action = action.with_validity(false);
        let event = LabEvent::ActionProcessed {
            action_id: action.id,
            kind: action.kind.clone(),
            is_valid: false,
            step: action.step_number,
        };
        log::debug!(target: LOG_TARGET, "rejected '{}' in step {}", action.kind, action.step_number + 1);
        next.user_actions.push(action);
        self.state.store(Arc::new(next));
        self.metrics.record(false);
        self.events.publish(&event);
    }

    fn apply_undo(&mut self, current: &SimulationState, action: UserAction) -> LabResult<ValidationResult> {
        let previous = self.undo_stack.pop().ok_or(ExecutionError::NothingToUndo)?;
        let mut restored = (*previous).clone();
        restored.user_actions.clone_from(&current.user_actions);
        let action = action.with_validity(true);
        let event = LabEvent::ActionProcessed {
            action_id: action.id,
            kind: action.kind.clone(),
            is_valid: true,
            step: action.step_number,
        };
        restored.user_actions.push(action);
        self.state.store(Arc::new(restored));
        self.undo_used = true;
        log::debug!(target: LOG_TARGET, "undo in step {}", current.current_step + 1);
        self.events.publish(&event);
        Ok(ValidationResult::ok("Last action undone"))
    }

    fn complete(&mut self, state: &SimulationState) {
        let now: DateTime<Utc> = self.clock.now();
        let completion_secs = state.elapsed_secs(now);
        let breakdown = scoring::final_score(
            state.score,
            completion_secs,
            &self.metrics,
            self.definition.difficulty,
            &self.config.scoring,
        );
        if breakdown.hint_penalty_overflowed() {
            log::warn!(
                target: LOG_TARGET,
                "{} hints pushed the score multiplier to {:.2}; clamped to 0",
                self.metrics.hints_used,
                breakdown.hint_multiplier
            );
        }
        let summary = SessionSummary {
            subject: self.definition.subject,
            metrics: &self.metrics,
            score: &breakdown,
            completion_secs,
            no_undo: !self.undo_used,
        };
        let achievements = achievements::evaluate(&summary, self.history.as_ref());
        let feedback = format!(
            "Completed '{}' in {:.0}s with {:.0}% accuracy",
            self.definition.name,
            completion_secs,
            self.metrics.accuracy() * 100.0
        );

        self.result = Some(SessionResult {
            final_score: breakdown.total,
            breakdown,
            completion_secs,
            measurements: state.measurements.clone(),
            achievements,
            metrics: self.metrics,
            feedback,
        });
        self.transition(RunStatus::Complete);
        log::info!(target: LOG_TARGET, "'{}' scored {:.1}", self.definition.name, breakdown.total);
        self.events.publish(&LabEvent::Completed {
            final_score: breakdown.total,
        });
    }
}
