use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::json;

use labsim::{
    export, ActionInput, ExperimentDefinition, ExperimentStep, LabConfig, LabEvent, ManualClock,
    Orchestrator, RunStatus, StepGoal, Subject, VariableKey,
};

const TITRATION: &str = r#"{
    "name": "Acid-base titration",
    "subject": "chemistry",
    "difficulty": 2,
    "steps": [
        {
            "step_number": 1,
            "instructions": "Add 50 mL of 0.5 M HCl to the flask",
            "safety_notes": ["Wear goggles when handling HCl"],
            "expected_results": "Flask holds acidic solution",
            "allowed_reagents": ["HCl"],
            "goal": { "type": "targets", "values": { "solution_volume": 0.05 }, "tolerance": 0.0001 }
        },
        {
            "step_number": 2,
            "instructions": "Titrate with 0.5 M NaOH until neutral",
            "allowed_reagents": ["NaOH"],
            "hints": ["Equal moles of acid and base neutralize"],
            "goal": { "type": "target_ph", "ph": 7.0 }
        }
    ]
}"#;

fn add(reagent: &str, volume_ml: f64, concentration: f64) -> ActionInput {
    ActionInput::new(
        "add_reagent",
        json!({ "reagent": reagent, "volume_ml": volume_ml, "concentration": concentration }),
    )
}

fn start(definition: ExperimentDefinition) -> (Orchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let mut lab = Orchestrator::new(definition, LabConfig::default())
        .unwrap()
        .with_clock(clock.clone());
    lab.start().unwrap();
    (lab, clock)
}

#[test]
fn safety_note_naming_a_reagent_blocks_it() {
    let definition = ExperimentDefinition::from_json(TITRATION).unwrap();
    assert_eq!(definition.difficulty, 2);
    assert_eq!(definition.steps[1].goal, StepGoal::TargetPh { ph: 7.0 });
    let (mut lab, _) = start(definition);

    // HCl is named in the step's safety note, so adding it is refused.
    let refused = lab.submit(add("HCl", 50.0, 0.5));
    assert!(!refused.is_valid);
    assert!(refused.safety_warning.as_deref().unwrap().contains("goggles"));
    assert_eq!(lab.snapshot().variables.number(&VariableKey::SolutionVolume), None);
}

#[test]
fn titration_reaches_neutral_ph() {
    let definition = ExperimentDefinition::new(
        "Titration",
        Subject::Chemistry,
        vec![
            ExperimentStep::new(1, "Add the acid")
                .with_allowed_reagents(["HCl"])
                .with_goal(StepGoal::Targets {
                    values: [(VariableKey::SolutionVolume, 0.05)].into_iter().collect(),
                    tolerance: 1e-4,
                }),
            ExperimentStep::new(2, "Titrate to neutral")
                .with_allowed_reagents(["NaOH"])
                .with_goal(StepGoal::TargetPh { ph: 7.0 }),
        ],
    )
    .with_difficulty(2);
    let (mut lab, clock) = start(definition);

    let r = lab.submit(add("NaOH", 10.0, 0.5));
    assert!(!r.is_valid, "NaOH is not allowed in step 1");

    let r = lab.submit(add("HCl", 50.0, 0.5));
    assert_eq!(r.next_step, Some(1));

    let r = lab.submit(add("NaOH", 30.0, 0.5));
    assert!(r.is_valid);
    assert_eq!(r.next_step, None);
    let ph = lab.snapshot().variables.number(&VariableKey::Ph).unwrap();
    assert!(ph < 7.0);

    clock.advance_secs(150);
    let r = lab.submit(add("NaOH", 20.0, 0.5));
    assert_eq!(r.next_step, Some(2));

    let state = lab.snapshot();
    assert!(state.is_complete);
    assert_eq!(state.variables.number(&VariableKey::Ph), Some(7.0));
    assert!((state.variables.number(&VariableKey::SaltMoles).unwrap() - 0.025).abs() < 1e-12);
    assert_eq!(lab.status(), RunStatus::Complete);

    let result = lab.session_result().unwrap();
    assert!((result.breakdown.difficulty_multiplier - 1.2).abs() < 1e-12);
    assert_eq!(result.completion_secs, 150.0);
}

#[test]
fn bleach_after_ammonia_is_always_refused() {
    let definition = ExperimentDefinition::new(
        "Household chemicals",
        Subject::Chemistry,
        vec![ExperimentStep::new(1, "Prepare cleaning solutions")],
    );
    let (mut lab, _) = start(definition);

    assert!(lab.submit(add("ammonia", 20.0, 0.5)).is_valid);
    let before = lab.snapshot();

    let r = lab.submit(add("bleach", 20.0, 0.5));
    assert!(!r.is_valid);
    assert!(r.safety_warning.is_some());

    let after = lab.snapshot();
    assert_eq!(after.variables, before.variables);
    assert_eq!(after.user_actions.len(), before.user_actions.len() + 1);
    assert!(!after.user_actions.last().unwrap().is_valid);
}

#[test]
fn bleach_after_neutralized_ammonia_is_refused() {
    let definition = ExperimentDefinition::new(
        "Household chemicals",
        Subject::Chemistry,
        vec![ExperimentStep::new(1, "Neutralize, then clean")],
    );
    let (mut lab, _) = start(definition);

    assert!(lab.submit(add("ammonia", 20.0, 0.5)).is_valid);
    assert!(lab.submit(add("HCl", 20.0, 0.5)).is_valid);
    let vars = &lab.snapshot().variables;
    assert_eq!(vars.number(&VariableKey::concentration("ammonia")), Some(0.0));
    assert_eq!(vars.number(&VariableKey::concentration("hcl")), Some(0.0));

    let r = lab.submit(add("bleach", 20.0, 0.5));
    assert!(!r.is_valid);
    assert!(r.safety_warning.unwrap().contains("chloramine"));
}

#[test]
fn overfilling_the_vessel_changes_nothing() {
    let definition = ExperimentDefinition::new("Dilution", Subject::Chemistry, vec![ExperimentStep::new(1, "Fill")]);
    let (mut lab, _) = start(definition);
    assert!(lab.submit(add("water", 400.0, 0.0)).is_valid);
    assert!(lab
        .submit(ActionInput::new("measurement", json!({ "name": "volume", "value": 400, "unit": "mL" })))
        .is_valid);
    let before = lab.snapshot();

    let r = lab.submit(add("water", 200.0, 0.0));
    assert!(!r.is_valid);
    assert!(r.feedback.contains("capacity"));
    assert!(r.safety_warning.is_none());

    let after = lab.snapshot();
    assert_eq!(after.variables, before.variables);
    assert_eq!(after.measurements, before.measurements);
    assert_eq!(after.current_step, before.current_step);
    assert_eq!(after.user_actions.len(), before.user_actions.len() + 1);
    let logged = after.user_actions.last().unwrap();
    assert_eq!(logged.kind, "add_reagent");
    assert!(!logged.is_valid);
}

#[test]
fn releasing_before_setup_changes_nothing() {
    let definition = ExperimentDefinition::new(
        "Pendulum",
        Subject::Physics,
        vec![ExperimentStep::new(1, "Time the swings").with_goal(StepGoal::MatchPeriod)],
    );
    let (mut lab, _) = start(definition);
    assert!(lab
        .submit(ActionInput::new("measurement", json!({ "name": "string_length", "value": 1.0, "unit": "m" })))
        .is_valid);
    let before = lab.snapshot();

    let r = lab.submit(ActionInput::bare("release_pendulum"));
    assert!(!r.is_valid);
    assert!(r.feedback.contains("Set up the pendulum"));

    let after = lab.snapshot();
    assert_eq!(after.variables, before.variables);
    assert!(!after.variables.flag(&VariableKey::PendulumSwinging));
    assert_eq!(after.measurements, before.measurements);
    assert_eq!(after.user_actions.len(), before.user_actions.len() + 1);
    let logged = after.user_actions.last().unwrap();
    assert_eq!(logged.kind, "release_pendulum");
    assert!(!logged.is_valid);
}

#[test]
fn microscopy_then_ecosystem() {
    let definition = ExperimentDefinition::new(
        "Leaf cells and food webs",
        Subject::Biology,
        vec![
            ExperimentStep::new(1, "Find a chloroplast").with_goal(StepGoal::ObserveStructure {
                structure: "chloroplast".to_string(),
            }),
            ExperimentStep::new(2, "Keep the ecosystem balanced").with_goal(StepGoal::SustainEcosystem),
        ],
    );
    let (mut lab, _) = start(definition);

    assert!(lab.submit(ActionInput::new("set_magnification", json!({ "magnification": 400 }))).is_valid);
    assert!(!lab.submit(ActionInput::new("observe", json!({ "structure": "chloroplast" }))).is_valid);
    assert!(lab.submit(ActionInput::bare("focus_microscope")).is_valid);
    let r = lab.submit(ActionInput::new("observe", json!({ "structure": "chloroplast" })));
    assert_eq!(r.next_step, Some(1));

    lab.submit(ActionInput::new("set_population", json!({ "species": "rabbits", "count": 200 })));
    lab.submit(ActionInput::new("set_population", json!({ "species": "foxes", "count": 150 })));
    let mut advanced_at = None;
    for generation in 1..=5 {
        let r = lab.submit(ActionInput::bare("advance_ecosystem"));
        if r.next_step == Some(2) {
            advanced_at = Some(generation);
            break;
        }
    }
    assert_eq!(advanced_at, Some(3));
    assert!(lab.snapshot().is_complete);
}

#[test]
fn measurements_export_and_reimport() {
    let definition = ExperimentDefinition::new(
        "Pendulum",
        Subject::Physics,
        vec![ExperimentStep::new(1, "Time the swings").with_goal(StepGoal::MatchPeriod)],
    );
    let (mut lab, clock) = start(definition);
    lab.submit(ActionInput::new("set_pendulum", json!({ "length_cm": 100, "angle_deg": 10 })));
    lab.submit(ActionInput::bare("release_pendulum"));
    lab.submit(ActionInput::new("measurement", json!({ "name": "amplitude", "value": 10, "unit": "deg" })));
    clock.advance_secs(5);
    let r = lab.submit(ActionInput::new(
        "measurement",
        json!({ "name": "period", "value": 2.006, "unit": "s", "note": "average of 10" }),
    ));
    assert_eq!(r.next_step, Some(1));

    let measurements = &lab.session_result().unwrap().measurements;
    assert_eq!(measurements.len(), 2);
    let json = export::to_json(measurements).unwrap();
    assert_eq!(&export::from_json(&json).unwrap(), measurements);
}

#[test]
fn readers_never_see_torn_state() {
    let definition = ExperimentDefinition::new(
        "Circuit",
        Subject::Physics,
        (1..=20).map(|n| ExperimentStep::new(n, "Confirm")).collect(),
    );
    let (mut lab, _) = start(definition);
    let handle = lab.handle();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let done = done.clone();
        thread::spawn(move || {
            let mut observed = 0u32;
            while !done.load(Ordering::Acquire) {
                let s = handle.load();
                assert!(s.current_step <= s.total_steps);
                assert_eq!(s.is_complete, s.current_step == s.total_steps);
                assert!(s.score >= f64::from(observed) * 100.0);
                observed = s.current_step;
            }
        })
    };

    for _ in 0..20 {
        lab.submit(ActionInput::bare("confirm_step"));
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();
    assert!(lab.snapshot().is_complete);
}

#[test]
fn events_follow_the_lifecycle() {
    let definition = ExperimentDefinition::new("One step", Subject::Physics, vec![ExperimentStep::new(1, "Go")]);
    let mut lab = Orchestrator::new(definition, LabConfig::default()).unwrap();
    let events = lab.subscribe(16);
    lab.start().unwrap();
    lab.pause().unwrap();
    lab.resume().unwrap();
    lab.submit(ActionInput::bare("confirm_step"));

    let statuses: Vec<(RunStatus, RunStatus)> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            LabEvent::StatusChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            (RunStatus::NotStarted, RunStatus::Running),
            (RunStatus::Running, RunStatus::Paused),
            (RunStatus::Paused, RunStatus::Running),
            (RunStatus::Running, RunStatus::Complete),
        ]
    );
}

#[test]
fn config_from_toml_changes_limits() {
    let config = LabConfig::from_toml_str(
        r#"
        [physics]
        max_voltage_v = 24.0

        [scoring]
        points_per_step = 50.0
        "#,
    )
    .unwrap();
    let definition = ExperimentDefinition::new("Low voltage", Subject::Physics, vec![ExperimentStep::new(1, "Go")]);
    let mut lab = Orchestrator::new(definition, config).unwrap();
    lab.start().unwrap();
    assert!(!lab.submit(ActionInput::new("set_voltage", json!({ "voltage": 30 }))).is_valid);
    let r = lab.submit(ActionInput::bare("confirm_step"));
    assert_eq!(r.score_delta, Some(50.0));
}
