use bindflow_client::{AdsorbateVariant, CancelFlag, Generation, PollOptions};
use bindflow_core::config::Config;
use bindflow_core::model::{Layout, RunRequest, Stage};
use bindflow_client::ClientError;
use bindflow_core::model::TaskState;
use bindflow_runner::controller::{StageController, TaskOutcome};
use bindflow_runner::error::CliError;
use bindflow_runner::execute;
use bindflow_runner::prober::Prober;
use bindflow_runner::retry::RetryPolicy;
use bindflow_runner::task_runner::TaskRunner;
use bindflow_test_utils::mock::{Call, MockCollaborators, MockScheduler, Outcome};
use std::fs;
use std::time::Duration;

struct Workspace {
    _dir: tempfile::TempDir,
    layout: Layout,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Support");
    fs::create_dir(&root).unwrap();
    Workspace {
        layout: Layout::new(root).unwrap(),
        _dir: dir,
    }
}

fn poll() -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(1),
        timeout: None,
    }
}

fn run(
    ws: &Workspace,
    request: &RunRequest,
    scheduler: &MockScheduler,
    collaborators: &MockCollaborators,
) -> Result<(), CliError> {
    execute(
        request,
        &ws.layout,
        &Config::default(),
        scheduler,
        collaborators,
        poll(),
        CancelFlag::new(),
    )
}

/// Runs the stages directly so the per-task report can be inspected.
fn run_with_report(
    ws: &Workspace,
    request: &RunRequest,
    scheduler: &MockScheduler,
    collaborators: &MockCollaborators,
) -> (Result<(), CliError>, Vec<TaskOutcome>) {
    let config = Config::default();
    let prober = Prober::new(
        scheduler,
        collaborators,
        config.pipeline.output_log.clone(),
        config.pipeline.success_marker.clone(),
    );
    let runner = TaskRunner::new(
        scheduler,
        collaborators,
        prober,
        RetryPolicy::new(config.pipeline.recovery_rounds),
    );
    let mut controller = StageController::new(
        runner,
        scheduler,
        collaborators,
        &ws.layout,
        request,
        config.pipeline.top_layers,
        poll(),
        CancelFlag::new(),
    );
    let result = controller.run();
    (result, controller.into_report())
}

/// Leaves `O` failed on disk the way an interrupted earlier invocation would:
/// the slab succeeded and both attempts at `O` failed.
fn leave_adsorbate_failed(ws: &Workspace) {
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    s.script(
        &ws.layout.adsorbate_dir("O", "Pt"),
        [Outcome::Failure, Outcome::Failure],
    );
    let err = run(ws, &request, &s, &c).unwrap_err();
    assert!(matches!(err, CliError::StageFailed { stage: Stage::AdsorbateRelax, .. }));
}

fn stage_generations(collaborators: &MockCollaborators, variant: AdsorbateVariant) -> usize {
    collaborators
        .calls()
        .iter()
        .filter(|c| {
            matches!(c, Call::Generate(_, Generation::Adsorbate { variant: v, .. }) if *v == variant)
        })
        .count()
}

#[test]
fn neutral_run_skips_charged_stage_and_uses_plain_aggregation() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());

    run(&ws, &request, &s, &c).unwrap();

    assert_eq!(stage_generations(&c, AdsorbateVariant::Far), 0);
    assert_eq!(stage_generations(&c, AdsorbateVariant::Plain), 2);
    assert!(!ws.layout.far_dir("O", "Pt").exists());
    assert_eq!(
        c.aggregations(),
        vec![
            ("Pt".to_string(), "O".to_string(), AdsorbateVariant::Plain),
            ("Pt".to_string(), "OH".to_string(), AdsorbateVariant::Plain),
        ]
    );
    // slab + 2 adsorbates + 2 thermal
    assert_eq!(s.submissions().len(), 5);
}

#[test]
fn charged_run_relaxes_far_variant_after_plain_stage() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "OOH", "1", "-1").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());

    run(&ws, &request, &s, &c).unwrap();

    let plain = ws.layout.adsorbate_dir("OOH", "Pt");
    let far = ws.layout.far_dir("OOH", "Pt");
    let order = s.submissions();
    let plain_at = order.iter().position(|d| *d == plain).unwrap();
    let far_at = order.iter().position(|d| *d == far).unwrap();
    assert!(plain_at < far_at);
    assert_eq!(s.submission_count(&far), 1);
    assert_eq!(
        c.aggregations(),
        vec![("Pt".to_string(), "OOH".to_string(), AdsorbateVariant::Far)]
    );
}

#[test]
fn stages_fan_out_before_waiting() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH,OOH", "1", "0").unwrap();
    let s = MockScheduler::with_queue_polls(2);
    let c = MockCollaborators::new();

    run(&ws, &request, &s, &c).unwrap();

    // Every adsorbate job is submitted before the first one is polled.
    assert_eq!(s.submissions().len(), 7);
    for id in ["1002", "1003", "1004"] {
        assert_eq!(s.submitted_before_first_query(id), Some(4));
    }
    for ads in ["O", "OH", "OOH"] {
        assert_eq!(s.submission_count(&ws.layout.adsorbate_dir(ads, "Pt")), 1);
    }
}

#[test]
fn rerun_after_success_submits_nothing() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    run(&ws, &request, &s, &c).unwrap();

    let (s2, c2) = (MockScheduler::new(), MockCollaborators::new());
    run(&ws, &request, &s2, &c2).unwrap();

    assert!(s2.submissions().is_empty());
    assert!(c2.generated().is_empty());
    assert_eq!(c2.aggregations().len(), 2);
}

#[test]
fn running_job_from_previous_invocation_is_awaited_not_resubmitted() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let slab = ws.layout.slab_dir("Pt");
    s.preload_running(&slab, "77", 3);
    fs::write(slab.join("OUTCAR"), bindflow_test_utils::SUCCESS_LOG).unwrap();

    run(&ws, &request, &s, &c).unwrap();

    assert_eq!(s.submission_count(&slab), 0);
    assert!(s.queries().iter().filter(|h| h.0 == "77").count() >= 3);
}

#[test]
fn failed_task_is_recovered_once_and_run_completes() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let oh = ws.layout.adsorbate_dir("OH", "Pt");
    s.script(&oh, [Outcome::Failure, Outcome::Success]);

    run(&ws, &request, &s, &c).unwrap();

    assert_eq!(s.submission_count(&oh), 2);
    assert_eq!(
        c.calls()
            .iter()
            .filter(|call| matches!(call, Call::Archive(_)))
            .collect::<Vec<_>>(),
        vec![&Call::Archive(oh.clone())]
    );
    assert!(oh.join("OUTCAR.1").is_file());
}

#[test]
fn second_failure_is_fatal_without_third_attempt() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let slab = ws.layout.slab_dir("Pt");
    s.script(&slab, [Outcome::Failure, Outcome::Failure, Outcome::Success]);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    assert!(matches!(err, CliError::StageFailed { stage: Stage::SlabRelax, .. }));
    assert_eq!(s.submission_count(&slab), 2);
    assert!(c.aggregations().is_empty());
    assert!(!ws.layout.adsorbate_dir("O", "Pt").exists());
}

#[test]
fn failed_recovery_submission_spares_siblings_then_fails_stage() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let o = ws.layout.adsorbate_dir("O", "Pt");
    let oh = ws.layout.adsorbate_dir("OH", "Pt");
    s.script(&o, [Outcome::Failure, Outcome::Rejected]);
    s.script(&oh, [Outcome::Failure, Outcome::Success]);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    match err {
        CliError::StageFailed { stage, unfinished } => {
            assert_eq!(stage, Stage::AdsorbateRelax);
            assert_eq!(unfinished.len(), 1);
            assert_eq!(unfinished[0].0.work_dir, o);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(s.submission_count(&oh), 2);
}

#[test]
fn archive_failure_aborts_run() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let slab = ws.layout.slab_dir("Pt");
    s.script(&slab, [Outcome::Failure]);
    c.fail_archive(&slab);

    let err = run(&ws, &request, &s, &c).unwrap_err();
    assert!(matches!(err, CliError::RecoveryFailure { .. }));
    assert_eq!(s.submission_count(&slab), 1);
}

#[test]
fn thermal_mismatch_aborts_before_submission() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    c.set_thermal_atoms(3);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    assert!(matches!(err, CliError::StructuralMismatch { .. }));
    assert_eq!(s.submission_count(&ws.layout.thermal_dir("O", "Pt")), 0);
    assert!(c.aggregations().is_empty());
}

#[test]
fn energies_are_extracted_per_stage() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "-1").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());

    run(&ws, &request, &s, &c).unwrap();

    let calls = c.calls();
    assert!(calls.contains(&Call::ExtractEnergy(ws.layout.slab_dir("Pt"))));
    assert!(calls.contains(&Call::ExtractEnergy(ws.layout.adsorbate_dir("O", "Pt"))));
    assert!(!calls.contains(&Call::ExtractEnergy(ws.layout.far_dir("O", "Pt"))));
    assert!(calls.contains(&Call::ExtractFreeEnergy(ws.layout.thermal_dir("O", "Pt"))));
}

#[test]
fn job_that_left_no_log_is_resubmitted_in_recovery_round() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let slab = ws.layout.slab_dir("Pt");
    s.script(&slab, [Outcome::NoLog]);

    run(&ws, &request, &s, &c).unwrap();

    assert_eq!(s.submission_count(&slab), 2);
    assert!(!c.calls().contains(&Call::Archive(slab)));
}

#[test]
fn rerun_recovers_task_left_failed_by_earlier_invocation() {
    let ws = workspace();
    leave_adsorbate_failed(&ws);
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let o = ws.layout.adsorbate_dir("O", "Pt");

    run(&ws, &request, &s, &c).unwrap();

    assert_eq!(s.submission_count(&ws.layout.slab_dir("Pt")), 0);
    assert_eq!(s.submission_count(&o), 1);
    assert_eq!(
        c.calls()
            .iter()
            .filter(|call| matches!(call, Call::Archive(_)))
            .collect::<Vec<_>>(),
        vec![&Call::Archive(o.clone())]
    );
    assert!(o.join("OUTCAR.2").is_file());
    assert!(c.generated().iter().all(|d| *d != o));
}

#[test]
fn rerun_stops_when_recovered_task_fails_again() {
    let ws = workspace();
    leave_adsorbate_failed(&ws);
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let o = ws.layout.adsorbate_dir("O", "Pt");
    s.script(&o, [Outcome::Failure, Outcome::Success]);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    assert!(matches!(err, CliError::RetryBudgetExhausted(ref t) if t.contains('O')));
    assert_eq!(s.submission_count(&o), 1);
    assert!(c.aggregations().is_empty());
    assert!(!ws.layout.thermal_dir("O", "Pt").exists());
}

#[test]
fn rejected_resubmission_on_rerun_spares_new_siblings() {
    let ws = workspace();
    leave_adsorbate_failed(&ws);
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let o = ws.layout.adsorbate_dir("O", "Pt");
    let oh = ws.layout.adsorbate_dir("OH", "Pt");
    s.script(&o, [Outcome::Rejected, Outcome::Rejected]);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    match err {
        CliError::StageFailed { stage, unfinished } => {
            assert_eq!(stage, Stage::AdsorbateRelax);
            assert_eq!(unfinished.len(), 1);
            assert_eq!(unfinished[0].0.work_dir, o);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(s.submission_count(&oh), 1);
    assert_eq!(s.submission_count(&o), 0);
}

#[test]
fn failed_energy_extraction_stops_run() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let slab = ws.layout.slab_dir("Pt");
    c.fail_extraction(&slab);

    let err = run(&ws, &request, &s, &c).unwrap_err();

    assert!(matches!(
        err,
        CliError::Client(ClientError::CollaboratorFailed { .. })
    ));
    assert!(!ws.layout.adsorbate_dir("O", "Pt").exists());
    assert!(c.aggregations().is_empty());
}

#[test]
fn report_covers_stage_that_stopped_early() {
    let ws = workspace();
    let request = RunRequest::parse("Pt", "O,OH", "1", "0").unwrap();
    let (s, c) = (MockScheduler::new(), MockCollaborators::new());
    let oh = ws.layout.adsorbate_dir("OH", "Pt");
    c.fail_generation(&oh);

    let (result, report) = run_with_report(&ws, &request, &s, &c);

    assert!(matches!(
        result,
        Err(CliError::Client(ClientError::GenerationFailure { .. }))
    ));
    let rows: Vec<(Stage, &str, &TaskState)> = report
        .iter()
        .map(|o| (o.task.stage, o.task.subject.as_str(), &o.state))
        .collect();
    assert_eq!(
        rows,
        vec![
            (Stage::SlabRelax, "Pt", &TaskState::Succeeded),
            (Stage::AdsorbateRelax, "O", &TaskState::Succeeded),
            (Stage::AdsorbateRelax, "OH", &TaskState::Absent),
        ]
    );
}
