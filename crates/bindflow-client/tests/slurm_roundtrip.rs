use bindflow_client::{
    await_completion, CancelFlag, ClientError, Collaborators, Generation, JobScheduler,
    PollOptions, ProcessCollaborators, ProcessRunner, SlurmScheduler,
};
use bindflow_core::config::{CollaboratorConfig, PipelineConfig, SchedulerConfig};
use bindflow_core::model::{JobHandle, Layout, Stage};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Submission and collaborators change the process working directory.
static CWD_LOCK: Mutex<()> = Mutex::new(());

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

struct Cluster {
    _dir: tempfile::TempDir,
    layout: Layout,
    scheduler: SlurmScheduler,
    queue_file: std::path::PathBuf,
}

/// A fake queue backed by a text file: `squeue` prints it, the submitter appends to it.
fn cluster() -> Cluster {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let bin = base.join("bin");
    let root = base.join("work").join("Support");
    fs::create_dir_all(&bin).unwrap();
    fs::create_dir_all(&root).unwrap();
    let queue_file = base.join("queue");
    fs::write(&queue_file, "JOBID PARTITION NAME\n").unwrap();

    let submit = script(
        &bin,
        "sbatch-wrapper",
        &format!(
            "test -d \"$1\" || exit 3\necho 9001 >> {q}\n: > \"$1/slurm-9001.out\"\necho \"Submitted batch job 9001\"",
            q = queue_file.display()
        ),
    );
    let squeue = script(&bin, "squeue", &format!("cat {}", queue_file.display()));

    let scheduler_config = SchedulerConfig {
        submit_command: vec![submit],
        queue_command: vec![squeue, "-j".to_string()],
        ..Default::default()
    };
    let scheduler = SlurmScheduler::new(
        Arc::new(ProcessRunner),
        &scheduler_config,
        &PipelineConfig::default(),
    )
    .unwrap();

    Cluster {
        layout: Layout::new(root).unwrap(),
        scheduler,
        queue_file,
        _dir: dir,
    }
}

#[test]
fn submitted_job_is_active_until_it_leaves_the_queue() {
    let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let c = cluster();
    let task = c.layout.task(Stage::SlabRelax, "Pt", "Pt");
    fs::create_dir_all(&task.work_dir).unwrap();

    let handle = c.scheduler.submit(&task).unwrap();
    assert_eq!(handle, JobHandle::from("9001"));
    assert_eq!(c.scheduler.is_active(&task.work_dir), Some(handle.clone()));

    fs::write(&c.queue_file, "JOBID PARTITION NAME\n").unwrap();
    assert_eq!(c.scheduler.is_active(&task.work_dir), None);

    let options = PollOptions {
        interval: Duration::from_millis(1),
        timeout: Some(Duration::from_secs(5)),
    };
    await_completion(&c.scheduler, &handle, &options, &CancelFlag::new()).unwrap();
}

#[test]
fn submitter_failure_is_submission_failure() {
    let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let c = cluster();
    let task = c.layout.task(Stage::AdsorbateRelax, "Pt", "O");
    fs::create_dir_all(task.context_dir()).unwrap();

    let err = c.scheduler.submit(&task).unwrap_err();
    assert!(matches!(err, ClientError::SubmissionFailure { .. }));
}

#[test]
fn generated_adsorbate_directory_lands_next_to_support() {
    let _lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let c = cluster();
    let task = c.layout.task(Stage::AdsorbateRelax, "Pt", "OH");
    let config = CollaboratorConfig {
        adsorbate_generator: vec![
            "sh".to_string(),
            "-c".to_string(),
            "mkdir -p \"../$2/$1\" && echo \"$3 $4 $5\" > \"../$2/$1/args\"".to_string(),
            "gen".to_string(),
        ],
        ..Default::default()
    };
    let collaborators =
        ProcessCollaborators::new(Arc::new(ProcessRunner), config, c.layout.root.clone());

    collaborators
        .generate(
            &task,
            &Generation::Adsorbate {
                material: "Pt".to_string(),
                adsorbate: "OH".to_string(),
                net_charge: -1,
                top_layers: 3,
                site_index: 4,
                variant: bindflow_client::AdsorbateVariant::Plain,
            },
        )
        .unwrap();

    assert_eq!(
        fs::read_to_string(task.work_dir.join("args")).unwrap().trim(),
        "-1 3 4"
    );
}
