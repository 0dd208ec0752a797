use crate::{poscar, FAILED_LOG, SUCCESS_LOG};
use bindflow_client::{AdsorbateVariant, ClientError, Collaborators, Generation, JobScheduler};
use bindflow_core::model::{JobHandle, Task};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ATOMS: usize = 18;

/// What a simulated job leaves behind in its working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Success marker in the log and a relaxed structure.
    Success,
    /// Log without the success marker.
    Failure,
    /// The job vanished without writing a log.
    NoLog,
    /// The submitter refuses the job.
    Rejected,
}

#[derive(Default)]
struct SchedulerState {
    next_id: u64,
    submissions: Vec<PathBuf>,
    outcomes: HashMap<PathBuf, VecDeque<Outcome>>,
    running: HashMap<String, u32>,
    queries: Vec<(JobHandle, usize)>,
}

/// In-memory scheduler. Jobs "run" at submission time and stay in the queue
/// for a configurable number of queries.
pub struct MockScheduler {
    state: RefCell<SchedulerState>,
    queue_polls: u32,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::with_queue_polls(0)
    }

    pub fn with_queue_polls(queue_polls: u32) -> Self {
        Self {
            state: RefCell::new(SchedulerState {
                next_id: 1000,
                ..Default::default()
            }),
            queue_polls,
        }
    }

    /// Outcomes for successive submissions of `work_dir`. Unscripted submissions succeed.
    pub fn script(&self, work_dir: &Path, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state
            .borrow_mut()
            .outcomes
            .entry(work_dir.to_path_buf())
            .or_default()
            .extend(outcomes);
    }

    /// Pretends a job from an earlier driver run is still queued for `work_dir`.
    pub fn preload_running(&self, work_dir: &Path, id: &str, polls: u32) -> JobHandle {
        fs::create_dir_all(work_dir).expect("create work dir");
        fs::write(work_dir.join(format!("slurm-{}.out", id)), "").expect("write record");
        self.state
            .borrow_mut()
            .running
            .insert(id.to_string(), polls);
        JobHandle::from(id)
    }

    pub fn submissions(&self) -> Vec<PathBuf> {
        self.state.borrow().submissions.clone()
    }

    pub fn submission_count(&self, work_dir: &Path) -> usize {
        self.state
            .borrow()
            .submissions
            .iter()
            .filter(|d| d.as_path() == work_dir)
            .count()
    }

    pub fn queries(&self) -> Vec<JobHandle> {
        self.state
            .borrow()
            .queries
            .iter()
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// How many submissions had been made when `id` was first queried.
    pub fn submitted_before_first_query(&self, id: &str) -> Option<usize> {
        self.state
            .borrow()
            .queries
            .iter()
            .find(|(h, _)| h.0 == id)
            .map(|(_, n)| *n)
    }
}

impl JobScheduler for MockScheduler {
    fn submit(&self, task: &Task) -> bindflow_client::Result<JobHandle> {
        let mut state = self.state.borrow_mut();
        let outcome = state
            .outcomes
            .get_mut(&task.work_dir)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Success);
        if outcome == Outcome::Rejected {
            return Err(ClientError::SubmissionFailure {
                dir: task.work_dir.clone(),
                reason: "sbatch: error: Batch job submission failed".to_string(),
            });
        }

        state.next_id += 1;
        let id = state.next_id.to_string();
        state.submissions.push(task.work_dir.clone());
        state.running.insert(id.clone(), self.queue_polls);

        let dir = &task.work_dir;
        fs::write(dir.join(format!("slurm-{}.out", id)), "")?;
        match outcome {
            Outcome::Success => {
                fs::write(dir.join("OUTCAR"), SUCCESS_LOG)?;
                fs::write(dir.join("CONTCAR"), poscar(DEFAULT_ATOMS))?;
            }
            Outcome::Failure => fs::write(dir.join("OUTCAR"), FAILED_LOG)?,
            Outcome::NoLog | Outcome::Rejected => {}
        }
        Ok(JobHandle(id))
    }

    fn is_known(&self, handle: &JobHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let submitted = state.submissions.len();
        state.queries.push((handle.clone(), submitted));
        match state.running.get_mut(&handle.0) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Generate(PathBuf, Generation),
    Archive(PathBuf),
    ExtractEnergy(PathBuf),
    ExtractFreeEnergy(PathBuf),
    Aggregate(String, String, AdsorbateVariant),
}

#[derive(Default)]
struct CollaboratorState {
    calls: Vec<Call>,
    failing_archives: HashSet<PathBuf>,
    failing_generations: HashSet<PathBuf>,
    failing_extractions: HashSet<PathBuf>,
    thermal_atoms: Option<usize>,
}

/// Records every collaborator call and mimics the filesystem effects of the real scripts.
#[derive(Default)]
pub struct MockCollaborators {
    state: RefCell<CollaboratorState>,
}

impl MockCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn generated(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Generate(dir, _) => Some(dir),
                _ => None,
            })
            .collect()
    }

    pub fn aggregations(&self) -> Vec<(String, String, AdsorbateVariant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Aggregate(m, a, v) => Some((m, a, v)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_archive(&self, work_dir: &Path) {
        self.state
            .borrow_mut()
            .failing_archives
            .insert(work_dir.to_path_buf());
    }

    pub fn fail_generation(&self, work_dir: &Path) {
        self.state
            .borrow_mut()
            .failing_generations
            .insert(work_dir.to_path_buf());
    }

    /// Makes energy and free energy extraction fail for `work_dir`.
    pub fn fail_extraction(&self, work_dir: &Path) {
        self.state
            .borrow_mut()
            .failing_extractions
            .insert(work_dir.to_path_buf());
    }

    fn extraction(&self, name: &str, task: &Task) -> bindflow_client::Result<()> {
        if self.state.borrow().failing_extractions.contains(&task.work_dir) {
            return Err(ClientError::CollaboratorFailed {
                name: name.to_string(),
                reason: "exited with 1".to_string(),
            });
        }
        Ok(())
    }

    /// Makes thermal generation write a structure with a different atom count.
    pub fn set_thermal_atoms(&self, atoms: usize) {
        self.state.borrow_mut().thermal_atoms = Some(atoms);
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Collaborators for MockCollaborators {
    fn generate(&self, task: &Task, request: &Generation) -> bindflow_client::Result<()> {
        self.record(Call::Generate(task.work_dir.clone(), request.clone()));
        let state = self.state.borrow();
        if state.failing_generations.contains(&task.work_dir) {
            return Err(ClientError::GenerationFailure {
                what: request.describe(),
                reason: "generator exited with 1".to_string(),
            });
        }
        fs::create_dir_all(&task.work_dir)?;
        let atoms = match request {
            Generation::Thermal { .. } => state.thermal_atoms.unwrap_or(DEFAULT_ATOMS),
            _ => DEFAULT_ATOMS,
        };
        fs::write(task.work_dir.join("POSCAR"), poscar(atoms))?;
        Ok(())
    }

    fn archive(&self, task: &Task) -> bindflow_client::Result<()> {
        self.record(Call::Archive(task.work_dir.clone()));
        if self.state.borrow().failing_archives.contains(&task.work_dir) {
            return Err(ClientError::ArchiveFailure {
                dir: task.work_dir.clone(),
                reason: "backup.sh exited with 1".to_string(),
            });
        }
        let log = task.work_dir.join("OUTCAR");
        if log.exists() {
            let mut n = 1;
            while task.work_dir.join(format!("OUTCAR.{}", n)).exists() {
                n += 1;
            }
            fs::rename(&log, task.work_dir.join(format!("OUTCAR.{}", n)))?;
        }
        Ok(())
    }

    fn check_output(&self, _task: &Task) -> bindflow_client::Result<bool> {
        Err(ClientError::CollaboratorFailed {
            name: "output_checker".to_string(),
            reason: "no output checker configured".to_string(),
        })
    }

    fn has_output_checker(&self) -> bool {
        false
    }

    fn extract_energy(&self, task: &Task) -> bindflow_client::Result<()> {
        self.record(Call::ExtractEnergy(task.work_dir.clone()));
        self.extraction("energy_extractor", task)
    }

    fn extract_free_energy(&self, task: &Task) -> bindflow_client::Result<()> {
        self.record(Call::ExtractFreeEnergy(task.work_dir.clone()));
        self.extraction("free_energy_extractor", task)
    }

    fn aggregate(
        &self,
        material: &str,
        adsorbate: &str,
        variant: AdsorbateVariant,
    ) -> bindflow_client::Result<()> {
        self.record(Call::Aggregate(
            material.to_string(),
            adsorbate.to_string(),
            variant,
        ));
        Ok(())
    }
}
