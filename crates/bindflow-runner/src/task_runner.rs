use crate::error::CliError;
use crate::prober::Prober;
use crate::retry::{RetryBudget, RetryPolicy};
use bindflow_client::{Collaborators, Generation, JobScheduler};
use bindflow_core::constants::files;
use bindflow_core::model::{JobHandle, Task, TaskState};
use bindflow_core::poscar;
use std::collections::HashMap;
use std::path::PathBuf;

/// A task together with what its generator needs if the directory is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub task: Task,
    pub generation: Generation,
}

/// Drives one task forward by at most one action per call.
pub struct TaskRunner<'a> {
    scheduler: &'a dyn JobScheduler,
    collaborators: &'a dyn Collaborators,
    prober: Prober<'a>,
    policy: RetryPolicy,
    handles: HashMap<PathBuf, JobHandle>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(
        scheduler: &'a dyn JobScheduler,
        collaborators: &'a dyn Collaborators,
        prober: Prober<'a>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            scheduler,
            collaborators,
            prober,
            policy,
            handles: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn probe(&self, task: &Task) -> TaskState {
        self.prober
            .probe_with_hint(task, self.handles.get(&task.work_dir))
    }

    /// Returns the job to wait for, or `None` when there is nothing to wait on.
    /// A `Failed` task takes one attempt from `budget`; with none left the
    /// task is given up on.
    pub fn ensure_progress(
        &mut self,
        planned: &PlannedTask,
        budget: &mut RetryBudget,
    ) -> Result<Option<JobHandle>, CliError> {
        let task = &planned.task;
        match self.probe(task) {
            TaskState::Absent => {
                tracing::info!("Generating inputs for {}.", task.label());
                self.collaborators.generate(task, &planned.generation)?;
                verify_structure(task, &planned.generation)?;
                self.submit(task).map(Some)
            }
            TaskState::Prepared => self.submit(task).map(Some),
            TaskState::Submitted(handle) => {
                tracing::info!("{} is already queued as job {}.", task.label(), handle);
                self.handles.insert(task.work_dir.clone(), handle.clone());
                Ok(Some(handle))
            }
            TaskState::Succeeded => {
                tracing::debug!("{} has already succeeded.", task.label());
                Ok(None)
            }
            TaskState::AwaitingCheck => {
                tracing::warn!(
                    "Outcome of {} could not be determined; leaving it untouched.",
                    task.label()
                );
                Ok(None)
            }
            TaskState::Failed => {
                if !budget.try_consume() {
                    return Err(CliError::RetryBudgetExhausted(task.label()));
                }
                let handle = self
                    .policy
                    .recover(task, self.scheduler, self.collaborators)?;
                self.handles.insert(task.work_dir.clone(), handle.clone());
                Ok(Some(handle))
            }
        }
    }

    fn submit(&mut self, task: &Task) -> Result<JobHandle, CliError> {
        let handle = self.scheduler.submit(task)?;
        tracing::info!("Submitted {} as job {}.", task.label(), handle);
        self.handles.insert(task.work_dir.clone(), handle.clone());
        Ok(handle)
    }
}

/// A thermal deck must describe the same atoms as the relaxed structure it came from.
fn verify_structure(task: &Task, generation: &Generation) -> Result<(), CliError> {
    let Generation::Thermal { relaxed_dir, .. } = generation else {
        return Ok(());
    };
    let source_path = relaxed_dir.join(files::RELAXED_STRUCTURE);
    let derived = task.work_dir.join(files::INPUT_STRUCTURE);
    let source_atoms = poscar::atom_count(&source_path)?;
    let derived_atoms = poscar::atom_count(&derived)?;
    if source_atoms != derived_atoms {
        return Err(CliError::StructuralMismatch {
            task: task.label(),
            source_path,
            source_atoms,
            derived,
            derived_atoms,
        });
    }
    tracing::debug!(
        "{} has {} atoms, matching '{}'.",
        derived.display(),
        derived_atoms,
        source_path.display()
    );
    Ok(())
}
