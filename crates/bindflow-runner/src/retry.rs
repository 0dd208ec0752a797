use crate::error::{CliError, RecoveryStep};
use bindflow_client::{Collaborators, JobScheduler};
use bindflow_core::model::{JobHandle, Task};

/// How many more archive-and-resubmit cycles a task may use in the current stage.
/// Lives only as long as one stage of one driver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(attempts: u32) -> Self {
        Self {
            remaining: attempts,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Takes one attempt if any are left.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    recovery_rounds: u32,
}

impl RetryPolicy {
    pub fn new(recovery_rounds: u32) -> Self {
        Self { recovery_rounds }
    }

    pub fn recovery_rounds(&self) -> u32 {
        self.recovery_rounds
    }

    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.recovery_rounds)
    }

    /// One archive-and-resubmit cycle. The caller decides whether a cycle is
    /// still allowed.
    pub fn recover(
        &self,
        task: &Task,
        scheduler: &dyn JobScheduler,
        collaborators: &dyn Collaborators,
    ) -> Result<JobHandle, CliError> {
        tracing::info!(
            "{} failed, archiving the previous attempt and resubmitting.",
            task.label()
        );
        collaborators
            .archive(task)
            .map_err(|source| CliError::RecoveryFailure {
                task: task.label(),
                step: RecoveryStep::Archive,
                source,
            })?;
        let handle = scheduler
            .submit(task)
            .map_err(|source| CliError::RecoveryFailure {
                task: task.label(),
                step: RecoveryStep::Resubmit,
                source,
            })?;
        tracing::info!("Resubmitted {} as job {}.", task.label(), handle);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindflow_core::model::{Layout, Stage};
    use bindflow_test_utils::mock::{Call, MockCollaborators, MockScheduler, Outcome};

    fn task_in(dir: &tempfile::TempDir) -> Task {
        let root = dir.path().join("Support");
        std::fs::create_dir_all(root.join("Pt")).unwrap();
        Layout::new(root).unwrap().task(Stage::SlabRelax, "Pt", "Pt")
    }

    #[test]
    fn test_budget_is_consumed_once_per_attempt() {
        let mut budget = RetryPolicy::new(1).budget();
        assert!(!budget.is_exhausted());
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_zero_rounds_means_no_recovery() {
        assert!(RetryPolicy::new(0).budget().is_exhausted());
    }

    #[test]
    fn test_recover_archives_then_submits() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(&dir);
        std::fs::write(task.work_dir.join("OUTCAR"), "crashed").unwrap();
        let scheduler = MockScheduler::new();
        let collaborators = MockCollaborators::new();

        let handle = RetryPolicy::new(1)
            .recover(&task, &scheduler, &collaborators)
            .unwrap();

        assert_eq!(
            collaborators.calls(),
            vec![Call::Archive(task.work_dir.clone())]
        );
        assert_eq!(scheduler.submissions(), vec![task.work_dir.clone()]);
        assert!(task.work_dir.join(format!("slurm-{}.out", handle)).is_file());
    }

    #[test]
    fn test_archive_failure_skips_resubmission() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(&dir);
        let scheduler = MockScheduler::new();
        let collaborators = MockCollaborators::new();
        collaborators.fail_archive(&task.work_dir);

        let err = RetryPolicy::new(1)
            .recover(&task, &scheduler, &collaborators)
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::RecoveryFailure {
                step: RecoveryStep::Archive,
                ..
            }
        ));
        assert!(!err.spares_siblings(true));
        assert!(scheduler.submissions().is_empty());
    }

    #[test]
    fn test_resubmission_failure_spares_siblings_in_any_round() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(&dir);
        let scheduler = MockScheduler::new();
        scheduler.script(&task.work_dir, [Outcome::Rejected]);
        let collaborators = MockCollaborators::new();

        let err = RetryPolicy::new(1)
            .recover(&task, &scheduler, &collaborators)
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::RecoveryFailure {
                step: RecoveryStep::Resubmit,
                ..
            }
        ));
        assert!(err.spares_siblings(false));
        assert!(err.spares_siblings(true));
    }
}
