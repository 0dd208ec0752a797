use crate::model::{JobHandle, TaskState};

/// What inspecting a task's primary output log showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvidence {
    Missing,
    SuccessMarker,
    NoSuccessMarker,
    Undetermined,
}

/// Snapshot of filesystem and scheduler facts for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFacts {
    pub dir_exists: bool,
    pub active_job: Option<JobHandle>,
    pub log: LogEvidence,
}

impl TaskFacts {
    pub fn absent() -> Self {
        Self {
            dir_exists: false,
            active_job: None,
            log: LogEvidence::Missing,
        }
    }
}

/// Classifies a task from a snapshot. An active job always wins over whatever
/// the log says, since a running job may still be rewriting it.
pub fn determine_task_state(facts: &TaskFacts) -> TaskState {
    if !facts.dir_exists {
        return TaskState::Absent;
    }
    if let Some(handle) = &facts.active_job {
        return TaskState::Submitted(handle.clone());
    }
    match facts.log {
        LogEvidence::Missing => TaskState::Prepared,
        LogEvidence::SuccessMarker => TaskState::Succeeded,
        LogEvidence::NoSuccessMarker => TaskState::Failed,
        LogEvidence::Undetermined => TaskState::AwaitingCheck,
    }
}

/// Scans log text for the success marker.
pub fn log_contains_marker(content: &str, marker: &str) -> bool {
    !marker.is_empty() && content.contains(marker)
}

/// Extracts the job id from a scheduler record file name such as `slurm-12345.out`.
pub fn job_id_from_record_name(file_name: &str, prefix: &str, suffix: &str) -> Option<String> {
    let digits = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits.to_string())
    } else {
        None
    }
}
