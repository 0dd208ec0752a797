use bindflow_client::{Collaborators, JobScheduler};
use bindflow_core::engine::{determine_task_state, log_contains_marker, LogEvidence, TaskFacts};
use bindflow_core::model::{JobHandle, Task, TaskState};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Gathers filesystem and scheduler facts about a task and classifies them.
/// Never submits, archives or writes anything.
pub struct Prober<'a> {
    scheduler: &'a dyn JobScheduler,
    collaborators: &'a dyn Collaborators,
    output_log: String,
    success_marker: String,
}

impl<'a> Prober<'a> {
    pub fn new(
        scheduler: &'a dyn JobScheduler,
        collaborators: &'a dyn Collaborators,
        output_log: impl Into<String>,
        success_marker: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            collaborators,
            output_log: output_log.into(),
            success_marker: success_marker.into(),
        }
    }

    pub fn probe(&self, task: &Task) -> TaskState {
        self.probe_with_hint(task, None)
    }

    /// Like [`Prober::probe`], but asks the scheduler about `hint` first. The
    /// hint is a handle obtained earlier in this run; record files are only
    /// scanned when it is no longer known.
    pub fn probe_with_hint(&self, task: &Task, hint: Option<&JobHandle>) -> TaskState {
        let state = determine_task_state(&self.facts(task, hint));
        tracing::debug!("Probed {}: {}", task.label(), state);
        state
    }

    pub fn facts(&self, task: &Task, hint: Option<&JobHandle>) -> TaskFacts {
        if !task.work_dir.is_dir() {
            return TaskFacts::absent();
        }
        let active_job = match hint {
            Some(handle) if self.scheduler.is_known(handle) => Some(handle.clone()),
            _ => self.scheduler.is_active(&task.work_dir),
        };
        let log = if active_job.is_some() {
            // A running job owns the log; the verdict would be ignored anyway.
            LogEvidence::Missing
        } else {
            self.log_evidence(task)
        };
        TaskFacts {
            dir_exists: true,
            active_job,
            log,
        }
    }

    fn log_evidence(&self, task: &Task) -> LogEvidence {
        let log_path = task.work_dir.join(&self.output_log);
        if !log_path.is_file() {
            return LogEvidence::Missing;
        }

        if task.stage.is_relaxation() && self.collaborators.has_output_checker() {
            return match self.collaborators.check_output(task) {
                Ok(true) => LogEvidence::SuccessMarker,
                Ok(false) => LogEvidence::NoSuccessMarker,
                Err(e) => {
                    tracing::warn!("Output checker could not judge {}: {}", task.label(), e);
                    LogEvidence::Undetermined
                }
            };
        }

        match file_contains(&log_path, &self.success_marker) {
            Ok(true) => LogEvidence::SuccessMarker,
            Ok(false) => LogEvidence::NoSuccessMarker,
            Err(e) => {
                tracing::warn!("Could not read '{}': {}", log_path.display(), e);
                LogEvidence::Undetermined
            }
        }
    }
}

/// Line-wise scan so multi-hundred-megabyte logs are never held in memory.
/// Lines that are not valid UTF-8 are decoded lossily.
pub fn file_contains(path: &Path, marker: &str) -> io::Result<bool> {
    if marker.is_empty() {
        return Ok(false);
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
        if log_contains_marker(&String::from_utf8_lossy(&line), marker) {
            return Ok(true);
        }
    }
}
