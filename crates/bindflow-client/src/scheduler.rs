use crate::cancel::CancelFlag;
use crate::error::{ClientError, Result};
use bindflow_core::constants::files;
use bindflow_core::engine::job_id_from_record_name;
use bindflow_core::model::{JobHandle, Task};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// File naming of the per-job output records the scheduler leaves in a task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordNaming {
    pub prefix: String,
    pub suffix: String,
}

impl Default for RecordNaming {
    fn default() -> Self {
        Self {
            prefix: files::SCHEDULER_OUTPUT_PREFIX.to_string(),
            suffix: files::SCHEDULER_OUTPUT_SUFFIX.to_string(),
        }
    }
}

impl RecordNaming {
    /// Job ids embedded in record files directly inside `dir`, in ascending order.
    pub fn job_ids_in(&self, dir: &Path) -> Vec<JobHandle> {
        let mut ids: Vec<JobHandle> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                job_id_from_record_name(&name, &self.prefix, &self.suffix)
            })
            .map(JobHandle)
            .collect();
        ids.sort_by_key(|h| h.0.parse::<u64>().unwrap_or(u64::MAX));
        ids
    }
}

pub trait JobScheduler {
    /// Submits the task's working directory. Leaves a new queued job on success.
    fn submit(&self, task: &Task) -> Result<JobHandle>;

    /// Whether the scheduler still reports the job. A failing query means "no record".
    fn is_known(&self, handle: &JobHandle) -> bool;

    fn record_naming(&self) -> RecordNaming {
        RecordNaming::default()
    }

    /// First job recorded in `work_dir` that the scheduler still knows about.
    fn is_active(&self, work_dir: &Path) -> Option<JobHandle> {
        self.record_naming()
            .job_ids_in(work_dir)
            .into_iter()
            .find(|handle| self.is_known(handle))
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(bindflow_core::constants::defaults::POLL_INTERVAL_SECS),
            timeout: None,
        }
    }
}

fn sleep_cancellable(total: Duration, cancel: &CancelFlag) {
    let slice = Duration::from_millis(200);
    let start = Instant::now();
    while !cancel.is_cancelled() {
        let elapsed = start.elapsed();
        if elapsed >= total {
            return;
        }
        thread::sleep(slice.min(total - elapsed));
    }
}

/// Blocks until the scheduler no longer reports `handle`. Without a timeout this
/// waits indefinitely; the cancel flag is checked between polls.
pub fn await_completion<S: JobScheduler + ?Sized>(
    scheduler: &S,
    handle: &JobHandle,
    options: &PollOptions,
    cancel: &CancelFlag,
) -> Result<()> {
    tracing::info!("Waiting for job {} to complete...", handle);
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled(handle.clone()));
        }
        if !scheduler.is_known(handle) {
            tracing::info!("Job {} has completed.", handle);
            return Ok(());
        }
        if let Some(timeout) = options.timeout {
            if start.elapsed() >= timeout {
                return Err(ClientError::TimedOut {
                    handle: handle.clone(),
                    secs: timeout.as_secs(),
                });
            }
        }
        tracing::info!("Job {} is still running...", handle);
        sleep_cancellable(options.interval, cancel);
    }
}
