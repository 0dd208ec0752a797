use crate::command::CommandRunner;
use crate::error::{ClientError, Result};
use crate::scheduler::{JobScheduler, RecordNaming};
use bindflow_core::config::{PipelineConfig, SchedulerConfig};
use bindflow_core::model::{JobHandle, Task};
use bindflow_core::workdir::ScopedDir;
use regex::Regex;
use std::sync::Arc;

/// SLURM-backed scheduler: submissions go through a site wrapper script whose
/// output carries the job id, and liveness is checked with `squeue -j`.
pub struct SlurmScheduler {
    runner: Arc<dyn CommandRunner>,
    submit_command: Vec<String>,
    queue_command: Vec<String>,
    job_id_pattern: Regex,
    naming: RecordNaming,
}

impl SlurmScheduler {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        scheduler: &SchedulerConfig,
        pipeline: &PipelineConfig,
    ) -> Result<Self> {
        let job_id_pattern =
            Regex::new(&scheduler.job_id_pattern).map_err(|e| ClientError::InvalidPattern {
                pattern: scheduler.job_id_pattern.clone(),
                reason: e.to_string(),
            })?;
        if job_id_pattern.captures_len() < 2 {
            return Err(ClientError::InvalidPattern {
                pattern: scheduler.job_id_pattern.clone(),
                reason: "pattern needs a capture group for the job id".to_string(),
            });
        }
        Ok(Self {
            runner,
            submit_command: scheduler.submit_command.clone(),
            queue_command: scheduler.queue_command.clone(),
            job_id_pattern,
            naming: RecordNaming {
                prefix: pipeline.scheduler_output_prefix.clone(),
                suffix: pipeline.scheduler_output_suffix.clone(),
            },
        })
    }

    pub fn parse_job_id(&self, output: &str) -> Result<JobHandle> {
        self.job_id_pattern
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| JobHandle(m.as_str().to_string()))
            .ok_or_else(|| ClientError::JobIdParse(output.trim().to_string()))
    }

    fn query(&self, handle: &JobHandle) -> Result<bool> {
        let out = self
            .runner
            .run(&self.queue_command, std::slice::from_ref(&handle.0))?;
        if !out.success {
            return Err(ClientError::QueueQueryFailure(
                handle.clone(),
                out.failure_summary(),
            ));
        }
        Ok(out
            .stdout
            .split_whitespace()
            .any(|token| token == handle.0))
    }
}

impl JobScheduler for SlurmScheduler {
    fn submit(&self, task: &Task) -> Result<JobHandle> {
        let failure = |reason: String| ClientError::SubmissionFailure {
            dir: task.work_dir.clone(),
            reason,
        };

        let out = {
            let _scope = ScopedDir::enter(task.context_dir())?;
            self.runner
                .run(&self.submit_command, &[task.dir_name()])
                .map_err(|e| failure(e.to_string()))?
        };
        if !out.success {
            return Err(failure(out.failure_summary()));
        }

        let handle = self
            .parse_job_id(&out.stdout)
            .map_err(|e| failure(e.to_string()))?;
        tracing::debug!("Scheduler accepted {} as job {}.", task.label(), handle);
        Ok(handle)
    }

    fn is_known(&self, handle: &JobHandle) -> bool {
        match self.query(handle) {
            Ok(known) => known,
            Err(e) => {
                tracing::debug!("Treating job {} as finished: {}", handle, e);
                false
            }
        }
    }

    fn record_naming(&self) -> RecordNaming {
        self.naming.clone()
    }
}
