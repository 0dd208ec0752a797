use bindflow_core::model::JobHandle;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] bindflow_core::errors::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Job submission failed for '{dir}': {reason}")]
    SubmissionFailure { dir: PathBuf, reason: String },

    #[error("Failed to parse job ID from submitter output: {0}")]
    JobIdParse(String),

    #[error("Queue query for job {0} failed: {1}")]
    QueueQueryFailure(JobHandle, String),

    #[error("Input generation for '{what}' failed: {reason}")]
    GenerationFailure { what: String, reason: String },

    #[error("Archiving '{dir}' failed: {reason}")]
    ArchiveFailure { dir: PathBuf, reason: String },

    #[error("Collaborator '{name}' failed: {reason}")]
    CollaboratorFailed { name: String, reason: String },

    #[error("Invalid job ID pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Interrupted while waiting for job {0}.")]
    Cancelled(JobHandle),

    #[error("Gave up waiting for job {handle} after {secs}s.")]
    TimedOut { handle: JobHandle, secs: u64 },
}

pub type Result<T> = std::result::Result<T, ClientError>;
