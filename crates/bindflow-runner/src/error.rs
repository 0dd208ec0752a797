use bindflow_core::model::{Stage, Task, TaskState};
use std::path::PathBuf;
use thiserror::Error;

/// Which half of an archive-and-resubmit cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    Archive,
    Resubmit,
}

impl std::fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStep::Archive => write!(f, "archive"),
            RecoveryStep::Resubmit => write!(f, "resubmit"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] bindflow_core::errors::ConfigError),

    #[error(transparent)]
    Domain(#[from] bindflow_core::errors::DomainError),

    #[error(transparent)]
    Client(#[from] bindflow_client::ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Recovery of {task} failed during {step}: {source}")]
    RecoveryFailure {
        task: String,
        step: RecoveryStep,
        #[source]
        source: bindflow_client::ClientError,
    },

    #[error("Structure mismatch for {task}: '{derived}' has {derived_atoms} atoms but its source '{source_path}' has {source_atoms}.")]
    StructuralMismatch {
        task: String,
        source_path: PathBuf,
        source_atoms: usize,
        derived: PathBuf,
        derived_atoms: usize,
    },

    #[error("No recovery attempts left for {0}.")]
    RetryBudgetExhausted(String),

    #[error("Stage '{stage}' did not complete: {}", describe_unfinished(.unfinished))]
    StageFailed {
        stage: Stage,
        unfinished: Vec<(Task, TaskState)>,
    },
}

fn describe_unfinished(unfinished: &[(Task, TaskState)]) -> String {
    unfinished
        .iter()
        .map(|(task, state)| format!("{} is {}", task.subject, state))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CliError {
    /// Whether the rest of the round can go on without the task that raised
    /// this. A rejected resubmission is contained in every round, including a
    /// first round that finds a task already `Failed`. A rejected plain
    /// submission is contained only in recovery rounds.
    pub fn spares_siblings(&self, recovering: bool) -> bool {
        match self {
            CliError::RecoveryFailure {
                step: RecoveryStep::Resubmit,
                ..
            } => true,
            CliError::Client(bindflow_client::ClientError::SubmissionFailure { .. }) => recovering,
            _ => false,
        }
    }
}
