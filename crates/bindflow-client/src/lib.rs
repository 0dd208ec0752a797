pub mod cancel;
pub mod collaborators;
pub mod command;
pub mod error;
pub mod scheduler;
pub mod slurm;

pub use cancel::CancelFlag;
pub use collaborators::{AdsorbateVariant, Collaborators, Generation, ProcessCollaborators};
pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use error::{ClientError, Result};
pub use scheduler::{await_completion, JobScheduler, PollOptions, RecordNaming};
pub use slurm::SlurmScheduler;

#[cfg(test)]
pub(crate) static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
