pub mod cli;
pub mod controller;
pub mod error;
pub mod prober;
pub mod retry;
pub mod summary;
pub mod task_runner;

use bindflow_client::{
    CancelFlag, CommandRunner, PollOptions, ProcessCollaborators, ProcessRunner, SlurmScheduler,
};
use bindflow_core::config::{self, Config};
use bindflow_core::errors::ConfigError;
use bindflow_core::model::{Layout, RunRequest};
use bindflow_core::workdir::ScopedDir;
use cli::Cli;
use controller::StageController;
use error::CliError;
use prober::Prober;
use retry::RetryPolicy;
use std::sync::Arc;
use task_runner::TaskRunner;

/// Loads the configuration the CLI points at and applies flag overrides.
pub fn resolve_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load_config()?,
    };
    if let Some(secs) = cli.poll_interval {
        config.scheduler.poll_interval_secs = secs;
    }
    if let Some(secs) = cli.timeout {
        config.scheduler.timeout_secs = Some(secs);
    }
    Ok(config)
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let request = RunRequest::parse(
        &cli.material,
        &cli.adsorbates,
        &cli.site_index,
        &cli.net_charge,
    )?;
    let config = resolve_config(&cli)?;

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let root = root
        .canonicalize()
        .map_err(|source| ConfigError::PathIo {
            path: root.clone(),
            source,
        })?;
    let layout = Layout::new(root)?;
    let _scope = ScopedDir::enter(&layout.root)?;

    tracing::info!(
        "bindflow {} | material {} | adsorbates {} | site {} | charge {}",
        env!("CARGO_PKG_VERSION"),
        request.material,
        request.adsorbates.join(","),
        request.site_index,
        request.net_charge
    );
    tracing::debug!("Launch directory: {}", layout.root.display());

    let commands: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let scheduler = SlurmScheduler::new(commands.clone(), &config.scheduler, &config.pipeline)?;
    let collaborators = ProcessCollaborators::new(
        commands,
        config.collaborators.clone(),
        layout.root.clone(),
    );

    let cancel = CancelFlag::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        tracing::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let poll = PollOptions {
        interval: config.scheduler.poll_interval(),
        timeout: config.scheduler.timeout(),
    };
    execute(
        &request,
        &layout,
        &config,
        &scheduler,
        &collaborators,
        poll,
        cancel,
    )
}

/// Runs every stage of `request` against the given scheduler and collaborators,
/// then prints the summary table whether or not the run finished.
pub fn execute(
    request: &RunRequest,
    layout: &Layout,
    config: &Config,
    scheduler: &dyn bindflow_client::JobScheduler,
    collaborators: &dyn bindflow_client::Collaborators,
    poll: PollOptions,
    cancel: CancelFlag,
) -> Result<(), CliError> {
    let prober = Prober::new(
        scheduler,
        collaborators,
        config.pipeline.output_log.clone(),
        config.pipeline.success_marker.clone(),
    );
    let runner = TaskRunner::new(
        scheduler,
        collaborators,
        prober,
        RetryPolicy::new(config.pipeline.recovery_rounds),
    );
    let mut controller = StageController::new(
        runner,
        scheduler,
        collaborators,
        layout,
        request,
        config.pipeline.top_layers,
        poll,
        cancel,
    );

    let result = controller.run();
    let report = controller.into_report();
    if !report.is_empty() {
        println!("{}", summary::render(&report));
    }
    if result.is_ok() {
        tracing::info!("All stages for {} have been completed.", request.material);
    }
    result
}
