use crate::error::CliError;
use crate::retry::RetryBudget;
use crate::task_runner::{PlannedTask, TaskRunner};
use bindflow_client::{
    await_completion, AdsorbateVariant, CancelFlag, Collaborators, Generation, JobScheduler,
    PollOptions,
};
use bindflow_core::model::{JobHandle, Layout, RunRequest, Stage, Task, TaskState};
use std::collections::HashMap;
use std::path::PathBuf;

/// Final state of one task, as reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: Task,
    pub state: TaskState,
    pub recoveries: u32,
}

/// Stages a request goes through, in order. The charged-variant stage only
/// exists for charged requests.
pub fn stages_for(request: &RunRequest) -> Vec<Stage> {
    let mut stages = vec![Stage::SlabRelax, Stage::AdsorbateRelax];
    if request.is_charged() {
        stages.push(Stage::ChargedVariantRelax);
    }
    stages.push(Stage::ThermalCorrection);
    stages
}

pub fn plan_stage(
    stage: Stage,
    request: &RunRequest,
    layout: &Layout,
    top_layers: u32,
) -> Vec<PlannedTask> {
    let material = &request.material;
    if stage == Stage::SlabRelax {
        return vec![PlannedTask {
            task: layout.task(stage, material, material),
            generation: Generation::Slab {
                material: material.clone(),
                top_layers,
            },
        }];
    }
    request
        .adsorbates
        .iter()
        .map(|adsorbate| {
            let generation = match stage {
                Stage::ThermalCorrection => Generation::Thermal {
                    material: material.clone(),
                    adsorbate: adsorbate.clone(),
                    site_index: request.site_index,
                    relaxed_dir: layout.adsorbate_dir(adsorbate, material),
                },
                _ => Generation::Adsorbate {
                    material: material.clone(),
                    adsorbate: adsorbate.clone(),
                    net_charge: request.net_charge,
                    top_layers,
                    site_index: request.site_index,
                    variant: if stage == Stage::ChargedVariantRelax {
                        AdsorbateVariant::Far
                    } else {
                        AdsorbateVariant::Plain
                    },
                },
            };
            PlannedTask {
                task: layout.task(stage, material, adsorbate),
                generation,
            }
        })
        .collect()
}

/// Sequences the stages of one request. Each stage fans out over its tasks,
/// waits for every job, then runs recovery rounds for whatever did not succeed.
pub struct StageController<'a> {
    runner: TaskRunner<'a>,
    scheduler: &'a dyn JobScheduler,
    collaborators: &'a dyn Collaborators,
    layout: &'a Layout,
    request: &'a RunRequest,
    top_layers: u32,
    poll: PollOptions,
    cancel: CancelFlag,
    report: Vec<TaskOutcome>,
}

impl<'a> StageController<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: TaskRunner<'a>,
        scheduler: &'a dyn JobScheduler,
        collaborators: &'a dyn Collaborators,
        layout: &'a Layout,
        request: &'a RunRequest,
        top_layers: u32,
        poll: PollOptions,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            runner,
            scheduler,
            collaborators,
            layout,
            request,
            top_layers,
            poll,
            cancel,
            report: Vec::new(),
        }
    }

    pub fn report(&self) -> &[TaskOutcome] {
        &self.report
    }

    pub fn into_report(self) -> Vec<TaskOutcome> {
        self.report
    }

    pub fn run(&mut self) -> Result<(), CliError> {
        for stage in stages_for(self.request) {
            let planned = plan_stage(stage, self.request, self.layout, self.top_layers);
            self.run_stage(stage, &planned)?;
            self.after_stage(stage, &planned)?;
        }
        self.aggregate()
    }

    pub fn run_stage(&mut self, stage: Stage, planned: &[PlannedTask]) -> Result<(), CliError> {
        tracing::info!("Starting stage '{}' with {} task(s).", stage, planned.len());
        let mut budgets: HashMap<PathBuf, RetryBudget> = planned
            .iter()
            .map(|p| (p.task.work_dir.clone(), self.runner.policy().budget()))
            .collect();

        let driven = self.drive_stage(stage, planned, &mut budgets);
        let unfinished = self.record_outcomes(planned, &budgets);
        driven?;
        if !unfinished.is_empty() {
            return Err(CliError::StageFailed { stage, unfinished });
        }
        tracing::info!("Stage '{}' completed.", stage);
        Ok(())
    }

    fn drive_stage(
        &mut self,
        stage: Stage,
        planned: &[PlannedTask],
        budgets: &mut HashMap<PathBuf, RetryBudget>,
    ) -> Result<(), CliError> {
        let handles = self.fan_out(planned, budgets, false)?;
        self.fan_in(&handles)?;

        for round in 1..=self.runner.policy().recovery_rounds() {
            let pending: Vec<PlannedTask> = planned
                .iter()
                .filter(|p| !self.runner.probe(&p.task).is_succeeded())
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            tracing::info!(
                "Recovery round {} of stage '{}' for {} task(s).",
                round,
                stage,
                pending.len()
            );
            let handles = self.fan_out(&pending, budgets, true)?;
            self.fan_in(&handles)?;
        }
        Ok(())
    }

    /// Adds one report row per planned task, also when the stage stopped
    /// early, and returns the tasks that did not succeed.
    fn record_outcomes(
        &mut self,
        planned: &[PlannedTask],
        budgets: &HashMap<PathBuf, RetryBudget>,
    ) -> Vec<(Task, TaskState)> {
        let mut unfinished = Vec::new();
        for p in planned {
            let state = self.runner.probe(&p.task);
            let recoveries = budgets
                .get(&p.task.work_dir)
                .map(|b| self.runner.policy().recovery_rounds() - b.remaining())
                .unwrap_or(0);
            if !state.is_succeeded() {
                unfinished.push((p.task.clone(), state.clone()));
            }
            self.report.push(TaskOutcome {
                task: p.task.clone(),
                state,
                recoveries,
            });
        }
        unfinished
    }

    /// Issues every submission of the round before any waiting starts. Rejected
    /// resubmissions are reported and left for the final probe to judge.
    fn fan_out(
        &mut self,
        planned: &[PlannedTask],
        budgets: &mut HashMap<PathBuf, RetryBudget>,
        recovering: bool,
    ) -> Result<Vec<JobHandle>, CliError> {
        let mut handles = Vec::new();
        let fresh = self.runner.policy().budget();
        for p in planned {
            let budget = budgets.entry(p.task.work_dir.clone()).or_insert(fresh);
            match self.runner.ensure_progress(p, budget) {
                Ok(Some(handle)) => {
                    if !handles.contains(&handle) {
                        handles.push(handle);
                    }
                }
                Ok(None) => {}
                Err(e) if e.spares_siblings(recovering) => {
                    tracing::error!("{}; no action taken for {} this round.", e, p.task.label());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(handles)
    }

    fn fan_in(&self, handles: &[JobHandle]) -> Result<(), CliError> {
        for handle in handles {
            await_completion(self.scheduler, handle, &self.poll, &self.cancel)?;
        }
        Ok(())
    }

    fn after_stage(&mut self, stage: Stage, planned: &[PlannedTask]) -> Result<(), CliError> {
        match stage {
            Stage::SlabRelax | Stage::AdsorbateRelax => {
                for p in planned {
                    self.collaborators.extract_energy(&p.task)?;
                }
            }
            Stage::ChargedVariantRelax => {}
            Stage::ThermalCorrection => {
                for p in planned {
                    self.collaborators.extract_free_energy(&p.task)?;
                }
            }
        }

        let last_relaxation = if self.request.is_charged() {
            Stage::ChargedVariantRelax
        } else {
            Stage::AdsorbateRelax
        };
        if stage == last_relaxation {
            tracing::info!("GemOpt tasks have been completed.");
        } else if stage == Stage::ThermalCorrection {
            tracing::info!("Thermal calculations have been completed.");
        }
        Ok(())
    }

    fn aggregate(&self) -> Result<(), CliError> {
        let variant = if self.request.is_charged() {
            AdsorbateVariant::Far
        } else {
            AdsorbateVariant::Plain
        };
        for adsorbate in &self.request.adsorbates {
            self.collaborators
                .aggregate(&self.request.material, adsorbate, variant)?;
        }
        tracing::info!(
            "Binding energies for {} recorded ({} adsorbate(s)).",
            self.request.material,
            self.request.adsorbates.len()
        );
        Ok(())
    }
}
