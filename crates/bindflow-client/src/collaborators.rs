use crate::command::{CommandOutput, CommandRunner};
use crate::error::{ClientError, Result};
use bindflow_core::config::CollaboratorConfig;
use bindflow_core::constants::markers;
use bindflow_core::model::Task;
use bindflow_core::workdir::ScopedDir;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsorbateVariant {
    Plain,
    /// Adsorbate placed far from the surface, used as the reference for charged systems.
    Far,
}

/// Everything an input-deck generator needs to create one task's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Slab {
        material: String,
        top_layers: u32,
    },
    Adsorbate {
        material: String,
        adsorbate: String,
        net_charge: i32,
        top_layers: u32,
        site_index: u32,
        variant: AdsorbateVariant,
    },
    Thermal {
        material: String,
        adsorbate: String,
        site_index: u32,
        /// Directory holding the relaxed adsorbate structure the thermal deck is derived from.
        relaxed_dir: PathBuf,
    },
}

impl Generation {
    pub fn describe(&self) -> String {
        match self {
            Generation::Slab { material, .. } => format!("slab {}", material),
            Generation::Adsorbate {
                material,
                adsorbate,
                variant: AdsorbateVariant::Plain,
                ..
            } => format!("{} on {}", adsorbate, material),
            Generation::Adsorbate {
                material,
                adsorbate,
                variant: AdsorbateVariant::Far,
                ..
            } => format!("far {} on {}", adsorbate, material),
            Generation::Thermal {
                material,
                adsorbate,
                ..
            } => format!("thermal {} on {}", adsorbate, material),
        }
    }
}

/// The opaque external programs the pipeline delegates to.
pub trait Collaborators {
    /// Creates the task's working directory with simulation-ready inputs.
    fn generate(&self, task: &Task, request: &Generation) -> Result<()>;

    /// Moves the previous attempt's outputs aside so the task can be resubmitted.
    fn archive(&self, task: &Task) -> Result<()>;

    /// `Ok(true)` when the output checker reports success, `Ok(false)` when it
    /// ran but did not, `Err` when it could not decide.
    fn check_output(&self, task: &Task) -> Result<bool>;

    /// Whether `check_output` is available; otherwise the log is inspected directly.
    fn has_output_checker(&self) -> bool;

    /// Records the electronic energy of a finished relaxation.
    fn extract_energy(&self, task: &Task) -> Result<()>;

    /// Records the free-energy correction of a finished thermal calculation.
    fn extract_free_energy(&self, task: &Task) -> Result<()>;

    /// Appends the binding energy row for one adsorbate.
    fn aggregate(&self, material: &str, adsorbate: &str, variant: AdsorbateVariant)
        -> Result<()>;
}

pub struct ProcessCollaborators {
    runner: Arc<dyn CommandRunner>,
    config: CollaboratorConfig,
    root: PathBuf,
}

impl ProcessCollaborators {
    /// `root` is the launch directory generators and aggregators are run from.
    pub fn new(runner: Arc<dyn CommandRunner>, config: CollaboratorConfig, root: PathBuf) -> Self {
        Self {
            runner,
            config,
            root,
        }
    }

    fn run_in(&self, dir: &Path, argv: &[String], args: &[String]) -> Result<CommandOutput> {
        let _scope = ScopedDir::enter(dir)?;
        self.runner.run(argv, args)
    }

    fn run_checked(&self, name: &str, dir: &Path, argv: &[String], args: &[String]) -> Result<()> {
        let out = self.run_in(dir, argv, args)?;
        if !out.success {
            return Err(ClientError::CollaboratorFailed {
                name: name.to_string(),
                reason: out.failure_summary(),
            });
        }
        Ok(())
    }
}

impl Collaborators for ProcessCollaborators {
    fn generate(&self, task: &Task, request: &Generation) -> Result<()> {
        let failure = |reason: String| ClientError::GenerationFailure {
            what: request.describe(),
            reason,
        };
        let (argv, args): (&[String], Vec<String>) = match request {
            Generation::Slab {
                material,
                top_layers,
            } => (
                self.config.slab_generator.as_slice(),
                vec![material.clone(), top_layers.to_string()],
            ),
            Generation::Adsorbate {
                material,
                adsorbate,
                net_charge,
                top_layers,
                site_index,
                variant,
            } => (
                match variant {
                    AdsorbateVariant::Plain => self.config.adsorbate_generator.as_slice(),
                    AdsorbateVariant::Far => self.config.far_adsorbate_generator.as_slice(),
                },
                vec![
                    material.clone(),
                    adsorbate.clone(),
                    net_charge.to_string(),
                    top_layers.to_string(),
                    site_index.to_string(),
                ],
            ),
            Generation::Thermal {
                material,
                adsorbate,
                site_index,
                relaxed_dir,
            } => {
                let staging_dir = relaxed_dir.parent().unwrap_or(Path::new("."));
                let out = self
                    .run_in(staging_dir, &self.config.thermal_staging, std::slice::from_ref(material))
                    .map_err(|e| failure(e.to_string()))?;
                if !out.success {
                    return Err(failure(format!("staging {}", out.failure_summary())));
                }
                (
                    self.config.thermal_generator.as_slice(),
                    vec![material.clone(), adsorbate.clone(), site_index.to_string()],
                )
            }
        };

        let out = self
            .run_in(&self.root, argv, &args)
            .map_err(|e| failure(e.to_string()))?;
        if !out.success {
            return Err(failure(out.failure_summary()));
        }
        if !task.work_dir.is_dir() {
            return Err(failure(format!(
                "expected directory '{}' was not created",
                task.work_dir.display()
            )));
        }
        Ok(())
    }

    fn archive(&self, task: &Task) -> Result<()> {
        let out = self
            .run_in(task.context_dir(), &self.config.archiver, &[task.dir_name()])
            .map_err(|e| ClientError::ArchiveFailure {
                dir: task.work_dir.clone(),
                reason: e.to_string(),
            })?;
        if !out.success {
            return Err(ClientError::ArchiveFailure {
                dir: task.work_dir.clone(),
                reason: out.failure_summary(),
            });
        }
        Ok(())
    }

    fn check_output(&self, task: &Task) -> Result<bool> {
        let Some(checker) = &self.config.output_checker else {
            return Err(ClientError::CollaboratorFailed {
                name: "output_checker".to_string(),
                reason: "no output checker configured".to_string(),
            });
        };
        let name = task.dir_name();
        let out = self.run_in(task.context_dir(), checker, std::slice::from_ref(&name))?;
        if !out.success {
            return Err(ClientError::CollaboratorFailed {
                name: "output_checker".to_string(),
                reason: out.failure_summary(),
            });
        }
        let expected = format!("{}{}", markers::CHECKER_SUCCESS_PREFIX, name);
        Ok(out
            .combined()
            .lines()
            .any(|line| line.trim() == expected))
    }

    fn has_output_checker(&self) -> bool {
        self.config.output_checker.is_some()
    }

    fn extract_energy(&self, task: &Task) -> Result<()> {
        self.run_checked(
            "energy_extractor",
            task.context_dir(),
            &self.config.energy_extractor,
            &[task.dir_name()],
        )
    }

    fn extract_free_energy(&self, task: &Task) -> Result<()> {
        self.run_checked(
            "free_energy_extractor",
            task.context_dir(),
            &self.config.free_energy_extractor,
            &[task.dir_name()],
        )
    }

    fn aggregate(
        &self,
        material: &str,
        adsorbate: &str,
        variant: AdsorbateVariant,
    ) -> Result<()> {
        let (name, argv) = match variant {
            AdsorbateVariant::Plain => ("binding_aggregator", &self.config.binding_aggregator),
            AdsorbateVariant::Far => ("far_binding_aggregator", &self.config.far_binding_aggregator),
        };
        self.run_checked(
            name,
            &self.root,
            argv,
            &[material.to_string(), adsorbate.to_string()],
        )
    }
}
