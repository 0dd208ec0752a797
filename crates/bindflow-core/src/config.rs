use crate::constants::{defaults, dirs, files, markers};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

fn default_max_files() -> usize {
    20
}

fn default_max_age_days() -> u64 {
    14
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    /// Submission wrapper. Run from the task's parent directory with the task directory name appended.
    pub submit_command: Vec<String>,
    /// Queue query. The job id is appended.
    pub queue_command: Vec<String>,
    /// Regex with one capture group matching the job id in the submitter's output.
    pub job_id_pattern: String,
    pub poll_interval_secs: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_command: vec!["gam-subvasp.sh".to_string()],
            queue_command: vec!["squeue".to_string(), "-j".to_string()],
            job_id_pattern: defaults::JOB_ID_PATTERN.to_string(),
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub top_layers: u32,
    pub output_log: String,
    pub success_marker: String,
    pub scheduler_output_prefix: String,
    pub scheduler_output_suffix: String,
    pub recovery_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_layers: defaults::TOP_LAYERS,
            output_log: files::OUTPUT_LOG.to_string(),
            success_marker: markers::SUCCESS.to_string(),
            scheduler_output_prefix: files::SCHEDULER_OUTPUT_PREFIX.to_string(),
            scheduler_output_suffix: files::SCHEDULER_OUTPUT_SUFFIX.to_string(),
            recovery_rounds: defaults::RECOVERY_ROUNDS,
        }
    }
}

/// External commands, as argv prefixes. Arguments are appended per call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct CollaboratorConfig {
    pub slab_generator: Vec<String>,
    pub adsorbate_generator: Vec<String>,
    pub far_adsorbate_generator: Vec<String>,
    pub thermal_staging: Vec<String>,
    pub thermal_generator: Vec<String>,
    pub archiver: Vec<String>,
    /// When set, relaxation outcomes are judged by this checker instead of reading the log directly.
    pub output_checker: Option<Vec<String>>,
    pub energy_extractor: Vec<String>,
    pub free_energy_extractor: Vec<String>,
    pub binding_aggregator: Vec<String>,
    pub far_binding_aggregator: Vec<String>,
}

fn python(script: &str) -> Vec<String> {
    vec!["python".to_string(), script.to_string()]
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            slab_generator: python("slab.py"),
            adsorbate_generator: python("adsorbate-NELECT.py"),
            far_adsorbate_generator: python("far-adsorbate-NELECT.py"),
            thermal_staging: vec!["r2t.sh".to_string()],
            thermal_generator: python("thermal.py"),
            archiver: vec!["backup.sh".to_string()],
            output_checker: None,
            energy_extractor: vec!["getE.sh".to_string()],
            free_energy_extractor: vec!["getG.sh".to_string()],
            binding_aggregator: python("binding.py"),
            far_binding_aggregator: python("far-binding.py"),
        }
    }
}

impl CollaboratorConfig {
    fn named_commands(&self) -> Vec<(&'static str, &Vec<String>)> {
        let mut commands = vec![
            ("slab_generator", &self.slab_generator),
            ("adsorbate_generator", &self.adsorbate_generator),
            ("far_adsorbate_generator", &self.far_adsorbate_generator),
            ("thermal_staging", &self.thermal_staging),
            ("thermal_generator", &self.thermal_generator),
            ("archiver", &self.archiver),
            ("energy_extractor", &self.energy_extractor),
            ("free_energy_extractor", &self.free_energy_extractor),
            ("binding_aggregator", &self.binding_aggregator),
            ("far_binding_aggregator", &self.far_binding_aggregator),
        ];
        if let Some(checker) = &self.output_checker {
            commands.push(("output_checker", checker));
        }
        commands
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut commands = self.collaborators.named_commands();
        commands.push(("submit_command", &self.scheduler.submit_command));
        commands.push(("queue_command", &self.scheduler.queue_command));
        for (name, argv) in commands {
            if argv.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(ConfigError::EmptyCommand(name.to_string()));
            }
        }
        if !self.scheduler.job_id_pattern.contains('(') {
            return Err(ConfigError::General(format!(
                "job_id_pattern '{}' must contain a capture group for the job id",
                self.scheduler.job_id_pattern
            )));
        }
        if self.pipeline.success_marker.is_empty() {
            return Err(ConfigError::General(
                "success_marker must not be empty".to_string(),
            ));
        }
        if self.pipeline.output_log.is_empty() {
            return Err(ConfigError::General(
                "output_log must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn expand_commands(&mut self) -> Result<(), ConfigError> {
        let c = &mut self.collaborators;
        let mut argvs: Vec<&mut Vec<String>> = vec![
            &mut c.slab_generator,
            &mut c.adsorbate_generator,
            &mut c.far_adsorbate_generator,
            &mut c.thermal_staging,
            &mut c.thermal_generator,
            &mut c.archiver,
            &mut c.energy_extractor,
            &mut c.free_energy_extractor,
            &mut c.binding_aggregator,
            &mut c.far_binding_aggregator,
            &mut self.scheduler.submit_command,
            &mut self.scheduler.queue_command,
        ];
        if let Some(checker) = c.output_checker.as_mut() {
            argvs.push(checker);
        }
        for argv in argvs {
            for part in argv.iter_mut() {
                *part = expand(part)?;
            }
        }
        Ok(())
    }
}

fn expand(value: &str) -> Result<String, ConfigError> {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .map_err(|e| ConfigError::PathExpansion {
            path: value.to_string(),
            reason: e.to_string(),
        })
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(dirs::APP);
    xdg_dirs
        .get_config_home()
        .map(|home| home.join("config.toml"))
        .ok_or_else(|| ConfigError::Xdg("Could not find config home directory".to_string()))
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = fs_err::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.expand_commands()?;
    config.validate()?;
    Ok(config)
}

/// Loads the user configuration, falling back to defaults when no file exists.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = default_config_path()?;
    if !path.exists() {
        tracing::debug!(
            "No configuration at '{}', using defaults.",
            path.display()
        );
        return Ok(Config::default());
    }
    load_from_path(&path)
}

pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs_err::write(path, content)?;
    Ok(())
}
