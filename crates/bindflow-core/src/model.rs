use crate::constants::dirs;
use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SlabRelax,
    AdsorbateRelax,
    ChargedVariantRelax,
    ThermalCorrection,
}

impl Stage {
    pub fn is_relaxation(self) -> bool {
        !matches!(self, Stage::ThermalCorrection)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SlabRelax => write!(f, "slab-relax"),
            Stage::AdsorbateRelax => write!(f, "adsorbate-relax"),
            Stage::ChargedVariantRelax => write!(f, "charged-variant-relax"),
            Stage::ThermalCorrection => write!(f, "thermal-correction"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStageError(pub String);

impl fmt::Display for ParseStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid stage: '{}'. Valid values are: slab-relax, adsorbate-relax, charged-variant-relax, thermal-correction",
            self.0
        )
    }
}

impl std::error::Error for ParseStageError {}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slab-relax" => Ok(Stage::SlabRelax),
            "adsorbate-relax" => Ok(Stage::AdsorbateRelax),
            "charged-variant-relax" => Ok(Stage::ChargedVariantRelax),
            "thermal-correction" => Ok(Stage::ThermalCorrection),
            _ => Err(ParseStageError(s.to_string())),
        }
    }
}

/// Scheduler-assigned job identifier. Only meaningful to the scheduler that issued it.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(s: &str) -> Self {
        JobHandle(s.to_string())
    }
}

/// One schedulable unit of work. Recomputed from its identifying fields, never stored.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Task {
    pub stage: Stage,
    pub subject: String,
    pub work_dir: PathBuf,
}

impl Task {
    /// Name of the working directory itself, passed as the argument to per-task collaborators.
    pub fn dir_name(&self) -> String {
        self.work_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Directory the per-task collaborators are run from.
    pub fn context_dir(&self) -> &Path {
        self.work_dir.parent().unwrap_or(Path::new("."))
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.stage, self.subject)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.work_dir.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// No working directory yet.
    Absent,
    /// Working directory exists but nothing has produced an output log and no job is active.
    Prepared,
    /// A scheduler job for the working directory is queued or running.
    Submitted(JobHandle),
    /// Output log exists but inspecting it did not yield a verdict.
    AwaitingCheck,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskState::Succeeded)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Absent => write!(f, "absent"),
            TaskState::Prepared => write!(f, "prepared"),
            TaskState::Submitted(handle) => write!(f, "submitted ({})", handle),
            TaskState::AwaitingCheck => write!(f, "awaiting-check"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// The positional arguments of one driver invocation, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub material: String,
    pub adsorbates: Vec<String>,
    pub site_index: u32,
    pub net_charge: i32,
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(DomainError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl RunRequest {
    pub fn parse(
        material: &str,
        adsorbates: &str,
        site_index: &str,
        net_charge: &str,
    ) -> Result<Self, DomainError> {
        let material = material.trim();
        if material.is_empty() {
            return Err(DomainError::EmptyMaterial);
        }
        validate_name(material)?;

        let mut list: Vec<String> = Vec::new();
        for ads in adsorbates.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            validate_name(ads)?;
            if list.iter().any(|existing| existing == ads) {
                return Err(DomainError::DuplicateAdsorbate(ads.to_string()));
            }
            list.push(ads.to_string());
        }
        if list.is_empty() {
            return Err(DomainError::EmptyAdsorbateList(adsorbates.to_string()));
        }

        let site_index = site_index
            .trim()
            .parse::<u32>()
            .map_err(|_| DomainError::InvalidSiteIndex(site_index.to_string()))?;
        let net_charge = net_charge
            .trim()
            .parse::<i32>()
            .map_err(|_| DomainError::InvalidNetCharge(net_charge.to_string()))?;

        Ok(Self {
            material: material.to_string(),
            adsorbates: list,
            site_index,
            net_charge,
        })
    }

    pub fn is_charged(&self) -> bool {
        self.net_charge != 0
    }
}

/// Directory layout of a run. `root` is the launch (support) directory; adsorbate
/// variants live in sibling directories named after the adsorbate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    workspace: PathBuf,
}

impl Layout {
    pub fn new(root: PathBuf) -> Result<Self, DomainError> {
        let workspace = root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| DomainError::NoParentDirectory(root.clone()))?;
        Ok(Self { root, workspace })
    }

    pub fn slab_dir(&self, material: &str) -> PathBuf {
        self.root.join(material)
    }

    pub fn adsorbate_root(&self, adsorbate: &str) -> PathBuf {
        self.workspace.join(adsorbate)
    }

    pub fn adsorbate_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.adsorbate_root(adsorbate).join(material)
    }

    pub fn far_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.adsorbate_root(adsorbate)
            .join(format!("{}{}", dirs::FAR_PREFIX, material))
    }

    pub fn thermal_root(&self, adsorbate: &str) -> PathBuf {
        self.adsorbate_root(adsorbate).join(dirs::THERMAL)
    }

    pub fn thermal_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.thermal_root(adsorbate).join(material)
    }

    pub fn task(&self, stage: Stage, material: &str, subject: &str) -> Task {
        let work_dir = match stage {
            Stage::SlabRelax => self.slab_dir(material),
            Stage::AdsorbateRelax => self.adsorbate_dir(subject, material),
            Stage::ChargedVariantRelax => self.far_dir(subject, material),
            Stage::ThermalCorrection => self.thermal_dir(subject, material),
        };
        Task {
            stage,
            subject: subject.to_string(),
            work_dir,
        }
    }
}
