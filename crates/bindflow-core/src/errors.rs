use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("XDG Base Directory Error: {0}")]
    Xdg(String),

    #[error("Failed to expand path '{path}': {reason}")]
    PathExpansion { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    General(String),

    #[error("Collaborator command '{0}' is empty. Each collaborator needs at least a program name.")]
    EmptyCommand(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Material name must not be empty.")]
    EmptyMaterial,

    #[error("Invalid name '{0}'. Names must not contain path separators or be '.'/'..'.")]
    InvalidName(String),

    #[error("Adsorbate list '{0}' is empty. Pass one or more comma-separated adsorbate names.")]
    EmptyAdsorbateList(String),

    #[error("Adsorbate '{0}' is listed more than once.")]
    DuplicateAdsorbate(String),

    #[error("Invalid site index '{0}'. Expected a non-negative integer.")]
    InvalidSiteIndex(String),

    #[error("Invalid net charge '{0}'. Expected an integer.")]
    InvalidNetCharge(String),

    #[error("Cannot derive the workspace parent of '{0}'.")]
    NoParentDirectory(PathBuf),
}
