//! Project configuration: `lathe.toml` with defaults.
//!
//! Precedence is CLI flag > `lathe.toml` > built-in default; the CLI layer
//! applies its overrides after loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "lathe.toml";

/// Top-level configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LatheToml {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleConfig {
    /// Command used to reach the generative/QC oracles
    #[serde(default = "default_oracle_command")]
    pub command: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { command: default_oracle_command() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Attempt budget per component and per attachment
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Settling delay before each capture, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    /// Vertical camera field of view, degrees
    #[serde(default = "default_fov_degrees")]
    pub fov_degrees: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { fov_degrees: default_fov_degrees() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Directory that holds per-run artifacts
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { run_dir: default_run_dir() }
    }
}

fn default_oracle_command() -> String {
    "claude".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_settle_ms() -> u64 {
    100
}

fn default_fov_degrees() -> f64 {
    50.0
}

fn default_run_dir() -> PathBuf {
    PathBuf::from(".lathe")
}

impl LatheToml {
    /// Load `lathe.toml` from the project directory, falling back to
    /// defaults when the file does not exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Absolute run directory for a given project directory.
    pub fn run_dir(&self, project_dir: &Path) -> PathBuf {
        if self.paths.run_dir.is_absolute() {
            self.paths.run_dir.clone()
        } else {
            project_dir.join(&self.paths.run_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let config = LatheToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.oracle.command, "claude");
        assert_eq!(config.pipeline.max_attempts, 4);
        assert_eq!(config.pipeline.settle_ms, 100);
        assert_eq!(config.stage.fov_degrees, 50.0);
        assert_eq!(config.paths.run_dir, PathBuf::from(".lathe"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[pipeline]\nmax_attempts = 2\n",
        )
        .unwrap();
        let config = LatheToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.pipeline.max_attempts, 2);
        assert_eq!(config.oracle.command, "claude");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "pipeline = 12").unwrap();
        assert!(LatheToml::load_or_default(dir.path()).is_err());
    }

    #[test]
    fn run_dir_resolves_relative_to_project() {
        let config = LatheToml::default();
        let resolved = config.run_dir(Path::new("/work/project"));
        assert_eq!(resolved, PathBuf::from("/work/project/.lathe"));
    }

    #[test]
    fn round_trip_serialization() {
        let config = LatheToml::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: LatheToml = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
