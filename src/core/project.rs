//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::team::TeamRoster;

/// Directory holding change control state inside a project
pub const TCC_DIR: &str = ".tcc";

/// Represents a change control project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of .tcc/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(TCC_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path, max_depth: usize) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let project = Self { root };
        if project.tcc_dir().exists() {
            return Err(ProjectError::AlreadyExists(project.root));
        }

        std::fs::create_dir_all(project.tcc_dir())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::create_dir_all(project.parts_dir())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        std::fs::write(project.config_path(), Self::default_config(max_depth))
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(project.team_path(), TeamRoster::default_template())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(project)
    }

    fn default_config(max_depth: usize) -> String {
        format!(
            r#"# Change control project configuration

# Actor recorded on change orders (can be overridden by TCC_AUTHOR)
# author: ""

# Project id stamped on new change orders (default: directory name)
# project_id: ""

# Default output format (auto, yaml, json, tsv, csv, id)
# default_format: auto

bom:
  # Deepest BOM level walked during impact analysis
  max_depth: {max_depth}
"#
        )
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .tcc state directory
    pub fn tcc_dir(&self) -> PathBuf {
        self.root.join(TCC_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.tcc_dir().join("config.yaml")
    }

    pub fn team_path(&self) -> PathBuf {
        self.tcc_dir().join("team.yaml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.tcc_dir().join("changes.db")
    }

    pub fn sourcing_path(&self) -> PathBuf {
        self.tcc_dir().join("sourcing.yaml")
    }

    /// Part files live beside .tcc/, outside the state directory
    pub fn parts_dir(&self) -> PathBuf {
        self.root.join("parts")
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a change control project (searched from {searched_from:?}). Run 'tcc init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("change control project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path(), 20).unwrap();

        assert!(project.tcc_dir().is_dir());
        assert!(project.config_path().exists());
        assert!(project.team_path().exists());
        assert!(project.parts_dir().is_dir());
        assert!(!project.db_path().exists());
    }

    #[test]
    fn test_init_writes_explicit_depth() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path(), 7).unwrap();
        let contents = std::fs::read_to_string(project.config_path()).unwrap();
        let config: Config = serde_yml::from_str(&contents).unwrap();
        assert_eq!(config.bom.max_depth, Some(7));
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path(), 20).unwrap();

        let err = Project::init(tmp.path(), 20).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
    }

    #[test]
    fn test_project_discover_finds_tcc_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path(), 20).unwrap();

        let subdir = tmp.path().join("parts/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_tcc_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }
}
