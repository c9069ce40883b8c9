//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::workflow::{ChangeOrderError, EngineConfig};
use crate::core::Project;

/// BOM traversal settings
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct BomConfig {
    /// Deepest level impact analysis will walk; required before implementing
    pub max_depth: Option<usize>,
}

/// Change control configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Actor recorded on change orders and audit entries
    pub author: Option<String>,

    /// Default output format
    pub default_format: Option<String>,

    /// Project identifier stamped on new change orders
    pub project_id: Option<String>,

    pub bom: BomConfig,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/tcc/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.tcc/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        if let Ok(author) = std::env::var("TCC_AUTHOR") {
            config.author = Some(author);
        }
        if let Ok(depth) = std::env::var("TCC_BOM_MAX_DEPTH") {
            match depth.parse() {
                Ok(d) => config.bom.max_depth = Some(d),
                Err(_) => tracing::warn!(value = %depth, "ignoring invalid TCC_BOM_MAX_DEPTH"),
            }
        }

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tcc")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.project_id.is_some() {
            self.project_id = other.project_id;
        }
        if other.bom.max_depth.is_some() {
            self.bom.max_depth = other.bom.max_depth;
        }
    }

    /// Get the author name, falling back to git config or username
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }

        // Try git config
        if let Ok(output) = std::process::Command::new("git")
            .args(["config", "user.name"])
            .output()
        {
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }

        // Fall back to username
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Engine settings; the BOM depth limit has no default
    pub fn engine_config(&self) -> Result<EngineConfig, ChangeOrderError> {
        self.bom.max_depth.map(EngineConfig::new).ok_or_else(|| {
            ChangeOrderError::Validation(
                "bom.max_depth is not configured; set it in .tcc/config.yaml or TCC_BOM_MAX_DEPTH"
                    .to_string(),
            )
        })
    }

    /// Project id from config, else the project directory name
    pub fn project_id(&self, project: &Project) -> String {
        if let Some(ref id) = self.project_id {
            return id.clone();
        }
        project
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string())
    }
}
