//! Settings loading with multi-layer merge

use crate::config::Params;
use crate::sink::OutputMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level flowtree settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Logging options
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Root parameters every invocation starts from
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level for the `flowtree` target (error, warn, info, debug, trace)
    pub level: Option<String>,

    /// Also write logs to this file
    pub file: Option<PathBuf>,

    /// Where flow log lines go
    pub output: Option<OutputMode>,
}

impl Settings {
    /// Load settings from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/flowtree/config.toml
    /// 3. .flowtree/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                let user = Self::load_file(&user_path)
                    .with_context(|| format!("loading {}", user_path.display()))?;
                settings.merge(user);
            }
        }

        let project_path = Self::project_config_path(project_dir);
        if project_path.exists() {
            let project = Self::load_file(&project_path)
                .with_context(|| format!("loading {}", project_path.display()))?;
            settings.merge(project);
        }

        Ok(settings)
    }

    /// Load settings from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// ~/.config/flowtree/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("flowtree/config.toml"))
    }

    pub fn project_config_path(project_dir: Option<&Path>) -> PathBuf {
        project_dir
            .map(|p| p.join(".flowtree/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".flowtree/config.toml"))
    }

    /// Merge another layer into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.logging.level.is_some() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file.is_some() {
            self.logging.file = other.logging.file;
        }
        if other.logging.output.is_some() {
            self.logging.output = other.logging.output;
        }

        for (key, value) in other.params {
            self.params.insert(key, value);
        }
    }
}
