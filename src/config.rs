//! Runtime configuration (`pych.toml`)

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "pych.toml";

/// Environment variable with extra library directories
pub const LIBRARY_PATH_VAR: &str = "PYCH_LIBRARY_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directories searched, in order, for shared libraries
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Load a library as soon as a declaration using it is hinted
    #[serde(default)]
    pub preload: bool,
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    ///
    /// Relative search paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.search_paths = config
                .search_paths
                .into_iter()
                .map(|p| if p.is_relative() { base.join(p) } else { p })
                .collect();
        }
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load `pych.toml` from current directory or parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(err) => tracing::warn!(path = %config_path.display(), error = %err, "Ignoring unreadable config"),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Append directories from `PYCH_LIBRARY_PATH`
    pub fn with_env(mut self) -> Self {
        if let Some(paths) = std::env::var_os(LIBRARY_PATH_VAR) {
            self.search_paths.extend(std::env::split_paths(&paths));
        }
        self
    }

    /// Discovered config plus environment search paths
    pub fn from_env() -> Self {
        Self::discover().with_env()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }
}
