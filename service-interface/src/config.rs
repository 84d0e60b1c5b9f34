//! Runtime configuration.
//!
//! ```toml
//! main_service = "org.example.foo"
//!
//! [services]
//! dir = "/usr/lib/browser/services"
//! extension = "so"
//! name_marker = "lib"
//! include_linked = true
//! ```

use crate::error::ConfigError;
use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Points [`Config::from_env`] at a TOML file.
pub const CONFIG_PATH_ENV: &str = "SERVICE_RUNTIME_CONFIG";

/// Overrides `services.dir` after the file (if any) has been read.
pub const SERVICES_DIR_ENV: &str = "SERVICES_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service the application entry point instantiates first.
    pub main_service: Option<String>,
    pub services: ServicesConfig,
}

/// How the registry discovers plugin files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Directory scanned (non-recursively) for service libraries.
    pub dir: PathBuf,
    /// Shared-library extension, compared case-insensitively and without the dot.
    pub extension: String,
    /// Substring a file name must contain to be considered a service library.
    pub name_marker: String,
    /// Also register factories linked into the running binary.
    pub include_linked: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("services"),
            extension: default_extension().to_string(),
            name_marker: "lib".to_string(),
            include_linked: true,
        }
    }
}

fn default_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

impl Config {
    /// Configuration scanning `dir` with all other settings at their defaults.
    pub fn with_services_dir(dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.services.dir = dir.into();
        config
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build the configuration used by the process-wide registry.
    ///
    /// Reads the file named by `SERVICE_RUNTIME_CONFIG` when set, then applies
    /// `SERVICES_DIR`. A broken file is logged and defaults are used instead.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => match Self::from_file(Path::new(&path)) {
                Ok(config) => config,
                Err(err) => {
                    warn!("{}; falling back to default configuration", err);
                    Self::default()
                }
            },
            None => Self::default(),
        };
        if let Some(dir) = lookup(SERVICES_DIR_ENV) {
            debug!("services dir overridden by {}: {}", SERVICES_DIR_ENV, dir);
            config.services.dir = PathBuf::from(dir);
        }
        config
    }
}
