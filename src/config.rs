// src/config.rs

//! Configuration loading
//!
//! runepkg reads a TOML file naming the directories it works in:
//!
//! ```toml
//! runepkg_dir = "~/.local/share/runepkg"
//! control_dir = "~/.local/share/runepkg/control"
//! runepkg_db  = "~/.local/share/runepkg/db"
//! install_dir = "/"
//!
//! [install]
//! max_workers = 16
//! ```
//!
//! The file is looked up in a fixed order; see [`Config::locate`].

use crate::error::{Error, Result};
use crate::filesystem::MAX_WORKERS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RUNEPKG_CONFIG_PATH";

/// System-wide config file
pub const SYSTEM_CONFIG: &str = "/etc/runepkg/runepkgconfig";

/// Per-user config file, relative to the home directory
pub const USER_CONFIG: &str = ".runepkgconfig";

/// Tunables for install/remove transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Upper bound on file-copy workers (never above 32)
    pub max_workers: usize,
    /// Maximum dependency recursion depth
    pub max_depth: usize,
    /// Keep per-archive extraction directories after a transaction
    pub keep_extracted: bool,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            max_workers: MAX_WORKERS,
            max_depth: 64,
            keep_extracted: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    runepkg_dir: Option<String>,
    control_dir: Option<String>,
    runepkg_db: Option<String>,
    install_dir: Option<String>,
    install_root: Option<String>,
    #[serde(default)]
    install: InstallSettings,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub runepkg_dir: Option<PathBuf>,
    /// Extraction workspace
    pub control_dir: PathBuf,
    /// Package database root
    pub runepkg_db: PathBuf,
    /// Internal install-record root
    pub install_dir: PathBuf,
    /// Where package payloads are installed
    pub install_root: PathBuf,
    pub install: InstallSettings,
    /// File the configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn expand_path(key: &str, value: &str, home: Option<&Path>) -> Result<PathBuf> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::ConfigError(format!("'{}' is empty", key)));
    }

    let path = if value == "~" || value.starts_with("~/") {
        let home = home.ok_or_else(|| {
            Error::ConfigError(format!("cannot expand '~' in '{}': no home directory", key))
        })?;
        match value.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => home.to_path_buf(),
        }
    } else {
        PathBuf::from(value)
    };

    if !path.is_absolute() {
        return Err(Error::ConfigError(format!(
            "'{}' must be an absolute path, got '{}'",
            key, value
        )));
    }
    Ok(path)
}

fn required(key: &str, value: Option<String>, home: Option<&Path>) -> Result<PathBuf> {
    let value = value
        .ok_or_else(|| Error::ConfigError(format!("missing required key '{}'", key)))?;
    expand_path(key, &value, home)
}

impl Config {
    /// Parse configuration text, expanding `~` against `home`
    pub fn from_toml(text: &str, home: Option<&Path>) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| Error::ConfigError(e.to_string()))?;

        let install_dir = required("install_dir", raw.install_dir, home)?;
        let install_root = match raw.install_root {
            Some(value) => expand_path("install_root", &value, home)?,
            None => install_dir.clone(),
        };
        let runepkg_dir = raw
            .runepkg_dir
            .map(|value| expand_path("runepkg_dir", &value, home))
            .transpose()?;

        let mut install = raw.install;
        if install.max_workers == 0 || install.max_workers > MAX_WORKERS {
            return Err(Error::ConfigError(format!(
                "install.max_workers must be between 1 and {}",
                MAX_WORKERS
            )));
        }
        if install.max_depth == 0 {
            install.max_depth = InstallSettings::default().max_depth;
        }

        Ok(Self {
            runepkg_dir,
            control_dir: required("control_dir", raw.control_dir, home)?,
            runepkg_db: required("runepkg_db", raw.runepkg_db, home)?,
            install_dir,
            install_root,
            install,
            source: None,
        })
    }

    /// Load a specific config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let home = dirs::home_dir();
        let mut config = Self::from_toml(&text, home.as_deref())
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.source = Some(path.to_path_buf());
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Pick the config file to use
    ///
    /// Order: `explicit` (from `--config`), `env_value` (from
    /// `RUNEPKG_CONFIG_PATH`), [`SYSTEM_CONFIG`], then `~/.runepkgconfig`.
    /// An explicit path must exist. Otherwise the first existing file wins.
    pub fn locate(
        explicit: Option<&Path>,
        env_value: Option<&Path>,
        home: Option<&Path>,
    ) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(Error::ConfigError(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let mut candidates = Vec::new();
        if let Some(path) = env_value.filter(|p| !p.as_os_str().is_empty()) {
            candidates.push(path.to_path_buf());
        }
        candidates.push(PathBuf::from(SYSTEM_CONFIG));
        if let Some(home) = home {
            candidates.push(home.join(USER_CONFIG));
        }

        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }

        let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(Error::ConfigError(format!(
            "no configuration file found (looked for ${}, {})",
            CONFIG_ENV,
            searched.join(", ")
        )))
    }

    /// Locate and load the configuration for this process
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let env_value = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let home = dirs::home_dir();
        let path = Self::locate(explicit, env_value.as_deref(), home.as_deref())?;
        Self::load(&path)
    }

    /// Configuration with every directory under `base`
    pub fn with_base_dir(base: &Path) -> Self {
        let root = base.join("root");
        Self {
            runepkg_dir: Some(base.to_path_buf()),
            control_dir: base.join("control"),
            runepkg_db: base.join("db"),
            install_dir: root.clone(),
            install_root: root,
            install: InstallSettings::default(),
            source: None,
        }
    }

    /// Create the working directories (idempotent)
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.control_dir,
            &self.runepkg_db,
            &self.install_dir,
            &self.install_root,
        ] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::ConfigError(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}
