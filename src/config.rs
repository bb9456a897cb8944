//! Well-known file locations and the defaults file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use eyre::WrapErr as _;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the base directory.
pub const BASE_PATH_ENV: &str = "STEPPATH";

const BASE_DIR_NAME: &str = ".step";

/// Base directory holding the CA root, configuration and defaults.
///
/// Resolved from `$STEPPATH`, falling back to `$HOME/.step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath {
    root: PathBuf,
}

impl BasePath {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BasePath { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = match env::var_os(BASE_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(BASE_DIR_NAME),
        };

        log::trace!("using base path {}", root.display());
        BasePath { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Default root certificate location.
    pub fn root_ca_path(&self) -> PathBuf {
        self.root.join("certs").join("root_ca.crt")
    }

    /// Default offline CA configuration location.
    pub fn ca_config_path(&self) -> PathBuf {
        self.root.join("config").join("ca.json")
    }

    /// Default location of the defaults file.
    pub fn defaults_path(&self) -> PathBuf {
        self.root.join("config").join("defaults.json")
    }

    /// Returns `explicit` if set, otherwise the default root location if it exists on disk.
    pub fn resolve_root(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_owned()),
            None => Some(self.root_ca_path()).filter(|path| path.exists()),
        }
    }
}

/// Fallback values for flags that were not given on the command line.
///
/// # Example JSON
///
/// ```json
/// {
///   "ca-url": "https://ca.example.com",
///   "root": "/home/user/.step/certs/root_ca.crt",
///   "ca-config": "/home/user/.step/config/ca.json"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_config: Option<PathBuf>,
}

impl Defaults {
    /// Loads the defaults file; a missing file yields empty defaults.
    pub fn load(path: &Path) -> eyre::Result<Defaults> {
        if !path.exists() {
            return Ok(Defaults::default());
        }

        let json = fs::read_to_string(path)
            .wrap_err_with(|| format!("error reading {}", path.display()))?;
        serde_json::from_str(&json).wrap_err_with(|| format!("error parsing {}", path.display()))
    }
}
