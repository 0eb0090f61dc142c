// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional configuration file that Oxishift reads
//! at startup. Every key has a default, so a missing file, or an empty one,
//! yields a working configuration.
//!
//! # General Layout
//!
//! ```toml
//! mount_point = "/Volumes/Migration"
//! work_dir = "~/work"
//! app_support_dir = "~/Library/Application Support"
//!
//! [exclude]
//! work = [".DS_Store", "*.log", "node_modules/"]
//! ```
//!
//! Path values go through shell expansion, so `~` and environment variables
//! may be used freely.

use crate::registry::Purpose;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Settings layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Mount point of the network share holding every backup root.
    pub mount_point: ExpandedPath,

    /// Directory whose immediate subdirectories are work categories.
    pub work_dir: ExpandedPath,

    /// Directory whose top-level items are application configuration.
    pub app_support_dir: ExpandedPath,

    /// Exclusion pattern overrides per backup purpose.
    pub exclude: Excludes,
}

impl Settings {
    /// Load settings from target path.
    ///
    /// A missing file is not an error. Defaults are used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are invalid.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => "".parse(),
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }

    /// Exclusion patterns to apply when archiving for a purpose.
    ///
    /// Falls back to the purpose's built-in patterns when no override exists.
    pub fn excludes_for(&self, purpose: Purpose) -> Vec<String> {
        let custom = match purpose {
            Purpose::Migration => &self.exclude.migration,
            Purpose::User => &self.exclude.user,
            Purpose::Work => &self.exclude.work,
            Purpose::AppConfig => &self.exclude.app_config,
        };

        match custom {
            Some(patterns) => patterns.clone(),
            None => purpose
                .default_excludes()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mount_point: ExpandedPath::new("/Volumes/Migration"),
            work_dir: ExpandedPath::new("~/work"),
            app_support_dir: ExpandedPath::new("~/Library/Application Support"),
            exclude: Excludes::default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.mount_point = settings.mount_point.expand()?;
        settings.work_dir = settings.work_dir.expand()?;
        settings.app_support_dir = settings.app_support_dir.expand()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Exclusion pattern overrides.
///
/// Patterns follow gitignore syntax relative to the purpose's base directory.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Excludes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work: Option<Vec<String>>,

    #[serde(rename = "app-config", skip_serializing_if = "Option::is_none")]
    pub app_config: Option<Vec<String>>,
}

/// Path that has been run through shell expansion.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ExpandedPath(PathBuf);

impl ExpandedPath {
    /// Construct new path without expanding it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    fn expand(&self) -> Result<Self> {
        Ok(Self::new(
            shellexpand::full(self.to_string().as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        ))
    }
}

impl Display for ExpandedPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file exists but cannot be read.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
