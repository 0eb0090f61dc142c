// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup and restore runs.
//!
//! A __run__ processes every category of one backup purpose in order, one
//! category fully before the next. Backup runs measure, archive, and push
//! each category to the purpose's backup root. Restore runs discover stored
//! archives, check them for conflicts with existing files, extract them, and
//! normalize ownership.
//!
//! # Failure Handling
//!
//! Every failure surfaces as a [`MigrateError`] with a [`Severity`]:
//!
//! - __Fatal__ failures abort the run, e.g., missing mount point, missing
//!   base directory, or nothing to process at all.
//! - __Recoverable__ failures only affect one category or archive. They are
//!   reported, counted, and the run moves on.
//! - __Declined__ means the operator answered "no" to an overwrite prompt.
//!   The archive is skipped and counted as neither success nor failure.
//!
//! A run that completes returns a summary with its counts, even if some
//! categories failed, so callers can still tell partial failure apart from
//! full success.
//!
//! # See Also
//!
//! 1. [`backup`]
//! 2. [`restore`]

pub mod backup;
pub mod restore;

use crate::{
    archive::{exclude::ExcludeError, ArchiveError, Archiver, TarGz},
    config::Settings,
    fault::Fault,
    measure::MeasureError,
    path::{home_dir, NoWayHome},
    registry::{Purpose, RegistryError},
    transfer::TransferError,
};

use std::{error::Error as StdError, path::PathBuf};
use tracing::warn;

/// Where a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Purpose of the run.
    pub purpose: Purpose,

    /// Directory categories are read from, and restored into.
    pub base: PathBuf,

    /// Mount point of the network share.
    pub mount: PathBuf,

    /// Exclusion rules applied when archiving.
    pub excludes: Vec<String>,
}

impl Layout {
    /// Resolve layout of a purpose from settings.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory cannot be determined.
    pub fn resolve(settings: &Settings, purpose: Purpose) -> Result<Self, NoWayHome> {
        let base = match purpose {
            Purpose::Migration | Purpose::User => home_dir()?,
            Purpose::Work => settings.work_dir.as_path().to_path_buf(),
            Purpose::AppConfig => settings.app_support_dir.as_path().to_path_buf(),
        };

        Ok(Self {
            purpose,
            base,
            mount: settings.mount_point.as_path().to_path_buf(),
            excludes: settings.excludes_for(purpose),
        })
    }
}

/// Runs backups and restores for one layout.
#[derive(Debug)]
pub struct Migrator<A = TarGz>
where
    A: Archiver,
{
    pub(crate) layout: Layout,
    pub(crate) archiver: A,
}

impl Migrator<TarGz> {
    /// Construct new migrator using tar and gzip archives.
    pub fn with_layout(layout: Layout) -> Self {
        Self::new(layout, TarGz)
    }
}

impl<A> Migrator<A>
where
    A: Archiver,
{
    /// Construct new migrator.
    pub fn new(layout: Layout, archiver: A) -> Self {
        Self { layout, archiver }
    }
}

/// Ask the operator to confirm a destructive step.
pub trait Confirm {
    /// Return `true` only on an affirmative answer.
    fn confirm(&mut self, message: &str) -> bool;
}

/// Interactive confirmation through the terminal.
///
/// A prompt that cannot be shown, e.g., without a terminal, counts as "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireConfirm;

impl Confirm for InquireConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        match inquire::Confirm::new(message).with_default(false).prompt() {
            Ok(answer) => answer,
            Err(err) => {
                warn!("cannot ask for confirmation: {err}");
                false
            }
        }
    }
}

/// Answer every confirmation affirmatively.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _message: &str) -> bool {
        true
    }
}

/// How a failure affects the rest of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the run.
    Fatal,

    /// Report, skip the current category or archive, and continue.
    Recoverable,

    /// Operator declined, skip without counting a failure.
    Declined,
}

/// Run error types.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Category registry cannot be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Nothing can be measured.
    #[error(transparent)]
    Measure(#[from] MeasureError),

    /// Share or backup root is unusable.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Exclusion rules are invalid.
    #[error(transparent)]
    Exclude(#[from] ExcludeError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Restore target directory cannot be created.
    #[error("failed to prepare restore target {:?}", path.display())]
    PrepareTarget {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Scratch space for an archive cannot be created.
    #[error("{name}: failed to create scratch directory")]
    Scratch {
        #[source]
        source: std::io::Error,
        name: String,
    },

    /// Category cannot be archived.
    #[error("{name}: compression failed")]
    Pack {
        #[source]
        source: ArchiveError,
        name: String,
    },

    /// Archive cannot be copied to backup root.
    #[error("{name}: copy to backup root failed")]
    Push {
        #[source]
        source: TransferError,
        name: String,
    },

    /// Stored archive cannot be read.
    #[error("{name}: cannot read archive")]
    Inspect {
        #[source]
        source: ArchiveError,
        name: String,
    },

    /// Stored archive cannot be extracted.
    #[error("{name}: extraction failed")]
    Extract {
        #[source]
        source: ArchiveError,
        name: String,
    },

    /// Operator declined to overwrite existing files.
    #[error("{name}: skipped, existing files kept")]
    Declined { name: String },
}

impl MigrateError {
    /// How this failure affects the rest of the run.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Registry(_)
            | Self::Measure(_)
            | Self::Transfer(_)
            | Self::Exclude(_)
            | Self::IndicatifStyleTemplate(_)
            | Self::PrepareTarget { .. } => Severity::Fatal,
            Self::Scratch { .. }
            | Self::Pack { .. }
            | Self::Push { .. }
            | Self::Inspect { .. }
            | Self::Extract { .. } => Severity::Recoverable,
            Self::Declined { .. } => Severity::Declined,
        }
    }

    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Registry(err) => err.fault(),
            Self::Measure(err) => err.fault(),
            Self::Transfer(err) | Self::Push { source: err, .. } => err.fault(),
            Self::Pack { source, .. }
            | Self::Inspect { source, .. }
            | Self::Extract { source, .. } => source.fault(),
            Self::PrepareTarget { source, .. } | Self::Scratch { source, .. } => Fault::of(source),
            Self::Exclude(_) | Self::IndicatifStyleTemplate(_) | Self::Declined { .. } => Fault::Other,
        }
    }
}

/// Render error with its whole source chain on one line.
pub(crate) fn chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Friendly result alias :3
pub type Result<T, E = MigrateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn severity_of_errors() {
        let fatal = MigrateError::Transfer(TransferError::MountMissing {
            mount: PathBuf::from("/Volumes/Migration"),
        });
        let recoverable = MigrateError::Push {
            source: TransferError::NoArchives {
                root: PathBuf::from("/x"),
            },
            name: "work".into(),
        };
        let declined = MigrateError::Declined {
            name: "credentials".into(),
        };

        assert_eq!(fatal.severity(), Severity::Fatal);
        assert_eq!(recoverable.severity(), Severity::Recoverable);
        assert_eq!(declined.severity(), Severity::Declined);
    }

    #[test]
    fn fault_of_errors() {
        let denied = MigrateError::Pack {
            source: ArchiveError::Create {
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                path: PathBuf::from("/tmp/a.tar.gz"),
            },
            name: "a".into(),
        };
        let missing = MigrateError::Transfer(TransferError::RootMissing {
            root: PathBuf::from("/share/backup-work"),
        });
        let other = MigrateError::Extract {
            source: ArchiveError::OutsideBase {
                path: PathBuf::from("/elsewhere"),
            },
            name: "a".into(),
        };

        assert_eq!(denied.fault(), Fault::PermissionDenied);
        assert_eq!(missing.fault(), Fault::Missing);
        assert_eq!(other.fault(), Fault::Other);
    }

    #[test]
    fn chain_includes_sources() {
        let error = MigrateError::Extract {
            source: ArchiveError::Unpack {
                source: std::io::Error::other("disk full"),
                path: PathBuf::from("/share/a.tar.gz"),
            },
            name: "a".into(),
        };

        assert_eq!(
            chain(&error),
            r#"a: extraction failed: failed to extract archive "/share/a.tar.gz": disk full"#
        );
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn layout_bases_per_purpose() -> anyhow::Result<()> {
        let settings: Settings = r#"
            mount_point = "/mnt/share"
            work_dir = "~/code"
        "#
        .parse()?;

        let migration = Layout::resolve(&settings, Purpose::Migration)?;
        assert_eq!(migration.base, PathBuf::from("/home/blah"));
        assert_eq!(migration.mount, PathBuf::from("/mnt/share"));

        let work = Layout::resolve(&settings, Purpose::Work)?;
        assert_eq!(work.base, PathBuf::from("/home/blah/code"));

        let apps = Layout::resolve(&settings, Purpose::AppConfig)?;
        assert_eq!(
            apps.base,
            PathBuf::from("/home/blah/Library/Application Support")
        );

        Ok(())
    }
}
