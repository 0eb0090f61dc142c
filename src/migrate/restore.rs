// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Restore runs.
//!
//! A restore run discovers archives in the purpose's backup root, either all
//! of them or the one belonging to a named category, and processes them in
//! name order.
//!
//! # Conflicts
//!
//! Before extracting, the archive's table of contents is compared with the
//! target directory. Non-directory entries whose path already exists form the
//! __conflict set__. Only the first few conflicts are collected, since one
//! is enough to require confirmation. When conflicts exist the operator must
//! confirm, otherwise the archive is skipped entirely. Nothing is ever
//! partially extracted.

use crate::{
    archive::{top_level, ArchiveEntry, Archiver},
    measure::format_size,
    migrate::{chain, Confirm, MigrateError, Migrator, Result, Severity},
    owner::{normalize, Identity, DEFAULT_GROUP},
    transfer::{BackupRoot, StoredArchive},
};

use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// Most conflicts collected per archive.
pub const CONFLICT_LIMIT: usize = 5;

/// Most entries shown when previewing an archive.
pub const PREVIEW_LIMIT: usize = 10;

/// Restore run options.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Preview archives instead of extracting them.
    pub dry_run: bool,

    /// Restrict run to the archive of one category or item.
    pub name: Option<String>,
}

/// Outcome of a completed restore run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Archives discovered.
    pub total: usize,

    /// Archives extracted, or previewed on dry runs.
    pub processed: usize,

    /// Archives that could not be read or extracted.
    pub failed: usize,

    /// Archives skipped because the operator declined.
    pub declined: usize,
}

/// Outcome of restoring one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStep {
    /// Archive extracted, with number of entries written.
    Extracted(usize),

    /// Dry run, archive contents shown.
    Previewed(usize),
}

/// Collect entries whose target path already exists under `base`.
///
/// Directories are not conflicts, since extraction merges into them. Stops
/// after `limit` conflicts.
pub fn conflicts(entries: &[ArchiveEntry], base: &Path, limit: usize) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .filter(|entry| base.join(&entry.path).symlink_metadata().is_ok())
        .map(|entry| entry.path.clone())
        .take(limit)
        .collect()
}

impl<A> Migrator<A>
where
    A: Archiver,
{
    /// List stored archives with their sizes.
    ///
    /// Has no side effects.
    ///
    /// # Errors
    ///
    /// - Return [`MigrateError::Registry`] if a fixed registry has no
    ///   category of the given name.
    /// - Return [`MigrateError::Transfer`] if mount point or backup root is
    ///   missing, or if no matching archive exists.
    pub fn list(&self, name: Option<&str>) -> Result<Vec<StoredArchive>> {
        if let Some(name) = name {
            self.layout.purpose.lookup(name)?;
        }
        let root = BackupRoot::for_restore(&self.layout.mount, self.layout.purpose)?;
        let archives = root.discover(name)?;

        info!("{} archives in {:?}", archives.len(), root.as_path().display());
        for archive in &archives {
            info!("  {:<40} {:>8}", archive.name, format_size(archive.size));
        }

        Ok(archives)
    }

    /// Restore archives of the layout's purpose into its base directory.
    ///
    /// # Errors
    ///
    /// Only fatal failures are returned:
    ///
    /// - Return [`MigrateError::Registry`] if a fixed registry has no
    ///   category of the given name.
    /// - Return [`MigrateError::Transfer`] if mount point or backup root is
    ///   missing, or if no matching archive exists.
    /// - Return [`MigrateError::PrepareTarget`] if base directory cannot be
    ///   created.
    #[instrument(skip(self, confirm), fields(purpose = %self.layout.purpose), level = "debug")]
    pub fn restore(
        &self,
        options: &RestoreOptions,
        confirm: &mut dyn Confirm,
    ) -> Result<RestoreSummary> {
        let layout = &self.layout;
        if let Some(name) = &options.name {
            layout.purpose.lookup(name)?;
        }
        let root = BackupRoot::for_restore(&layout.mount, layout.purpose)?;
        let archives = root.discover(options.name.as_deref())?;

        if options.dry_run {
            info!("dry run, nothing will be extracted");
        } else if !layout.base.is_dir() {
            mkdirp::mkdirp(&layout.base).map_err(|err| MigrateError::PrepareTarget {
                source: err,
                path: layout.base.clone(),
            })?;
        }

        let identity = Identity::current().with_group(DEFAULT_GROUP);
        let mut summary = RestoreSummary {
            total: archives.len(),
            ..Default::default()
        };
        for (index, archive) in archives.iter().enumerate() {
            info!(
                "[{}/{}] {} ({})",
                index + 1,
                summary.total,
                archive.name,
                format_size(archive.size)
            );

            let result = if options.dry_run {
                self.preview_archive(archive)
            } else {
                self.restore_archive(archive, &identity, confirm)
            };

            match result {
                Ok(_) => summary.processed += 1,
                Err(err) => match err.severity() {
                    Severity::Fatal => return Err(err),
                    Severity::Recoverable => {
                        error!("[{}] {}", err.fault(), chain(&err));
                        summary.failed += 1;
                    }
                    Severity::Declined => {
                        info!("{err}");
                        summary.declined += 1;
                    }
                },
            }
        }

        info!(
            "restored {}/{} archives ({} declined, {} failed)",
            summary.processed, summary.total, summary.declined, summary.failed
        );

        Ok(summary)
    }

    fn preview_archive(&self, archive: &StoredArchive) -> Result<RestoreStep> {
        let entries = self.inspect(archive)?;
        for entry in entries.iter().take(PREVIEW_LIMIT) {
            info!("  {}", entry.path.display());
        }
        if entries.len() > PREVIEW_LIMIT {
            info!("  ... and {} more entries", entries.len() - PREVIEW_LIMIT);
        }
        info!(
            "{}: would extract {} entries into {:?}",
            archive.name,
            entries.len(),
            self.layout.base.display()
        );

        Ok(RestoreStep::Previewed(entries.len()))
    }

    fn restore_archive(
        &self,
        archive: &StoredArchive,
        identity: &Identity,
        confirm: &mut dyn Confirm,
    ) -> Result<RestoreStep> {
        let base = &self.layout.base;
        let kind = self.layout.purpose.kind_of(&archive.name);
        let entries = self.inspect(archive)?;

        let found = conflicts(&entries, base, CONFLICT_LIMIT);
        if !found.is_empty() {
            warn!("{}: existing paths would be overwritten:", archive.name);
            for path in &found {
                warn!("  {}", base.join(path).display());
            }
            if let Some(advisory) = kind.behavior().advisory {
                warn!("{advisory}");
            }

            let question = format!("Overwrite existing files with contents of {}?", archive.name);
            if !confirm.confirm(&question) {
                return Err(MigrateError::Declined {
                    name: archive.name.clone(),
                });
            }
        }

        self.archiver
            .unpack(&archive.path, base)
            .map_err(|err| MigrateError::Extract {
                source: err,
                name: archive.name.clone(),
            })?;

        let top = top_level(&entries);
        let fixed = normalize(identity, base, kind, top.as_deref());
        info!(
            "{}: extracted {} entries, ownership set to {} on {fixed} paths",
            archive.name,
            entries.len(),
            identity.name
        );

        Ok(RestoreStep::Extracted(entries.len()))
    }

    fn inspect(&self, archive: &StoredArchive) -> Result<Vec<ArchiveEntry>> {
        self.archiver
            .entries(&archive.path)
            .map_err(|err| MigrateError::Inspect {
                source: err,
                name: archive.name.clone(),
            })
    }
}
