// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup runs.
//!
//! A backup run resolves the purpose's categories, measures them, and then
//! archives every category that has at least one existing item. Each archive
//! is built in a scratch directory and copied into the backup root. A
//! category whose archive is already stored is left alone, regardless of how
//! old the stored archive is.
//!
//! Dry runs perform discovery and measurement exactly like live runs, but
//! never compress, copy, or create anything. Their summary counts categories
//! as if every step had succeeded.

use crate::{
    archive::{exclude::Excluder, Archiver, PackStats},
    measure::{format_size, CategoryUsage, Estimate, Tally},
    migrate::{chain, MigrateError, Migrator, Result, Severity},
    transfer::BackupRoot,
};

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Outcome of a completed backup run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    /// Categories with at least one existing item.
    pub attempted: usize,

    /// Categories archived, already stored, or that would be archived.
    pub processed: usize,

    /// Categories whose archive was already stored.
    pub already_stored: usize,

    /// Categories that failed to archive or copy.
    pub failed: usize,

    /// Categories without any existing item.
    pub empty: usize,

    /// Bytes and items covered by processed categories.
    pub tally: Tally,

    /// Estimated bytes of every category.
    pub total_bytes: u64,
}

/// Outcome of backing up one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStep {
    /// Archive built and stored.
    Archived(PackStats),

    /// Archive was stored by an earlier run.
    AlreadyStored,

    /// Dry run, archive would have been built and stored.
    WouldArchive,
}

impl<A> Migrator<A>
where
    A: Archiver,
{
    /// Back up every category of the layout's purpose.
    ///
    /// # Errors
    ///
    /// Only fatal failures are returned:
    ///
    /// - Return [`MigrateError::Transfer`] if mount point is missing or
    ///   backup root cannot be created.
    /// - Return [`MigrateError::Registry`] if base directory is missing.
    /// - Return [`MigrateError::Measure`] if no category has any item.
    /// - Return [`MigrateError::Exclude`] if exclusion rules are invalid.
    #[instrument(skip(self), fields(purpose = %self.layout.purpose), level = "debug")]
    pub fn backup(&self, dry_run: bool) -> Result<BackupSummary> {
        let layout = &self.layout;
        if dry_run {
            info!("dry run, nothing will be written");
        }

        let root = BackupRoot::for_backup(&layout.mount, layout.purpose, dry_run)?;
        let categories = layout.purpose.categories(&layout.base)?;

        info!("measure {} categories in {:?}", categories.len(), layout.base.display());
        let estimate = Estimate::measure(&layout.base, categories)?;
        for usage in &estimate.categories {
            report_usage(usage);
        }
        info!(
            "total: {} items, {}",
            estimate.total_items(),
            format_size(estimate.total_bytes())
        );

        let excluder = Excluder::new(&layout.base, &layout.excludes)?;
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");

        let mut summary = BackupSummary {
            total_bytes: estimate.total_bytes(),
            ..Default::default()
        };
        for usage in &estimate.categories {
            let name = &usage.category.name;
            if !usage.has_items() {
                info!("{name}: no items found, skip");
                summary.empty += 1;
                continue;
            }

            summary.attempted += 1;
            match self.backup_category(&root, usage, &excluder, &style, dry_run) {
                Ok(step) => {
                    if step == BackupStep::AlreadyStored {
                        summary.already_stored += 1;
                    }
                    summary.processed += 1;
                    summary.tally = summary.tally.advance(usage.bytes(), usage.present.len());
                    info!(
                        "[{:>3}%] {name} done",
                        summary.tally.percent(summary.total_bytes)
                    );
                }
                Err(err) => match err.severity() {
                    Severity::Recoverable => {
                        error!("[{}] {}", err.fault(), chain(&err));
                        summary.failed += 1;
                    }
                    // Backups never prompt, so nothing can be declined here.
                    Severity::Fatal | Severity::Declined => return Err(err),
                },
            }
        }

        info!(
            "processed {}/{} categories ({} already stored, {} failed), {} of {}",
            summary.processed,
            summary.attempted,
            summary.already_stored,
            summary.failed,
            format_size(summary.tally.bytes),
            format_size(summary.total_bytes)
        );

        Ok(summary)
    }

    fn backup_category(
        &self,
        root: &BackupRoot,
        usage: &CategoryUsage,
        excluder: &Excluder,
        style: &ProgressStyle,
        dry_run: bool,
    ) -> Result<BackupStep> {
        let name = usage.category.name.as_str();
        let archive_name = self.layout.purpose.archive_name(name);

        if root.contains(name) {
            info!("{name}: {archive_name} already exists, skip");
            return Ok(BackupStep::AlreadyStored);
        }

        if dry_run {
            info!(
                "{name}: would archive {} items ({}) to {:?}",
                usage.present.len(),
                format_size(usage.bytes()),
                root.archive_path(name).display()
            );
            return Ok(BackupStep::WouldArchive);
        }

        // INVARIANT: Scratch directory is removed when dropped, whatever happens.
        let scratch = tempfile::Builder::new()
            .prefix("oxishift-")
            .tempdir()
            .map_err(|err| MigrateError::Scratch {
                source: err,
                name: name.to_string(),
            })?;
        let local = scratch.path().join(&archive_name);

        let bar = ProgressBar::new(usage.bytes());
        bar.set_style(style.clone());
        bar.set_message(format!("compress {name}"));
        bar.enable_steady_tick(Duration::from_millis(100));
        let packed = self.archiver.pack(
            &self.layout.base,
            &usage.present_paths(),
            excluder,
            &local,
            &mut |bytes| bar.inc(bytes),
        );
        bar.finish_and_clear();
        let stats = packed.map_err(|err| MigrateError::Pack {
            source: err,
            name: name.to_string(),
        })?;

        info!("{name}: copy {archive_name} to {:?}", root.as_path().display());
        root.push(&local, name).map_err(|err| MigrateError::Push {
            source: err,
            name: name.to_string(),
        })?;

        Ok(BackupStep::Archived(stats))
    }
}

fn report_usage(usage: &CategoryUsage) {
    let name = &usage.category.name;
    if usage.present.is_empty() {
        info!("{name}: nothing present");
        return;
    }

    info!(
        "{name}: {} items, {}",
        usage.present.len(),
        format_size(usage.bytes())
    );
    if !usage.missing.is_empty() {
        let missing = usage
            .missing
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>();
        info!("{name}: missing {}", missing.join(", "));
    }
}
