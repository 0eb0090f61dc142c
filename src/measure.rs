// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Disk usage estimation.
//!
//! Sizes are measured the way `du -k` does: allocated blocks are rounded up
//! to whole 1024-byte blocks, every hard-linked inode is counted once, and
//! symbolic links are never followed. The totals only feed progress
//! percentages, so they are estimates of archive work rather than exact
//! archive sizes.

use crate::{fault::Fault, registry::Category};

use std::{
    collections::HashSet,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Measure disk usage of a file or directory tree in bytes.
///
/// Unreadable entries inside a tree are skipped with a warning, matching how
/// `du` keeps going past permission errors.
///
/// # Errors
///
/// - Return [`MeasureError::Stat`] if `path` itself cannot be inspected.
pub fn disk_usage(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    path.symlink_metadata().map_err(|err| MeasureError::Stat {
        source: err,
        path: path.to_path_buf(),
    })?;

    let mut seen = HashSet::new();
    let mut kib = 0u64;
    for entry in WalkDir::new(path).follow_links(false).follow_root_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("cannot measure {err}");
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("cannot measure {:?}: {err}", entry.path().display());
                continue;
            }
        };

        // INVARIANT: Count hard-linked inodes once.
        if metadata.nlink() > 1 && !metadata.is_dir() && !seen.insert((metadata.dev(), metadata.ino())) {
            continue;
        }

        // INVARIANT: 512-byte blocks rounded up to 1024-byte blocks.
        kib += metadata.blocks().div_ceil(2);
    }

    Ok(kib * 1024)
}

/// Usage of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    /// The measured category.
    pub category: Category,

    /// Existing members with their usage in bytes.
    pub present: Vec<(PathBuf, u64)>,

    /// Members that do not exist under the base directory.
    pub missing: Vec<PathBuf>,
}

impl CategoryUsage {
    /// Measure every member of a category under `base`.
    ///
    /// Missing members contribute nothing.
    pub fn measure(base: impl AsRef<Path>, category: Category) -> Self {
        let base = base.as_ref();
        let existing = category.existing_members(base);
        let mut present = Vec::new();
        let mut missing = Vec::new();

        for member in &category.members {
            if !existing.contains(member) {
                debug!("{}: missing {:?}", category.name, member.display());
                missing.push(member.clone());
                continue;
            }

            let bytes = match disk_usage(base.join(member)) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("{}: {err}", category.name);
                    0
                }
            };
            present.push((member.clone(), bytes));
        }

        Self {
            category,
            present,
            missing,
        }
    }

    /// Total bytes of existing members.
    pub fn bytes(&self) -> u64 {
        self.present.iter().map(|(_, bytes)| bytes).sum()
    }

    /// Check if at least one member exists.
    pub fn has_items(&self) -> bool {
        !self.present.is_empty()
    }

    /// Existing member paths.
    pub fn present_paths(&self) -> Vec<PathBuf> {
        self.present.iter().map(|(path, _)| path.clone()).collect()
    }
}

/// Usage of every category of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Estimate {
    pub categories: Vec<CategoryUsage>,
}

impl Estimate {
    /// Measure every category under `base`.
    ///
    /// # Errors
    ///
    /// - Return [`MeasureError::NothingFound`] if no category has a single
    ///   existing member.
    pub fn measure(base: impl AsRef<Path>, categories: Vec<Category>) -> Result<Self> {
        let base = base.as_ref();
        let categories = categories
            .into_iter()
            .map(|category| CategoryUsage::measure(base, category))
            .collect::<Vec<_>>();

        let estimate = Self { categories };
        if estimate.total_items() == 0 {
            return Err(MeasureError::NothingFound {
                base: base.to_path_buf(),
            });
        }

        Ok(estimate)
    }

    /// Total bytes across categories.
    pub fn total_bytes(&self) -> u64 {
        self.categories.iter().map(CategoryUsage::bytes).sum()
    }

    /// Total existing items across categories.
    pub fn total_items(&self) -> usize {
        self.categories.iter().map(|usage| usage.present.len()).sum()
    }
}

/// Running progress counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Bytes processed so far.
    pub bytes: u64,

    /// Items processed so far.
    pub items: usize,
}

impl Tally {
    /// Record processed work, returning the updated counters.
    pub fn advance(self, bytes: u64, items: usize) -> Self {
        Self {
            bytes: self.bytes + bytes,
            items: self.items + items,
        }
    }

    /// Percentage of `total` bytes processed, clamped to 100.
    pub fn percent(&self, total: u64) -> u64 {
        if total == 0 {
            return 100;
        }

        (self.bytes.saturating_mul(100) / total).min(100)
    }
}

/// Format byte count the way `ls -lh` does.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];

    if bytes < 1024 {
        return format!("{bytes}B");
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.1}{}", UNITS[unit])
}

/// Measurement error types.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    /// Path cannot be inspected.
    #[error("cannot inspect {:?}", path.display())]
    Stat {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// No category had any existing item.
    #[error("no items found under {:?}", base.display())]
    NothingFound { base: PathBuf },
}

impl MeasureError {
    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Stat { source, .. } => Fault::of(source),
            Self::NothingFound { .. } => Fault::Missing,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = MeasureError> = std::result::Result<T, E>;
