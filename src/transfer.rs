// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup root management.
//!
//! All archives live on a network share that the operator mounts before
//! running Oxishift. Each backup purpose owns one __backup root__ directly
//! under the mount point, e.g., `/Volumes/Migration/backup-work`. Backup roots
//! are created on demand and never deleted.
//!
//! The share is treated as a dumb directory. No locking takes place, so two
//! runs against the same backup root can interleave.

use crate::{fault::Fault, path::is_contained, registry::Purpose};

use std::{
    fs::{remove_file, File},
    io::{copy, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Purpose-specific directory on the mounted share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRoot {
    path: PathBuf,
    purpose: Purpose,
}

impl BackupRoot {
    /// Open backup root for a backup run.
    ///
    /// Creates the backup root if missing, unless `dry_run` is set, in which
    /// case nothing on the share is touched.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError::MountMissing`] if mount point does not exist.
    /// - Return [`TransferError::CreateRoot`] if backup root cannot be made.
    #[instrument(skip(mount), level = "debug")]
    pub fn for_backup(mount: impl AsRef<Path>, purpose: Purpose, dry_run: bool) -> Result<Self> {
        let mount = mount.as_ref();
        if !mount.is_dir() {
            return Err(TransferError::MountMissing {
                mount: mount.to_path_buf(),
            });
        }

        let path = mount.join(purpose.root_name());
        if !dry_run && !path.is_dir() {
            debug!("create backup root {:?}", path.display());
            mkdirp::mkdirp(&path).map_err(|err| TransferError::CreateRoot {
                source: err,
                root: path.clone(),
            })?;
        }

        Ok(Self { path, purpose })
    }

    /// Open backup root for a restore run.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError::MountMissing`] if mount point does not exist.
    /// - Return [`TransferError::RootMissing`] if backup root does not exist.
    #[instrument(skip(mount), level = "debug")]
    pub fn for_restore(mount: impl AsRef<Path>, purpose: Purpose) -> Result<Self> {
        let mount = mount.as_ref();
        if !mount.is_dir() {
            return Err(TransferError::MountMissing {
                mount: mount.to_path_buf(),
            });
        }

        let path = mount.join(purpose.root_name());
        if !path.is_dir() {
            return Err(TransferError::RootMissing { root: path });
        }

        Ok(Self { path, purpose })
    }

    /// Path to backup root.
    pub fn as_path(&self) -> &Path {
        self.path.as_path()
    }

    /// Path an archive of a category or item would be stored at.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.path.join(self.purpose.archive_name(name))
    }

    /// Check if an archive for a category or item is already stored.
    pub fn contains(&self, name: &str) -> bool {
        self.archive_path(name).is_file()
    }

    /// Copy a local archive into the backup root.
    ///
    /// Only file contents are copied. Extended attributes and permission bits
    /// stay behind. A failed copy is tolerated if the destination still ends
    /// up complete, which happens on shares that refuse metadata updates after
    /// the data was written. Incomplete destinations are removed.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError::Copy`] if destination is missing or
    ///   incomplete after the copy.
    #[instrument(skip(self, local), level = "debug")]
    pub fn push(&self, local: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
        let local = local.as_ref();
        let dest = self.archive_path(name);

        if let Err(err) = copy_contents(local, &dest) {
            let expected = local.metadata().map(|meta| meta.len()).ok();
            let actual = dest.metadata().map(|meta| meta.len()).ok();
            if expected.is_some() && expected == actual {
                warn!("copy of {name} reported {err}, but destination is complete");
                return Ok(dest);
            }

            let _ = remove_file(&dest);
            return Err(TransferError::Copy {
                source: err,
                from: local.to_path_buf(),
                to: dest,
            });
        }

        Ok(dest)
    }

    /// Discover stored archives.
    ///
    /// With a name, only the archive of that category or item is returned.
    /// Without one, every `*.tar.gz` file of the backup root is returned in
    /// name order.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError::InvalidName`] if name is not a plain item
    ///   name, e.g., contains a path separator or `..`.
    /// - Return [`TransferError::ArchiveNotFound`] if named archive is absent.
    /// - Return [`TransferError::NoArchives`] if backup root has no archives.
    /// - Return [`TransferError::Glob`] if backup root path cannot be globbed.
    pub fn discover(&self, name: Option<&str>) -> Result<Vec<StoredArchive>> {
        if let Some(name) = name {
            if !is_contained(name) || name.contains('/') {
                return Err(TransferError::InvalidName {
                    name: name.to_string(),
                });
            }

            let path = self.archive_path(name);
            return match StoredArchive::open(&path) {
                Some(archive) => Ok(vec![archive]),
                None => Err(TransferError::ArchiveNotFound {
                    name: name.to_string(),
                    root: self.path.clone(),
                }),
            };
        }

        let pattern = format!(
            "{}/*.tar.gz",
            glob::Pattern::escape(self.path.to_string_lossy().as_ref())
        );
        let mut paths = glob::glob(&pattern)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!("skip unreadable entry: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();
        paths.sort();

        let archives = paths
            .iter()
            .filter_map(StoredArchive::open)
            .collect::<Vec<_>>();
        if archives.is_empty() {
            return Err(TransferError::NoArchives {
                root: self.path.clone(),
            });
        }

        Ok(archives)
    }
}

/// Archive stored in a backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArchive {
    /// Full path to the archive.
    pub path: PathBuf,

    /// Archive file name without its `.tar.gz` extension.
    pub name: String,

    /// Compressed size in bytes.
    pub size: u64,
}

impl StoredArchive {
    /// Inspect archive at path, if it is a regular `.tar.gz` file.
    pub fn open(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let metadata = path.metadata().ok().filter(|meta| meta.is_file())?;
        let file_name = path.file_name()?.to_string_lossy();
        let name = file_name.strip_suffix(".tar.gz")?.to_string();

        Some(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
        })
    }
}

fn copy_contents(from: &Path, to: &Path) -> std::io::Result<u64> {
    let mut source = File::open(from)?;
    let mut dest = File::create(to)?;
    let written = copy(&mut source, &mut dest)?;
    dest.flush()?;

    Ok(written)
}

/// Transfer error types.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Mount point of the share does not exist.
    #[error(
        "mount point {:?} does not exist, mount the share first or point `mount_point` at it",
        mount.display()
    )]
    MountMissing { mount: PathBuf },

    /// Backup root does not exist on the share.
    #[error("backup root {:?} does not exist", root.display())]
    RootMissing { root: PathBuf },

    /// Backup root cannot be created.
    #[error("failed to create backup root {:?}", root.display())]
    CreateRoot {
        #[source]
        source: std::io::Error,
        root: PathBuf,
    },

    /// Archive cannot be copied into backup root.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Archive name would leave the backup root.
    #[error("invalid archive name {name:?}")]
    InvalidName { name: String },

    /// Named archive is not stored in backup root.
    #[error("no archive for {name:?} in {:?}", root.display())]
    ArchiveNotFound { name: String, root: PathBuf },

    /// Backup root holds no archives.
    #[error("no archives found in {:?}", root.display())]
    NoArchives { root: PathBuf },

    /// Backup root path cannot be used as glob pattern.
    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

impl TransferError {
    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::CreateRoot { source, .. } | Self::Copy { source, .. } => Fault::of(source),
            Self::MountMissing { .. }
            | Self::RootMissing { .. }
            | Self::ArchiveNotFound { .. }
            | Self::NoArchives { .. } => Fault::Missing,
            Self::InvalidName { .. } | Self::Glob(_) => Fault::Other,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
