// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive handling.
//!
//! Every category is stored as one gzip-compressed tarball whose entry paths
//! are relative to the category's base directory. So an archive of the
//! `credentials` category holds `.ssh/config` rather than
//! `/Users/blah/.ssh/config`, and can be unpacked into a home directory on a
//! different machine as-is.
//!
//! # Ownership
//!
//! Archives record owners by numeric user and group ID only. The destination
//! machine may hand the same user a different numeric ID, so extraction never
//! restores recorded owners. Extracted files belong to whoever runs the
//! restore, and the restore logic rewrites ownership afterwards when needed.
//!
//! # See Also
//!
//! 1. [`exclude`]

pub mod exclude;

use crate::{archive::exclude::Excluder, fault::Fault};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    fs::File,
    os::unix::fs::FileTypeExt,
    path::{Component, Path, PathBuf},
};
use tar::{Archive, Builder, HeaderMode};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Layer of indirection for archive handling.
pub trait Archiver {
    /// Pack existing members of `base` into a new archive at `dest`.
    ///
    /// The `progress` callback receives the byte length of every regular file
    /// appended.
    fn pack(
        &self,
        base: &Path,
        members: &[PathBuf],
        excluder: &Excluder,
        dest: &Path,
        progress: &mut dyn FnMut(u64),
    ) -> Result<PackStats>;

    /// List entries of an archive in stored order.
    fn entries(&self, archive: &Path) -> Result<Vec<ArchiveEntry>>;

    /// Unpack whole archive into `target`.
    fn unpack(&self, archive: &Path, target: &Path) -> Result<()>;
}

/// Summary of a packed archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackStats {
    /// Number of entries written.
    pub entries: usize,

    /// Uncompressed bytes of regular files written.
    pub bytes: u64,
}

/// One entry in an archive's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path relative to the base directory.
    pub path: PathBuf,

    /// Uncompressed size in bytes.
    pub size: u64,

    /// Entry is a directory.
    pub is_dir: bool,
}

/// Top-level path that an archive extracts to.
///
/// Derived from the first component of the first entry.
pub fn top_level(entries: &[ArchiveEntry]) -> Option<PathBuf> {
    entries.first().and_then(|entry| {
        entry.path.components().find_map(|component| match component {
            Component::Normal(name) => Some(PathBuf::from(name)),
            _ => None,
        })
    })
}

/// Archive handling through tar and gzip.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGz;

impl Archiver for TarGz {
    #[instrument(skip(self, members, excluder, progress), level = "debug")]
    fn pack(
        &self,
        base: &Path,
        members: &[PathBuf],
        excluder: &Excluder,
        dest: &Path,
        progress: &mut dyn FnMut(u64),
    ) -> Result<PackStats> {
        let file = File::create(dest).map_err(|err| ArchiveError::Create {
            source: err,
            path: dest.to_path_buf(),
        })?;
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

        // INVARIANT: Record owners numerically, never dereference symlinks.
        builder.mode(HeaderMode::Complete);
        builder.follow_symlinks(false);

        let mut stats = PackStats::default();
        for member in members {
            let root = base.join(member);
            let walker = WalkDir::new(&root)
                .follow_links(false)
                .follow_root_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !excluder.is_excluded(entry.path(), entry.file_type().is_dir()));

            for entry in walker {
                let entry = entry.map_err(|err| ArchiveError::Walk {
                    source: err,
                    path: root.clone(),
                })?;

                if entry.file_type().is_socket() {
                    debug!("skip socket {:?}", entry.path().display());
                    continue;
                }

                let name = entry
                    .path()
                    .strip_prefix(base)
                    .map_err(|_| ArchiveError::OutsideBase {
                        path: entry.path().to_path_buf(),
                    })?;
                builder
                    .append_path_with_name(entry.path(), name)
                    .map_err(|err| ArchiveError::Append {
                        source: err,
                        path: entry.path().to_path_buf(),
                    })?;
                stats.entries += 1;

                if entry.file_type().is_file() {
                    let len = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                    stats.bytes += len;
                    progress(len);
                }
            }
        }

        builder
            .into_inner()
            .and_then(GzEncoder::finish)
            .map_err(|err| ArchiveError::Finish {
                source: err,
                path: dest.to_path_buf(),
            })?;

        Ok(stats)
    }

    fn entries(&self, archive: &Path) -> Result<Vec<ArchiveEntry>> {
        let read_err = |err| ArchiveError::Read {
            source: err,
            path: archive.to_path_buf(),
        };

        let file = File::open(archive).map_err(read_err)?;
        let mut tarball = Archive::new(GzDecoder::new(file));
        let mut entries = Vec::new();
        for entry in tarball.entries().map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            entries.push(ArchiveEntry {
                path: entry.path().map_err(read_err)?.into_owned(),
                size: entry.size(),
                is_dir: entry.header().entry_type().is_dir(),
            });
        }

        Ok(entries)
    }

    #[instrument(skip(self), level = "debug")]
    fn unpack(&self, archive: &Path, target: &Path) -> Result<()> {
        let file = File::open(archive).map_err(|err| ArchiveError::Read {
            source: err,
            path: archive.to_path_buf(),
        })?;
        let mut tarball = Archive::new(GzDecoder::new(file));

        // INVARIANT: Extracted files belong to the invoking user.
        tarball.set_preserve_ownerships(false);
        tarball.set_preserve_permissions(true);
        tarball.set_preserve_mtime(true);
        tarball.set_unpack_xattrs(false);
        tarball.set_overwrite(true);

        tarball.unpack(target).map_err(|err| ArchiveError::Unpack {
            source: err,
            path: archive.to_path_buf(),
        })
    }
}

/// Archive error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Archive file cannot be created.
    #[error("failed to create archive {:?}", path.display())]
    Create {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory tree cannot be walked.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        path: PathBuf,
    },

    /// Walked path is not under the base directory.
    #[error("path {:?} is outside of base directory", path.display())]
    OutsideBase { path: PathBuf },

    /// Entry cannot be appended to archive.
    #[error("failed to append {:?} to archive", path.display())]
    Append {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Compression stream cannot be completed.
    #[error("failed to finish archive {:?}", path.display())]
    Finish {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive cannot be opened or read.
    #[error("failed to read archive {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive cannot be extracted.
    #[error("failed to extract archive {:?}", path.display())]
    Unpack {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl ArchiveError {
    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Create { source, .. }
            | Self::Append { source, .. }
            | Self::Finish { source, .. }
            | Self::Read { source, .. }
            | Self::Unpack { source, .. } => Fault::of(source),
            Self::Walk { source, .. } => source.io_error().map(Fault::of).unwrap_or(Fault::Other),
            Self::OutsideBase { .. } => Fault::Other,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        fs::{create_dir_all, read_to_string, write},
        os::unix::fs::symlink,
    };

    fn entry_paths(entries: &[ArchiveEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|entry| entry.path.to_string_lossy().trim_end_matches('/').to_string())
            .collect()
    }

    #[test]
    fn pack_records_paths_relative_to_base() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        create_dir_all(base.path().join(".ssh"))?;
        write(base.path().join(".ssh/config"), "Host *")?;
        write(base.path().join(".netrc"), "machine x")?;

        let dest = out.path().join("credentials.tar.gz");
        let mut seen = 0u64;
        let stats = TarGz.pack(
            base.path(),
            &[PathBuf::from(".ssh"), PathBuf::from(".netrc")],
            &Excluder::none(),
            &dest,
            &mut |bytes| seen += bytes,
        )?;

        assert_eq!(stats.entries, 3);
        assert_eq!(stats.bytes, 15);
        assert_eq!(seen, 15);

        let entries = TarGz.entries(&dest)?;
        assert_eq!(entry_paths(&entries), vec![".ssh", ".ssh/config", ".netrc"]);
        assert!(entries[0].is_dir);

        Ok(())
    }

    #[test]
    fn pack_skips_excluded_paths() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        create_dir_all(base.path().join("app/Caches"))?;
        write(base.path().join("app/Caches/blob"), "junk")?;
        write(base.path().join("app/debug.log"), "junk")?;
        write(base.path().join("app/settings.json"), "{}")?;

        let excluder = Excluder::new(base.path(), ["Caches/", "*.log"])?;
        let dest = out.path().join("app.tar.gz");
        TarGz.pack(base.path(), &[PathBuf::from("app")], &excluder, &dest, &mut |_| {})?;

        let entries = TarGz.entries(&dest)?;
        assert_eq!(entry_paths(&entries), vec!["app", "app/settings.json"]);

        Ok(())
    }

    #[test]
    fn unpack_reproduces_tree() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let target = tempfile::tempdir()?;
        create_dir_all(base.path().join("proj/src"))?;
        write(base.path().join("proj/src/lib.rs"), "pub fn a() {}")?;
        symlink("src/lib.rs", base.path().join("proj/link"))?;

        let dest = out.path().join("proj.tar.gz");
        TarGz.pack(base.path(), &[PathBuf::from("proj")], &Excluder::none(), &dest, &mut |_| {})?;
        TarGz.unpack(&dest, target.path())?;

        assert_eq!(read_to_string(target.path().join("proj/src/lib.rs"))?, "pub fn a() {}");
        assert_eq!(
            std::fs::read_link(target.path().join("proj/link"))?,
            PathBuf::from("src/lib.rs")
        );

        Ok(())
    }

    #[test]
    fn symlinked_member_is_stored_as_link() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let target = tempfile::tempdir()?;
        create_dir_all(base.path().join("dotfiles/git"))?;
        write(base.path().join("dotfiles/git/ignore"), "target/")?;
        create_dir_all(base.path().join(".config"))?;
        symlink("../dotfiles/git", base.path().join(".config/git"))?;

        let dest = out.path().join("git-config.tar.gz");
        let stats = TarGz.pack(
            base.path(),
            &[PathBuf::from(".config/git")],
            &Excluder::none(),
            &dest,
            &mut |_| {},
        )?;
        assert_eq!(stats.entries, 1);
        assert_eq!(entry_paths(&TarGz.entries(&dest)?), vec![".config/git"]);

        TarGz.unpack(&dest, target.path())?;
        assert_eq!(
            std::fs::read_link(target.path().join(".config/git"))?,
            PathBuf::from("../dotfiles/git")
        );

        Ok(())
    }

    #[test]
    fn corrupt_archive_cannot_be_listed() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        let dest = out.path().join("broken.tar.gz");
        write(&dest, "definitely not gzip")?;

        let result = TarGz.entries(&dest);
        assert!(matches!(result, Err(ArchiveError::Read { .. })));

        Ok(())
    }

    #[test]
    fn top_level_from_first_entry() {
        let entries = vec![
            ArchiveEntry {
                path: PathBuf::from("Code/User/settings.json"),
                size: 2,
                is_dir: false,
            },
            ArchiveEntry {
                path: PathBuf::from("Other"),
                size: 0,
                is_dir: true,
            },
        ];

        assert_eq!(top_level(&entries), Some(PathBuf::from("Code")));
        assert_eq!(top_level(&[]), None);
    }
}
