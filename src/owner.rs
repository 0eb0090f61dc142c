// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ownership normalization.
//!
//! The source and destination machines rarely agree on numeric user and
//! group IDs. Archives are extracted without restoring recorded owners, and
//! afterwards the extracted paths are handed to the invoking user and the
//! `staff` group. Every step here is best-effort. A filesystem that refuses
//! `chown`, or a run without administrative rights, leaves ownership as the
//! extraction produced it.

use crate::{
    fault::Fault,
    registry::{CategoryKind, PostExtract},
};

use std::{
    ffi::{CStr, CString},
    fs::{read_dir, set_permissions, Permissions},
    os::unix::fs::{lchown, PermissionsExt},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Group that restored files are handed to.
pub const DEFAULT_GROUP: &str = "staff";

/// Identity of the invoking user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login name, or the numeric user ID if it has no name.
    pub name: String,

    /// Numeric user ID.
    pub uid: u32,

    /// Numeric group ID to hand files to.
    pub gid: u32,
}

impl Identity {
    /// Query identity of the invoking user with their primary group.
    pub fn current() -> Self {
        // SAFETY: Both calls always succeed and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        let name = user_name(uid).unwrap_or_else(|| uid.to_string());

        Self { name, uid, gid }
    }

    /// Switch to named group if it exists on this machine.
    pub fn with_group(mut self, group: &str) -> Self {
        match group_id(group) {
            Some(gid) => self.gid = gid,
            None => debug!("group {group:?} does not exist, keep group {}", self.gid),
        }

        self
    }
}

fn user_name(uid: u32) -> Option<String> {
    // SAFETY: Returned record points into static storage that is copied out
    // before any other identity call can overwrite it.
    unsafe {
        let record = libc::getpwuid(uid);
        if record.is_null() || (*record).pw_name.is_null() {
            return None;
        }

        CStr::from_ptr((*record).pw_name)
            .to_str()
            .ok()
            .map(ToString::to_string)
    }
}

fn group_id(name: &str) -> Option<u32> {
    let name = CString::new(name).ok()?;

    // SAFETY: Same as `user_name`.
    unsafe {
        let record = libc::getgrnam(name.as_ptr());
        if record.is_null() {
            return None;
        }

        Some((*record).gr_gid)
    }
}

/// Hand a path and everything below it to an identity.
///
/// Symbolic links are changed themselves, never their targets, including a
/// symlinked `path`. Each refused change is logged and skipped, so one
/// foreign-owned entry never shields the rest of the tree.
///
/// Returns the number of paths whose ownership was rewritten.
pub fn chown_tree(path: impl AsRef<Path>, identity: &Identity) -> usize {
    chown_tree_with(path.as_ref(), identity, |entry, uid, gid| {
        lchown(entry, Some(uid), Some(gid))
    })
}

fn chown_tree_with<F>(path: &Path, identity: &Identity, mut chown: F) -> usize
where
    F: FnMut(&Path, u32, u32) -> std::io::Result<()>,
{
    let mut changed = 0;
    let walker = WalkDir::new(path).follow_links(false).follow_root_links(false);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let err = OwnerError::Walk {
                    source: err,
                    path: path.to_path_buf(),
                };
                debug!("{err} ({})", err.fault());
                continue;
            }
        };

        match chown(entry.path(), identity.uid, identity.gid) {
            Ok(()) => changed += 1,
            Err(err) => {
                let err = OwnerError::Chown {
                    source: err,
                    path: entry.path().to_path_buf(),
                };
                debug!("ownership left as is: {err} ({})", err.fault());
            }
        }
    }

    changed
}

/// Lock down a secure shell directory.
///
/// Directory gets mode 700, and each regular file directly inside it gets
/// mode 600.
///
/// # Errors
///
/// - Return [`OwnerError::Chmod`] if a mode cannot be changed.
pub fn secure_ssh_dir(ssh_dir: impl AsRef<Path>) -> Result<()> {
    let ssh_dir = ssh_dir.as_ref();
    let chmod = |path: &Path, mode: u32| {
        set_permissions(path, Permissions::from_mode(mode)).map_err(|err| OwnerError::Chmod {
            source: err,
            path: path.to_path_buf(),
        })
    };

    chmod(ssh_dir, 0o700)?;
    let entries = read_dir(ssh_dir).map_err(|err| OwnerError::Chmod {
        source: err,
        path: ssh_dir.to_path_buf(),
    })?;
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
        if is_file {
            chmod(&entry.path(), 0o600)?;
        }
    }

    Ok(())
}

/// Apply the post-extraction ownership fix of a category.
///
/// Fixed categories hand every known member that exists under `base` to the
/// identity. Discovered categories hand over the single `top_level` path the
/// archive extracted. Credentials additionally get their `.ssh` directory
/// locked down. Failures are logged and swallowed.
///
/// Returns the number of paths whose ownership was rewritten.
#[instrument(skip(identity, base, top_level), level = "debug")]
pub fn normalize(
    identity: &Identity,
    base: &Path,
    kind: CategoryKind,
    top_level: Option<&Path>,
) -> usize {
    let behavior = kind.behavior();
    let targets: Vec<PathBuf> = match behavior.post_extract {
        PostExtract::ChownMembers | PostExtract::ChownMembersSecureSsh => behavior
            .members
            .iter()
            .map(|member| base.join(member))
            .filter(|path| path.symlink_metadata().is_ok())
            .collect(),
        PostExtract::ChownTopLevel => top_level.map(|top| base.join(top)).into_iter().collect(),
    };

    let fixed = targets
        .iter()
        .map(|target| chown_tree(target, identity))
        .sum::<usize>();

    if behavior.post_extract == PostExtract::ChownMembersSecureSsh {
        let ssh_dir = base.join(".ssh");
        if ssh_dir.is_dir() {
            if let Err(err) = secure_ssh_dir(&ssh_dir) {
                debug!("permissions of {:?} left as is ({}): {err}", ssh_dir.display(), err.fault());
            }
        }
    }

    fixed
}

/// Ownership error types.
#[derive(Debug, thiserror::Error)]
pub enum OwnerError {
    /// Tree cannot be walked.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        path: PathBuf,
    },

    /// Ownership change refused.
    #[error("failed to change owner of {:?}", path.display())]
    Chown {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Mode change refused.
    #[error("failed to change mode of {:?}", path.display())]
    Chmod {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl OwnerError {
    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Walk { source, .. } => source.io_error().map(Fault::of).unwrap_or(Fault::Other),
            Self::Chown { source, .. } | Self::Chmod { source, .. } => Fault::of(source),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = OwnerError> = std::result::Result<T, E>;
