// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem fault classification.
//!
//! Archive, transfer, and ownership operations all talk to the filesystem
//! through library calls instead of external tools. Their I/O failures are
//! sorted into a small set of [`Fault`] kinds so callers can tell a missing
//! path apart from a refused operation without matching on raw
//! [`std::io::ErrorKind`] values everywhere.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io,
};

/// Broad kind of filesystem failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Target path or required entry does not exist.
    Missing,

    /// Operation refused by the operating system.
    PermissionDenied,

    /// Anything else.
    Other,
}

impl Fault {
    /// Classify an I/O error.
    pub fn of(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::Missing,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => match error.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => Self::PermissionDenied,
                Some(libc::ENOENT) => Self::Missing,
                _ => Self::Other,
            },
        }
    }
}

impl Display for Fault {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Missing => fmt.write_str("missing"),
            Self::PermissionDenied => fmt.write_str("permission denied"),
            Self::Other => fmt.write_str("failure"),
        }
    }
}
