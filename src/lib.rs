// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Move home directory data between machines.
//!
//! Oxishift backs up categories of user data, e.g., shell configuration,
//! credentials, project directories, and application settings, as one
//! compressed archive per category on a mounted network share. On the other
//! machine it restores those archives and hands the extracted files to the
//! invoking user, whatever numeric user ID that machine assigned them.
//!
//! # Purposes
//!
//! Data is grouped into four backup purposes, each with its own backup root
//! on the share. See [`registry::Purpose`] for what each one covers.

pub mod archive;
pub mod config;
pub mod fault;
pub mod measure;
pub mod migrate;
pub mod owner;
pub mod path;
pub mod registry;
pub mod transfer;

pub use migrate::{
    backup::BackupSummary,
    restore::{RestoreOptions, RestoreSummary},
    AssumeYes, Confirm, InquireConfirm, Layout, MigrateError, Migrator, Severity,
};
pub use registry::Purpose;
