// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{snapshot, stage_file, Sandbox};

use anyhow::Result;
use oxishift::{AssumeYes, Confirm, MigrateError, Migrator, Purpose, RestoreOptions, Severity};
use pretty_assertions::assert_eq;
use std::{
    fs::{create_dir_all, metadata, read_link, read_to_string},
    os::unix::fs::{symlink, PermissionsExt},
    path::PathBuf,
    process::Command,
};

struct Decline;

impl Confirm for Decline {
    fn confirm(&mut self, _message: &str) -> bool {
        false
    }
}

fn stage_projects(sandbox: &Sandbox) -> Result<()> {
    sandbox.stage("alpha/README.md", "# alpha")?;
    sandbox.stage("alpha/src/lib.rs", "pub fn alpha() {}")?;
    sandbox.stage("alpha/build.log", "noise")?;
    sandbox.stage("beta/notes.txt", "beta notes")?;
    sandbox.stage("beta/.cache/blob", "cached")?;
    create_dir_all(sandbox.source().join("gamma/empty"))?;

    Ok(())
}

#[test]
fn work_round_trip_reproduces_tree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    stage_projects(&sandbox)?;

    let summary = Migrator::with_layout(sandbox.backup_layout(Purpose::Work)).backup(false)?;
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 0);

    let restored = Migrator::with_layout(sandbox.restore_layout(Purpose::Work))
        .restore(&RestoreOptions::default(), &mut AssumeYes)?;
    assert_eq!(restored.processed, 3);

    let mut expect = snapshot(sandbox.source())?;
    expect.remove(&PathBuf::from("alpha/build.log"));
    expect.remove(&PathBuf::from("beta/.cache"));
    expect.remove(&PathBuf::from("beta/.cache/blob"));
    assert_eq!(snapshot(sandbox.target())?, expect);

    Ok(())
}

#[test]
fn second_backup_reports_everything_stored() -> Result<()> {
    let sandbox = Sandbox::new()?;
    stage_projects(&sandbox)?;
    let migrator = Migrator::with_layout(sandbox.backup_layout(Purpose::Work));

    let first = migrator.backup(false)?;
    let archives = snapshot(&sandbox.mount().join("backup-work"))?;
    let second = migrator.backup(false)?;

    assert_eq!(first.already_stored, 0);
    assert_eq!(second.already_stored, second.attempted);
    assert_eq!(second.processed, first.processed);
    assert_eq!(snapshot(&sandbox.mount().join("backup-work"))?, archives);

    Ok(())
}

#[test]
fn dry_run_backup_writes_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    stage_projects(&sandbox)?;
    let before = snapshot(sandbox.source())?;
    let migrator = Migrator::with_layout(sandbox.backup_layout(Purpose::Work));

    let dry = migrator.backup(true)?;
    assert!(!sandbox.mount().join("backup-work").exists());
    assert_eq!(snapshot(sandbox.source())?, before);

    let live = migrator.backup(false)?;
    assert_eq!(dry.processed, live.processed);
    assert_eq!(dry.total_bytes, live.total_bytes);
    assert_eq!(dry.tally, live.tally);

    Ok(())
}

#[test]
fn missing_items_do_not_fail_backup() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage(".zshrc", "export EDITOR=vi")?;
    sandbox.stage(".ssh/config", "Host *")?;

    let summary = Migrator::with_layout(sandbox.backup_layout(Purpose::Migration)).backup(false)?;

    assert_eq!(summary.empty, 2);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.processed, 2);
    let stored = snapshot(&sandbox.mount().join("backup-migration"))?
        .into_keys()
        .collect::<Vec<_>>();
    assert_eq!(
        stored,
        vec![
            PathBuf::from("credentials.tar.gz"),
            PathBuf::from("shell-config.tar.gz")
        ]
    );

    Ok(())
}

#[test]
fn symlinked_git_config_round_trips() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage("dotfiles/git/ignore", "target/")?;
    create_dir_all(sandbox.source().join(".config"))?;
    symlink("../dotfiles/git", sandbox.source().join(".config/git"))?;

    Migrator::with_layout(sandbox.backup_layout(Purpose::Migration)).backup(false)?;
    let options = RestoreOptions {
        dry_run: false,
        name: Some("git-config".into()),
    };
    let summary = Migrator::with_layout(sandbox.restore_layout(Purpose::Migration))
        .restore(&options, &mut AssumeYes)?;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        read_link(sandbox.target().join(".config/git"))?,
        PathBuf::from("../dotfiles/git")
    );

    Ok(())
}

#[test]
fn declined_credentials_keep_existing_keys() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage(".ssh/id_ed25519", "old machine key")?;
    Migrator::with_layout(sandbox.backup_layout(Purpose::Migration)).backup(false)?;

    stage_file(sandbox.target(), ".ssh/id_ed25519", "new machine key")?;
    let summary = Migrator::with_layout(sandbox.restore_layout(Purpose::Migration))
        .restore(&RestoreOptions::default(), &mut Decline)?;

    assert_eq!(summary.declined, 1);
    assert_eq!(summary.processed, 0);
    assert_eq!(
        read_to_string(sandbox.target().join(".ssh/id_ed25519"))?,
        "new machine key"
    );

    Ok(())
}

#[test]
fn restored_credentials_are_locked_down() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage(".ssh/id_ed25519", "key")?;
    sandbox.stage(".ssh/config", "Host *")?;
    sandbox.stage(".gitconfig", "[user]")?;
    Migrator::with_layout(sandbox.backup_layout(Purpose::Migration)).backup(false)?;

    let options = RestoreOptions {
        dry_run: false,
        name: Some("credentials".into()),
    };
    let summary = Migrator::with_layout(sandbox.restore_layout(Purpose::Migration))
        .restore(&options, &mut AssumeYes)?;

    assert_eq!(summary.total, 1);
    assert!(!sandbox.target().join(".gitconfig").exists());
    let ssh = sandbox.target().join(".ssh");
    assert_eq!(metadata(&ssh)?.permissions().mode() & 0o777, 0o700);
    assert_eq!(
        metadata(ssh.join("id_ed25519"))?.permissions().mode() & 0o777,
        0o600
    );

    Ok(())
}

#[test]
fn app_config_names_use_underscores() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage("Sublime Text/Packages/User/Preferences.sublime-settings", "{}")?;
    sandbox.stage("Sublime Text/Cache/index", "junk")?;
    sandbox.stage("Code/User/settings.json", "{}")?;

    Migrator::with_layout(sandbox.backup_layout(Purpose::AppConfig)).backup(false)?;
    assert!(sandbox
        .mount()
        .join("backup-app-config/Sublime_Text.tar.gz")
        .is_file());

    let options = RestoreOptions {
        dry_run: false,
        name: Some("Sublime Text".into()),
    };
    Migrator::with_layout(sandbox.restore_layout(Purpose::AppConfig))
        .restore(&options, &mut AssumeYes)?;

    assert!(sandbox
        .target()
        .join("Sublime Text/Packages/User/Preferences.sublime-settings")
        .is_file());
    assert!(!sandbox.target().join("Sublime Text/Cache").exists());
    assert!(!sandbox.target().join("Code").exists());

    Ok(())
}

#[test]
fn listing_empty_root_is_fatal() -> Result<()> {
    let sandbox = Sandbox::new()?;
    create_dir_all(sandbox.mount().join("backup-work"))?;

    let result = Migrator::with_layout(sandbox.restore_layout(Purpose::Work)).list(None);
    match result {
        Err(err @ MigrateError::Transfer(_)) => assert_eq!(err.severity(), Severity::Fatal),
        other => panic!("expected fatal transfer error, got {other:?}"),
    }

    Ok(())
}

fn oxishift(sandbox: &Sandbox, args: &[&str]) -> Result<i32> {
    let status = Command::new(env!("CARGO_BIN_EXE_oxishift"))
        .arg("--config")
        .arg(sandbox.source().join("absent.toml"))
        .arg("--mount")
        .arg(sandbox.mount())
        .args(args)
        .env("HOME", sandbox.source())
        .env("RUST_LOG", "off")
        .status()?;

    Ok(status.code().unwrap_or(-1))
}

#[test]
fn list_exit_codes() -> Result<()> {
    let sandbox = Sandbox::new()?;
    create_dir_all(sandbox.mount().join("backup-user"))?;
    assert_eq!(oxishift(&sandbox, &["restore", "user", "--list"])?, 1);

    sandbox.stage("Documents/taxes.txt", "2025")?;
    assert_eq!(oxishift(&sandbox, &["backup", "user"])?, 0);
    assert_eq!(oxishift(&sandbox, &["restore", "user", "--list"])?, 0);
    assert_eq!(oxishift(&sandbox, &["restore", "user", "-l", "nope"])?, 1);

    Ok(())
}

#[test]
fn missing_mount_exits_with_failure() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stage(".zshrc", "export A=1")?;

    let status = Command::new(env!("CARGO_BIN_EXE_oxishift"))
        .args(["--mount", "/nonexistent/oxishift/mount", "backup", "migration"])
        .arg("--config")
        .arg(sandbox.source().join("absent.toml"))
        .env("HOME", sandbox.source())
        .env("RUST_LOG", "off")
        .status()?;

    assert_eq!(status.code(), Some(1));

    Ok(())
}
