// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxishift::{
    config::{ExpandedPath, Settings},
    path::default_config_path,
    registry::CategoryKind,
    AssumeYes, Confirm, InquireConfirm, Layout, Migrator, Purpose, RestoreOptions,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  oxishift [options] <oxishift-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Mount point of network share, overrides configuration.
    #[arg(short, long, global = true, value_name = "path")]
    pub mount: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut settings = Settings::load(config_path)?;
        if let Some(mount) = self.mount {
            settings.mount_point = ExpandedPath::new(mount);
        }

        match self.command {
            Command::Backup(opts) => run_backup(&settings, opts),
            Command::Restore(opts) => run_restore(&settings, opts),
            Command::Categories(opts) => run_categories(&settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Archive categories of a purpose to the network share.
    #[command(override_usage = "oxishift backup [options] <purpose>")]
    Backup(BackupOptions),

    /// Extract archives of a purpose from the network share.
    #[command(override_usage = "oxishift restore [options] <purpose> [<name>]")]
    Restore(RestoreArgs),

    /// List categories known for each purpose.
    #[command(override_usage = "oxishift categories [options] [<purpose>]")]
    Categories(CategoriesOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackupOptions {
    /// Purpose to back up.
    #[arg(value_enum, value_name = "purpose")]
    pub purpose: Purpose,

    /// Show what would be archived without writing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreArgs {
    /// Purpose to restore.
    #[arg(value_enum, value_name = "purpose")]
    pub purpose: Purpose,

    /// Restore only the archive of this category or item.
    #[arg(value_name = "name")]
    pub name: Option<String>,

    /// Preview archive contents without extracting anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// List stored archives and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Overwrite existing files without asking.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CategoriesOptions {
    /// Only list categories of this purpose.
    #[arg(value_enum, value_name = "purpose")]
    pub purpose: Option<Purpose>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_backup(settings: &Settings, opts: BackupOptions) -> Result<()> {
    let layout = Layout::resolve(settings, opts.purpose)?;
    let migrator = Migrator::with_layout(layout);
    migrator.backup(opts.dry_run)?;

    Ok(())
}

fn run_restore(settings: &Settings, opts: RestoreArgs) -> Result<()> {
    let layout = Layout::resolve(settings, opts.purpose)?;
    let migrator = Migrator::with_layout(layout);

    if opts.list {
        migrator.list(opts.name.as_deref())?;
        return Ok(());
    }

    let mut confirm: Box<dyn Confirm> = if opts.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(InquireConfirm)
    };
    let options = RestoreOptions {
        dry_run: opts.dry_run,
        name: opts.name,
    };
    migrator.restore(&options, confirm.as_mut())?;

    Ok(())
}

fn run_categories(settings: &Settings, opts: CategoriesOptions) -> Result<()> {
    let purposes = match opts.purpose {
        Some(purpose) => vec![purpose],
        None => Purpose::ALL.to_vec(),
    };

    for purpose in purposes {
        let layout = Layout::resolve(settings, purpose)?;
        info!("{purpose} ({:?})", layout.base.display());
        match purpose.categories(&layout.base) {
            Ok(categories) => {
                for category in categories {
                    if category.kind == CategoryKind::Discovered {
                        info!("  {}", category.name);
                        continue;
                    }

                    let members = category
                        .members
                        .iter()
                        .map(|member| member.display().to_string())
                        .collect::<Vec<_>>();
                    info!("  {:<20} {}", category.name, members.join(" "));
                }
            }
            Err(err) => warn!("  {err}"),
        }
    }

    Ok(())
}
