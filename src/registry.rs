// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Category registry.
//!
//! A __category__ is a named group of filesystem items that migrate together
//! as one archive. Items are always relative to a __base directory__, which
//! is either the user's home directory, the work directory, or the
//! application support directory depending on the backup __purpose__.
//!
//! # Fixed and Scanned Registries
//!
//! The `migration` and `user` purposes come with a fixed table of categories
//! whose members are well known dotfiles and user directories. The `work` and
//! `app-config` purposes have no fixed table. Instead, every immediate child
//! of their base directory is a category of its own, discovered at run time.
//!
//! # Behavior Records
//!
//! Each category carries a [`CategoryKind`] that maps to a static
//! [`Behavior`] record. The record names the member list, the advisory text
//! shown alongside restore conflicts, and the ownership fix applied after a
//! successful extraction.

use crate::{fault::Fault, path::is_contained};

use clap::ValueEnum;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Reason a set of categories is being migrated.
///
/// Each purpose owns one backup root on the mounted share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Purpose {
    /// Shell, credential, git, and network configuration in the home directory.
    Migration,

    /// Standard user directories in the home directory.
    User,

    /// Every project directory under the work directory.
    Work,

    /// Every top-level item of the application support directory.
    #[value(name = "app-config")]
    AppConfig,
}

impl Purpose {
    /// All purposes in display order.
    pub const ALL: [Purpose; 4] = [
        Purpose::Migration,
        Purpose::User,
        Purpose::Work,
        Purpose::AppConfig,
    ];

    /// Name of the backup root directory on the mounted share.
    pub fn root_name(&self) -> &'static str {
        match self {
            Self::Migration => "backup-migration",
            Self::User => "backup-user",
            Self::Work => "backup-work",
            Self::AppConfig => "backup-app-config",
        }
    }

    /// Fixed category table, or `None` if categories are discovered by scan.
    pub fn fixed_categories(&self) -> Option<&'static [CategoryKind]> {
        match self {
            Self::Migration => Some(&[
                CategoryKind::ShellConfig,
                CategoryKind::Credentials,
                CategoryKind::GitConfig,
                CategoryKind::NetworkConfig,
            ]),
            Self::User => Some(&[CategoryKind::UserDirs]),
            Self::Work | Self::AppConfig => None,
        }
    }

    /// Built-in exclusion patterns in gitignore syntax.
    pub fn default_excludes(&self) -> &'static [&'static str] {
        match self {
            Self::Migration | Self::User => &[".DS_Store"],
            Self::Work => &[".DS_Store", "*.log", ".cache/", "Caches/"],
            Self::AppConfig => &[".DS_Store", "*.log", "Caches/", "Cache/", "Logs/", "logs/"],
        }
    }

    /// Archive file name for a category or item name.
    ///
    /// Application configuration items frequently contain spaces, which are
    /// replaced with underscores.
    pub fn archive_name(&self, name: &str) -> String {
        match self {
            Self::AppConfig => format!("{}.tar.gz", name.replace(' ', "_")),
            _ => format!("{name}.tar.gz"),
        }
    }

    /// Resolve categories in registry order.
    ///
    /// Fixed registries are returned as-is. Scanned registries list the
    /// immediate children of `base`, skipping hidden names and sorting by
    /// name.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::MissingBase`] if `base` is not a directory.
    /// - Return [`RegistryError::Scan`] if `base` cannot be listed.
    pub fn categories(&self, base: impl AsRef<Path>) -> Result<Vec<Category>> {
        let base = base.as_ref();
        if !base.is_dir() {
            return Err(RegistryError::MissingBase {
                base: base.to_path_buf(),
            });
        }

        if let Some(fixed) = self.fixed_categories() {
            return Ok(fixed.iter().copied().map(Category::fixed).collect());
        }

        let mut names = Vec::new();
        let entries = read_dir(base).map_err(|err| RegistryError::Scan {
            source: err,
            base: base.to_path_buf(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| RegistryError::Scan {
                source: err,
                base: base.to_path_buf(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                debug!("skip hidden item {name:?}");
                continue;
            }

            let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
            if *self == Self::Work && !is_dir {
                debug!("skip non-directory {name:?}");
                continue;
            }

            names.push(name);
        }
        names.sort();

        Ok(names.into_iter().map(Category::discovered).collect())
    }

    /// Look up the kind of a category by name.
    ///
    /// Fixed registries only know their own category names. Scanned
    /// registries accept any name as a discovered category.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::UnknownCategory`] if a fixed registry has no
    ///   category of that name.
    pub fn lookup(&self, name: &str) -> Result<CategoryKind> {
        match self.fixed_categories() {
            Some(fixed) => fixed
                .iter()
                .copied()
                .find(|kind| kind.name() == name)
                .ok_or_else(|| RegistryError::UnknownCategory {
                    purpose: *self,
                    name: name.to_string(),
                }),
            None => Ok(CategoryKind::Discovered),
        }
    }

    /// Determine category kind from an archive's category name.
    ///
    /// Names that do not belong to the fixed table are generic.
    pub fn kind_of(&self, name: &str) -> CategoryKind {
        self.lookup(name).unwrap_or(CategoryKind::Discovered)
    }
}

impl Display for Purpose {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Migration => fmt.write_str("migration"),
            Self::User => fmt.write_str("user"),
            Self::Work => fmt.write_str("work"),
            Self::AppConfig => fmt.write_str("app-config"),
        }
    }
}

/// Identity of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    ShellConfig,
    Credentials,
    GitConfig,
    NetworkConfig,
    UserDirs,

    /// Any category found by scanning a base directory.
    Discovered,
}

impl CategoryKind {
    /// Name of a fixed category. Discovered categories have no fixed name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ShellConfig => "shell-config",
            Self::Credentials => "credentials",
            Self::GitConfig => "git-config",
            Self::NetworkConfig => "network-config",
            Self::UserDirs => "user-dirs",
            Self::Discovered => "",
        }
    }

    /// Static behavior record of this kind.
    pub fn behavior(&self) -> &'static Behavior {
        match self {
            Self::ShellConfig => &SHELL_CONFIG,
            Self::Credentials => &CREDENTIALS,
            Self::GitConfig => &GIT_CONFIG,
            Self::NetworkConfig => &NETWORK_CONFIG,
            Self::UserDirs => &USER_DIRS,
            Self::Discovered => &DISCOVERED,
        }
    }
}

/// Category-specific behavior.
#[derive(Debug, PartialEq, Eq)]
pub struct Behavior {
    /// Member item names relative to the base directory.
    pub members: &'static [&'static str],

    /// Extra text printed next to restore conflicts.
    pub advisory: Option<&'static str>,

    /// Ownership fix applied after extraction.
    pub post_extract: PostExtract,
}

/// Ownership fix applied after a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostExtract {
    /// Rewrite owner of every known member that exists.
    ChownMembers,

    /// Same as [`PostExtract::ChownMembers`], then lock down `.ssh`.
    ChownMembersSecureSsh,

    /// Rewrite owner of the single top-level path the archive extracted.
    ChownTopLevel,
}

static SHELL_CONFIG: Behavior = Behavior {
    members: &[
        ".zshrc",
        ".zprofile",
        ".zshenv",
        ".zsh_history",
        ".bashrc",
        ".bash_profile",
        ".bash_history",
        ".profile",
        ".inputrc",
        ".oh-my-zsh",
    ],
    advisory: Some("existing shell configuration will be replaced, open a new terminal afterwards"),
    post_extract: PostExtract::ChownMembers,
};

static CREDENTIALS: Behavior = Behavior {
    members: &[".ssh", ".gnupg", ".aws", ".netrc", ".npmrc"],
    advisory: Some(
        "existing keys and credentials will be overwritten, keep a copy of any key that only lives on this machine",
    ),
    post_extract: PostExtract::ChownMembersSecureSsh,
};

static GIT_CONFIG: Behavior = Behavior {
    members: &[".gitconfig", ".gitignore_global", ".git-credentials", ".config/git"],
    advisory: None,
    post_extract: PostExtract::ChownMembers,
};

static NETWORK_CONFIG: Behavior = Behavior {
    members: &[".curlrc", ".wgetrc", ".config/wireguard", ".openvpn"],
    advisory: None,
    post_extract: PostExtract::ChownMembers,
};

static USER_DIRS: Behavior = Behavior {
    members: &["Desktop", "Documents", "Downloads", "Pictures", "Music", "Movies"],
    advisory: None,
    post_extract: PostExtract::ChownMembers,
};

static DISCOVERED: Behavior = Behavior {
    members: &[],
    advisory: None,
    post_extract: PostExtract::ChownTopLevel,
};

/// A resolved category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Category name, also the archive stem.
    pub name: String,

    /// Category identity.
    pub kind: CategoryKind,

    /// Member items relative to the base directory.
    pub members: Vec<PathBuf>,
}

impl Category {
    /// Construct category from fixed table entry.
    pub fn fixed(kind: CategoryKind) -> Self {
        Self {
            name: kind.name().to_string(),
            kind,
            members: kind.behavior().members.iter().map(PathBuf::from).collect(),
        }
    }

    /// Construct category from discovered item name.
    pub fn discovered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            members: vec![PathBuf::from(&name)],
            name,
            kind: CategoryKind::Discovered,
        }
    }

    /// Members that currently exist under `base`.
    ///
    /// Broken symlinks count as existing items.
    pub fn existing_members(&self, base: impl AsRef<Path>) -> Vec<PathBuf> {
        self.members
            .iter()
            .filter(|member| is_contained(member))
            .filter(|member| base.as_ref().join(member).symlink_metadata().is_ok())
            .cloned()
            .collect()
    }
}

/// Registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Base directory does not exist.
    #[error("base directory {:?} does not exist", base.display())]
    MissingBase { base: PathBuf },

    /// Base directory cannot be listed.
    #[error("failed to scan {:?}", base.display())]
    Scan {
        #[source]
        source: std::io::Error,
        base: PathBuf,
    },

    /// Named category is not part of the registry.
    #[error("no category named {name:?} for purpose {purpose}")]
    UnknownCategory { purpose: Purpose, name: String },
}

impl RegistryError {
    /// Broad kind of the underlying failure.
    pub fn fault(&self) -> Fault {
        match self {
            Self::MissingBase { .. } | Self::UnknownCategory { .. } => Fault::Missing,
            Self::Scan { source, .. } => Fault::of(source),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    #[test]
    fn static_members_stay_inside_base() {
        for purpose in Purpose::ALL {
            for kind in purpose.fixed_categories().unwrap_or_default() {
                for member in kind.behavior().members {
                    assert!(is_contained(member), "{member} escapes its base");
                }
            }
        }
    }

    #[test_case(Purpose::Migration, "shell-config", "shell-config.tar.gz"; "migration")]
    #[test_case(Purpose::Work, "my project", "my project.tar.gz"; "work keeps spaces")]
    #[test_case(Purpose::AppConfig, "Sublime Text 3", "Sublime_Text_3.tar.gz"; "app config")]
    #[test]
    fn archive_naming(purpose: Purpose, name: &str, expect: &str) {
        assert_eq!(purpose.archive_name(name), expect);
    }

    #[test]
    fn fixed_registry_order() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let names = Purpose::Migration
            .categories(base.path())?
            .into_iter()
            .map(|category| category.name)
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec!["shell-config", "credentials", "git-config", "network-config"]
        );

        Ok(())
    }

    #[test]
    fn scanned_registry_lists_children() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        create_dir_all(base.path().join("beta"))?;
        create_dir_all(base.path().join("alpha"))?;
        create_dir_all(base.path().join(".hidden"))?;
        write(base.path().join("notes.txt"), "hi")?;

        let work = Purpose::Work
            .categories(base.path())?
            .into_iter()
            .map(|category| category.name)
            .collect::<Vec<_>>();
        assert_eq!(work, vec!["alpha", "beta"]);

        let app = Purpose::AppConfig
            .categories(base.path())?
            .into_iter()
            .map(|category| category.name)
            .collect::<Vec<_>>();
        assert_eq!(app, vec!["alpha", "beta", "notes.txt"]);

        Ok(())
    }

    #[test]
    fn missing_base_is_fatal() {
        let result = Purpose::Work.categories("/nonexistent/oxishift/work");
        assert!(matches!(result, Err(RegistryError::MissingBase { .. })));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Purpose::Migration.lookup("git-config").ok(), Some(CategoryKind::GitConfig));
        assert_eq!(Purpose::AppConfig.lookup("Sublime Text").ok(), Some(CategoryKind::Discovered));

        let result = Purpose::Migration.lookup("browser-history");
        assert!(matches!(result, Err(RegistryError::UnknownCategory { .. })));
        assert_eq!(result.unwrap_err().fault(), Fault::Missing);
    }

    #[test]
    fn existing_members_skip_missing_items() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        write(base.path().join(".zshrc"), "export A=1")?;
        write(base.path().join(".profile"), "export B=2")?;

        let category = Category::fixed(CategoryKind::ShellConfig);
        let result = category.existing_members(base.path());
        assert_eq!(result, vec![PathBuf::from(".zshrc"), PathBuf::from(".profile")]);

        Ok(())
    }

    #[test]
    fn kind_from_archive_name() {
        assert_eq!(Purpose::Migration.kind_of("credentials"), CategoryKind::Credentials);
        assert_eq!(Purpose::Migration.kind_of("mystery"), CategoryKind::Discovered);
        assert_eq!(Purpose::Work.kind_of("credentials"), CategoryKind::Discovered);
    }
}
