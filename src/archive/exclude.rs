// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exclusion rule handling.
//!
//! Some purposes keep caches, logs, and Finder metadata out of their
//! archives. Exclusion rules use plain gitignore syntax relative to the base
//! directory being archived, so `Caches/` drops every directory named
//! `Caches` at any depth, and `/Caches/` only drops the top-level one.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Match paths against exclusion rules.
#[derive(Clone, Debug)]
pub struct Excluder {
    matcher: Gitignore,
}

impl Excluder {
    /// Construct new excluder rooted at `base`.
    ///
    /// # Errors
    ///
    /// - Return [`ExcludeError`] if a rule cannot be parsed.
    pub fn new(
        base: impl AsRef<Path>,
        rules: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(base.as_ref());
        for rule in rules {
            builder.add_line(None, rule.as_ref())?;
        }

        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Construct excluder that matches nothing.
    pub fn none() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// Check if path should be left out of an archive.
    ///
    /// The path must live under the base directory. A path is also excluded
    /// when any of its parents is.
    pub fn is_excluded(&self, path: impl AsRef<Path>, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(path.as_ref(), is_dir)
            .is_ignore()
    }
}

/// Exclusion rule errors.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ExcludeError(#[from] ignore::Error);

/// Friendly result alias :3
pub type Result<T, E = ExcludeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("/base/project/.DS_Store", false, true; "finder metadata")]
    #[test_case("/base/project/build.log", false, true; "log file")]
    #[test_case("/base/project/Caches", true, true; "cache directory")]
    #[test_case("/base/project/Caches/blob", false, true; "inside cache directory")]
    #[test_case("/base/project/src/main.rs", false, false; "source file")]
    #[test_case("/base/project/Caches", false, false; "file named like cache directory")]
    #[test]
    fn default_work_rules(path: &str, is_dir: bool, expect: bool) {
        let excluder = Excluder::new("/base", [".DS_Store", "*.log", ".cache/", "Caches/"]).unwrap();
        assert_eq!(excluder.is_excluded(path, is_dir), expect);
    }

    #[test]
    fn empty_excluder_matches_nothing() {
        let excluder = Excluder::none();
        assert!(!excluder.is_excluded("/base/.DS_Store", false));
    }
}
