// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Chefignore rule handling.
//!
//! Utilities to load and apply the `chefignore` files that exclude content
//! from cookbooks.
//!
//! # Chefignore Syntax
//!
//! A chefignore file holds one pattern per line. Blank lines and lines
//! starting with `#` are skipped. The pattern syntax is the gitignore
//! syntax, so a pattern without `/` matches a file name at any depth while a
//! pattern with a `/` is anchored to the directory of the chefignore file.
//!
//! Patterns are only ever checked against __files__. A directory is kept as
//! long as some file underneath it survives, so both `recipes` and
//! `recipes/` leave the `recipes` directory alone.
//!
//! # Scoping
//!
//! A chefignore file applies to everything at or below its directory,
//! unless a chefignore closer to the matched file exists. The chefignore at
//! the top of a cookbook root directory applies to every cookbook in that
//! root, relative to each cookbook's own directory.
//!
//! # See Also
//!
//! - [Man page gitignore](https://git-scm.com/docs/gitignore)

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::debug;

/// Name of files holding ignore rules.
pub const CHEFIGNORE: &str = "chefignore";

/// One compiled ignore pattern.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    matcher: Option<Gitignore>,
}

impl PathMatcher {
    /// Compile one ignore pattern line.
    ///
    /// Patterns are not validated, a line that fails to compile simply
    /// matches nothing.
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let mut builder = GitignoreBuilder::new(".");
        let matcher = match builder.add_line(None, &pattern) {
            Ok(builder) => builder.build().ok(),
            Err(error) => {
                debug!("inert chefignore pattern {pattern:?}: {error}");
                None
            }
        };

        Self { pattern, matcher }
    }

    /// Pattern as written in the chefignore file.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match a file path relative to the chefignore directory.
    pub fn matches(&self, relative: impl AsRef<Path>) -> bool {
        self.matcher
            .as_ref()
            .map(|matcher| matcher.matched(relative.as_ref(), false).is_ignore())
            .unwrap_or(false)
    }
}

/// Ignore rules of one chefignore file.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    matchers: Vec<PathMatcher>,
}

impl IgnoreRuleSet {
    /// Load rules from chefignore file of target directory.
    ///
    /// A directory without a chefignore file yields an empty rule set.
    ///
    /// # Errors
    ///
    /// - Return [`Error::ReadChefignore`] if existing chefignore file cannot
    ///   be read.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CHEFIGNORE);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = read_to_string(&path).map_err(|err| Error::ReadChefignore {
            source: err,
            path: path.clone(),
        })?;

        Ok(Self::from(content.as_str()))
    }

    /// Check if any rule matches file path relative to rule directory.
    pub fn is_ignored(&self, relative: impl AsRef<Path>) -> bool {
        self.matchers
            .iter()
            .any(|matcher| matcher.matches(relative.as_ref()))
    }

    /// Check if rule set holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.matchers.len()
    }
}

impl From<&str> for IgnoreRuleSet {
    fn from(content: &str) -> Self {
        let matchers = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(PathMatcher::new)
            .collect();

        Self { matchers }
    }
}

/// Per-invocation cache of loaded chefignore files.
///
/// # Invariant
///
/// - Each directory is read at most once per cache.
#[derive(Debug, Default)]
pub struct IgnoreCache {
    rules: Mutex<HashMap<PathBuf, Arc<IgnoreRuleSet>>>,
}

impl IgnoreCache {
    /// Construct new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules of chefignore file in target directory, loading if needed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::ReadChefignore`] if chefignore file cannot be read.
    pub fn rules(&self, dir: &Path) -> Result<Arc<IgnoreRuleSet>> {
        let mut rules = self.rules.lock().map_err(|_| Error::Poisoned)?;
        if let Some(rule_set) = rules.get(dir) {
            return Ok(rule_set.clone());
        }

        let rule_set = Arc::new(IgnoreRuleSet::load(dir)?);
        debug!("loaded {} chefignore rules from {:?}", rule_set.len(), dir.display());
        rules.insert(dir.to_path_buf(), rule_set.clone());
        Ok(rule_set)
    }

    /// Check if a file inside a cookbook is ignored.
    ///
    /// Walks from the file's directory up to `cookbook_dir`, then tries
    /// `cookbook_root`. The first directory holding a chefignore file
    /// decides, matching relative to itself, or relative to `cookbook_dir`
    /// for the root-level file.
    ///
    /// # Errors
    ///
    /// - Return [`Error::ReadChefignore`] if chefignore file cannot be read.
    pub fn is_ignored(&self, cookbook_root: &Path, cookbook_dir: &Path, file: &Path) -> Result<bool> {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if !current.starts_with(cookbook_dir) {
                break;
            }

            if current.join(CHEFIGNORE).is_file() {
                let relative = file.strip_prefix(current).unwrap_or(file);
                return Ok(self.rules(current)?.is_ignored(relative));
            }

            dir = current.parent();
        }

        if cookbook_root.join(CHEFIGNORE).is_file() {
            let relative = file.strip_prefix(cookbook_dir).unwrap_or(file);
            return Ok(self.rules(cookbook_root)?.is_ignored(relative));
        }

        Ok(false)
    }
}

/// Chefignore handling error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Chefignore file cannot be read.
    #[error("failed to read chefignore file at {:?}", path.display())]
    ReadChefignore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Chefignore cache lock was poisoned by a panicking thread.
    #[error("chefignore cache lock poisoned")]
    Poisoned,
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
