// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Multi-root directory overlay.
//!
//! Each top-level directory of a chef repository may be backed by several
//! root directories on disk, e.g., two `cookbook_path` entries. The overlay
//! unions their children into one logical directory.
//!
//! # Conflicts
//!
//! When more than one root holds a valid child with the same name, the
//! child of the first configured root wins for every read and descent, and
//! a warning naming both directories is reported. Invalid entries never
//! take part, so an empty cookbook directory in the first root does not
//! shadow a real cookbook in the second root.

use crate::{address::TopLevel, config::ConfigError, report::Diagnostics};

use std::{
    collections::BTreeMap,
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Ordered root directories of every managed top-level directory.
///
/// # Invariant
///
/// - Top-level directories missing from the mapping are not managed.
/// - Earlier roots win name conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootMapping {
    repo_roots: Vec<PathBuf>,
    roots: BTreeMap<TopLevel, Vec<PathBuf>>,
}

impl RootMapping {
    /// Construct new mapping without managed top-level directories.
    pub fn new(repo_roots: Vec<PathBuf>) -> Self {
        Self {
            repo_roots,
            roots: BTreeMap::new(),
        }
    }

    /// Manage top-level directory with target roots.
    pub fn insert(&mut self, top: TopLevel, roots: Vec<PathBuf>) {
        self.roots.insert(top, roots);
    }

    /// Builder form of [`RootMapping::insert`].
    pub fn with(mut self, top: TopLevel, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.insert(top, roots.into_iter().map(Into::into).collect());
        self
    }

    /// Roots of a top-level directory, `None` if it is not managed.
    pub fn roots(&self, top: TopLevel) -> Option<&[PathBuf]> {
        self.roots.get(&top).map(Vec::as_slice)
    }

    /// Managed top-level directories in listing order.
    pub fn top_levels(&self) -> impl Iterator<Item = TopLevel> + '_ {
        self.roots.keys().copied()
    }

    /// Repository root directories.
    pub fn repo_roots(&self) -> &[PathBuf] {
        &self.repo_roots
    }

    /// Check if a top-level directory is managed and has roots.
    pub fn is_configured(&self, top: TopLevel) -> bool {
        self.roots(top).is_some_and(|roots| !roots.is_empty())
    }

    /// Roots of a top-level directory that must be configured.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Unconfigured`] if no roots are configured.
    pub fn configured_roots(&self, top: TopLevel) -> Result<&[PathBuf], ConfigError> {
        match self.roots(top) {
            Some(roots) if !roots.is_empty() => Ok(roots),
            _ => Err(ConfigError::Unconfigured { top }),
        }
    }
}

/// Child of a top-level directory found in one of its roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayChild {
    pub name: String,
    pub root: PathBuf,
    pub os_path: PathBuf,
    pub is_dir: bool,
}

/// Merge the roots of a top-level directory into one namespace.
#[derive(Debug)]
pub struct OverlayDirectoryResolver<'a> {
    mapping: &'a RootMapping,
    diagnostics: &'a Diagnostics,
}

impl<'a> OverlayDirectoryResolver<'a> {
    /// Construct new resolver.
    pub fn new(mapping: &'a RootMapping, diagnostics: &'a Diagnostics) -> Self {
        Self {
            mapping,
            diagnostics,
        }
    }

    /// Check if any root of a top-level directory exists.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if top-level directory is not configured.
    pub fn exists(&self, top: TopLevel) -> Result<bool> {
        Ok(self
            .mapping
            .configured_roots(top)?
            .iter()
            .any(|root| root.is_dir()))
    }

    /// List union of valid children across all roots, ordered by name.
    ///
    /// The `accept` predicate decides which entries are valid children.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if top-level directory is not configured.
    /// - Return [`Error::ReadDir`] if a root cannot be read.
    pub fn resolve<F>(&self, top: TopLevel, mut accept: F) -> Result<Vec<OverlayChild>>
    where
        F: FnMut(&OverlayChild) -> Result<bool>,
    {
        let mut winners: BTreeMap<String, OverlayChild> = BTreeMap::new();
        for root in self.mapping.configured_roots(top)? {
            for child in scan_root(root)? {
                if !accept(&child)? {
                    continue;
                }

                match winners.get(&child.name) {
                    Some(winner) => self.conflict(winner, &child),
                    None => {
                        winners.insert(child.name.clone(), child);
                    }
                }
            }
        }

        Ok(winners.into_values().collect())
    }

    /// Find the winning valid child with target name.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if top-level directory is not configured.
    pub fn resolve_child<F>(&self, top: TopLevel, name: &str, mut accept: F) -> Result<Option<OverlayChild>>
    where
        F: FnMut(&OverlayChild) -> Result<bool>,
    {
        let mut winner: Option<OverlayChild> = None;
        for root in self.mapping.configured_roots(top)? {
            let os_path = root.join(name);
            if !os_path.exists() {
                continue;
            }

            let child = OverlayChild {
                name: name.to_string(),
                root: root.clone(),
                is_dir: os_path.is_dir(),
                os_path,
            };
            if !accept(&child)? {
                continue;
            }

            match &winner {
                Some(winner) => self.conflict(winner, &child),
                None => winner = Some(child),
            }
        }

        Ok(winner)
    }

    fn conflict(&self, winner: &OverlayChild, loser: &OverlayChild) {
        debug!("{:?} shadows {:?}", winner.os_path.display(), loser.os_path.display());
        self.diagnostics.warn(format!(
            "Child with name '{}' found in multiple directories: {} and {}",
            winner.name,
            winner.os_path.display(),
            loser.os_path.display()
        ));
    }
}

fn scan_root(root: &Path) -> Result<Vec<OverlayChild>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let entries = read_dir(root).map_err(|err| Error::ReadDir {
        source: err,
        path: root.to_path_buf(),
    })?;

    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::ReadDir {
            source: err,
            path: root.to_path_buf(),
        })?;
        let os_path = entry.path();
        children.push(OverlayChild {
            name: entry.file_name().to_string_lossy().into_owned(),
            root: root.to_path_buf(),
            is_dir: os_path.is_dir(),
            os_path,
        });
    }

    children.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(children)
}

/// Overlay error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Top-level directory has no configured roots.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Directory cannot be read.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Chefignore rules cannot be loaded while validating children.
    #[error(transparent)]
    Chefignore(#[from] crate::chefignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
