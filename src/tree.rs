// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Uniform tree views over both sides of a chef repository.
//!
//! The local repository and the remote object store look nothing alike on
//! the inside, but the diff engine and the sync executor need to walk and
//! mutate both the same way. A [`TreeView`] exposes either side as a tree of
//! [`RepoEntry`] nodes addressed by [`LogicalPath`].
//!
//! Entries are produced lazily. Nothing is materialized beyond what a walk
//! actually asks for.
//!
//! # Tree Views
//!
//! - [`LocalTree`]: local filesystem, honoring the root mapping and
//!   chefignore rules.
//! - [`RemoteTree`]: remote object store, resolving cookbook versions.
//!
//! # See Also
//!
//! - [`ObjectAddress`]

pub mod local;
pub mod remote;

pub use local::LocalTree;
pub use remote::RemoteTree;

use crate::{
    address::{CookbookLayout, ObjectAddress, ObjectKind},
    config::ConfigError,
    cookbook::{metadata_version, CookbookVersion, DEFAULT_VERSION},
    handler::Content,
    path::LogicalPath,
    store::StoreError,
};

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

/// Side of a chef repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    /// The opposite side.
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

impl Display for Side {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Local => fmt.write_str("local"),
            Self::Remote => fmt.write_str("remote"),
        }
    }
}

/// Node of a tree view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub path: LogicalPath,
    pub kind: ObjectKind,
    pub is_leaf: bool,
}

impl RepoEntry {
    /// Construct new entry.
    pub fn new(path: LogicalPath, kind: ObjectKind, is_leaf: bool) -> Self {
        Self {
            path,
            kind,
            is_leaf,
        }
    }

    /// Check if entry can hold children.
    pub fn is_dir(&self) -> bool {
        !self.is_leaf
    }

    /// Name of the entry, empty for the root.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }
}

/// Uniform view over one side of a chef repository.
pub trait TreeView: Send + Sync + 'static {
    /// Side this view represents.
    fn side(&self) -> Side;

    /// Cookbook directory layout of this view.
    fn layout(&self) -> CookbookLayout;

    /// Lookup entry, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if the path needs an unconfigured root.
    fn entry(&self, path: &LogicalPath) -> Result<Option<RepoEntry>>;

    /// Children of a directory entry ordered by name.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotFound`] if directory does not exist.
    fn list_children(&self, path: &LogicalPath) -> Result<Vec<RepoEntry>>;

    /// Check if an entry with this name and type is valid under `parent`,
    /// whether or not `parent` exists yet.
    fn can_have_child(&self, parent: &LogicalPath, name: &str, is_dir: bool) -> bool;

    /// Read leaf content.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotFound`] if leaf does not exist.
    fn read(&self, path: &LogicalPath) -> Result<Content>;

    /// Create directory entry.
    fn create_dir(&self, path: &LogicalPath) -> Result<()>;

    /// Create or replace leaf entry.
    fn write(&self, path: &LogicalPath, content: &Content) -> Result<()>;

    /// Delete entry.
    ///
    /// # Errors
    ///
    /// - Return [`Error::MustDeleteRecursively`] if entry is a directory
    ///   and `recursive` is not set.
    /// - Return [`Error::NotAllowed`] if entry can never be deleted.
    fn delete(&self, path: &LogicalPath, recursive: bool) -> Result<()>;

    /// Cookbooks are only ever written as a whole.
    fn writes_whole_cookbooks(&self) -> bool {
        false
    }

    /// Write an entire cookbook in one operation.
    ///
    /// With `replace_versions`, every other version of the cookbook is
    /// removed afterwards.
    fn write_cookbook(
        &self,
        path: &LogicalPath,
        _cookbook: CookbookVersion,
        _replace_versions: bool,
    ) -> Result<()> {
        Err(Error::NotAllowed {
            path: path.clone(),
            side: self.side(),
            operation: Operation::Update,
            reason: None,
        })
    }
}

/// Read an entire cookbook directory through a tree view.
///
/// The version comes from the directory name in versioned layout, else from
/// the cookbook metadata.
///
/// # Errors
///
/// - Return [`Error::Address`] if path does not name a cookbook.
/// - Return any error raised while walking or reading the cookbook.
pub fn read_cookbook(view: &dyn TreeView, path: &LogicalPath) -> Result<CookbookVersion> {
    let ObjectAddress::Cookbook { name, version } = ObjectAddress::parse(path, view.layout())? else {
        return Err(Error::NotACookbook { path: path.clone() });
    };

    let mut files = BTreeMap::new();
    let mut pending = vec![path.clone()];
    while let Some(dir) = pending.pop() {
        for child in view.list_children(&dir)? {
            if child.is_dir() {
                pending.push(child.path);
                continue;
            }

            let relative = child.path.strip_prefix(path).unwrap_or_default().join("/");
            files.insert(relative, view.read(&child.path)?.to_bytes());
        }
    }

    let version = version
        .or_else(|| metadata_version(&files))
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    Ok(CookbookVersion {
        name,
        version,
        files,
    })
}

/// Operation refused by a tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateChild,
    Update,
    Delete,
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::CreateChild => fmt.write_str("cannot have a child created under it"),
            Self::Update => fmt.write_str("cannot be updated"),
            Self::Delete => fmt.write_str("cannot be deleted"),
        }
    }
}

/// Tree view error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Entry does not exist.
    #[error("{path}: No such file or directory")]
    NotFound { path: LogicalPath, side: Side },

    /// Entry refuses the operation at this granularity.
    #[error("{path} {operation}")]
    NotAllowed {
        path: LogicalPath,
        side: Side,
        operation: Operation,
        reason: Option<String>,
    },

    /// Composite entry deleted without recursion.
    #[error("{path} must be deleted recursively!  Pass -r to knife delete.")]
    MustDeleteRecursively { path: LogicalPath, side: Side },

    /// Entry is a directory on one side and a file on the other.
    #[error("File {path} is a directory on one side and a regular file on the other")]
    TypeMismatch { path: LogicalPath },

    /// Path does not name a cookbook.
    #[error("{path} is not a cookbook")]
    NotACookbook { path: LogicalPath },

    /// Remote store operation failed.
    #[error("{path}: {source}")]
    Store {
        #[source]
        source: StoreError,
        path: LogicalPath,
    },

    /// Content is not valid JSON where JSON is required.
    #[error("Parse error reading {path} as JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        path: LogicalPath,
    },

    /// Filesystem operation failed.
    #[error("{path}: failed to access {:?}", os_path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: LogicalPath,
        os_path: PathBuf,
    },

    /// Root mapping cannot serve the path.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Chefignore rules cannot be loaded.
    #[error(transparent)]
    Chefignore(#[from] crate::chefignore::Error),

    /// Overlay cannot resolve a top-level directory.
    #[error(transparent)]
    Overlay(#[from] crate::overlay::Error),

    /// Path cannot address an object.
    #[error(transparent)]
    Address(#[from] crate::address::Error),
}

impl Error {
    /// Configuration errors abort the whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Overlay(crate::overlay::Error::Config(_))
        )
    }

    /// Render error for the user.
    ///
    /// Paths are rendered through `format`. With `with_side`, refusals name
    /// the side that refused, e.g., `/clients (remote) cannot be deleted.`
    pub fn describe(&self, format: &dyn Fn(&LogicalPath) -> String, with_side: bool) -> String {
        let side_of = |side: &Side| {
            if with_side {
                format!(" ({side})")
            } else {
                String::new()
            }
        };

        match self {
            Self::NotFound { path, .. } => format!("{}: No such file or directory", format(path)),
            Self::NotAllowed {
                path,
                side,
                operation,
                reason,
            } => match reason {
                Some(reason) => format!("{}{} {operation} ({reason}).", format(path), side_of(side)),
                None => format!("{}{} {operation}.", format(path), side_of(side)),
            },
            Self::MustDeleteRecursively { path, side } => format!(
                "{}{} must be deleted recursively!  Pass -r to knife delete.",
                format(path),
                side_of(side)
            ),
            error => error.to_string(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn describe_refusals() -> anyhow::Result<()> {
        let format = |path: &LogicalPath| path.to_string();
        let error = Error::NotAllowed {
            path: "/clients".parse()?,
            side: Side::Remote,
            operation: Operation::Delete,
            reason: None,
        };
        assert_eq!(error.describe(&format, false), "/clients cannot be deleted.");
        assert_eq!(error.describe(&format, true), "/clients (remote) cannot be deleted.");

        let error = Error::NotAllowed {
            path: "/environments/_default.json".parse()?,
            side: Side::Remote,
            operation: Operation::Delete,
            reason: Some("default environment cannot be modified".into()),
        };
        assert_eq!(
            error.describe(&format, true),
            "/environments/_default.json (remote) cannot be deleted (default environment cannot be modified)."
        );

        let error = Error::MustDeleteRecursively {
            path: "/cookbooks/x".parse()?,
            side: Side::Local,
        };
        assert_eq!(
            error.describe(&format, true),
            "/cookbooks/x (local) must be deleted recursively!  Pass -r to knife delete."
        );

        let error = Error::NotAllowed {
            path: "/cookbooks/x".parse()?,
            side: Side::Remote,
            operation: Operation::CreateChild,
            reason: None,
        };
        assert_eq!(
            error.describe(&format, false),
            "/cookbooks/x cannot have a child created under it."
        );

        Ok(())
    }
}
