// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Chef object addressing.
//!
//! Every logical path inside a chef repository addresses some kind of chef
//! object. The top-level segment decides the kind of object, and the depth
//! below it decides whether the path names the object itself, one of its
//! parts, or a grouping container.
//!
//! # Object Shapes
//!
//! Chef objects come in three shapes:
//!
//! 1. __Single-file__ objects: clients, environments, nodes, roles, and
//!    users. Each object is exactly one `<container>/<name>.json` file.
//! 2. __Data bags__: a directory per bag holding one `<item>.json` file per
//!    item. Bare files directly under `data_bags` are not items.
//! 3. __Cookbooks__: a directory per cookbook whose entire content belongs
//!    to the cookbook. In versioned layout the directory is named
//!    `<name>-<version>`.
//!
//! # See Also
//!
//! - [`LogicalPath`]

use crate::path::LogicalPath;

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kind of chef object a repository entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Client,
    Cookbook,
    DataBag,
    DataBagItem,
    Environment,
    Node,
    Role,
    User,
    Container,
}

impl Display for ObjectKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Client => "client",
            Self::Cookbook => "cookbook",
            Self::DataBag => "data_bag",
            Self::DataBagItem => "data_bag_item",
            Self::Environment => "environment",
            Self::Node => "node",
            Self::Role => "role",
            Self::User => "user",
            Self::Container => "container",
        };
        fmt.write_str(name)
    }
}

/// Shape of the objects stored under a top-level directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One `<name>.json` file per object.
    SingleFile,

    /// One directory of `<item>.json` files per bag.
    DataBag,

    /// One directory of arbitrary files per cookbook.
    Cookbook,
}

/// Top-level directory of a chef repository.
///
/// Closed policy table for everything that differs between object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopLevel {
    Clients,
    Cookbooks,
    DataBags,
    Environments,
    Nodes,
    Roles,
    Users,
}

impl TopLevel {
    /// All top-level directories in listing order.
    pub const ALL: [TopLevel; 7] = [
        Self::Clients,
        Self::Cookbooks,
        Self::DataBags,
        Self::Environments,
        Self::Nodes,
        Self::Roles,
        Self::Users,
    ];

    /// Name of the directory under the repository root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Cookbooks => "cookbooks",
            Self::DataBags => "data_bags",
            Self::Environments => "environments",
            Self::Nodes => "nodes",
            Self::Roles => "roles",
            Self::Users => "users",
        }
    }

    /// Lookup top-level directory by its directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|top| top.dir_name() == name)
    }

    /// Name of the configuration key holding this directory's roots.
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Clients => "client_path",
            Self::Cookbooks => "cookbook_path",
            Self::DataBags => "data_bag_path",
            Self::Environments => "environment_path",
            Self::Nodes => "node_path",
            Self::Roles => "role_path",
            Self::Users => "user_path",
        }
    }

    /// Kind of object stored directly underneath.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::Clients => ObjectKind::Client,
            Self::Cookbooks => ObjectKind::Cookbook,
            Self::DataBags => ObjectKind::DataBag,
            Self::Environments => ObjectKind::Environment,
            Self::Nodes => ObjectKind::Node,
            Self::Roles => ObjectKind::Role,
            Self::Users => ObjectKind::User,
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Cookbooks => Shape::Cookbook,
            Self::DataBags => Shape::DataBag,
            _ => Shape::SingleFile,
        }
    }

    /// Only cookbook content consults chefignore files.
    pub fn honors_chefignore(&self) -> bool {
        matches!(self, Self::Cookbooks)
    }

    /// Part of the static repository mode, i.e., not server-managed state.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Self::Cookbooks | Self::DataBags | Self::Environments | Self::Roles
        )
    }

    /// Logical path of this top-level directory.
    pub fn logical_path(&self) -> LogicalPath {
        LogicalPath::root().join(self.dir_name())
    }
}

impl Display for TopLevel {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.dir_name())
    }
}

/// Directory layout of cookbooks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CookbookLayout {
    /// Cookbook directories are named `<name>`.
    #[default]
    Unversioned,

    /// Cookbook directories are named `<name>-<version>`.
    Versioned,
}

/// Address of a chef object derived from its logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectAddress {
    Root,
    TopLevel(TopLevel),
    Object {
        top: TopLevel,
        name: String,
    },
    DataBag {
        bag: String,
    },
    DataBagItem {
        bag: String,
        item: String,
    },
    Cookbook {
        name: String,
        version: Option<String>,
    },
    CookbookFile {
        cookbook: String,
        version: Option<String>,
        file: Vec<String>,
    },
}

impl ObjectAddress {
    /// Parse logical path into an object address.
    ///
    /// # Errors
    ///
    /// - Return [`Error::UnknownTopLevel`] if first segment is not a known
    ///   top-level directory.
    /// - Return [`Error::NotAnObject`] if the path cannot name an object of
    ///   its kind, e.g., `/roles/x` without the `.json` extension.
    pub fn parse(path: &LogicalPath, layout: CookbookLayout) -> Result<Self> {
        let segments = path.segments();
        let Some(first) = segments.first() else {
            return Ok(Self::Root);
        };

        let top = TopLevel::from_dir_name(first).ok_or_else(|| Error::UnknownTopLevel {
            path: path.clone(),
        })?;
        let not_an_object = || Error::NotAnObject {
            path: path.clone(),
            kind: top.object_kind(),
        };

        match (top.shape(), &segments[1..]) {
            (_, []) => Ok(Self::TopLevel(top)),
            (Shape::SingleFile, [file]) => {
                let name = json_stem(file).ok_or_else(not_an_object)?;
                Ok(Self::Object {
                    top,
                    name: name.to_string(),
                })
            }
            (Shape::DataBag, [bag]) => Ok(Self::DataBag { bag: bag.clone() }),
            (Shape::DataBag, [bag, file]) => {
                let item = json_stem(file).ok_or_else(not_an_object)?;
                Ok(Self::DataBagItem {
                    bag: bag.clone(),
                    item: item.to_string(),
                })
            }
            (Shape::Cookbook, [dir, rest @ ..]) => {
                let (name, version) = match layout {
                    CookbookLayout::Unversioned => (dir.clone(), None),
                    CookbookLayout::Versioned => {
                        let (name, version) =
                            split_versioned_name(dir).ok_or_else(not_an_object)?;
                        (name.to_string(), Some(version.to_string()))
                    }
                };

                if rest.is_empty() {
                    Ok(Self::Cookbook { name, version })
                } else {
                    Ok(Self::CookbookFile {
                        cookbook: name,
                        version,
                        file: rest.to_vec(),
                    })
                }
            }
            _ => Err(not_an_object()),
        }
    }

    /// Convert address back into its logical path.
    pub fn to_logical_path(&self) -> LogicalPath {
        let root = LogicalPath::root();
        let cookbook_dir = |name: &str, version: &Option<String>| match version {
            Some(version) => format!("{name}-{version}"),
            None => name.to_string(),
        };

        match self {
            Self::Root => root,
            Self::TopLevel(top) => top.logical_path(),
            Self::Object { top, name } => top.logical_path().join(format!("{name}.json")),
            Self::DataBag { bag } => TopLevel::DataBags.logical_path().join(bag),
            Self::DataBagItem { bag, item } => TopLevel::DataBags
                .logical_path()
                .join(bag)
                .join(format!("{item}.json")),
            Self::Cookbook { name, version } => TopLevel::Cookbooks
                .logical_path()
                .join(cookbook_dir(name, version)),
            Self::CookbookFile {
                cookbook,
                version,
                file,
            } => TopLevel::Cookbooks
                .logical_path()
                .join(cookbook_dir(cookbook, version))
                .join(file.join("/")),
        }
    }

    /// Kind of object this address belongs to.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Root | Self::TopLevel(_) => ObjectKind::Container,
            Self::Object { top, .. } => top.object_kind(),
            Self::DataBag { .. } => ObjectKind::DataBag,
            Self::DataBagItem { .. } => ObjectKind::DataBagItem,
            Self::Cookbook { .. } | Self::CookbookFile { .. } => ObjectKind::Cookbook,
        }
    }

    /// Top-level directory containing this address.
    pub fn top_level(&self) -> Option<TopLevel> {
        match self {
            Self::Root => None,
            Self::TopLevel(top) | Self::Object { top, .. } => Some(*top),
            Self::DataBag { .. } | Self::DataBagItem { .. } => Some(TopLevel::DataBags),
            Self::Cookbook { .. } | Self::CookbookFile { .. } => Some(TopLevel::Cookbooks),
        }
    }

    /// Address holds JSON content that is normalized before comparison.
    pub fn is_json_object(&self) -> bool {
        matches!(self, Self::Object { .. } | Self::DataBagItem { .. })
    }

    /// Address names a composite object that must be deleted recursively.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::DataBag { .. } | Self::Cookbook { .. })
    }

    /// Check if an entry with this name and type may exist directly under
    /// this address.
    ///
    /// Cookbook content is validated further by chefignore rules, which are
    /// the business of the local tree view.
    pub fn accepts_child(&self, name: &str, is_dir: bool, layout: CookbookLayout) -> bool {
        match self {
            Self::Root => is_dir && TopLevel::from_dir_name(name).is_some(),
            Self::TopLevel(top) => match top.shape() {
                Shape::SingleFile => !is_dir && json_stem(name).is_some(),
                Shape::DataBag => is_dir && !name.starts_with('.'),
                Shape::Cookbook => {
                    is_dir
                        && !name.starts_with('.')
                        && (layout == CookbookLayout::Unversioned
                            || split_versioned_name(name).is_some())
                }
            },
            Self::DataBag { .. } => !is_dir && json_stem(name).is_some(),
            Self::Cookbook { .. } | Self::CookbookFile { .. } => name != "." && name != "..",
            Self::Object { .. } | Self::DataBagItem { .. } => false,
        }
    }
}

/// Strip `.json` extension from file name, rejecting an empty stem.
pub fn json_stem(file: &str) -> Option<&str> {
    file.strip_suffix(".json").filter(|stem| !stem.is_empty())
}

/// Split versioned cookbook directory name into name and version.
///
/// The version is everything after the last `-`, and must consist of
/// dot-separated numbers.
pub fn split_versioned_name(dir: &str) -> Option<(&str, &str)> {
    let (name, version) = dir.rsplit_once('-')?;
    let is_version = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

    if name.is_empty() || !is_version {
        return None;
    }

    Some((name, version))
}

/// Object addressing error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Path does not start with a known top-level directory.
    #[error("{path} is not inside a known top-level directory")]
    UnknownTopLevel { path: LogicalPath },

    /// Path cannot name an object of its kind.
    #[error("{path} cannot name a {kind}")]
    NotAnObject { path: LogicalPath, kind: ObjectKind },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
