// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote object store.
//!
//! The remote side of a chef repository is an opaque object store offering
//! get, list, create, update, and delete on a handful of collections, plus
//! whole-cookbook operations. How it talks to a server is not our concern,
//! only the contract and the errors it surfaces.
//!
//! # Memory Store
//!
//! [`MemoryStore`] implements the contract in memory. It can be loaded from
//! and saved to a JSON snapshot file, so a snapshot can stand in for a real
//! server. Like a real server, it always holds the `_default` environment,
//! which can be neither updated nor deleted.

use crate::{address::TopLevel, cookbook::CookbookVersion};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, instrument};

/// Name of the environment every store holds.
pub const DEFAULT_ENVIRONMENT: &str = "_default";

/// Reason the default environment refuses modification.
pub const DEFAULT_ENVIRONMENT_REASON: &str = "default environment cannot be modified";

/// Collection of JSON objects in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    Environments,
    Nodes,
    Roles,
    Users,

    /// Data bags themselves.
    DataBags,

    /// Items of one data bag.
    DataBag(String),
}

impl Collection {
    /// Collection of single-file objects stored under a top-level
    /// directory.
    pub fn for_top_level(top: TopLevel) -> Option<Self> {
        match top {
            TopLevel::Clients => Some(Self::Clients),
            TopLevel::Environments => Some(Self::Environments),
            TopLevel::Nodes => Some(Self::Nodes),
            TopLevel::Roles => Some(Self::Roles),
            TopLevel::Users => Some(Self::Users),
            TopLevel::DataBags => Some(Self::DataBags),
            TopLevel::Cookbooks => None,
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Clients => "clients",
            Self::Environments => "environments",
            Self::Nodes => "nodes",
            Self::Roles => "roles",
            Self::Users => "users",
            Self::DataBags => "data",
            Self::DataBag(bag) => bag,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::DataBag(bag) => write!(fmt, "data/{bag}"),
            collection => fmt.write_str(collection.key()),
        }
    }
}

/// Contract of the remote object store.
///
/// Every operation is synchronous and safe to call from several threads.
pub trait RemoteStore: Send + Sync + 'static {
    /// Names of all objects in a collection.
    fn list(&self, collection: &Collection) -> Result<Vec<String>>;

    /// Fetch one object.
    fn get(&self, collection: &Collection, name: &str) -> Result<Value>;

    /// Create new object, failing if it already exists.
    fn create(&self, collection: &Collection, name: &str, value: Value) -> Result<()>;

    /// Replace existing object.
    fn update(&self, collection: &Collection, name: &str, value: Value) -> Result<()>;

    /// Delete object. Deleting a data bag deletes its items.
    fn delete(&self, collection: &Collection, name: &str) -> Result<()>;

    /// Names of all cookbooks.
    fn list_cookbooks(&self) -> Result<Vec<String>>;

    /// Versions of one cookbook in store order.
    fn cookbook_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Fetch one cookbook version with all of its files.
    fn get_cookbook(&self, name: &str, version: &str) -> Result<CookbookVersion>;

    /// Create or replace one cookbook version.
    fn put_cookbook(&self, cookbook: CookbookVersion) -> Result<()>;

    /// Delete one cookbook version.
    fn delete_cookbook(&self, name: &str, version: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreState {
    objects: BTreeMap<String, BTreeMap<String, Value>>,
    data_bags: BTreeMap<String, BTreeMap<String, Value>>,
    cookbooks: BTreeMap<String, Vec<CookbookVersion>>,
}

impl StoreState {
    fn seed_default_environment(&mut self) {
        self.objects
            .entry(Collection::Environments.key().to_string())
            .or_default()
            .entry(DEFAULT_ENVIRONMENT.to_string())
            .or_insert_with(|| {
                json!({
                    "name": DEFAULT_ENVIRONMENT,
                    "description": "The default Chef environment",
                })
            });
    }

    fn objects(&self, collection: &Collection) -> Result<&BTreeMap<String, Value>> {
        match collection {
            Collection::DataBags => Err(StoreError::Unsupported {
                collection: collection.clone(),
            }),
            Collection::DataBag(bag) => self.data_bags.get(bag).ok_or_else(|| StoreError::NotFound {
                what: format!("data bag {bag}"),
            }),
            collection => Ok(self
                .objects
                .get(collection.key())
                .unwrap_or(&EMPTY_OBJECTS)),
        }
    }

    fn objects_mut(&mut self, collection: &Collection) -> Result<&mut BTreeMap<String, Value>> {
        match collection {
            Collection::DataBags => Err(StoreError::Unsupported {
                collection: collection.clone(),
            }),
            Collection::DataBag(bag) => {
                self.data_bags
                    .get_mut(bag)
                    .ok_or_else(|| StoreError::NotFound {
                        what: format!("data bag {bag}"),
                    })
            }
            collection => Ok(self.objects.entry(collection.key().to_string()).or_default()),
        }
    }
}

static EMPTY_OBJECTS: BTreeMap<String, Value> = BTreeMap::new();

/// In-memory remote object store.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Construct new store holding only the default environment.
    pub fn new() -> Self {
        let mut state = StoreState::default();
        state.seed_default_environment();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Load store from snapshot file.
    ///
    /// A missing snapshot file yields a fresh store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ReadSnapshot`] if snapshot cannot be read.
    /// - Return [`StoreError::ParseSnapshot`] if snapshot is not valid.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no store snapshot at {:?}, starting empty", path.display());
            return Ok(Self::new());
        }

        let data = read_to_string(path).map_err(|err| StoreError::ReadSnapshot {
            source: err,
            path: path.to_path_buf(),
        })?;
        let mut state: StoreState =
            serde_json::from_str(&data).map_err(|err| StoreError::ParseSnapshot {
                source: err,
                path: path.to_path_buf(),
            })?;
        state.seed_default_environment();

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Save store to snapshot file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::WriteSnapshot`] if snapshot cannot be written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = {
            let state = self.lock()?;
            serde_json::to_string_pretty(&*state).map_err(|err| StoreError::ParseSnapshot {
                source: err,
                path: path.to_path_buf(),
            })?
        };

        write(path, data).map_err(|err| StoreError::WriteSnapshot {
            source: err,
            path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn is_default_environment(collection: &Collection, name: &str) -> bool {
    *collection == Collection::Environments && name == DEFAULT_ENVIRONMENT
}

impl RemoteStore for MemoryStore {
    fn list(&self, collection: &Collection) -> Result<Vec<String>> {
        let state = self.lock()?;
        match collection {
            Collection::DataBags => Ok(state.data_bags.keys().cloned().collect()),
            collection => Ok(state.objects(collection)?.keys().cloned().collect()),
        }
    }

    fn get(&self, collection: &Collection, name: &str) -> Result<Value> {
        let state = self.lock()?;
        match collection {
            Collection::DataBags => state
                .data_bags
                .contains_key(name)
                .then(|| json!({ "name": name }))
                .ok_or_else(|| StoreError::NotFound {
                    what: format!("data bag {name}"),
                }),
            collection => state
                .objects(collection)?
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    what: format!("{collection}/{name}"),
                }),
        }
    }

    fn create(&self, collection: &Collection, name: &str, value: Value) -> Result<()> {
        let mut state = self.lock()?;
        let exists = match collection {
            Collection::DataBags => state.data_bags.contains_key(name),
            collection => state.objects(collection)?.contains_key(name),
        };
        if exists {
            return Err(StoreError::Conflict {
                what: format!("{collection}/{name}"),
            });
        }

        match collection {
            Collection::DataBags => {
                state.data_bags.insert(name.to_string(), BTreeMap::new());
            }
            collection => {
                state.objects_mut(collection)?.insert(name.to_string(), value);
            }
        }

        Ok(())
    }

    fn update(&self, collection: &Collection, name: &str, value: Value) -> Result<()> {
        if is_default_environment(collection, name) {
            return Err(StoreError::Forbidden {
                what: format!("{collection}/{name}"),
                reason: DEFAULT_ENVIRONMENT_REASON.into(),
            });
        }

        let mut state = self.lock()?;
        let objects = state.objects_mut(collection)?;
        let object = objects.get_mut(name).ok_or_else(|| StoreError::NotFound {
            what: format!("{collection}/{name}"),
        })?;
        *object = value;

        Ok(())
    }

    fn delete(&self, collection: &Collection, name: &str) -> Result<()> {
        if is_default_environment(collection, name) {
            return Err(StoreError::Forbidden {
                what: format!("{collection}/{name}"),
                reason: DEFAULT_ENVIRONMENT_REASON.into(),
            });
        }

        let mut state = self.lock()?;
        let removed = match collection {
            Collection::DataBags => state.data_bags.remove(name).is_some(),
            collection => state.objects_mut(collection)?.remove(name).is_some(),
        };

        removed.then_some(()).ok_or_else(|| StoreError::NotFound {
            what: format!("{collection}/{name}"),
        })
    }

    fn list_cookbooks(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.cookbooks.keys().cloned().collect())
    }

    fn cookbook_versions(&self, name: &str) -> Result<Vec<String>> {
        self.lock()?
            .cookbooks
            .get(name)
            .map(|versions| versions.iter().map(|cookbook| cookbook.version.clone()).collect())
            .ok_or_else(|| StoreError::NotFound {
                what: format!("cookbook {name}"),
            })
    }

    fn get_cookbook(&self, name: &str, version: &str) -> Result<CookbookVersion> {
        self.lock()?
            .cookbooks
            .get(name)
            .and_then(|versions| versions.iter().find(|cookbook| cookbook.version == version))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("cookbook {name} version {version}"),
            })
    }

    fn put_cookbook(&self, cookbook: CookbookVersion) -> Result<()> {
        let mut state = self.lock()?;
        let versions = state.cookbooks.entry(cookbook.name.clone()).or_default();
        match versions.iter_mut().find(|existing| existing.version == cookbook.version) {
            Some(existing) => *existing = cookbook,
            None => versions.push(cookbook),
        }

        Ok(())
    }

    fn delete_cookbook(&self, name: &str, version: &str) -> Result<()> {
        let mut state = self.lock()?;
        let versions = state
            .cookbooks
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("cookbook {name}"),
            })?;

        let before = versions.len();
        versions.retain(|cookbook| cookbook.version != version);
        if versions.len() == before {
            return Err(StoreError::NotFound {
                what: format!("cookbook {name} version {version}"),
            });
        }

        if versions.is_empty() {
            state.cookbooks.remove(name);
        }

        Ok(())
    }
}

/// Remote store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Object does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Object already exists.
    #[error("{what} already exists")]
    Conflict { what: String },

    /// Store refuses to modify object.
    #[error("{what} cannot be modified: {reason}")]
    Forbidden { what: String, reason: String },

    /// Operation is not available on collection.
    #[error("operation not supported on collection {collection}")]
    Unsupported { collection: Collection },

    /// Snapshot file cannot be read.
    #[error("failed to read store snapshot at {:?}", path.display())]
    ReadSnapshot {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Snapshot file cannot be written.
    #[error("failed to write store snapshot at {:?}", path.display())]
    WriteSnapshot {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Snapshot file is not valid.
    #[error("failed to parse store snapshot at {:?}", path.display())]
    ParseSnapshot {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Store lock was poisoned by a panicking thread.
    #[error("remote store lock poisoned")]
    Poisoned,
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
