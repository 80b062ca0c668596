// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote object store tree view.
//!
//! Presents the flat collections of a [`RemoteStore`] as the same logical
//! tree the local repository uses. Single-file objects appear as
//! `<name>.json`, data bags as directories of items, and cookbooks as
//! directories built from the file set of one cookbook version.
//!
//! # Cookbook Versions
//!
//! In unversioned layout `/cookbooks/<name>` stands for one selected
//! version. Selection goes through [`CookbookVersionSelector`], except when
//! the tree is pinned to local versions for an upload: then the version
//! equal to the local one represents the cookbook, and a cookbook missing
//! that version exists but appears empty.

use crate::{
    address::{split_versioned_name, CookbookLayout, ObjectAddress, ObjectKind, Shape, TopLevel},
    config::RepoConfig,
    cookbook::{CookbookVersion, CookbookVersionSelector},
    handler::{normalize, Content},
    path::LogicalPath,
    store::{Collection, RemoteStore, StoreError},
    tree::{Error, Operation, RepoEntry, Result, Side, TreeView},
};

use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};
use tracing::{debug, instrument};

/// Tree view over the remote object store.
pub struct RemoteTree {
    store: Arc<dyn RemoteStore>,
    top_levels: Vec<TopLevel>,
    layout: CookbookLayout,
    selector: CookbookVersionSelector,
    local_versions: HashMap<String, String>,
    pinned: bool,
    cookbooks: Mutex<HashMap<(String, String), Arc<CookbookVersion>>>,
}

/// Version standing for a cookbook directory.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Missing,

    /// Cookbook exists, but not in the pinned version.
    Empty,
    Version(String),
}

impl RemoteTree {
    /// Construct new remote tree view exposing target top-level directories.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        top_levels: Vec<TopLevel>,
        layout: CookbookLayout,
        selector: CookbookVersionSelector,
    ) -> Self {
        Self {
            store,
            top_levels,
            layout,
            selector,
            local_versions: HashMap::new(),
            pinned: false,
            cookbooks: Mutex::new(HashMap::new()),
        }
    }

    /// Construct new remote tree view from repository configuration.
    pub fn from_config(config: &RepoConfig, store: Arc<dyn RemoteStore>) -> Self {
        Self::new(
            store,
            config.enabled_top_levels(),
            config.cookbook_layout(),
            CookbookVersionSelector::new(config.cookbook_version_policy),
        )
    }

    /// Local cookbook versions consulted by version selection.
    pub fn with_local_versions(mut self, versions: HashMap<String, String>) -> Self {
        self.local_versions = versions;
        self
    }

    /// Represent each cookbook by the version equal to its local version.
    pub fn pin_to_local_versions(mut self, versions: HashMap<String, String>) -> Self {
        self.local_versions = versions;
        self.pinned = true;
        self
    }

    /// Underlying object store.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    fn is_enabled(&self, top: TopLevel) -> bool {
        self.top_levels.contains(&top)
    }

    fn resolve_cookbook(&self, path: &LogicalPath, name: &str, version: Option<&String>) -> Result<Resolved> {
        let versions = match self.store.cookbook_versions(name) {
            Ok(versions) => versions,
            Err(StoreError::NotFound { .. }) => return Ok(Resolved::Missing),
            Err(err) => return Err(self.store_error(path, Operation::Update, err)),
        };

        if let Some(version) = version {
            if versions.contains(version) {
                return Ok(Resolved::Version(version.clone()));
            }
            return Ok(Resolved::Missing);
        }

        let local = self.local_versions.get(name);
        if let (true, Some(local)) = (self.pinned, local) {
            return Ok(match self.selector.select_for_upload(&versions, local) {
                Some(version) => Resolved::Version(version),
                None => Resolved::Empty,
            });
        }

        Ok(match self.selector.select(name, &versions, local.map(String::as_str)) {
            Some(version) => Resolved::Version(version),
            None => Resolved::Missing,
        })
    }

    fn cookbook(&self, path: &LogicalPath, name: &str, version: &str) -> Result<Arc<CookbookVersion>> {
        let key = (name.to_string(), version.to_string());
        if let Ok(cache) = self.cookbooks.lock() {
            if let Some(cookbook) = cache.get(&key) {
                return Ok(cookbook.clone());
            }
        }

        let cookbook = Arc::new(
            self.store
                .get_cookbook(name, version)
                .map_err(|err| self.store_error(path, Operation::Update, err))?,
        );
        if let Ok(mut cache) = self.cookbooks.lock() {
            cache.insert(key, cookbook.clone());
        }

        Ok(cookbook)
    }

    fn forget_cookbook(&self, name: &str) {
        if let Ok(mut cache) = self.cookbooks.lock() {
            cache.retain(|(cached, _), _| cached != name);
        }
    }

    /// File set of the version standing for a cookbook, `None` if the
    /// cookbook does not exist.
    fn cookbook_files(
        &self,
        path: &LogicalPath,
        name: &str,
        version: Option<&String>,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        match self.resolve_cookbook(path, name, version)? {
            Resolved::Missing => Ok(None),
            Resolved::Empty => Ok(Some(BTreeMap::new())),
            Resolved::Version(version) => Ok(Some(self.cookbook(path, name, &version)?.files.clone())),
        }
    }

    fn found<T>(&self, path: &LogicalPath, result: std::result::Result<T, StoreError>) -> Result<bool> {
        match result {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(self.store_error(path, Operation::Update, err)),
        }
    }

    fn store_error(&self, path: &LogicalPath, operation: Operation, err: StoreError) -> Error {
        match err {
            StoreError::NotFound { .. } => self.not_found(path),
            StoreError::Forbidden { reason, .. } => Error::NotAllowed {
                path: path.clone(),
                side: Side::Remote,
                operation,
                reason: Some(reason),
            },
            source => Error::Store {
                source,
                path: path.clone(),
            },
        }
    }

    fn not_found(&self, path: &LogicalPath) -> Error {
        Error::NotFound {
            path: path.clone(),
            side: Side::Remote,
        }
    }

    fn not_allowed(&self, path: &LogicalPath, operation: Operation) -> Error {
        Error::NotAllowed {
            path: path.clone(),
            side: Side::Remote,
            operation,
            reason: None,
        }
    }

    fn child_entry(&self, parent: &LogicalPath, name: &str, is_dir: bool) -> Option<RepoEntry> {
        let path = parent.join(name);
        let kind = ObjectAddress::parse(&path, self.layout).ok()?.kind();
        Some(RepoEntry::new(path, kind, !is_dir))
    }

    fn list_cookbook_dirs(&self, path: &LogicalPath) -> Result<Vec<RepoEntry>> {
        let mut names = self
            .store
            .list_cookbooks()
            .map_err(|err| self.store_error(path, Operation::Update, err))?;
        names.sort();

        let mut entries = Vec::new();
        for name in names {
            match self.layout {
                CookbookLayout::Versioned => {
                    let versions = self
                        .store
                        .cookbook_versions(&name)
                        .map_err(|err| self.store_error(path, Operation::Update, err))?;
                    for version in versions {
                        let dir = format!("{name}-{version}");
                        if split_versioned_name(&dir).is_some() {
                            entries.extend(self.child_entry(path, &dir, true));
                        }
                    }
                }
                CookbookLayout::Unversioned => {
                    if self.resolve_cookbook(path, &name, None)? != Resolved::Missing {
                        entries.extend(self.child_entry(path, &name, true));
                    }
                }
            }
        }

        Ok(entries)
    }
}

/// Immediate children of a directory inside a cookbook file set.
fn cookbook_children<'a>(files: &'a BTreeMap<String, Vec<u8>>, prefix: &str) -> BTreeMap<&'a str, bool> {
    let mut children = BTreeMap::new();
    for file in files.keys() {
        let rest = match prefix {
            "" => Some(file.as_str()),
            prefix => file
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/')),
        };

        if let Some(rest) = rest {
            match rest.split_once('/') {
                Some((dir, _)) => children.insert(dir, true),
                None => children.insert(rest, false),
            };
        }
    }

    children
}

impl TreeView for RemoteTree {
    fn side(&self) -> Side {
        Side::Remote
    }

    fn layout(&self) -> CookbookLayout {
        self.layout
    }

    fn entry(&self, path: &LogicalPath) -> Result<Option<RepoEntry>> {
        let Ok(address) = ObjectAddress::parse(path, self.layout) else {
            return Ok(None);
        };
        if address.top_level().is_some_and(|top| !self.is_enabled(top)) {
            return Ok(None);
        }

        let is_leaf = match &address {
            ObjectAddress::Root | ObjectAddress::TopLevel(_) => Some(false),
            ObjectAddress::Object { top, name } => {
                let Some(collection) = Collection::for_top_level(*top) else {
                    return Ok(None);
                };
                self.found(path, self.store.get(&collection, name))?.then_some(true)
            }
            ObjectAddress::DataBag { bag } => self
                .found(path, self.store.get(&Collection::DataBags, bag))?
                .then_some(false),
            ObjectAddress::DataBagItem { bag, item } => self
                .found(path, self.store.get(&Collection::DataBag(bag.clone()), item))?
                .then_some(true),
            ObjectAddress::Cookbook { name, version } => {
                (self.resolve_cookbook(path, name, version.as_ref())? != Resolved::Missing).then_some(false)
            }
            ObjectAddress::CookbookFile {
                cookbook,
                version,
                file,
            } => {
                let Some(files) = self.cookbook_files(path, cookbook, version.as_ref())? else {
                    return Ok(None);
                };
                let file = file.join("/");
                let dir = format!("{file}/");
                if files.contains_key(&file) {
                    Some(true)
                } else {
                    files.keys().any(|key| key.starts_with(&dir)).then_some(false)
                }
            }
        };

        Ok(is_leaf.map(|is_leaf| RepoEntry::new(path.clone(), address.kind(), is_leaf)))
    }

    #[instrument(skip(self), level = "debug")]
    fn list_children(&self, path: &LogicalPath) -> Result<Vec<RepoEntry>> {
        let address = ObjectAddress::parse(path, self.layout)?;
        if address.top_level().is_some_and(|top| !self.is_enabled(top)) {
            return Err(self.not_found(path));
        }

        let list = |collection: &Collection| {
            let mut names = self
                .store
                .list(collection)
                .map_err(|err| self.store_error(path, Operation::Update, err))?;
            names.sort();
            Ok::<_, Error>(names)
        };

        match &address {
            ObjectAddress::Root => Ok(self
                .top_levels
                .iter()
                .map(|top| RepoEntry::new(top.logical_path(), ObjectKind::Container, false))
                .collect()),
            ObjectAddress::TopLevel(top) => match (top.shape(), Collection::for_top_level(*top)) {
                (Shape::SingleFile, Some(collection)) => Ok(list(&collection)?
                    .into_iter()
                    .filter_map(|name| self.child_entry(path, &format!("{name}.json"), false))
                    .collect()),
                (Shape::DataBag, _) => Ok(list(&Collection::DataBags)?
                    .into_iter()
                    .filter_map(|bag| self.child_entry(path, &bag, true))
                    .collect()),
                _ => self.list_cookbook_dirs(path),
            },
            ObjectAddress::DataBag { bag } => Ok(list(&Collection::DataBag(bag.clone()))?
                .into_iter()
                .filter_map(|item| self.child_entry(path, &format!("{item}.json"), false))
                .collect()),
            ObjectAddress::Cookbook { name, version } => {
                let files = self
                    .cookbook_files(path, name, version.as_ref())?
                    .ok_or_else(|| self.not_found(path))?;
                Ok(cookbook_children(&files, "")
                    .into_iter()
                    .filter_map(|(name, is_dir)| self.child_entry(path, name, is_dir))
                    .collect())
            }
            ObjectAddress::CookbookFile {
                cookbook,
                version,
                file,
            } => {
                let files = self
                    .cookbook_files(path, cookbook, version.as_ref())?
                    .ok_or_else(|| self.not_found(path))?;
                let children = cookbook_children(&files, &file.join("/"));
                if children.is_empty() {
                    return Err(self.not_found(path));
                }

                Ok(children
                    .into_iter()
                    .filter_map(|(name, is_dir)| self.child_entry(path, name, is_dir))
                    .collect())
            }
            ObjectAddress::Object { .. } | ObjectAddress::DataBagItem { .. } => Err(self.not_found(path)),
        }
    }

    fn can_have_child(&self, parent: &LogicalPath, name: &str, is_dir: bool) -> bool {
        match ObjectAddress::parse(parent, self.layout) {
            Ok(ObjectAddress::Root) => {
                is_dir && TopLevel::from_dir_name(name).is_some_and(|top| self.is_enabled(top))
            }
            Ok(address) => address.accepts_child(name, is_dir, self.layout),
            Err(_) => false,
        }
    }

    fn read(&self, path: &LogicalPath) -> Result<Content> {
        let address = ObjectAddress::parse(path, self.layout)?;
        let value = match &address {
            ObjectAddress::Object { top, name } => {
                let collection = Collection::for_top_level(*top).ok_or_else(|| self.not_found(path))?;
                self.store.get(&collection, name)
            }
            ObjectAddress::DataBagItem { bag, item } => self.store.get(&Collection::DataBag(bag.clone()), item),
            ObjectAddress::CookbookFile {
                cookbook,
                version,
                file,
            } => {
                let files = self
                    .cookbook_files(path, cookbook, version.as_ref())?
                    .ok_or_else(|| self.not_found(path))?;
                return files
                    .get(&file.join("/"))
                    .map(|data| Content::Raw(data.clone()))
                    .ok_or_else(|| self.not_found(path));
            }
            _ => return Err(self.not_found(path)),
        };

        let value = value.map_err(|err| self.store_error(path, Operation::Update, err))?;
        Ok(Content::Json(normalize(&address, value)))
    }

    #[instrument(skip(self), level = "debug")]
    fn create_dir(&self, path: &LogicalPath) -> Result<()> {
        match ObjectAddress::parse(path, self.layout)? {
            ObjectAddress::Root => Ok(()),
            ObjectAddress::TopLevel(top) if self.is_enabled(top) => Ok(()),
            ObjectAddress::DataBag { bag } => {
                match self.store.create(&Collection::DataBags, &bag, json!({ "name": bag })) {
                    Ok(()) | Err(StoreError::Conflict { .. }) => Ok(()),
                    Err(err) => Err(self.store_error(path, Operation::CreateChild, err)),
                }
            }
            _ => Err(self.not_allowed(path, Operation::CreateChild)),
        }
    }

    #[instrument(skip(self, content), level = "debug")]
    fn write(&self, path: &LogicalPath, content: &Content) -> Result<()> {
        let address = ObjectAddress::parse(path, self.layout)?;
        let (collection, name) = match &address {
            ObjectAddress::Object { top, name } => (
                Collection::for_top_level(*top).ok_or_else(|| self.not_allowed(path, Operation::Update))?,
                name.clone(),
            ),
            ObjectAddress::DataBagItem { bag, item } => (Collection::DataBag(bag.clone()), item.clone()),
            ObjectAddress::CookbookFile { .. } => {
                // INVARIANT: Cookbooks are only ever written whole.
                return match self.entry(path)? {
                    Some(_) => Err(self.not_allowed(path, Operation::Update)),
                    None => Err(self.not_allowed(
                        &path.parent().unwrap_or_else(LogicalPath::root),
                        Operation::CreateChild,
                    )),
                };
            }
            _ => return Err(self.not_allowed(path, Operation::Update)),
        };

        let value = match content {
            Content::Json(value) => value.clone(),
            Content::Raw(data) => serde_json::from_slice::<Value>(data).map_err(|err| Error::Parse {
                source: err,
                path: path.clone(),
            })?,
        };

        let exists = self.found(path, self.store.get(&collection, &name))?;
        let result = if exists {
            self.store.update(&collection, &name, value)
        } else {
            self.store.create(&collection, &name, value)
        };

        result.map_err(|err| self.store_error(path, Operation::Update, err))
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, path: &LogicalPath, recursive: bool) -> Result<()> {
        let must_recurse = || Error::MustDeleteRecursively {
            path: path.clone(),
            side: Side::Remote,
        };
        let deleted = |result: std::result::Result<(), StoreError>| {
            result.map_err(|err| self.store_error(path, Operation::Delete, err))
        };

        match ObjectAddress::parse(path, self.layout)? {
            ObjectAddress::Root | ObjectAddress::TopLevel(_) | ObjectAddress::CookbookFile { .. } => {
                Err(self.not_allowed(path, Operation::Delete))
            }
            ObjectAddress::Object { top, name } => {
                let collection = Collection::for_top_level(top).ok_or_else(|| self.not_found(path))?;
                deleted(self.store.delete(&collection, &name))
            }
            ObjectAddress::DataBag { bag } => {
                if !self.found(path, self.store.get(&Collection::DataBags, &bag))? {
                    return Err(self.not_found(path));
                }
                if !recursive {
                    return Err(must_recurse());
                }
                deleted(self.store.delete(&Collection::DataBags, &bag))
            }
            ObjectAddress::DataBagItem { bag, item } => {
                deleted(self.store.delete(&Collection::DataBag(bag), &item))
            }
            ObjectAddress::Cookbook { name, version } => {
                let Resolved::Version(version) = self.resolve_cookbook(path, &name, version.as_ref())? else {
                    return Err(self.not_found(path));
                };
                if !recursive {
                    return Err(must_recurse());
                }

                self.forget_cookbook(&name);
                debug!("delete cookbook {name} version {version}");
                deleted(self.store.delete_cookbook(&name, &version))
            }
        }
    }

    fn writes_whole_cookbooks(&self) -> bool {
        true
    }

    #[instrument(skip(self, cookbook), level = "debug")]
    fn write_cookbook(&self, path: &LogicalPath, cookbook: CookbookVersion, replace_versions: bool) -> Result<()> {
        let name = cookbook.name.clone();
        let version = cookbook.version.clone();
        self.forget_cookbook(&name);
        self.store
            .put_cookbook(cookbook)
            .map_err(|err| self.store_error(path, Operation::Update, err))?;

        if !replace_versions || self.layout == CookbookLayout::Versioned {
            return Ok(());
        }

        let versions = self
            .store
            .cookbook_versions(&name)
            .map_err(|err| self.store_error(path, Operation::Delete, err))?;
        for other in versions.into_iter().filter(|other| *other != version) {
            debug!("purge cookbook {name} version {other}");
            self.store
                .delete_cookbook(&name, &other)
                .map_err(|err| self.store_error(path, Operation::Delete, err))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cookbook::VersionPolicy,
        store::{MemoryStore, DEFAULT_ENVIRONMENT_REASON},
    };
    use pretty_assertions::assert_eq;

    fn seeded_store() -> anyhow::Result<Arc<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Roles, "x", json!({"name": "x", "description": "bar"}))?;
        store.create(&Collection::DataBags, "bag", json!({}))?;
        store.create(&Collection::DataBag("bag".into()), "item", json!({"id": "item"}))?;
        store.put_cookbook(
            CookbookVersion::new("x", "1.0.1")
                .with_file("metadata.rb", "version '1.0.1'\n")
                .with_file("onlyin1.0.1.rb", ""),
        )?;
        store.put_cookbook(
            CookbookVersion::new("x", "1.0.0")
                .with_file("metadata.rb", "version '1.0.0'\n")
                .with_file("recipes/default.rb", ""),
        )?;
        Ok(store)
    }

    fn remote_tree(store: Arc<MemoryStore>, layout: CookbookLayout) -> RemoteTree {
        RemoteTree::new(store, TopLevel::ALL.to_vec(), layout, CookbookVersionSelector::default())
    }

    fn paths(entries: &[RepoEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.path.to_string()).collect()
    }

    #[test]
    fn list_collections_as_tree() -> anyhow::Result<()> {
        let tree = remote_tree(seeded_store()?, CookbookLayout::Unversioned);
        assert_eq!(paths(&tree.list_children(&"/roles".parse()?)?), vec!["/roles/x.json"]);
        assert_eq!(
            paths(&tree.list_children(&"/environments".parse()?)?),
            vec!["/environments/_default.json"]
        );
        assert_eq!(
            paths(&tree.list_children(&"/data_bags/bag".parse()?)?),
            vec!["/data_bags/bag/item.json"]
        );
        assert_eq!(
            tree.entry(&"/data_bags/bag".parse()?)?.map(|entry| entry.is_dir()),
            Some(true)
        );

        Ok(())
    }

    #[test]
    fn latest_cookbook_version_represents_cookbook() -> anyhow::Result<()> {
        let tree = remote_tree(seeded_store()?, CookbookLayout::Unversioned);
        assert_eq!(paths(&tree.list_children(&"/cookbooks".parse()?)?), vec!["/cookbooks/x"]);
        assert_eq!(
            paths(&tree.list_children(&"/cookbooks/x".parse()?)?),
            vec!["/cookbooks/x/metadata.rb", "/cookbooks/x/onlyin1.0.1.rb"]
        );

        let local = HashMap::from([("x".to_string(), "1.0.0".to_string())]);
        let tree = RemoteTree::new(
            seeded_store()?,
            TopLevel::ALL.to_vec(),
            CookbookLayout::Unversioned,
            CookbookVersionSelector::new(VersionPolicy::Local),
        )
        .with_local_versions(local);
        assert_eq!(
            paths(&tree.list_children(&"/cookbooks/x".parse()?)?),
            vec!["/cookbooks/x/metadata.rb", "/cookbooks/x/recipes"]
        );

        Ok(())
    }

    #[test]
    fn versioned_layout_lists_every_version_in_store_order() -> anyhow::Result<()> {
        let tree = remote_tree(seeded_store()?, CookbookLayout::Versioned);
        assert_eq!(
            paths(&tree.list_children(&"/cookbooks".parse()?)?),
            vec!["/cookbooks/x-1.0.1", "/cookbooks/x-1.0.0"]
        );
        assert!(tree.entry(&"/cookbooks/x-1.0.0/recipes/default.rb".parse()?)?.is_some());

        Ok(())
    }

    #[test]
    fn pinned_version_missing_appears_empty() -> anyhow::Result<()> {
        let local = HashMap::from([("x".to_string(), "2.0.0".to_string())]);
        let tree = remote_tree(seeded_store()?, CookbookLayout::Unversioned).pin_to_local_versions(local);
        assert!(tree.entry(&"/cookbooks/x".parse()?)?.is_some());
        assert!(tree.list_children(&"/cookbooks/x".parse()?)?.is_empty());

        Ok(())
    }

    #[test]
    fn refuse_partial_cookbook_writes() -> anyhow::Result<()> {
        let tree = remote_tree(seeded_store()?, CookbookLayout::Unversioned);
        let content = Content::Raw(Vec::new());
        assert!(matches!(
            tree.write(&"/cookbooks/x/metadata.rb".parse()?, &content),
            Err(Error::NotAllowed { operation: Operation::Update, .. })
        ));
        assert!(matches!(
            tree.write(&"/cookbooks/x/new.rb".parse()?, &content),
            Err(Error::NotAllowed { operation: Operation::CreateChild, .. })
        ));
        assert!(matches!(
            tree.delete(&"/cookbooks/x/metadata.rb".parse()?, false),
            Err(Error::NotAllowed { operation: Operation::Delete, .. })
        ));

        Ok(())
    }

    #[test]
    fn default_environment_cannot_be_deleted() -> anyhow::Result<()> {
        let tree = remote_tree(seeded_store()?, CookbookLayout::Unversioned);
        let result = tree.delete(&"/environments/_default.json".parse()?, false);
        let Err(Error::NotAllowed { reason, .. }) = result else {
            anyhow::bail!("expected refusal, got {result:?}");
        };
        assert_eq!(reason.as_deref(), Some(DEFAULT_ENVIRONMENT_REASON));

        Ok(())
    }

    #[test]
    fn write_cookbook_replaces_other_versions() -> anyhow::Result<()> {
        let store = seeded_store()?;
        let tree = remote_tree(store.clone(), CookbookLayout::Unversioned);
        let path = "/cookbooks/x".parse()?;
        tree.write_cookbook(&path, CookbookVersion::new("x", "2.0.0").with_file("a.rb", ""), true)?;
        assert_eq!(store.cookbook_versions("x")?, vec!["2.0.0".to_string()]);

        assert!(matches!(tree.delete(&path, false), Err(Error::MustDeleteRecursively { .. })));
        tree.delete(&path, true)?;
        assert_eq!(tree.entry(&path)?, None);

        Ok(())
    }
}
