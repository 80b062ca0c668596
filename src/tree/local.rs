// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local repository tree view.
//!
//! Maps the logical namespace onto the configured root directories. Entries
//! only exist when they are valid for their place in the tree: a role must
//! be a `.json` file, a data bag must be a directory, and cookbook content
//! must survive chefignore rules. Directories inside a cookbook exist only
//! while they hold visible content, so a directory whose every file is
//! chefignored vanishes from both listing and lookup.

use crate::{
    address::{CookbookLayout, ObjectAddress, ObjectKind, TopLevel},
    chefignore::IgnoreCache,
    config::{ConfigError, RepoConfig},
    handler::{minimize, normalize, to_pretty, Content},
    overlay::{self, OverlayDirectoryResolver, RootMapping},
    path::LogicalPath,
    report::Diagnostics,
    tree::{Error, Operation, RepoEntry, Result, Side, TreeView},
};

use mkdirp::mkdirp;
use serde_json::Value;
use std::{
    fs::{read, read_dir, remove_dir_all, remove_file, write},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument, warn};

/// Tree view over the local chef repository.
#[derive(Debug)]
pub struct LocalTree {
    mapping: RootMapping,
    layout: CookbookLayout,
    diagnostics: Arc<Diagnostics>,
    ignores: IgnoreCache,
}

#[derive(Debug)]
enum Located {
    Root,
    TopLevel(TopLevel),
    Os(OsEntry),
}

#[derive(Debug)]
struct OsEntry {
    address: ObjectAddress,

    /// Root directory of the top-level directory holding the entry.
    root: PathBuf,
    os_path: PathBuf,
    is_dir: bool,
}

impl LocalTree {
    /// Construct new local tree view.
    pub fn new(mapping: RootMapping, layout: CookbookLayout, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            mapping,
            layout,
            diagnostics,
            ignores: IgnoreCache::new(),
        }
    }

    /// Construct new local tree view from repository configuration.
    pub fn from_config(config: &RepoConfig, diagnostics: Arc<Diagnostics>) -> Self {
        Self::new(config.root_mapping(), config.cookbook_layout(), diagnostics)
    }

    /// Filesystem location of an entry, whether or not it exists yet.
    ///
    /// New entries land in the first root of their top-level directory
    /// unless an ancestor already exists in another root.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Config`] if top-level directory is not configured.
    pub fn os_path(&self, path: &LogicalPath) -> Result<PathBuf> {
        self.os_target(path).map(|(_, os_path)| os_path)
    }

    fn resolver(&self) -> OverlayDirectoryResolver<'_> {
        OverlayDirectoryResolver::new(&self.mapping, &self.diagnostics)
    }

    fn locate(&self, path: &LogicalPath) -> Result<Option<Located>> {
        let Ok(address) = ObjectAddress::parse(path, self.layout) else {
            return Ok(None);
        };
        let Some(top) = address.top_level() else {
            return Ok(Some(Located::Root));
        };

        let segments = path.segments();
        if segments.len() == 1 {
            return Ok(self.resolver().exists(top)?.then_some(Located::TopLevel(top)));
        }

        let top_address = ObjectAddress::TopLevel(top);
        let child = self.resolver().resolve_child(top, &segments[1], |child| {
            self.accepts(&top_address, &child.root, &child.name, &child.os_path, child.is_dir)
        })?;
        let Some(child) = child else {
            return Ok(None);
        };

        let mut os_path = child.os_path;
        let mut is_dir = child.is_dir;
        for (depth, name) in segments.iter().enumerate().skip(2) {
            if !is_dir {
                return Ok(None);
            }

            let parent = ObjectAddress::parse(&path.ancestor_at(depth), self.layout)?;
            let next = os_path.join(name);
            if !next.exists() {
                return Ok(None);
            }

            let next_is_dir = next.is_dir();
            if !self.accepts(&parent, &child.root, name, &next, next_is_dir)? {
                return Ok(None);
            }

            os_path = next;
            is_dir = next_is_dir;
        }

        Ok(Some(Located::Os(OsEntry {
            address,
            root: child.root,
            os_path,
            is_dir,
        })))
    }

    /// Check if an entry on disk is a valid child of its parent address.
    fn accepts(
        &self,
        parent: &ObjectAddress,
        root: &Path,
        name: &str,
        os_path: &Path,
        is_dir: bool,
    ) -> overlay::Result<bool> {
        if !parent.accepts_child(name, is_dir, self.layout) {
            return Ok(false);
        }

        match parent {
            ObjectAddress::TopLevel(TopLevel::Cookbooks) => {
                if self.has_visible_content(root, os_path, os_path)? {
                    return Ok(true);
                }

                self.diagnostics.warn(format!(
                    "Cookbook '{name}' is empty or entirely chefignored at {}",
                    os_path.display()
                ));
                Ok(false)
            }
            ObjectAddress::Cookbook { .. } | ObjectAddress::CookbookFile { .. } => {
                let cookbook_dir = cookbook_dir(root, os_path);
                if is_dir {
                    self.has_visible_content(root, &cookbook_dir, os_path)
                } else {
                    Ok(!self.ignores.is_ignored(root, &cookbook_dir, os_path)?)
                }
            }
            _ => Ok(true),
        }
    }

    fn has_visible_content(&self, root: &Path, cookbook_dir: &Path, dir: &Path) -> overlay::Result<bool> {
        let children = read_os_dir(dir).map_err(|err| overlay::Error::ReadDir {
            source: err,
            path: dir.to_path_buf(),
        })?;

        for (_, os_path, is_dir) in children {
            let visible = if is_dir {
                self.has_visible_content(root, cookbook_dir, &os_path)?
            } else {
                !self.ignores.is_ignored(root, cookbook_dir, &os_path)?
            };

            if visible {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn os_target(&self, path: &LogicalPath) -> Result<(PathBuf, PathBuf)> {
        if let Some(Located::Os(entry)) = self.locate(path)? {
            return Ok((entry.root, entry.os_path));
        }

        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(self.not_allowed(path, Operation::Update));
        };

        if parent.is_root() {
            let top = TopLevel::from_dir_name(name).ok_or_else(|| crate::address::Error::UnknownTopLevel {
                path: path.clone(),
            })?;
            let root = self
                .mapping
                .configured_roots(top)?
                .first()
                .cloned()
                .ok_or(ConfigError::Unconfigured { top })?;
            return Ok((root.clone(), root));
        }

        let (root, parent_os_path) = self.os_target(&parent)?;
        Ok((root, parent_os_path.join(name)))
    }

    fn child_entry(&self, parent: &LogicalPath, name: &str, is_dir: bool) -> Result<RepoEntry> {
        let path = parent.join(name);
        let kind = ObjectAddress::parse(&path, self.layout)?.kind();
        Ok(RepoEntry::new(path, kind, !is_dir))
    }

    fn not_found(&self, path: &LogicalPath) -> Error {
        Error::NotFound {
            path: path.clone(),
            side: Side::Local,
        }
    }

    fn not_allowed(&self, path: &LogicalPath, operation: Operation) -> Error {
        Error::NotAllowed {
            path: path.clone(),
            side: Side::Local,
            operation,
            reason: None,
        }
    }
}

impl TreeView for LocalTree {
    fn side(&self) -> Side {
        Side::Local
    }

    fn layout(&self) -> CookbookLayout {
        self.layout
    }

    fn entry(&self, path: &LogicalPath) -> Result<Option<RepoEntry>> {
        let entry = self.locate(path)?.map(|located| match located {
            Located::Root | Located::TopLevel(_) => {
                RepoEntry::new(path.clone(), ObjectKind::Container, false)
            }
            Located::Os(entry) => RepoEntry::new(path.clone(), entry.address.kind(), !entry.is_dir),
        });
        Ok(entry)
    }

    #[instrument(skip(self), level = "debug")]
    fn list_children(&self, path: &LogicalPath) -> Result<Vec<RepoEntry>> {
        match self.locate(path)? {
            Some(Located::Root) => {
                let mut entries = Vec::new();
                for top in self.mapping.top_levels() {
                    // INVARIANT: Unconfigured roots vanish from the root listing.
                    if self.mapping.is_configured(top) && self.resolver().exists(top)? {
                        entries.push(RepoEntry::new(top.logical_path(), ObjectKind::Container, false));
                    }
                }
                Ok(entries)
            }
            Some(Located::TopLevel(top)) => {
                let parent = ObjectAddress::TopLevel(top);
                self.resolver()
                    .resolve(top, |child| {
                        self.accepts(&parent, &child.root, &child.name, &child.os_path, child.is_dir)
                    })?
                    .into_iter()
                    .map(|child| self.child_entry(path, &child.name, child.is_dir))
                    .collect()
            }
            Some(Located::Os(entry)) if entry.is_dir => {
                let children = read_os_dir(&entry.os_path).map_err(|err| Error::Io {
                    source: err,
                    path: path.clone(),
                    os_path: entry.os_path.clone(),
                })?;

                let mut entries = Vec::new();
                for (name, os_path, is_dir) in children {
                    if self.accepts(&entry.address, &entry.root, &name, &os_path, is_dir)? {
                        entries.push(self.child_entry(path, &name, is_dir)?);
                    }
                }
                Ok(entries)
            }
            _ => Err(self.not_found(path)),
        }
    }

    fn can_have_child(&self, parent: &LogicalPath, name: &str, is_dir: bool) -> bool {
        let Ok(address) = ObjectAddress::parse(parent, self.layout) else {
            return false;
        };

        if address == ObjectAddress::Root {
            return is_dir
                && TopLevel::from_dir_name(name).is_some_and(|top| self.mapping.is_configured(top));
        }

        if !address.accepts_child(name, is_dir, self.layout) {
            return false;
        }

        if is_dir || !matches!(address, ObjectAddress::Cookbook { .. } | ObjectAddress::CookbookFile { .. }) {
            return true;
        }

        match self.os_target(&parent.join(name)) {
            Ok((root, os_path)) => {
                match self.ignores.is_ignored(&root, &cookbook_dir(&root, &os_path), &os_path) {
                    Ok(ignored) => !ignored,
                    Err(error) => {
                        warn!("cannot read chefignore for {}: {error}", os_path.display());
                        true
                    }
                }
            }
            Err(_) => true,
        }
    }

    fn read(&self, path: &LogicalPath) -> Result<Content> {
        let Some(Located::Os(entry)) = self.locate(path)? else {
            return Err(self.not_found(path));
        };
        if entry.is_dir {
            return Err(Error::TypeMismatch { path: path.clone() });
        }

        let bytes = read(&entry.os_path).map_err(|err| Error::Io {
            source: err,
            path: path.clone(),
            os_path: entry.os_path.clone(),
        })?;

        if !entry.address.is_json_object() {
            return Ok(Content::Raw(bytes));
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Ok(Content::Json(normalize(&entry.address, value))),
            Err(err) => {
                self.diagnostics.warn(format!(
                    "Parse error reading {} as JSON: {err}",
                    entry.os_path.display()
                ));
                Ok(Content::Raw(bytes))
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn create_dir(&self, path: &LogicalPath) -> Result<()> {
        match self.locate(path)? {
            Some(Located::Root | Located::TopLevel(_)) => return Ok(()),
            Some(Located::Os(entry)) if entry.is_dir => return Ok(()),
            Some(Located::Os(_)) => return Err(Error::TypeMismatch { path: path.clone() }),
            None => {}
        }

        let os_path = self.os_path(path)?;
        debug!("create directory {:?}", os_path.display());
        mkdirp(&os_path).map_err(|err| Error::Io {
            source: err,
            path: path.clone(),
            os_path: os_path.clone(),
        })?;
        Ok(())
    }

    #[instrument(skip(self, content), level = "debug")]
    fn write(&self, path: &LogicalPath, content: &Content) -> Result<()> {
        let address = ObjectAddress::parse(path, self.layout)?;
        if let Some(Located::Os(entry)) = self.locate(path)? {
            if entry.is_dir {
                return Err(Error::TypeMismatch { path: path.clone() });
            }
        }

        let os_path = self.os_path(path)?;
        let bytes = match content {
            Content::Json(value) if address.is_json_object() => {
                to_pretty(&minimize(&address, value)).into_bytes()
            }
            content => content.to_bytes(),
        };

        let io_error = |err: io::Error| Error::Io {
            source: err,
            path: path.clone(),
            os_path: os_path.clone(),
        };
        if let Some(parent) = os_path.parent() {
            mkdirp(parent).map_err(io_error)?;
        }
        write(&os_path, bytes).map_err(io_error)
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, path: &LogicalPath, recursive: bool) -> Result<()> {
        let entry = match self.locate(path)? {
            None => return Err(self.not_found(path)),
            Some(Located::Root | Located::TopLevel(_)) => {
                return Err(self.not_allowed(path, Operation::Delete));
            }
            Some(Located::Os(entry)) => entry,
        };

        let io_error = |err: io::Error| Error::Io {
            source: err,
            path: path.clone(),
            os_path: entry.os_path.clone(),
        };
        if entry.is_dir {
            if !recursive {
                return Err(Error::MustDeleteRecursively {
                    path: path.clone(),
                    side: Side::Local,
                });
            }
            remove_dir_all(&entry.os_path).map_err(io_error)
        } else {
            remove_file(&entry.os_path).map_err(io_error)
        }
    }
}

/// Cookbook directory holding a path below a cookbooks root.
fn cookbook_dir(root: &Path, os_path: &Path) -> PathBuf {
    match os_path.strip_prefix(root).ok().and_then(|rest| rest.components().next()) {
        Some(first) => root.join(first),
        None => os_path.to_path_buf(),
    }
}

/// Read directory as `(name, path, is_dir)` ordered by name.
fn read_os_dir(dir: &Path) -> io::Result<Vec<(String, PathBuf, bool)>> {
    let mut children = Vec::new();
    for entry in read_dir(dir)? {
        let entry = entry?;
        let os_path = entry.path();
        let is_dir = os_path.is_dir();
        children.push((entry.file_name().to_string_lossy().into_owned(), os_path, is_dir));
    }

    children.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathList;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use serde_json::json;
    use std::fs::{create_dir_all, read_to_string};

    fn local_tree(cwd: &Path) -> (LocalTree, Arc<Diagnostics>) {
        let config = RepoConfig {
            chef_repo_path: Some(PathList::One(cwd.join("repo"))),
            ..Default::default()
        };
        let diagnostics = Arc::new(Diagnostics::new());
        (LocalTree::from_config(&config, diagnostics.clone()), diagnostics)
    }

    fn names(entries: &[RepoEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.path.to_string()).collect()
    }

    #[sealed_test]
    fn list_only_valid_entries() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let repo = cwd.join("repo");
        create_dir_all(repo.join("roles/subdir"))?;
        write(repo.join("roles/x.json"), "{}")?;
        write(repo.join("roles/notes.txt"), "")?;
        create_dir_all(repo.join("data_bags/bag"))?;
        write(repo.join("data_bags/bag/item.json"), "{}")?;
        write(repo.join("data_bags/stray.json"), "{}")?;

        let (tree, _) = local_tree(&cwd);
        let root = LogicalPath::root();
        assert_eq!(names(&tree.list_children(&root)?), vec!["/data_bags", "/roles"]);
        assert_eq!(names(&tree.list_children(&"/roles".parse()?)?), vec!["/roles/x.json"]);
        assert_eq!(names(&tree.list_children(&"/data_bags".parse()?)?), vec!["/data_bags/bag"]);
        assert_eq!(tree.entry(&"/roles/subdir".parse()?)?, None);

        Ok(())
    }

    #[sealed_test]
    fn chefignored_content_vanishes() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let repo = cwd.join("repo");
        create_dir_all(repo.join("cookbooks/x/files"))?;
        create_dir_all(repo.join("cookbooks/empty"))?;
        write(repo.join("cookbooks/chefignore"), "x.json\nfiles/*\n")?;
        write(repo.join("cookbooks/x/x.json"), "{}")?;
        write(repo.join("cookbooks/x/y.json"), "{}")?;
        write(repo.join("cookbooks/x/files/a.txt"), "a")?;

        let (tree, diagnostics) = local_tree(&cwd);
        assert_eq!(names(&tree.list_children(&"/cookbooks".parse()?)?), vec!["/cookbooks/x"]);
        assert_eq!(
            names(&tree.list_children(&"/cookbooks/x".parse()?)?),
            vec!["/cookbooks/x/y.json"]
        );
        assert_eq!(tree.entry(&"/cookbooks/x/x.json".parse()?)?, None);
        assert!(!tree.can_have_child(&"/cookbooks/x".parse()?, "x.json", false));
        assert!(tree.can_have_child(&"/cookbooks/x".parse()?, "z.json", false));
        assert_eq!(
            diagnostics.drain(),
            vec![format!(
                "Cookbook 'empty' is empty or entirely chefignored at {}",
                repo.join("cookbooks/empty").display()
            )]
        );

        Ok(())
    }

    #[sealed_test]
    fn unreadable_chefignore_ignores_nothing() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let repo = cwd.join("repo");
        create_dir_all(repo.join("cookbooks/x"))?;
        write(repo.join("cookbooks/chefignore"), [0xff, 0xfe, 0x00])?;

        let (tree, _) = local_tree(&cwd);
        assert!(tree.can_have_child(&"/cookbooks/x".parse()?, "z.json", false));

        Ok(())
    }

    #[sealed_test]
    fn read_normalizes_and_write_minimizes() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let repo = cwd.join("repo");
        create_dir_all(repo.join("roles"))?;
        write(repo.join("roles/x.json"), r#"{"description": "bar", "name": "x"}"#)?;
        write(repo.join("roles/broken.json"), "{")?;

        let (tree, diagnostics) = local_tree(&cwd);
        let Content::Json(value) = tree.read(&"/roles/x.json".parse()?)? else {
            anyhow::bail!("expected JSON content");
        };
        assert_eq!(value["chef_type"], json!("role"));

        assert!(matches!(tree.read(&"/roles/broken.json".parse()?)?, Content::Raw(_)));
        assert_eq!(diagnostics.drain().len(), 1);

        tree.write(&"/roles/y.json".parse()?, &Content::Json(value))?;
        let expect = indoc! {r#"
            {
              "name": "x",
              "description": "bar"
            }
        "#};
        assert_eq!(read_to_string(repo.join("roles/y.json"))?, expect);

        Ok(())
    }

    #[sealed_test]
    fn delete_requires_recursion_for_directories() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let repo = cwd.join("repo");
        create_dir_all(repo.join("data_bags/bag"))?;
        write(repo.join("data_bags/bag/item.json"), "{}")?;

        let (tree, _) = local_tree(&cwd);
        let bag = "/data_bags/bag".parse()?;
        assert!(matches!(
            tree.delete(&bag, false),
            Err(Error::MustDeleteRecursively { .. })
        ));
        assert!(matches!(
            tree.delete(&"/data_bags".parse()?, true),
            Err(Error::NotAllowed { operation: Operation::Delete, .. })
        ));
        tree.delete(&bag, true)?;
        assert_eq!(tree.entry(&bag)?, None);

        Ok(())
    }

    #[sealed_test]
    fn new_entries_land_in_first_root() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let config = RepoConfig {
            role_path: Some(PathList::Many(vec![cwd.join("r1"), cwd.join("r2")])),
            chef_repo_path: Some(PathList::One(cwd.clone())),
            ..Default::default()
        };
        let tree = LocalTree::from_config(&config, Arc::new(Diagnostics::new()));

        tree.write(&"/roles/x.json".parse()?, &Content::Raw(b"{}".to_vec()))?;
        assert!(cwd.join("r1/x.json").is_file());

        create_dir_all(cwd.join("data_bags"))?;
        tree.create_dir(&"/data_bags/bag".parse()?)?;
        assert!(cwd.join("data_bags/bag").is_dir());

        Ok(())
    }
}
