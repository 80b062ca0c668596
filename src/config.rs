// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the knife configuration file, and derive the
//! repository root mapping from it. Reading the configuration file is the
//! only file I/O performed here, everything else is pure path arithmetic
//! over the resulting immutable configuration.
//!
//! # General Layout
//!
//! ```toml
//! chef_repo_path = "~/chef-repo"
//! cookbook_path = ["~/chef-repo/cookbooks", "~/vendor/cookbooks"]
//! versioned_cookbooks = false
//! repo_mode = "everything"
//! cookbook_version_policy = "latest"
//! concurrency = 10
//! remote_store = "~/.chef/server.json"
//! ```
//!
//! Every `*_path` key accepts either a single path or a list of paths. When
//! `chef_repo_path` is missing it is derived from the parents of
//! `cookbook_path`. Every missing `<kind>_path` is derived from
//! `chef_repo_path` by appending the kind's directory name.

use crate::{
    address::{CookbookLayout, TopLevel},
    cookbook::VersionPolicy,
    overlay::RootMapping,
    path::LogicalPath,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Component, Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Knife configuration layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Root directories of the chef repository.
    pub chef_repo_path: Option<PathList>,

    pub client_path: Option<PathList>,
    pub cookbook_path: Option<PathList>,
    pub data_bag_path: Option<PathList>,
    pub environment_path: Option<PathList>,
    pub node_path: Option<PathList>,
    pub role_path: Option<PathList>,
    pub user_path: Option<PathList>,

    /// Cookbook directories are named `<name>-<version>`.
    pub versioned_cookbooks: bool,

    /// Which top-level directories are managed.
    pub repo_mode: RepoMode,

    /// Rule picking the remote cookbook version to compare against.
    pub cookbook_version_policy: VersionPolicy,

    /// Maximum number of concurrent cookbook uploads.
    pub concurrency: usize,

    /// Snapshot file of the remote object store.
    pub remote_store: Option<PathBuf>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            chef_repo_path: None,
            client_path: None,
            cookbook_path: None,
            data_bag_path: None,
            environment_path: None,
            node_path: None,
            role_path: None,
            user_path: None,
            versioned_cookbooks: false,
            repo_mode: RepoMode::default(),
            cookbook_version_policy: VersionPolicy::default(),
            concurrency: 10,
            remote_store: None,
        }
    }
}

impl RepoConfig {
    /// Load configuration file.
    ///
    /// Relative paths inside the file are resolved against the directory
    /// containing it.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadConfig`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load configuration from {:?}", path.display());
        let data = read_to_string(path).map_err(|err| ConfigError::ReadConfig {
            source: err,
            path: path.to_path_buf(),
        })?;

        let config: RepoConfig = data.parse()?;
        let base = path.parent().unwrap_or(Path::new("."));
        Ok(config.resolve_relative(base))
    }

    /// Resolve all relative paths against a base directory.
    pub fn resolve_relative(mut self, base: &Path) -> Self {
        for list in self.path_lists_mut().into_iter().flatten() {
            list.map_paths(|path| lexical_normalize(&base.join(path)));
        }

        if let Some(store) = self.remote_store.take() {
            self.remote_store = Some(lexical_normalize(&base.join(store)));
        }

        self
    }

    /// Cookbook directory layout.
    pub fn cookbook_layout(&self) -> CookbookLayout {
        if self.versioned_cookbooks {
            CookbookLayout::Versioned
        } else {
            CookbookLayout::Unversioned
        }
    }

    /// Top-level directories managed under the configured repository mode.
    pub fn enabled_top_levels(&self) -> Vec<TopLevel> {
        TopLevel::ALL
            .into_iter()
            .filter(|top| self.repo_mode == RepoMode::Everything || top.is_static())
            .collect()
    }

    /// Repository root directories, explicit or derived from cookbook paths.
    pub fn repo_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = match (&self.chef_repo_path, &self.cookbook_path) {
            (Some(repo), _) => repo.paths(),
            (None, Some(cookbooks)) => cookbooks
                .paths()
                .iter()
                .map(|path| lexical_normalize(&path.join("..")))
                .collect(),
            (None, None) => Vec::new(),
        };

        // INVARIANT: Each repository root appears once, first position wins.
        let mut seen = Vec::new();
        roots.retain(|root| {
            if seen.contains(root) {
                false
            } else {
                seen.push(root.clone());
                true
            }
        });
        roots
    }

    /// Explicitly configured roots of target top-level directory.
    pub fn explicit_paths(&self, top: TopLevel) -> Option<&PathList> {
        match top {
            TopLevel::Clients => self.client_path.as_ref(),
            TopLevel::Cookbooks => self.cookbook_path.as_ref(),
            TopLevel::DataBags => self.data_bag_path.as_ref(),
            TopLevel::Environments => self.environment_path.as_ref(),
            TopLevel::Nodes => self.node_path.as_ref(),
            TopLevel::Roles => self.role_path.as_ref(),
            TopLevel::Users => self.user_path.as_ref(),
        }
    }

    /// Derive root mapping of all enabled top-level directories.
    pub fn root_mapping(&self) -> RootMapping {
        let repo_roots = self.repo_roots();
        let mut mapping = RootMapping::new(repo_roots.clone());
        for top in self.enabled_top_levels() {
            let roots = match self.explicit_paths(top) {
                Some(paths) => paths.paths(),
                None => repo_roots
                    .iter()
                    .map(|root| root.join(top.dir_name()))
                    .collect(),
            };
            mapping.insert(top, roots);
        }

        mapping
    }

    fn path_lists_mut(&mut self) -> [Option<&mut PathList>; 8] {
        [
            self.chef_repo_path.as_mut(),
            self.client_path.as_mut(),
            self.cookbook_path.as_mut(),
            self.data_bag_path.as_mut(),
            self.environment_path.as_mut(),
            self.node_path.as_mut(),
            self.role_path.as_mut(),
            self.user_path.as_mut(),
        ]
    }
}

impl FromStr for RepoConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: RepoConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for list in config.path_lists_mut().into_iter().flatten() {
            list.try_map_paths(expand)?;
        }
        if let Some(store) = config.remote_store.take() {
            config.remote_store = Some(expand(store)?);
        }

        Ok(config)
    }
}

impl Display for RepoConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Which top-level directories a repository manages.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoMode {
    /// Every top-level directory.
    #[default]
    Everything,

    /// Only cookbooks, data bags, environments, and roles.
    Static,
}

/// One path or an ordered list of paths.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathList {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl PathList {
    /// All paths in configured order.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::One(path) => vec![path.clone()],
            Self::Many(paths) => paths.clone(),
        }
    }

    fn map_paths(&mut self, mut map: impl FnMut(&Path) -> PathBuf) {
        match self {
            Self::One(path) => *path = map(path),
            Self::Many(paths) => paths.iter_mut().for_each(|path| *path = map(path)),
        }
    }

    fn try_map_paths(&mut self, mut map: impl FnMut(PathBuf) -> Result<PathBuf>) -> Result<()> {
        match self {
            Self::One(path) => *path = map(path.clone())?,
            Self::Many(paths) => {
                for path in paths.iter_mut() {
                    *path = map(path.clone())?;
                }
            }
        }

        Ok(())
    }
}

fn expand(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Resolve paths between the filesystem and the logical namespace relative
/// to the current working directory.
#[derive(Debug, Clone)]
pub struct Locator {
    mapping: RootMapping,
    cwd: PathBuf,
    base_path: Option<LogicalPath>,
}

impl Locator {
    /// Construct new locator for target working directory.
    pub fn new(mapping: RootMapping, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        let base_path = server_path(&mapping, &cwd);
        debug!("current logical directory is {base_path:?}");
        Self {
            mapping,
            cwd,
            base_path,
        }
    }

    /// Logical path of the current working directory, if it lies inside the
    /// repository.
    pub fn base_path(&self) -> Option<&LogicalPath> {
        self.base_path.as_ref()
    }

    /// Map filesystem path to its logical path.
    ///
    /// Relative paths are taken relative to the working directory.
    pub fn server_path(&self, os_path: impl AsRef<Path>) -> Option<LogicalPath> {
        server_path(&self.mapping, &self.cwd.join(os_path))
    }

    /// Resolve a command line argument to an absolute logical pattern.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::OutsideRepository`] if argument is relative
    ///   but the working directory lies outside the repository.
    pub fn resolve_arg(&self, arg: &str) -> Result<String> {
        if arg.starts_with('/') {
            return Ok(arg.to_string());
        }

        let base = self
            .base_path
            .as_ref()
            .ok_or_else(|| ConfigError::OutsideRepository {
                arg: arg.to_string(),
            })?;

        Ok(base.join(arg).to_string())
    }

    /// Render logical path relative to the current logical directory.
    pub fn format_path(&self, path: &LogicalPath) -> String {
        match &self.base_path {
            Some(base) if path == base => ".".into(),
            Some(base) => match path.strip_prefix(base) {
                Some(rest) => rest.join("/"),
                None => path.to_string(),
            },
            None => path.to_string(),
        }
    }
}

fn server_path(mapping: &RootMapping, os_path: &Path) -> Option<LogicalPath> {
    let target = realest_path(os_path);

    for top in mapping.top_levels() {
        for root in mapping.roots(top).unwrap_or_default() {
            if let Ok(rest) = target.strip_prefix(realest_path(root)) {
                let rest = rest
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned());
                return Some(LogicalPath::from_segments(
                    std::iter::once(top.dir_name().to_string()).chain(rest),
                ));
            }
        }
    }

    mapping
        .repo_roots()
        .iter()
        .any(|root| realest_path(root) == target)
        .then(LogicalPath::root)
}

/// Canonicalize the longest existing prefix of a path, keeping the rest.
fn realest_path(path: &Path) -> PathBuf {
    let path = lexical_normalize(path);
    if let Ok(real) = path.canonicalize() {
        return real;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => realest_path(parent).join(name),
        _ => path,
    }
}

/// Remove `.` and resolve `..` components without touching the filesystem.
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            component => result.push(component),
        }
    }
    result
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadConfig {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// No root directory configured for a top-level directory.
    #[error("no {} or chef_repo_path configured for /{}", top.config_key(), top.dir_name())]
    Unconfigured { top: TopLevel },

    /// Relative path used while working directory is outside repository.
    #[error("Attempt to use relative path '{arg}' when current directory is outside the repository path")]
    OutsideRepository { arg: String },

    /// Path to configuration file cannot be determined.
    #[error(transparent)]
    Path(#[from] crate::path::Error),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::create_dir_all;

    #[sealed_test(env = [("REPO", "/home/blah/chef-repo")])]
    fn deserialize_repo_config() -> anyhow::Result<()> {
        let result: RepoConfig = indoc! {r#"
            chef_repo_path = "$REPO"
            cookbook_path = ["$REPO/cookbooks", "/vendor/cookbooks"]
            versioned_cookbooks = true
            repo_mode = "static"
            cookbook_version_policy = "local"
            concurrency = 4
        "#}
        .parse()?;

        let expect = RepoConfig {
            chef_repo_path: Some(PathList::One("/home/blah/chef-repo".into())),
            cookbook_path: Some(PathList::Many(vec![
                "/home/blah/chef-repo/cookbooks".into(),
                "/vendor/cookbooks".into(),
            ])),
            versioned_cookbooks: true,
            repo_mode: RepoMode::Static,
            cookbook_version_policy: VersionPolicy::Local,
            concurrency: 4,
            ..Default::default()
        };

        assert_eq!(result, expect);
        assert_eq!(
            result.enabled_top_levels(),
            vec![
                TopLevel::Cookbooks,
                TopLevel::DataBags,
                TopLevel::Environments,
                TopLevel::Roles
            ]
        );

        Ok(())
    }

    #[test]
    fn serialize_repo_config() {
        let result = RepoConfig {
            chef_repo_path: Some(PathList::One("/repo".into())),
            ..Default::default()
        }
        .to_string();

        let expect = indoc! {r#"
            chef_repo_path = "/repo"
            versioned_cookbooks = false
            repo_mode = "everything"
            cookbook_version_policy = "latest"
            concurrency = 10
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn chef_repo_path_derives_from_cookbook_path() {
        let config = RepoConfig {
            cookbook_path: Some(PathList::Many(vec![
                "/repo1/cookbooks".into(),
                "/repo2/cookbooks".into(),
                "/repo2/cookbooks".into(),
            ])),
            ..Default::default()
        };

        assert_eq!(
            config.repo_roots(),
            vec![PathBuf::from("/repo1"), PathBuf::from("/repo2")]
        );

        let mapping = config.root_mapping();
        assert_eq!(
            mapping.roots(TopLevel::Roles),
            Some(&[PathBuf::from("/repo1/roles"), PathBuf::from("/repo2/roles")][..])
        );
        assert_eq!(
            mapping.roots(TopLevel::Cookbooks).map(<[PathBuf]>::len),
            Some(3)
        );
    }

    #[test]
    fn nothing_configured_leaves_every_kind_unconfigured() {
        let mapping = RepoConfig::default().root_mapping();
        for top in TopLevel::ALL {
            assert_eq!(mapping.roots(top), Some(&[][..]));
        }
    }

    #[test]
    fn relative_paths_resolve_against_config_directory() {
        let config = RepoConfig {
            chef_repo_path: Some(PathList::One("../repo".into())),
            remote_store: Some("server.json".into()),
            ..Default::default()
        }
        .resolve_relative(Path::new("/home/me/.chef"));

        assert_eq!(config.chef_repo_path, Some(PathList::One("/home/me/repo".into())));
        assert_eq!(config.remote_store, Some("/home/me/.chef/server.json".into()));
    }

    #[sealed_test]
    fn locator_maps_working_directory() -> anyhow::Result<()> {
        let repo = std::env::current_dir()?.join("repo");
        create_dir_all(repo.join("cookbooks/x/recipes"))?;
        create_dir_all(repo.join("roles"))?;

        let config = RepoConfig {
            chef_repo_path: Some(PathList::One(repo.clone())),
            ..Default::default()
        };

        let locator = Locator::new(config.root_mapping(), repo.join("cookbooks/x"));
        assert_eq!(locator.base_path().map(ToString::to_string), Some("/cookbooks/x".into()));
        assert_eq!(locator.resolve_arg("recipes")?, "/cookbooks/x/recipes");
        assert_eq!(locator.resolve_arg("../../roles")?, "/roles");
        assert_eq!(locator.resolve_arg("/roles/x.json")?, "/roles/x.json");
        assert_eq!(locator.format_path(&"/cookbooks/x/metadata.rb".parse()?), "metadata.rb");
        assert_eq!(locator.format_path(&"/cookbooks/x".parse()?), ".");
        assert_eq!(locator.format_path(&"/roles/x.json".parse()?), "/roles/x.json");

        let locator = Locator::new(config.root_mapping(), &repo);
        assert_eq!(locator.base_path(), Some(&LogicalPath::root()));
        assert_eq!(locator.format_path(&"/roles/x.json".parse()?), "roles/x.json");

        Ok(())
    }

    #[sealed_test]
    fn locator_rejects_relative_path_outside_repository() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let config = RepoConfig {
            cookbook_path: Some(PathList::One(cwd.join("chef_repo2/cookbooks"))),
            ..Default::default()
        };

        let locator = Locator::new(config.root_mapping(), &cwd);
        assert_eq!(locator.base_path(), None);
        assert_eq!(
            locator.resolve_arg("").unwrap_err().to_string(),
            "Attempt to use relative path '' when current directory is outside the repository path"
        );
        assert_eq!(locator.format_path(&"/roles".parse()?), "/roles");

        Ok(())
    }
}
