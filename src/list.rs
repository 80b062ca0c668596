// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Listing of tree view entries.
//!
//! Leaf arguments are listed as themselves, directory arguments as their
//! children. When more than one directory is listed, each gets its own
//! `<path>:` header.

use crate::{
    path::LogicalPath,
    pattern::{list_matches, PathPattern},
    report::Line,
    tree::{Error as TreeError, RepoEntry, Result as TreeResult, TreeView},
};

use tracing::instrument;

/// Options of a listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// List directories recursively.
    pub recursive: bool,

    /// Print every entry by its full path instead of grouping by directory.
    pub flat: bool,

    /// Append `/` to directories.
    pub slash_dirs: bool,

    /// List directory arguments as themselves, not their children.
    pub bare_directories: bool,
}

/// Rendered listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    pub lines: Vec<Line>,

    /// Some argument could not be listed.
    pub failed: bool,
}

/// List entries matching patterns.
///
/// Paths are rendered through `format`.
///
/// # Errors
///
/// - Return [`TreeError`] if it is fatal, see [`TreeError::is_fatal`].
#[instrument(skip(view, patterns, format), level = "debug")]
pub fn list(
    view: &dyn TreeView,
    patterns: &[PathPattern],
    options: ListOptions,
    format: &dyn Fn(&LogicalPath) -> String,
) -> TreeResult<Listing> {
    let mut listing = Listing::default();
    let mut errors = Vec::new();

    let mut matches = Vec::new();
    for pattern in patterns {
        let found = match list_matches(view, pattern) {
            Ok(found) => found,
            Err(error) => {
                collect(error, &mut errors)?;
                continue;
            }
        };

        if found.is_empty() {
            if let Some(path) = pattern.exact_path() {
                errors.push(TreeError::NotFound {
                    path,
                    side: view.side(),
                });
            }
        }
        matches.extend(found);
    }

    let mut directories = Vec::new();
    if !options.bare_directories {
        for entry in matches.iter().filter(|entry| entry.is_dir()) {
            directories.extend(expand_dir(view, entry.clone(), options.recursive, &mut errors)?);
        }
    }

    let mut results = matches
        .into_iter()
        .filter(|entry| !entry.is_dir() || options.bare_directories)
        .collect::<Vec<_>>();

    if options.flat {
        for (_, children) in directories.drain(..) {
            results.extend(children);
        }
    }

    results.sort_by_key(|entry| entry.path.to_string());
    directories.sort_by_key(|(dir, _)| dir.path.to_string());
    if results.is_empty() && directories.len() == 1 {
        if let Some((_, children)) = directories.pop() {
            results = children;
        }
    }

    for error in errors {
        listing.failed = true;
        listing
            .lines
            .push(Line::Stderr(format!("ERROR: {}", error.describe(format, false))));
    }

    let mut printed = !results.is_empty();
    for entry in &results {
        listing
            .lines
            .push(Line::Stdout(with_slash(format(&entry.path), entry, options)));
    }

    for (dir, children) in directories {
        if printed {
            listing.lines.push(Line::Stdout(String::new()));
        }
        printed = true;

        listing.lines.push(Line::Stdout(format!("{}:", format(&dir.path))));
        let mut names = children
            .iter()
            .map(|child| with_slash(child.name().to_string(), child, options))
            .collect::<Vec<_>>();
        names.sort();
        listing.lines.extend(names.into_iter().map(Line::Stdout));
    }

    Ok(listing)
}

/// Children of a directory, then of each child directory when recursive.
fn expand_dir(
    view: &dyn TreeView,
    dir: RepoEntry,
    recursive: bool,
    errors: &mut Vec<TreeError>,
) -> TreeResult<Vec<(RepoEntry, Vec<RepoEntry>)>> {
    let mut children = match view.list_children(&dir.path) {
        Ok(children) => children,
        Err(error) => {
            collect(error, errors)?;
            return Ok(Vec::new());
        }
    };
    children.sort_by(|left, right| left.name().cmp(right.name()));

    let child_dirs = children
        .iter()
        .filter(|child| child.is_dir())
        .cloned()
        .collect::<Vec<_>>();

    let mut result = vec![(dir, children)];
    if recursive {
        for child in child_dirs {
            result.extend(expand_dir(view, child, recursive, errors)?);
        }
    }

    Ok(result)
}

fn collect(error: TreeError, errors: &mut Vec<TreeError>) -> TreeResult<()> {
    if error.is_fatal() {
        return Err(error);
    }

    errors.push(error);
    Ok(())
}

fn with_slash(mut text: String, entry: &RepoEntry, options: ListOptions) -> String {
    if options.slash_dirs && entry.is_dir() {
        text.push('/');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{CookbookLayout, TopLevel},
        overlay::RootMapping,
        report::Diagnostics,
        tree::LocalTree,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        fs::{create_dir_all, write},
        path::Path,
        sync::Arc,
    };

    fn local_tree(cwd: &Path) -> LocalTree {
        let repo = cwd.join("repo");
        let mut mapping = RootMapping::new(vec![repo.clone()]);
        for top in [TopLevel::Roles, TopLevel::DataBags] {
            mapping.insert(top, vec![repo.join(top.dir_name())]);
        }
        LocalTree::new(mapping, CookbookLayout::Unversioned, Arc::new(Diagnostics::new()))
    }

    fn stdout(listing: &Listing) -> Vec<&str> {
        listing
            .lines
            .iter()
            .map(|line| match line {
                Line::Stdout(text) | Line::Stderr(text) => text.as_str(),
            })
            .collect()
    }

    fn setup(cwd: &Path) -> anyhow::Result<()> {
        create_dir_all(cwd.join("repo/roles"))?;
        write(cwd.join("repo/roles/a.json"), "{}")?;
        write(cwd.join("repo/roles/b.json"), "{}")?;
        create_dir_all(cwd.join("repo/data_bags/bag"))?;
        write(cwd.join("repo/data_bags/bag/item.json"), "{}")?;
        Ok(())
    }

    #[sealed_test]
    fn single_directory_lists_children_by_path() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        setup(&cwd)?;

        let tree = local_tree(&cwd);
        let format = |path: &LogicalPath| path.to_string();
        let listing = list(&tree, &[PathPattern::new("/roles")?], ListOptions::default(), &format)?;
        assert_eq!(stdout(&listing), vec!["/roles/a.json", "/roles/b.json"]);
        assert!(!listing.failed);

        Ok(())
    }

    #[sealed_test]
    fn recursive_listing_groups_by_directory() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        setup(&cwd)?;

        let tree = local_tree(&cwd);
        let format = |path: &LogicalPath| path.to_string();
        let options = ListOptions {
            recursive: true,
            slash_dirs: true,
            ..Default::default()
        };
        let listing = list(&tree, &[PathPattern::new("/")?], options, &format)?;
        assert_eq!(
            stdout(&listing),
            vec![
                "/:",
                "data_bags/",
                "roles/",
                "",
                "/data_bags:",
                "bag/",
                "",
                "/data_bags/bag:",
                "item.json",
                "",
                "/roles:",
                "a.json",
                "b.json",
            ]
        );

        let options = ListOptions {
            flat: true,
            ..options
        };
        let listing = list(&tree, &[PathPattern::new("/")?], options, &format)?;
        assert_eq!(
            stdout(&listing),
            vec![
                "/data_bags/",
                "/data_bags/bag/",
                "/data_bags/bag/item.json",
                "/roles/",
                "/roles/a.json",
                "/roles/b.json",
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn missing_exact_path_is_an_error() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        setup(&cwd)?;

        let tree = local_tree(&cwd);
        let format = |path: &LogicalPath| path.to_string();
        let patterns = [PathPattern::new("/roles/nope.json")?, PathPattern::new("/roles/a.json")?];
        let listing = list(&tree, &patterns, ListOptions::default(), &format)?;
        assert_eq!(
            listing.lines,
            vec![
                Line::Stderr("ERROR: /roles/nope.json: No such file or directory".into()),
                Line::Stdout("/roles/a.json".into()),
            ]
        );
        assert!(listing.failed);

        Ok(())
    }
}
