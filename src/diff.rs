// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree diff engine.
//!
//! Compare the local and remote tree views over every entry matching a
//! pattern, classifying each path into a [`DiffRecord`]. The engine is
//! direction agnostic: [`DiffStatus::Added`] always means "present only
//! locally", [`DiffStatus::Deleted`] always means "present only remotely".
//! Uploads and downloads interpret these statuses for themselves.
//!
//! # See Also
//!
//! - [`crate::sync`]

use crate::{
    handler::Content,
    path::LogicalPath,
    pattern::{child_pairs, list_pairs, EntryPair, PathPattern},
    report::Line,
    tree::{Error as TreeError, RepoEntry, Result as TreeResult, Side, TreeView},
};

use similar::TextDiff;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Classification of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    /// Present only locally.
    Added,

    /// Present only remotely.
    Deleted,

    /// Leaf present on both sides with different content.
    Modified,

    /// Leaf present on both sides with equal content.
    Unchanged,

    /// Directory on one side, leaf on the other.
    TypeChanged,

    /// Directory on both sides, not descended into.
    CommonSubdirectory,
}

impl DiffStatus {
    /// Status letter, `None` for statuses never shown by letter.
    pub fn letter(&self) -> Option<char> {
        match self {
            Self::Added => Some('A'),
            Self::Deleted => Some('D'),
            Self::Modified => Some('M'),
            Self::TypeChanged => Some('T'),
            Self::Unchanged | Self::CommonSubdirectory => None,
        }
    }
}

/// Classified path with both of its sides.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRecord {
    pub path: LogicalPath,
    pub status: DiffStatus,
    pub local: Option<RepoEntry>,
    pub remote: Option<RepoEntry>,
    pub local_content: Option<Content>,
    pub remote_content: Option<Content>,
}

impl DiffRecord {
    /// Entry of target side.
    pub fn entry(&self, side: Side) -> Option<&RepoEntry> {
        match side {
            Side::Local => self.local.as_ref(),
            Side::Remote => self.remote.as_ref(),
        }
    }

    /// Content of target side, if it was read.
    pub fn content(&self, side: Side) -> Option<&Content> {
        match side {
            Side::Local => self.local_content.as_ref(),
            Side::Remote => self.remote_content.as_ref(),
        }
    }
}

/// Status letter filter, e.g., `AM` keeps additions and modifications,
/// `d` drops deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffFilter {
    include: Vec<char>,
    exclude: Vec<char>,
}

impl DiffFilter {
    /// Check if a status passes the filter.
    ///
    /// Statuses without a letter always pass.
    pub fn admits(&self, status: DiffStatus) -> bool {
        let Some(letter) = status.letter() else {
            return true;
        };

        if !self.include.is_empty() && !self.include.contains(&letter) {
            return false;
        }

        !self.exclude.contains(&letter)
    }
}

impl FromStr for DiffFilter {
    type Err = Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut filter = Self::default();
        for letter in data.chars() {
            match letter {
                'A' | 'D' | 'M' | 'T' => filter.include.push(letter),
                'a' | 'd' | 'm' | 't' => filter.exclude.push(letter.to_ascii_uppercase()),
                _ => {
                    return Err(Error::InvalidFilter {
                        filter: data.to_string(),
                        letter,
                    })
                }
            }
        }

        Ok(filter)
    }
}

/// Options of a diff walk.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Descend into directories present on both sides.
    ///
    /// The requested paths themselves are always descended into.
    pub recursive: bool,

    /// Keep only records passing the filter.
    pub filter: Option<DiffFilter>,

    /// Side whose entries come first at each level.
    pub primary: Side,

    /// Read content of one-sided leaves too.
    pub with_content: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            filter: None,
            primary: Side::Remote,
            with_content: true,
        }
    }
}

/// Result of diffing one pattern.
#[derive(Debug, Default)]
pub struct DiffOutput {
    pub records: Vec<DiffRecord>,

    /// Per-path errors met during the walk.
    pub errors: Vec<TreeError>,

    /// Pattern matched something on at least one side.
    pub found: bool,
}

impl DiffOutput {
    /// Records that represent an actual difference.
    pub fn differences(&self) -> impl Iterator<Item = &DiffRecord> {
        self.records
            .iter()
            .filter(|record| record.status != DiffStatus::Unchanged)
    }
}

/// Compare local and remote tree views.
pub struct TreeDiffEngine<'a> {
    local: &'a dyn TreeView,
    remote: &'a dyn TreeView,
    options: DiffOptions,
}

impl<'a> TreeDiffEngine<'a> {
    /// Construct new diff engine.
    pub fn new(local: &'a dyn TreeView, remote: &'a dyn TreeView, options: DiffOptions) -> Self {
        Self {
            local,
            remote,
            options,
        }
    }

    /// Diff every entry matching a pattern.
    ///
    /// Per-path errors are collected into the output and never stop the
    /// walk.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError`] if it is fatal, see [`TreeError::is_fatal`].
    #[instrument(skip(self), fields(pattern = %pattern), level = "debug")]
    pub fn diff(&self, pattern: &PathPattern) -> TreeResult<DiffOutput> {
        let mut output = DiffOutput::default();
        let pairs = match list_pairs(self.local, self.remote, pattern, self.options.primary) {
            Ok(pairs) => pairs,
            Err(error) => {
                output.found = true;
                self.collect(error, &mut output)?;
                return Ok(output);
            }
        };

        output.found = !pairs.is_empty();
        for pair in pairs {
            self.diff_pair(pair, true, &mut output)?;
        }

        debug!("{} records, {} errors", output.records.len(), output.errors.len());
        Ok(output)
    }

    fn diff_pair(&self, pair: EntryPair, expand: bool, output: &mut DiffOutput) -> TreeResult<()> {
        let status = match (&pair.local, &pair.remote) {
            (None, None) => return Ok(()),
            (Some(local), None) => {
                if !could_exist(self.remote, &pair.path, local.is_dir()) {
                    debug!("{} cannot exist remotely", pair.path);
                    return Ok(());
                }
                DiffStatus::Added
            }
            (None, Some(remote)) => {
                if !could_exist(self.local, &pair.path, remote.is_dir()) {
                    debug!("{} cannot exist locally", pair.path);
                    return Ok(());
                }
                DiffStatus::Deleted
            }
            (Some(local), Some(remote)) if local.is_dir() && remote.is_dir() => {
                if !expand && !self.options.recursive {
                    DiffStatus::CommonSubdirectory
                } else {
                    let children = match child_pairs(self.local, self.remote, &pair, self.options.primary) {
                        Ok(children) => children,
                        Err(error) => return self.collect(error, output),
                    };
                    for child in children {
                        self.diff_pair(child, false, output)?;
                    }
                    return Ok(());
                }
            }
            (Some(local), Some(remote)) if local.is_dir() != remote.is_dir() => DiffStatus::TypeChanged,
            (Some(_), Some(_)) => DiffStatus::Unchanged,
        };

        let both = pair.local.is_some() && pair.remote.is_some();
        let wants_content = both || self.options.with_content;
        let (local_content, remote_content) = if wants_content && status != DiffStatus::TypeChanged {
            let local_content = match load(self.local, pair.local.as_ref()) {
                Ok(content) => content,
                Err(error) => return self.collect(error, output),
            };
            let remote_content = match load(self.remote, pair.remote.as_ref()) {
                Ok(content) => content,
                Err(error) => return self.collect(error, output),
            };
            (local_content, remote_content)
        } else {
            (None, None)
        };

        let status = match (status, &local_content, &remote_content) {
            (DiffStatus::Unchanged, Some(local), Some(remote)) if local.same_as(remote) => DiffStatus::Unchanged,
            (DiffStatus::Unchanged, ..) => DiffStatus::Modified,
            (status, ..) => status,
        };

        if self
            .options
            .filter
            .as_ref()
            .is_some_and(|filter| !filter.admits(status))
        {
            return Ok(());
        }

        output.records.push(DiffRecord {
            path: pair.path,
            status,
            local: pair.local,
            remote: pair.remote,
            local_content,
            remote_content,
        });

        Ok(())
    }

    fn collect(&self, error: TreeError, output: &mut DiffOutput) -> TreeResult<()> {
        if error.is_fatal() {
            return Err(error);
        }

        debug!("diff error: {error}");
        output.errors.push(error);
        Ok(())
    }
}

/// Check if an entry missing from a view could exist there.
pub(crate) fn could_exist(view: &dyn TreeView, path: &LogicalPath, is_dir: bool) -> bool {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => view.can_have_child(&parent, name, is_dir),
        _ => true,
    }
}

fn load(view: &dyn TreeView, entry: Option<&RepoEntry>) -> TreeResult<Option<Content>> {
    match entry {
        Some(entry) if !entry.is_dir() => match view.read(&entry.path) {
            Ok(content) => Ok(Some(content)),
            Err(TreeError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        },
        _ => Ok(None),
    }
}

/// How diff records are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Path only.
    NameOnly,

    /// Status letter and path.
    NameStatus,

    /// Unified diff of every change.
    #[default]
    Patch,
}

/// Render the output of diffing a pattern for the user.
///
/// The remote side is the old side, the local side is the new side.
pub fn render(
    output: &DiffOutput,
    pattern: &PathPattern,
    mode: OutputMode,
    format: &dyn Fn(&LogicalPath) -> String,
) -> Vec<Line> {
    let mut lines = Vec::new();
    for record in &output.records {
        if let Some(line) = render_record(record, mode, format) {
            lines.push(Line::Stdout(line));
        }
    }

    for error in &output.errors {
        lines.push(Line::Stderr(format!("ERROR: {}", error.describe(format, false))));
    }

    if !output.found {
        lines.push(Line::Stderr(format!(
            "ERROR: {pattern}: No such file or directory on remote or local"
        )));
    }

    lines
}

fn render_record(record: &DiffRecord, mode: OutputMode, format: &dyn Fn(&LogicalPath) -> String) -> Option<String> {
    let path = format(&record.path);
    let text = match (mode, record.status) {
        (_, DiffStatus::Unchanged) => None,
        (OutputMode::Patch, DiffStatus::CommonSubdirectory) => Some(format!("Common subdirectories: {path}")),
        (_, DiffStatus::CommonSubdirectory) => None,
        (OutputMode::NameOnly, _) => Some(path),
        (OutputMode::NameStatus, status) => status.letter().map(|letter| format!("{letter}\t{path}")),
        (OutputMode::Patch, DiffStatus::TypeChanged) => {
            let remote_is_dir = record.remote.as_ref().is_some_and(RepoEntry::is_dir);
            if remote_is_dir {
                Some(format!("File {path} is a directory while file {path} is a regular file"))
            } else {
                Some(format!("File {path} is a regular file while file {path} is a directory"))
            }
        }
        (OutputMode::Patch, DiffStatus::Deleted) => Some(match &record.remote_content {
            Some(old) => format!(
                "diff --knife {path} {path}\ndeleted file\n{}",
                unified(&old.to_text(), "", &path, "/dev/null")
            ),
            None => only_in(&record.path, format),
        }),
        (OutputMode::Patch, DiffStatus::Added) => Some(match &record.local_content {
            Some(new) => format!(
                "diff --knife {path} {path}\nnew file\n{}",
                unified("", &new.to_text(), "/dev/null", &path)
            ),
            None => only_in(&record.path, format),
        }),
        (OutputMode::Patch, DiffStatus::Modified) => {
            let old = record.remote_content.as_ref().map(Content::to_text).unwrap_or_default();
            let new = record.local_content.as_ref().map(Content::to_text).unwrap_or_default();
            Some(format!("diff --knife {path} {path}\n{}", unified(&old, &new, &path, &path)))
        }
    };

    text.map(|text| text.trim_end_matches('\n').to_string())
}

fn only_in(path: &LogicalPath, format: &dyn Fn(&LogicalPath) -> String) -> String {
    let parent = path.parent().unwrap_or_else(LogicalPath::root);
    format!("Only in {}: {}", format(&parent), path.name().unwrap_or_default())
}

fn unified(old: &str, new: &str, old_path: &str, new_path: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(old_path, new_path)
        .to_string()
}

/// Diff error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filter holds a letter that is not a status letter.
    #[error("invalid diff filter {filter:?}: unknown status letter {letter:?}")]
    InvalidFilter { filter: String, letter: char },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{CookbookLayout, TopLevel},
        cookbook::CookbookVersionSelector,
        overlay::RootMapping,
        report::Diagnostics,
        store::{Collection, MemoryStore, RemoteStore},
        tree::{LocalTree, RemoteTree},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use serde_json::json;
    use simple_test_case::test_case;
    use std::{
        fs::{create_dir_all, write},
        path::Path,
        sync::Arc,
    };

    fn views(cwd: &Path, store: Arc<MemoryStore>) -> (LocalTree, RemoteTree) {
        let repo = cwd.join("repo");
        let mut mapping = RootMapping::new(vec![repo.clone()]);
        for top in TopLevel::ALL {
            mapping.insert(top, vec![repo.join(top.dir_name())]);
        }

        let local = LocalTree::new(mapping, CookbookLayout::Unversioned, Arc::new(Diagnostics::new()));
        let remote = RemoteTree::new(
            store,
            TopLevel::ALL.to_vec(),
            CookbookLayout::Unversioned,
            CookbookVersionSelector::default(),
        );
        (local, remote)
    }

    fn status_lines(output: &DiffOutput, pattern: &PathPattern) -> Vec<Line> {
        render(output, pattern, OutputMode::NameStatus, &|path: &LogicalPath| path.to_string())
    }

    #[test_case("AM", DiffStatus::Added, true; "included letter")]
    #[test_case("AM", DiffStatus::Deleted, false; "missing letter")]
    #[test_case("d", DiffStatus::Deleted, false; "excluded letter")]
    #[test_case("d", DiffStatus::Modified, true; "exclusion keeps the rest")]
    #[test_case("A", DiffStatus::CommonSubdirectory, true; "letterless status passes")]
    #[test]
    fn filter_admits(filter: &str, status: DiffStatus, expect: bool) {
        let filter: DiffFilter = filter.parse().unwrap();
        self::assert_eq!(filter.admits(status), expect);
    }

    #[test]
    fn filter_rejects_unknown_letters() {
        assert!(matches!(
            "AX".parse::<DiffFilter>(),
            Err(Error::InvalidFilter { letter: 'X', .. })
        ));
    }

    #[sealed_test]
    fn classify_both_sides() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let roles = cwd.join("repo/roles");
        create_dir_all(&roles)?;
        write(roles.join("same.json"), r#"{"description": "bar", "name": "same"}"#)?;
        write(roles.join("changed.json"), r#"{"name": "changed", "description": "new"}"#)?;
        write(roles.join("local.json"), r#"{"name": "local"}"#)?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Roles, "same", json!({"name": "same", "description": "bar"}))?;
        store.create(&Collection::Roles, "changed", json!({"name": "changed", "description": "old"}))?;
        store.create(&Collection::Roles, "remote", json!({"name": "remote"}))?;

        let (local, remote) = views(&cwd, store);
        let engine = TreeDiffEngine::new(&local, &remote, DiffOptions::default());
        let pattern = PathPattern::new("/roles")?;
        let output = engine.diff(&pattern)?;

        assert_eq!(
            status_lines(&output, &pattern),
            vec![
                Line::Stdout("M\t/roles/changed.json".into()),
                Line::Stdout("D\t/roles/remote.json".into()),
                Line::Stdout("A\t/roles/local.json".into()),
            ]
        );
        assert_eq!(output.differences().count(), 3);
        assert_eq!(output.records.len(), 4);

        Ok(())
    }

    #[sealed_test]
    fn patch_shows_unified_diff() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let roles = cwd.join("repo/roles");
        create_dir_all(&roles)?;
        write(roles.join("x.json"), r#"{"name": "x", "description": "new"}"#)?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Roles, "x", json!({"name": "x", "description": "old"}))?;

        let (local, remote) = views(&cwd, store);
        let engine = TreeDiffEngine::new(&local, &remote, DiffOptions::default());
        let pattern = PathPattern::new("/roles/x.json")?;
        let lines = render(&engine.diff(&pattern)?, &pattern, OutputMode::Patch, &|path: &LogicalPath| {
            path.to_string()
        });

        let [Line::Stdout(patch)] = lines.as_slice() else {
            panic!("expected one patch, got {lines:?}");
        };
        assert!(patch.starts_with(indoc! {"
            diff --knife /roles/x.json /roles/x.json
            --- /roles/x.json
            +++ /roles/x.json
        "}));
        assert!(patch.contains("-  \"description\": \"old\","));
        assert!(patch.contains("+  \"description\": \"new\","));

        Ok(())
    }

    #[sealed_test]
    fn non_recursive_reports_common_subdirectories() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/data_bags/bag"))?;
        write(cwd.join("repo/data_bags/bag/item.json"), r#"{"id": "item", "x": 1}"#)?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::DataBags, "bag", json!({}))?;
        store.create(&Collection::DataBag("bag".into()), "item", json!({"id": "item"}))?;

        let (local, remote) = views(&cwd, store);
        let options = DiffOptions {
            recursive: false,
            ..Default::default()
        };
        let engine = TreeDiffEngine::new(&local, &remote, options);
        let pattern = PathPattern::new("/data_bags")?;
        let output = engine.diff(&pattern)?;
        let format = |path: &LogicalPath| path.to_string();

        assert_eq!(
            render(&output, &pattern, OutputMode::Patch, &format),
            vec![Line::Stdout("Common subdirectories: /data_bags/bag".into())]
        );
        assert!(render(&output, &pattern, OutputMode::NameStatus, &format).is_empty());

        Ok(())
    }

    #[sealed_test]
    fn unmatched_pattern_is_reported() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/roles"))?;

        let (local, remote) = views(&cwd, Arc::new(MemoryStore::new()));
        let engine = TreeDiffEngine::new(&local, &remote, DiffOptions::default());
        let pattern = PathPattern::new("/roles/*.json")?;
        let output = engine.diff(&pattern)?;

        assert!(!output.found);
        assert_eq!(
            status_lines(&output, &pattern),
            vec![Line::Stderr(
                "ERROR: /roles/*.json: No such file or directory on remote or local".into()
            )]
        );

        Ok(())
    }
}
