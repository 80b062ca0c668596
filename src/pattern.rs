// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Logical path patterns.
//!
//! Command line arguments name entries of the logical namespace, possibly
//! with wildcards in any segment, e.g., `/environments/*.json` or
//! `/cookbooks/*/recipes`. Each segment is matched on its own, so `*` never
//! crosses a `/`.
//!
//! Matching walks a [`TreeView`] lazily: exact segments are looked up
//! directly, and only wildcard segments cause a directory to be listed.

use crate::{
    path::LogicalPath,
    tree::{RepoEntry, Result as TreeResult, Side, TreeView},
};

use glob::Pattern;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

#[derive(Debug, Clone)]
enum Segment {
    Exact(String),
    Glob(Pattern),
}

impl Segment {
    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Glob(pattern) => pattern.matches(name),
        }
    }
}

/// Absolute logical path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    text: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile absolute pattern.
    ///
    /// `.` and `..` segments are resolved lexically first.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Path`] if pattern is not absolute.
    /// - Return [`Error::InvalidGlob`] if a wildcard segment is malformed.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let path: LogicalPath = text.as_ref().parse()?;
        let segments = path
            .segments()
            .iter()
            .map(|segment| {
                if !segment.contains(['*', '?', '[']) {
                    return Ok(Segment::Exact(segment.clone()));
                }

                Pattern::new(segment)
                    .map(Segment::Glob)
                    .map_err(|err| Error::InvalidGlob {
                        source: err,
                        pattern: text.as_ref().to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            text: path.to_string(),
            segments,
        })
    }

    /// Pattern depth in segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The path this pattern names, if it has no wildcards.
    pub fn exact_path(&self) -> Option<LogicalPath> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Exact(exact) => Some(exact.as_str()),
                Segment::Glob(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(LogicalPath::from_segments)
    }

    /// Check if pattern matches path exactly.
    pub fn matches(&self, path: &LogicalPath) -> bool {
        path.depth() == self.depth() && self.matches_prefix(path)
    }

    /// Check if any descendant of path could match.
    pub fn could_match_children(&self, path: &LogicalPath) -> bool {
        path.depth() < self.depth() && self.matches_prefix(path)
    }

    /// Name of the only child of path that could match, if the next segment
    /// has no wildcard.
    pub fn exact_child_name_under(&self, path: &LogicalPath) -> Option<&str> {
        match self.segments.get(path.depth())? {
            Segment::Exact(exact) => Some(exact),
            Segment::Glob(_) => None,
        }
    }

    fn matches_prefix(&self, path: &LogicalPath) -> bool {
        path.segments()
            .iter()
            .zip(&self.segments)
            .all(|(name, segment)| segment.matches(name))
    }
}

impl Display for PathPattern {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.text)
    }
}

/// Same logical path looked up on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPair {
    pub path: LogicalPath,
    pub local: Option<RepoEntry>,
    pub remote: Option<RepoEntry>,
}

impl EntryPair {
    fn from_sides(path: LogicalPath, first: (Side, Option<RepoEntry>), second: Option<RepoEntry>) -> Self {
        let (side, first) = first;
        match side {
            Side::Local => Self {
                path,
                local: first,
                remote: second,
            },
            Side::Remote => Self {
                path,
                local: second,
                remote: first,
            },
        }
    }

    /// Entry of target side.
    pub fn side(&self, side: Side) -> Option<&RepoEntry> {
        match side {
            Side::Local => self.local.as_ref(),
            Side::Remote => self.remote.as_ref(),
        }
    }
}

/// Every existing entry of a view matching a pattern, in walk order.
///
/// # Errors
///
/// - Return [`crate::tree::Error`] if the view fails to look up or list.
pub fn list_matches(view: &dyn TreeView, pattern: &PathPattern) -> TreeResult<Vec<RepoEntry>> {
    let mut matches = Vec::new();
    if let Some(root) = view.entry(&LogicalPath::root())? {
        list_from(view, pattern, root, &mut matches)?;
    }

    Ok(matches)
}

fn list_from(
    view: &dyn TreeView,
    pattern: &PathPattern,
    entry: RepoEntry,
    matches: &mut Vec<RepoEntry>,
) -> TreeResult<()> {
    if !entry.is_dir() || !pattern.could_match_children(&entry.path) {
        if pattern.matches(&entry.path) {
            matches.push(entry);
        }
        return Ok(());
    }

    let path = entry.path.clone();
    if pattern.matches(&path) {
        matches.push(entry);
    }

    match pattern.exact_child_name_under(&path) {
        Some(name) => {
            if let Some(child) = view.entry(&path.join(name))? {
                list_from(view, pattern, child, matches)?;
            }
        }
        None => {
            for child in view.list_children(&path)? {
                list_from(view, pattern, child, matches)?;
            }
        }
    }

    Ok(())
}

/// Pair up matches of both views.
///
/// Matches of the `primary` view come first in walk order, then matches
/// existing only in the other view.
///
/// # Errors
///
/// - Return [`crate::tree::Error`] if either view fails to look up or list.
pub fn list_pairs(
    local: &dyn TreeView,
    remote: &dyn TreeView,
    pattern: &PathPattern,
    primary: Side,
) -> TreeResult<Vec<EntryPair>> {
    let (first, second) = order(local, remote, primary);

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for entry in list_matches(first, pattern)? {
        let path = entry.path.clone();
        let other = second.entry(&path)?;
        seen.insert(path.clone());
        pairs.push(EntryPair::from_sides(path, (primary, Some(entry)), other));
    }

    for entry in list_matches(second, pattern)? {
        if seen.contains(&entry.path) {
            continue;
        }

        let path = entry.path.clone();
        let other = first.entry(&path)?;
        pairs.push(EntryPair::from_sides(path, (primary, other), Some(entry)));
    }

    Ok(pairs)
}

/// Pair up children of a directory present on at least one side.
///
/// Children of the `primary` view come first, then children existing only
/// in the other view.
///
/// # Errors
///
/// - Return [`crate::tree::Error`] if either view fails to list.
pub fn child_pairs(
    local: &dyn TreeView,
    remote: &dyn TreeView,
    pair: &EntryPair,
    primary: Side,
) -> TreeResult<Vec<EntryPair>> {
    let (first, second) = order(local, remote, primary);
    let list = |view: &dyn TreeView, entry: Option<&RepoEntry>| match entry {
        Some(entry) if entry.is_dir() => view.list_children(&entry.path),
        _ => Ok(Vec::new()),
    };

    let mut second_children = list(second, pair.side(primary.other()))?;
    let mut pairs = Vec::new();
    for child in list(first, pair.side(primary))? {
        let position = second_children.iter().position(|other| other.path == child.path);
        let other = position.map(|position| second_children.remove(position));
        pairs.push(EntryPair::from_sides(child.path.clone(), (primary, Some(child)), other));
    }

    for child in second_children {
        pairs.push(EntryPair::from_sides(child.path.clone(), (primary, None), Some(child)));
    }

    Ok(pairs)
}

fn order<'a>(
    local: &'a dyn TreeView,
    remote: &'a dyn TreeView,
    primary: Side,
) -> (&'a dyn TreeView, &'a dyn TreeView) {
    match primary {
        Side::Local => (local, remote),
        Side::Remote => (remote, local),
    }
}

/// Pattern error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pattern is not an absolute logical path.
    #[error(transparent)]
    Path(#[from] crate::path::Error),

    /// Wildcard segment cannot be compiled.
    #[error("invalid pattern {pattern}")]
    InvalidGlob {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn path(text: &str) -> LogicalPath {
        text.parse().unwrap()
    }

    #[test_case("/roles/x.json", "/roles/x.json", true; "exact match")]
    #[test_case("/roles/*.json", "/roles/x.json", true; "star within segment")]
    #[test_case("/roles/*.json", "/roles/x.rb", false; "star respects suffix")]
    #[test_case("/*", "/roles/x.json", false; "star never crosses slash")]
    #[test_case("/cookbooks/x/../y", "/cookbooks/y", true; "parent segments resolve")]
    #[test_case("/../roles", "/roles", true; "parent of root stays root")]
    #[test]
    fn pattern_matches(pattern: &str, target: &str, expect: bool) {
        let pattern = PathPattern::new(pattern).unwrap();
        self::assert_eq!(pattern.matches(&path(target)), expect);
    }

    #[test]
    fn exact_path_only_without_wildcards() -> anyhow::Result<()> {
        assert_eq!(PathPattern::new("/roles/x.json")?.exact_path(), Some(path("/roles/x.json")));
        assert_eq!(PathPattern::new("/")?.exact_path(), Some(LogicalPath::root()));
        assert_eq!(PathPattern::new("/roles/*.json")?.exact_path(), None);
        Ok(())
    }

    #[test]
    fn descent_follows_prefix() -> anyhow::Result<()> {
        let pattern = PathPattern::new("/cookbooks/*/recipes")?;
        assert!(pattern.could_match_children(&path("/cookbooks/x")));
        assert!(!pattern.could_match_children(&path("/roles")));
        assert!(!pattern.could_match_children(&path("/cookbooks/x/recipes")));
        assert_eq!(pattern.exact_child_name_under(&LogicalPath::root()), Some("cookbooks"));
        assert_eq!(pattern.exact_child_name_under(&path("/cookbooks")), None);
        Ok(())
    }

    #[test]
    fn relative_pattern_is_rejected() {
        assert!(matches!(PathPattern::new("roles"), Err(Error::Path(_))));
    }
}
