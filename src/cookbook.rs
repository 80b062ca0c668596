// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cookbook versions.
//!
//! A cookbook is a named, versioned bundle of files treated as one unit.
//! The remote store keeps every version ever uploaded, while an unversioned
//! local repository holds exactly one version per cookbook name. So whenever
//! the two are compared, one remote version has to be picked to represent
//! `/cookbooks/<name>`.
//!
//! # Version Selection
//!
//! By default the highest version wins. Alternatively the version equal to
//! the local one wins when the remote store has it, falling back to the
//! highest version otherwise. Uploads always compare against the version
//! equal to the local one, since that is the version being replaced.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};
use tracing::debug;

/// Version used when a cookbook carries no metadata version.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// One version of a cookbook with all of its files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookVersion {
    pub name: String,
    pub version: String,

    /// File content keyed by `/` separated path relative to the cookbook.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl CookbookVersion {
    /// Construct new empty cookbook version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            files: BTreeMap::new(),
        }
    }

    /// Add file to cookbook version.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

/// Determine version declared by cookbook metadata.
///
/// Tries the `version` field of `metadata.json` first, then the `version`
/// line of `metadata.rb`.
pub fn metadata_version(files: &BTreeMap<String, Vec<u8>>) -> Option<String> {
    if let Some(data) = files.get("metadata.json") {
        let version = serde_json::from_slice::<serde_json::Value>(data)
            .ok()
            .and_then(|value| value.get("version")?.as_str().map(str::to_owned));
        if version.is_some() {
            return version;
        }
    }

    let data = files.get("metadata.rb")?;
    String::from_utf8_lossy(data).lines().find_map(|line| {
        let rest = line.trim().strip_prefix("version")?;
        if !rest.starts_with([' ', '\t', '(']) {
            return None;
        }

        let rest = rest.trim_start_matches([' ', '\t', '(']).trim_end_matches([' ', ')']);
        let version = rest
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .or_else(|| rest.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))?;
        Some(version.to_string())
    })
}

/// Parse cookbook version, padding missing minor and patch numbers.
pub fn parse_version(version: &str) -> Option<semver::Version> {
    if let Ok(parsed) = semver::Version::parse(version) {
        return Some(parsed);
    }

    let padded = match version.split('.').count() {
        1 => format!("{version}.0.0"),
        2 => format!("{version}.0"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

/// Compare cookbook versions semantically.
///
/// Unparsable versions sort below parsable ones, and against each other
/// by plain text.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    match (parse_version(left), parse_version(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => left.cmp(right),
    }
}

/// Rule for picking the remote cookbook version to compare against.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Highest version wins.
    #[default]
    Latest,

    /// Version equal to the local one wins, else highest version.
    Local,
}

/// Resolve the version representing a cookbook in the unversioned
/// namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct CookbookVersionSelector {
    policy: VersionPolicy,
}

impl CookbookVersionSelector {
    /// Construct new selector with target policy.
    pub fn new(policy: VersionPolicy) -> Self {
        Self { policy }
    }

    /// Select version among candidates for download and diff.
    ///
    /// Candidates are given in store order. Equal versions keep the first
    /// one seen.
    pub fn select(&self, name: &str, candidates: &[String], local: Option<&str>) -> Option<String> {
        if self.policy == VersionPolicy::Local {
            if let Some(local) = local.filter(|local| candidates.iter().any(|c| c == local)) {
                debug!("cookbook {name} pinned to local version {local}");
                return Some(local.to_string());
            }
        }

        let selected = candidates.iter().fold(None::<&String>, |best, candidate| match best {
            Some(best) if compare_versions(candidate, best) != Ordering::Greater => Some(best),
            _ => Some(candidate),
        });
        debug!("cookbook {name} resolves to version {selected:?}");
        selected.cloned()
    }

    /// Select version among candidates for upload.
    ///
    /// Only the version equal to the local one qualifies.
    pub fn select_for_upload(&self, candidates: &[String], local: &str) -> Option<String> {
        candidates
            .iter()
            .find(|candidate| *candidate == local)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn metadata_version_from_ruby() {
        let cookbook = CookbookVersion::new("x", "").with_file(
            "metadata.rb",
            indoc! {r#"
                name 'x'
                version_constraint 'blah'
                version '1.2.3'
            "#},
        );
        assert_eq!(metadata_version(&cookbook.files), Some("1.2.3".into()));

        let cookbook = CookbookVersion::new("x", "").with_file("metadata.rb", "version(\"2.0.0\")\n");
        assert_eq!(metadata_version(&cookbook.files), Some("2.0.0".into()));
    }

    #[test]
    fn metadata_version_prefers_json() {
        let cookbook = CookbookVersion::new("x", "")
            .with_file("metadata.rb", "version '1.0.0'\n")
            .with_file("metadata.json", r#"{"name": "x", "version": "1.0.1"}"#);
        assert_eq!(metadata_version(&cookbook.files), Some("1.0.1".into()));

        let cookbook = CookbookVersion::new("x", "").with_file("recipes/default.rb", "");
        assert_eq!(metadata_version(&cookbook.files), None);
    }

    #[test_case("1.0.10", "1.0.9", Ordering::Greater; "numeric not lexical")]
    #[test_case("1.0", "1.0.0", Ordering::Equal; "padded minor version")]
    #[test_case("2", "1.9.9", Ordering::Greater; "padded major version")]
    #[test_case("blah", "0.0.1", Ordering::Less; "unparsable sorts low")]
    #[test]
    fn compare_versions_semantically(left: &str, right: &str, expect: Ordering) {
        self::assert_eq!(compare_versions(left, right), expect);
    }

    #[test]
    fn latest_version_wins_by_default() {
        let selector = CookbookVersionSelector::default();
        let candidates = versions(&["1.0.0", "1.0.1", "0.9.0"]);
        assert_eq!(selector.select("x", &candidates, Some("1.0.0")), Some("1.0.1".into()));
        assert_eq!(selector.select("x", &[], None), None);
    }

    #[test]
    fn local_policy_prefers_local_version() {
        let selector = CookbookVersionSelector::new(VersionPolicy::Local);
        let candidates = versions(&["1.0.0", "1.0.1"]);
        assert_eq!(selector.select("x", &candidates, Some("1.0.0")), Some("1.0.0".into()));
        assert_eq!(selector.select("x", &candidates, Some("0.5.0")), Some("1.0.1".into()));
        assert_eq!(selector.select("x", &candidates, None), Some("1.0.1".into()));
    }

    #[test]
    fn upload_selects_matching_version_only() {
        let selector = CookbookVersionSelector::default();
        let candidates = versions(&["1.0.0", "1.0.1"]);
        assert_eq!(selector.select_for_upload(&candidates, "1.0.0"), Some("1.0.0".into()));
        assert_eq!(selector.select_for_upload(&candidates, "2.0.0"), None);
    }
}
