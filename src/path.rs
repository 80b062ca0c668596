// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Model the logical paths used to address everything inside a chef
//! repository, and determine where external files like the knife
//! configuration file live by default.
//!
//! # Logical Paths
//!
//! A __logical path__ is a `/`-rooted sequence of segments that identifies a
//! position in the unified chef repository namespace, e.g.,
//! `/cookbooks/x/metadata.rb`. The same logical path names an entry on the
//! local side and on the remote side, which is what allows the two sides to
//! be compared at all.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Normalized `/`-rooted logical path.
///
/// # Invariant
///
/// - No empty segments, so no trailing slash except for the root itself.
/// - No `.` or `..` segments.
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    /// Construct the root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Construct path from raw segments.
    ///
    /// Empty segments and `.` are dropped, `..` pops the previous segment
    /// and stays put at the root.
    pub fn from_segments(segments: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut path = Self::root();
        for segment in segments {
            path.push(segment.as_ref());
        }
        path
    }

    /// Append one raw segment, applying normalization.
    fn push(&mut self, segment: &str) {
        match segment {
            "" | "." => {}
            ".." => {
                self.segments.pop();
            }
            segment => self.segments.push(segment.to_string()),
        }
    }

    /// Join a relative path onto this one.
    ///
    /// The relative path may contain several `/` separated segments,
    /// including `..`.
    pub fn join(&self, relative: impl AsRef<str>) -> Self {
        let mut path = self.clone();
        for segment in relative.as_ref().split('/') {
            path.push(segment);
        }
        path
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment of the path, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// All segments from the top level down.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check if this path equals or lies underneath `ancestor`.
    pub fn starts_with(&self, ancestor: &LogicalPath) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// Segments of this path below `ancestor`, if it is one.
    pub fn strip_prefix(&self, ancestor: &LogicalPath) -> Option<&[String]> {
        self.segments.strip_prefix(ancestor.segments.as_slice())
    }

    /// Path truncated to at most `depth` segments.
    pub fn ancestor_at(&self, depth: usize) -> Self {
        Self {
            segments: self.segments.iter().take(depth).cloned().collect(),
        }
    }
}

impl FromStr for LogicalPath {
    type Err = Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        if !data.starts_with('/') {
            return Err(Error::NotAbsolute {
                path: data.to_string(),
            });
        }

        Ok(Self::root().join(data))
    }
}

impl Display for LogicalPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.is_root() {
            return fmt.write_str("/");
        }

        for segment in &self.segments {
            write!(fmt, "/{segment}")?;
        }

        Ok(())
    }
}

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`Error::NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(Error::NoWayHome)
}

/// Determine default absolute path to knife configuration file.
///
/// Uses `$HOME/.chef/knife.toml`. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`Error::NoWayHome`] if home directory path cannot be determined.
pub fn default_config_file() -> Result<PathBuf> {
    home_dir().map(|home| home.join(".chef").join("knife.toml"))
}

/// Path error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Logical path does not start at the root.
    #[error("logical path {path:?} must start with '/'")]
    NotAbsolute { path: String },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
