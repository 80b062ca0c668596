// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Outcome reporting.
//!
//! Operations never print. They record one [`Outcome`] per entry into a
//! [`Report`], and collect non-fatal warnings into [`Diagnostics`]. The
//! binary renders both at the end of an invocation, paths formatted relative
//! to the working directory through a [`Locator`].

use crate::{config::Locator, path::LogicalPath, tree::Error as TreeError};

use std::sync::Mutex;
use tracing::debug;

/// Deduplicated collection of non-fatal warnings.
///
/// # Invariant
///
/// - Each distinct warning is kept once, in order of first report.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Mutex<Vec<String>>,
}

impl Diagnostics {
    /// Construct new empty diagnostics sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report warning.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("warning: {message}");

        // INVARIANT: A poisoned sink only loses warnings, never the operation.
        if let Ok(mut warnings) = self.warnings.lock() {
            if !warnings.contains(&message) {
                warnings.push(message);
            }
        }
    }

    /// Take all warnings reported so far.
    pub fn drain(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|mut warnings| std::mem::take(&mut *warnings))
            .unwrap_or_default()
    }
}

/// Action a dry run would have taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Update,
    PurgeExtra,
}

/// Result of processing one entry.
#[derive(Debug)]
pub enum Outcome {
    Created(LogicalPath),
    Updated(LogicalPath),
    Deleted(LogicalPath),

    /// Destination-only entry removed because purge is on.
    PurgedExtra(LogicalPath),

    /// Dry run only.
    Planned { action: PlannedAction, path: LogicalPath },

    /// Entry skipped on purpose, e.g., a declined confirmation.
    Skipped { path: LogicalPath, reason: String },

    /// Entry failed, the invocation fails.
    Failed { error: TreeError, with_side: bool },

    /// Entry refused by the destination in an expected way.
    Warned { error: TreeError, with_side: bool },

    /// Pattern matched nothing on either side.
    NoMatch { pattern: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::NoMatch { .. })
    }
}

/// Rendered line of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Stdout(String),
    Stderr(String),
}

/// Ordered outcomes of an operation.
#[derive(Debug, Default)]
pub struct Report {
    outcomes: Vec<Outcome>,
}

impl Report {
    /// Construct new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one outcome.
    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    /// Append all outcomes of another report in order.
    pub fn extend(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
    }

    /// Outcomes in the order they were recorded.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Check if any entry failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(Outcome::is_failure)
    }

    /// Render outcomes for the user.
    pub fn lines(&self, locator: &Locator) -> Vec<Line> {
        let format = |path: &LogicalPath| locator.format_path(path);
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                Outcome::Created(path) => Line::Stdout(format!("Created {}", format(path))),
                Outcome::Updated(path) => Line::Stdout(format!("Updated {}", format(path))),
                Outcome::Deleted(path) => Line::Stdout(format!("Deleted {}", format(path))),
                Outcome::PurgedExtra(path) => {
                    Line::Stdout(format!("Deleted extra entry {} (purge is on)", format(path)))
                }
                Outcome::Planned { action, path } => Line::Stdout(match action {
                    PlannedAction::Create => format!("Would create {}", format(path)),
                    PlannedAction::Update => format!("Would update {}", format(path)),
                    PlannedAction::PurgeExtra => {
                        format!("Would delete extra entry {} (purge is on)", format(path))
                    }
                }),
                Outcome::Skipped { path, reason } => {
                    Line::Stdout(format!("Skipped {} ({reason})", format(path)))
                }
                Outcome::Failed { error, with_side } => {
                    Line::Stderr(format!("ERROR: {}", error.describe(&format, *with_side)))
                }
                Outcome::Warned { error, with_side } => {
                    Line::Stderr(format!("WARNING: {}", error.describe(&format, *with_side)))
                }
                Outcome::NoMatch { pattern } => {
                    Line::Stderr(format!("ERROR: {pattern}: No such file or directory"))
                }
            })
            .collect()
    }
}
