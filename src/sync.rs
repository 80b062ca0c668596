// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Synchronization between the local and remote tree views.
//!
//! Uploads and downloads are diffs applied in one direction. The source side
//! is copied onto the destination side:
//!
//! - Source-only entries are created, together with any missing parent.
//! - Modified entries are updated.
//! - Destination-only entries are deleted only when purge is on.
//!
//! Destinations that only take whole cookbooks, i.e., the remote store,
//! receive every changed cookbook as one unit. Those cookbook uploads run as
//! a concurrent batch.
//!
//! Deletion through [`delete`] works on either side or both at once.

use crate::{
    address::{CookbookLayout, ObjectAddress, TopLevel},
    config::RepoConfig,
    cookbook::{metadata_version, VersionPolicy},
    diff::{could_exist, DiffOptions, DiffRecord, DiffStatus, TreeDiffEngine},
    handler::Content,
    path::LogicalPath,
    pattern::{list_matches, PathPattern},
    report::{Outcome, PlannedAction, Report},
    store::RemoteStore,
    tree::{read_cookbook, Error as TreeError, Operation, RemoteTree, Result as TreeResult, Side, TreeView},
};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::IsTerminal,
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, instrument};

/// Direction of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local to remote.
    Upload,

    /// Remote to local.
    Download,
}

impl Direction {
    /// Side entries are copied from.
    pub fn source(self) -> Side {
        match self {
            Self::Upload => Side::Local,
            Self::Download => Side::Remote,
        }
    }

    /// Side entries are copied onto.
    pub fn destination(self) -> Side {
        self.source().other()
    }
}

/// What a diff record means for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    SourceOnly,
    DestinationOnly,
    Modified,
    Unchanged,
    TypeChanged,
    CommonSubdirectory,
}

impl Change {
    fn of(status: DiffStatus, direction: Direction) -> Self {
        match (status, direction) {
            (DiffStatus::Added, Direction::Upload) | (DiffStatus::Deleted, Direction::Download) => {
                Self::SourceOnly
            }
            (DiffStatus::Added, Direction::Download) | (DiffStatus::Deleted, Direction::Upload) => {
                Self::DestinationOnly
            }
            (DiffStatus::Modified, _) => Self::Modified,
            (DiffStatus::Unchanged, _) => Self::Unchanged,
            (DiffStatus::TypeChanged, _) => Self::TypeChanged,
            (DiffStatus::CommonSubdirectory, _) => Self::CommonSubdirectory,
        }
    }
}

/// Options of a sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Delete destination-only entries.
    pub purge: bool,

    /// Report what would be done without doing it.
    pub dry_run: bool,

    /// Rewrite entries even when unchanged.
    pub force: bool,

    /// Update entries that differ. Without it only missing entries are
    /// created.
    pub diff: bool,

    /// Maximum number of concurrent cookbook uploads.
    pub concurrency: usize,

    /// Show progress of cookbook batches on a terminal.
    pub show_progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            purge: false,
            dry_run: false,
            force: false,
            diff: true,
            concurrency: 10,
            show_progress: false,
        }
    }
}

/// Whole cookbook waiting to be written.
#[derive(Debug, Clone)]
struct CookbookJob {
    path: LogicalPath,
    action: PlannedAction,
}

/// Place of an outcome in walk order.
#[derive(Debug)]
enum Slot {
    Done(Outcome),
    Job(usize),
}

/// Apply diffs between the local and remote tree views.
pub struct SyncExecutor {
    local: Arc<dyn TreeView>,
    remote: Arc<dyn TreeView>,
    options: SyncOptions,
}

impl SyncExecutor {
    /// Construct new sync executor.
    pub fn new(local: Arc<dyn TreeView>, remote: Arc<dyn TreeView>, options: SyncOptions) -> Self {
        Self {
            local,
            remote,
            options,
        }
    }

    fn views(&self, direction: Direction) -> (&Arc<dyn TreeView>, &Arc<dyn TreeView>) {
        match direction {
            Direction::Upload => (&self.local, &self.remote),
            Direction::Download => (&self.remote, &self.local),
        }
    }

    /// Diff a pattern, then copy its source side onto its destination side.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Tree`] if a fatal tree error occurs.
    /// - Return [`Error::Join`] if a cookbook upload task panics.
    /// - Return [`Error::IndicatifStyleTemplate`] if progress bar cannot be
    ///   styled.
    #[instrument(skip(self), fields(pattern = %pattern), level = "debug")]
    pub async fn sync(&self, pattern: &PathPattern, direction: Direction) -> Result<Report> {
        let options = DiffOptions {
            primary: direction.source(),
            ..Default::default()
        };
        let output = TreeDiffEngine::new(&*self.local, &*self.remote, options).diff(pattern)?;

        let mut report = Report::new();
        if !output.found {
            report.push(Outcome::NoMatch {
                pattern: pattern.to_string(),
            });
            return Ok(report);
        }

        for error in output.errors {
            report.push(self.refusal(error)?);
        }
        report.extend(self.apply(output.records, direction, pattern.depth()).await?);

        Ok(report)
    }

    /// Apply diff records in one direction.
    ///
    /// Outcomes are reported in record order, even for cookbooks uploaded
    /// concurrently. Cookbooks are only grouped when the pattern does not
    /// name something inside a cookbook.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Tree`] if a fatal tree error occurs.
    /// - Return [`Error::Join`] if a cookbook upload task panics.
    pub async fn apply(&self, records: Vec<DiffRecord>, direction: Direction, depth: usize) -> Result<Report> {
        let (source, destination) = self.views(direction);
        let whole_cookbooks = destination.writes_whole_cookbooks() && depth <= 2;

        let mut slots = Vec::new();
        let mut jobs = Vec::new();
        let mut planned = BTreeSet::new();
        for record in records {
            let change = Change::of(record.status, direction);
            match cookbook_of(&record.path).filter(|_| whole_cookbooks) {
                Some(cookbook) if !(record.path == cookbook && change == Change::DestinationOnly) => {
                    if planned.contains(&cookbook) || !self.changes_cookbook(change) {
                        continue;
                    }

                    let action = if record.path == cookbook && change == Change::SourceOnly {
                        PlannedAction::Create
                    } else if self.options.diff {
                        PlannedAction::Update
                    } else {
                        continue;
                    };
                    planned.insert(cookbook.clone());
                    if self.options.dry_run {
                        slots.push(Slot::Done(Outcome::Planned { action, path: cookbook }));
                    } else {
                        slots.push(Slot::Job(jobs.len()));
                        jobs.push(CookbookJob { path: cookbook, action });
                    }
                }
                _ => {
                    let mut outcomes = Vec::new();
                    self.apply_record(&**source, &**destination, record, change, &mut outcomes)?;
                    slots.extend(outcomes.into_iter().map(Slot::Done));
                }
            }
        }

        let mut results = self
            .upload_cookbooks(Arc::clone(source), Arc::clone(destination), jobs)
            .await?
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();

        let mut report = Report::new();
        for slot in slots {
            match slot {
                Slot::Done(outcome) => report.push(outcome),
                Slot::Job(index) => {
                    if let Some(outcome) = results.get_mut(index).and_then(Option::take) {
                        report.push(outcome);
                    }
                }
            }
        }

        Ok(report)
    }

    fn changes_cookbook(&self, change: Change) -> bool {
        match change {
            Change::Unchanged | Change::CommonSubdirectory => self.options.force,
            _ => true,
        }
    }

    fn apply_record(
        &self,
        source: &dyn TreeView,
        destination: &dyn TreeView,
        record: DiffRecord,
        change: Change,
        outcomes: &mut Vec<Outcome>,
    ) -> TreeResult<()> {
        let path = record.path.clone();
        match change {
            Change::SourceOnly => {
                let Some(entry) = record.entry(source.side()).cloned() else {
                    return Ok(());
                };
                if !self.ensure_parents(destination, &path, outcomes)? {
                    return Ok(());
                }

                let content = record.content(source.side()).cloned();
                self.copy_new(source, destination, &path, entry.is_dir(), content, outcomes)
            }
            Change::DestinationOnly => {
                if !self.options.purge {
                    return Ok(());
                }

                if self.options.dry_run {
                    outcomes.push(Outcome::Planned {
                        action: PlannedAction::PurgeExtra,
                        path,
                    });
                    return Ok(());
                }

                match destination.delete(&path, true) {
                    Ok(()) => outcomes.push(Outcome::PurgedExtra(path)),
                    Err(TreeError::NotFound { .. }) => debug!("{path} already gone"),
                    Err(error) => outcomes.push(self.refusal(error)?),
                }
                Ok(())
            }
            Change::Modified | Change::Unchanged => {
                if !self.options.diff || (change == Change::Unchanged && !self.options.force) {
                    return Ok(());
                }

                if self.options.dry_run {
                    outcomes.push(Outcome::Planned {
                        action: PlannedAction::Update,
                        path,
                    });
                    return Ok(());
                }

                let content = match record.content(source.side()) {
                    Some(content) => content.clone(),
                    None => match source.read(&path) {
                        Ok(content) => content,
                        Err(error) => {
                            outcomes.push(self.refusal(error)?);
                            return Ok(());
                        }
                    },
                };
                match destination.write(&path, &content) {
                    Ok(()) => outcomes.push(Outcome::Updated(path)),
                    Err(error) => outcomes.push(self.refusal(error)?),
                }
                Ok(())
            }
            Change::TypeChanged => {
                outcomes.push(Outcome::Failed {
                    error: TreeError::TypeMismatch { path },
                    with_side: false,
                });
                Ok(())
            }
            Change::CommonSubdirectory => Ok(()),
        }
    }

    /// Create missing parents of a destination path, outermost first.
    ///
    /// Return `false` if a parent could not be created.
    fn ensure_parents(
        &self,
        destination: &dyn TreeView,
        path: &LogicalPath,
        outcomes: &mut Vec<Outcome>,
    ) -> TreeResult<bool> {
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(parent) = current {
            if parent.is_root() {
                break;
            }

            match destination.entry(&parent) {
                Ok(Some(_)) => break,
                Ok(None) => {}
                Err(error) => {
                    outcomes.push(self.refusal(error)?);
                    return Ok(false);
                }
            }
            current = parent.parent();
            missing.push(parent);
        }

        for parent in missing.into_iter().rev() {
            if !could_exist(destination, &parent, true) {
                outcomes.push(Outcome::Failed {
                    error: TreeError::NotAllowed {
                        path: parent.parent().unwrap_or_else(LogicalPath::root),
                        side: destination.side(),
                        operation: Operation::CreateChild,
                        reason: None,
                    },
                    with_side: false,
                });
                return Ok(false);
            }

            if self.options.dry_run {
                outcomes.push(Outcome::Planned {
                    action: PlannedAction::Create,
                    path: parent,
                });
                continue;
            }

            match destination.create_dir(&parent) {
                Ok(()) => outcomes.push(Outcome::Created(parent)),
                Err(error) => {
                    outcomes.push(self.refusal(error)?);
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Copy a source entry missing from the destination, directories
    /// recursively.
    fn copy_new(
        &self,
        source: &dyn TreeView,
        destination: &dyn TreeView,
        path: &LogicalPath,
        is_dir: bool,
        content: Option<Content>,
        outcomes: &mut Vec<Outcome>,
    ) -> TreeResult<()> {
        if !is_dir {
            if self.options.dry_run {
                outcomes.push(Outcome::Planned {
                    action: PlannedAction::Create,
                    path: path.clone(),
                });
                return Ok(());
            }

            let content = match content {
                Some(content) => content,
                None => match source.read(path) {
                    Ok(content) => content,
                    Err(error) => {
                        outcomes.push(self.refusal(error)?);
                        return Ok(());
                    }
                },
            };
            match destination.write(path, &content) {
                Ok(()) => outcomes.push(Outcome::Created(path.clone())),
                Err(error) => outcomes.push(self.refusal(error)?),
            }
            return Ok(());
        }

        if self.options.dry_run {
            outcomes.push(Outcome::Planned {
                action: PlannedAction::Create,
                path: path.clone(),
            });
        } else {
            match destination.create_dir(path) {
                Ok(()) => outcomes.push(Outcome::Created(path.clone())),
                Err(error) => {
                    outcomes.push(self.refusal(error)?);
                    return Ok(());
                }
            }
        }

        let children = match source.list_children(path) {
            Ok(children) => children,
            Err(error) => {
                outcomes.push(self.refusal(error)?);
                return Ok(());
            }
        };
        for child in children {
            if !destination.can_have_child(path, child.name(), child.is_dir()) {
                debug!("{} cannot exist on {}", child.path, destination.side());
                continue;
            }
            self.copy_new(source, destination, &child.path, child.is_dir(), None, outcomes)?;
        }

        Ok(())
    }

    /// Turn a non-fatal error into an outcome.
    ///
    /// Refusals carrying a reason are expected, e.g., the default
    /// environment, so they only warn.
    fn refusal(&self, error: TreeError) -> TreeResult<Outcome> {
        if error.is_fatal() {
            return Err(error);
        }

        debug!("sync error: {error}");
        Ok(match &error {
            TreeError::NotAllowed { reason: Some(_), .. } => Outcome::Warned {
                error,
                with_side: false,
            },
            _ => Outcome::Failed {
                error,
                with_side: false,
            },
        })
    }

    /// Write whole cookbooks with bounded concurrency.
    ///
    /// Every job is attempted. Outcomes are returned in job order.
    async fn upload_cookbooks(
        &self,
        source: Arc<dyn TreeView>,
        destination: Arc<dyn TreeView>,
        jobs: Vec<CookbookJob>,
    ) -> Result<Vec<Outcome>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let bar = if self.options.show_progress && std::io::stderr().is_terminal() {
            ProgressBar::new(jobs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message("uploading cookbooks");
        bar.enable_steady_tick(Duration::from_millis(100));

        let replace_versions = self.options.purge;
        let mut results = futures::stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| {
                let source = Arc::clone(&source);
                let destination = Arc::clone(&destination);
                let bar = bar.clone();
                async move {
                    let path = job.path.clone();
                    let result = tokio::task::spawn_blocking(move || -> TreeResult<CookbookJob> {
                        let cookbook = read_cookbook(&*source, &job.path)?;
                        debug!("write cookbook {} version {}", cookbook.name, cookbook.version);
                        destination.write_cookbook(&job.path, cookbook, replace_versions)?;
                        Ok(job)
                    })
                    .await;
                    bar.inc(1);
                    (index, path, result)
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        bar.finish_and_clear();
        results.sort_by_key(|(index, ..)| *index);

        let mut uploaded = 0;
        let mut outcomes = Vec::with_capacity(results.len());
        for (_, path, result) in results {
            let outcome = match result? {
                Ok(job) => {
                    uploaded += 1;
                    match job.action {
                        PlannedAction::Create => Outcome::Created(job.path),
                        _ => Outcome::Updated(job.path),
                    }
                }
                Err(error) => {
                    debug!("cookbook {path} failed");
                    self.refusal(error)?
                }
            };
            outcomes.push(outcome);
        }
        info!("Uploaded {uploaded} cookbooks");

        Ok(outcomes)
    }
}

/// Cookbook directory holding a path, if any.
fn cookbook_of(path: &LogicalPath) -> Option<LogicalPath> {
    match path.segments().first() {
        Some(top) if top == TopLevel::Cookbooks.dir_name() && path.depth() >= 2 => Some(path.ancestor_at(2)),
        _ => None,
    }
}

/// Versions of every local cookbook, from their metadata.
///
/// Only the unversioned layout has anything to report.
///
/// # Errors
///
/// - Return [`TreeError`] if the cookbooks cannot be listed or read.
pub fn local_cookbook_versions(local: &dyn TreeView) -> TreeResult<HashMap<String, String>> {
    let mut versions = HashMap::new();
    let cookbooks = TopLevel::Cookbooks.logical_path();
    if local.layout() != CookbookLayout::Unversioned
        || !local.can_have_child(&LogicalPath::root(), TopLevel::Cookbooks.dir_name(), true)
        || local.entry(&cookbooks)?.is_none()
    {
        return Ok(versions);
    }

    for cookbook in local.list_children(&cookbooks)? {
        let mut metadata = BTreeMap::new();
        for file in ["metadata.json", "metadata.rb"] {
            let path = cookbook.path.join(file);
            if local.entry(&path)?.is_some() {
                metadata.insert(file.to_string(), local.read(&path)?.to_bytes());
            }
        }

        let version = metadata_version(&metadata).unwrap_or_else(|| crate::cookbook::DEFAULT_VERSION.into());
        versions.insert(cookbook.name().to_string(), version);
    }

    Ok(versions)
}

/// Remote tree view prepared for one operation.
///
/// Uploads compare against the remote version equal to the local one. Other
/// operations consult local versions only under the `local` version policy.
///
/// # Errors
///
/// - Return [`TreeError`] if local cookbook versions cannot be read.
pub fn remote_view(
    config: &RepoConfig,
    store: Arc<dyn RemoteStore>,
    local: &dyn TreeView,
    direction: Option<Direction>,
) -> TreeResult<RemoteTree> {
    let remote = RemoteTree::from_config(config, store);
    if direction == Some(Direction::Upload) {
        return Ok(remote.pin_to_local_versions(local_cookbook_versions(local)?));
    }

    if config.cookbook_version_policy == VersionPolicy::Local {
        return Ok(remote.with_local_versions(local_cookbook_versions(local)?));
    }

    Ok(remote)
}

/// Delete every entry matching a pattern from target views.
///
/// Per-side errors are reported before `Deleted <path>`, which is reported
/// once when any side deleted the entry. Deleting a remote validator client
/// requires `confirm` to agree.
///
/// # Errors
///
/// - Return [`TreeError`] if it is fatal, see [`TreeError::is_fatal`].
#[instrument(skip(views, confirm), fields(pattern = %pattern), level = "debug")]
pub fn delete(
    views: &[&dyn TreeView],
    pattern: &PathPattern,
    recursive: bool,
    confirm: &mut dyn FnMut(&LogicalPath) -> bool,
) -> TreeResult<Report> {
    let mut report = Report::new();

    let mut paths: Vec<LogicalPath> = Vec::new();
    for view in views {
        let matches = match list_matches(*view, pattern) {
            Ok(matches) => matches,
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                report.push(Outcome::Failed {
                    error,
                    with_side: true,
                });
                continue;
            }
        };

        for entry in matches {
            if !paths.contains(&entry.path) {
                paths.push(entry.path);
            }
        }
    }

    if paths.is_empty() {
        if let Some(path) = pattern.exact_path() {
            report.push(Outcome::Failed {
                error: TreeError::NotFound {
                    path,
                    side: views.first().map_or(Side::Remote, |view| view.side()),
                },
                with_side: false,
            });
        }
        return Ok(report);
    }

    for path in paths {
        let mut deleted = false;
        for view in views {
            match delete_one(*view, &path, recursive, confirm) {
                Ok(Some(outcome)) => report.push(outcome),
                Ok(None) => deleted = true,
                Err(TreeError::NotFound { .. }) => {}
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => report.push(Outcome::Failed {
                    error,
                    with_side: true,
                }),
            }
        }

        if deleted {
            report.push(Outcome::Deleted(path));
        }
    }

    Ok(report)
}

/// Delete one entry from one view. Return an outcome if it was skipped.
fn delete_one(
    view: &dyn TreeView,
    path: &LogicalPath,
    recursive: bool,
    confirm: &mut dyn FnMut(&LogicalPath) -> bool,
) -> TreeResult<Option<Outcome>> {
    if view.entry(path)?.is_none() {
        return Err(TreeError::NotFound {
            path: path.clone(),
            side: view.side(),
        });
    }

    if view.side() == Side::Remote && is_validator(view, path)? && !confirm(path) {
        return Ok(Some(Outcome::Skipped {
            path: path.clone(),
            reason: "validator client not confirmed".into(),
        }));
    }

    view.delete(path, recursive)?;
    Ok(None)
}

fn is_validator(view: &dyn TreeView, path: &LogicalPath) -> TreeResult<bool> {
    let Ok(ObjectAddress::Object {
        top: TopLevel::Clients, ..
    }) = ObjectAddress::parse(path, view.layout())
    else {
        return Ok(false);
    };

    Ok(match view.read(path)? {
        Content::Json(value) => value.get("validator").and_then(|value| value.as_bool()) == Some(true),
        Content::Raw(_) => false,
    })
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal tree view error.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Cookbook upload task did not run to completion.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    /// Progress bar template is invalid.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cookbook::{CookbookVersion, CookbookVersionSelector},
        overlay::RootMapping,
        report::Diagnostics,
        store::{Collection, MemoryStore, RemoteStore, Result as StoreResult, StoreError},
        tree::LocalTree,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use serde_json::{json, Value};
    use std::{
        fs::{create_dir_all, write},
        path::Path,
    };

    fn local_tree(cwd: &Path) -> Arc<LocalTree> {
        let repo = cwd.join("repo");
        let mut mapping = RootMapping::new(vec![repo.clone()]);
        for top in TopLevel::ALL {
            mapping.insert(top, vec![repo.join(top.dir_name())]);
        }
        Arc::new(LocalTree::new(mapping, CookbookLayout::Unversioned, Arc::new(Diagnostics::new())))
    }

    fn remote_tree(store: Arc<MemoryStore>, local: &dyn TreeView) -> anyhow::Result<Arc<RemoteTree>> {
        let remote = RemoteTree::new(
            store,
            TopLevel::ALL.to_vec(),
            CookbookLayout::Unversioned,
            CookbookVersionSelector::default(),
        )
        .pin_to_local_versions(local_cookbook_versions(local)?);
        Ok(Arc::new(remote))
    }

    fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
        Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
    }

    fn rendered(report: &Report) -> Vec<String> {
        report
            .outcomes()
            .iter()
            .map(|outcome| match outcome {
                Outcome::Created(path) => format!("Created {path}"),
                Outcome::Updated(path) => format!("Updated {path}"),
                Outcome::Deleted(path) => format!("Deleted {path}"),
                Outcome::PurgedExtra(path) => format!("Purged {path}"),
                Outcome::Planned { action, path } => format!("{action:?} {path}"),
                Outcome::Skipped { path, .. } => format!("Skipped {path}"),
                Outcome::Failed { error, .. } => format!("Failed {error}"),
                Outcome::Warned { error, .. } => format!("Warned {error}"),
                Outcome::NoMatch { pattern } => format!("NoMatch {pattern}"),
            })
            .collect()
    }

    #[sealed_test]
    fn upload_creates_parents_then_children() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/data_bags/x"))?;
        write(cwd.join("repo/data_bags/x/y.json"), r#"{"id": "y"}"#)?;

        let store = Arc::new(MemoryStore::new());
        let local = local_tree(&cwd);
        let remote = remote_tree(store.clone(), &*local)?;
        let executor = SyncExecutor::new(local, remote, SyncOptions::default());

        let pattern = PathPattern::new("/data_bags/x/y.json")?;
        let report = runtime()?.block_on(executor.sync(&pattern, Direction::Upload))?;
        assert_eq!(
            rendered(&report),
            vec!["Created /data_bags/x", "Created /data_bags/x/y.json"]
        );
        assert_eq!(store.get(&Collection::DataBag("x".into()), "y")?, json!({"id": "y"}));

        Ok(())
    }

    #[sealed_test]
    fn purge_is_idempotent() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/roles"))?;
        write(cwd.join("repo/roles/x.json"), r#"{"name": "x", "description": "new"}"#)?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Roles, "x", json!({"name": "x", "description": "old"}))?;
        store.create(&Collection::Roles, "extra", json!({"name": "extra"}))?;

        let options = SyncOptions {
            purge: true,
            ..Default::default()
        };
        let pattern = PathPattern::new("/roles")?;
        let runtime = runtime()?;

        let local = local_tree(&cwd);
        let remote = remote_tree(store.clone(), &*local)?;
        let executor = SyncExecutor::new(local.clone(), remote, options.clone());
        let report = runtime.block_on(executor.sync(&pattern, Direction::Upload))?;
        assert_eq!(rendered(&report), vec!["Updated /roles/x.json", "Purged /roles/extra.json"]);

        let remote = remote_tree(store.clone(), &*local)?;
        let executor = SyncExecutor::new(local, remote, options);
        let report = runtime.block_on(executor.sync(&pattern, Direction::Upload))?;
        assert!(report.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn dry_run_changes_nothing() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/roles"))?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Roles, "x", json!({"name": "x"}))?;
        store.create(&Collection::DataBags, "bag", json!({}))?;
        store.create(&Collection::DataBag("bag".into()), "item", json!({"id": "item"}))?;

        let local = local_tree(&cwd);
        let remote = remote_tree(store, &*local)?;
        let options = SyncOptions {
            dry_run: true,
            ..Default::default()
        };
        let executor = SyncExecutor::new(local, remote, options);
        let runtime = runtime()?;

        let mut report = Report::new();
        for pattern in ["/data_bags", "/roles"] {
            let pattern = PathPattern::new(pattern)?;
            report.extend(runtime.block_on(executor.sync(&pattern, Direction::Download))?);
        }

        assert_eq!(
            rendered(&report),
            vec![
                "Create /data_bags",
                "Create /data_bags/bag",
                "Create /data_bags/bag/item.json",
                "Create /roles/x.json"
            ]
        );
        assert!(!cwd.join("repo/roles/x.json").exists());
        assert!(!cwd.join("repo/data_bags").exists());

        Ok(())
    }

    #[sealed_test]
    fn cookbooks_upload_as_a_whole() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let cookbooks = cwd.join("repo/cookbooks");
        create_dir_all(cookbooks.join("x/recipes"))?;
        write(cookbooks.join("x/metadata.rb"), "version '1.0.0'\n")?;
        write(cookbooks.join("x/recipes/default.rb"), "new\n")?;
        create_dir_all(cookbooks.join("y"))?;
        write(cookbooks.join("y/metadata.rb"), "version '2.0.0'\n")?;

        let store = Arc::new(MemoryStore::new());
        store.put_cookbook(
            CookbookVersion::new("x", "1.0.0")
                .with_file("metadata.rb", "version '1.0.0'\n")
                .with_file("recipes/default.rb", "old\n"),
        )?;
        store.put_cookbook(CookbookVersion::new("x", "0.9.0").with_file("metadata.rb", "version '0.9.0'\n"))?;

        let local = local_tree(&cwd);
        let remote = remote_tree(store.clone(), &*local)?;
        let options = SyncOptions {
            purge: true,
            concurrency: 2,
            ..Default::default()
        };
        let executor = SyncExecutor::new(local, remote, options);
        let report = runtime()?.block_on(executor.sync(&PathPattern::new("/cookbooks")?, Direction::Upload))?;

        assert_eq!(rendered(&report), vec!["Updated /cookbooks/x", "Created /cookbooks/y"]);
        assert_eq!(store.cookbook_versions("x")?, vec!["1.0.0".to_string()]);
        assert_eq!(
            store.get_cookbook("x", "1.0.0")?.files.get("recipes/default.rb"),
            Some(&b"new\n".to_vec())
        );

        Ok(())
    }

    #[sealed_test]
    fn cookbook_file_cannot_be_uploaded_alone() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let cookbooks = cwd.join("repo/cookbooks");
        create_dir_all(cookbooks.join("x"))?;
        write(cookbooks.join("x/metadata.rb"), "version '1.0.0'\n")?;
        write(cookbooks.join("x/extra.rb"), "")?;

        let store = Arc::new(MemoryStore::new());
        store.put_cookbook(CookbookVersion::new("x", "1.0.0").with_file("metadata.rb", "version '1.0.0'\n"))?;

        let local = local_tree(&cwd);
        let remote = remote_tree(store, &*local)?;
        let executor = SyncExecutor::new(local, remote, SyncOptions::default());
        let pattern = PathPattern::new("/cookbooks/x/extra.rb")?;
        let report = runtime()?.block_on(executor.sync(&pattern, Direction::Upload))?;

        assert_eq!(
            rendered(&report),
            vec!["Failed /cookbooks/x cannot have a child created under it"]
        );
        assert!(report.has_failures());

        Ok(())
    }

    /// Memory store that rejects uploads of one cookbook.
    struct RejectingStore {
        inner: MemoryStore,
        rejected: String,
    }

    impl RemoteStore for RejectingStore {
        fn list(&self, collection: &Collection) -> StoreResult<Vec<String>> {
            self.inner.list(collection)
        }

        fn get(&self, collection: &Collection, name: &str) -> StoreResult<Value> {
            self.inner.get(collection, name)
        }

        fn create(&self, collection: &Collection, name: &str, value: Value) -> StoreResult<()> {
            self.inner.create(collection, name, value)
        }

        fn update(&self, collection: &Collection, name: &str, value: Value) -> StoreResult<()> {
            self.inner.update(collection, name, value)
        }

        fn delete(&self, collection: &Collection, name: &str) -> StoreResult<()> {
            self.inner.delete(collection, name)
        }

        fn list_cookbooks(&self) -> StoreResult<Vec<String>> {
            self.inner.list_cookbooks()
        }

        fn cookbook_versions(&self, name: &str) -> StoreResult<Vec<String>> {
            self.inner.cookbook_versions(name)
        }

        fn get_cookbook(&self, name: &str, version: &str) -> StoreResult<CookbookVersion> {
            self.inner.get_cookbook(name, version)
        }

        fn put_cookbook(&self, cookbook: CookbookVersion) -> StoreResult<()> {
            if cookbook.name == self.rejected {
                return Err(StoreError::Conflict {
                    what: format!("cookbook {}", cookbook.name),
                });
            }
            self.inner.put_cookbook(cookbook)
        }

        fn delete_cookbook(&self, name: &str, version: &str) -> StoreResult<()> {
            self.inner.delete_cookbook(name, version)
        }
    }

    #[sealed_test]
    fn failed_cookbook_does_not_stop_its_siblings() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let cookbooks = cwd.join("repo/cookbooks");
        for name in ["a", "b"] {
            create_dir_all(cookbooks.join(name).join("recipes"))?;
            write(cookbooks.join(name).join("metadata.rb"), "version '1.0.0'\n")?;
            write(cookbooks.join(name).join("recipes/default.rb"), "")?;
        }

        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            rejected: "a".into(),
        });
        let local = local_tree(&cwd);
        let remote = RemoteTree::new(
            store.clone(),
            TopLevel::ALL.to_vec(),
            CookbookLayout::Unversioned,
            CookbookVersionSelector::default(),
        )
        .pin_to_local_versions(local_cookbook_versions(&*local)?);
        let options = SyncOptions {
            concurrency: 2,
            ..Default::default()
        };
        let executor = SyncExecutor::new(local, Arc::new(remote), options);
        let report = runtime()?.block_on(executor.sync(&PathPattern::new("/cookbooks")?, Direction::Upload))?;

        assert_eq!(
            rendered(&report),
            vec!["Failed /cookbooks/a: cookbook a already exists", "Created /cookbooks/b"]
        );
        assert!(report.has_failures());
        assert_eq!(store.cookbook_versions("b")?, vec!["1.0.0".to_string()]);
        assert!(store.cookbook_versions("a").is_err());

        Ok(())
    }

    #[sealed_test]
    fn delete_default_environment_from_both_sides() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo/environments"))?;
        write(cwd.join("repo/environments/_default.json"), "{}")?;

        let store = Arc::new(MemoryStore::new());
        let local = local_tree(&cwd);
        let remote = remote_tree(store, &*local)?;
        let pattern = PathPattern::new("/environments/_default.json")?;
        let report = delete(&[&*remote, &*local], &pattern, false, &mut |_| true)?;

        assert_eq!(
            rendered(&report),
            vec![
                "Failed /environments/_default.json cannot be deleted",
                "Deleted /environments/_default.json"
            ]
        );
        assert!(!cwd.join("repo/environments/_default.json").exists());

        Ok(())
    }

    #[sealed_test]
    fn delete_validator_needs_confirmation() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        create_dir_all(cwd.join("repo"))?;

        let store = Arc::new(MemoryStore::new());
        store.create(&Collection::Clients, "v", json!({"name": "v", "validator": true}))?;

        let local = local_tree(&cwd);
        let remote = remote_tree(store.clone(), &*local)?;
        let pattern = PathPattern::new("/clients/v.json")?;
        let report = delete(&[&*remote], &pattern, false, &mut |_| false)?;
        assert_eq!(rendered(&report), vec!["Skipped /clients/v.json"]);
        assert!(store.get(&Collection::Clients, "v").is_ok());

        let report = delete(&[&*remote], &pattern, false, &mut |_| true)?;
        assert_eq!(rendered(&report), vec!["Deleted /clients/v.json"]);

        let report = delete(&[&*remote], &pattern, false, &mut |_| true)?;
        assert_eq!(rendered(&report), vec!["Failed /clients/v.json: No such file or directory"]);

        Ok(())
    }
}
