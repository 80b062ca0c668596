// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use chefsync::{
    config::{Locator, PathList, RepoConfig},
    diff::{render, DiffFilter, DiffOptions, OutputMode, TreeDiffEngine},
    list::{list, ListOptions},
    path::{default_config_file, LogicalPath},
    pattern::PathPattern,
    report::{Diagnostics, Line},
    store::{MemoryStore, RemoteStore},
    sync::{self, Direction, SyncExecutor, SyncOptions},
    tree::{LocalTree, Side, TreeView},
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::{env::current_dir, path::PathBuf, process::exit, sync::Arc};
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "chefsync [options] <command> [<path>]...",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to knife configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Override root directory of the chef repository.
    #[arg(long, global = true, value_name = "path")]
    pub chef_repo_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Run selected command. Return `false` if any path failed.
    async fn run(self) -> Result<bool> {
        let session = Session::open(self.config, self.chef_repo_path)?;
        match self.command {
            Command::List(opts) => run_list(&session, opts),
            Command::Diff(opts) => run_diff(&session, opts),
            Command::Upload(opts) => run_sync(&session, opts, Direction::Upload).await,
            Command::Download(opts) => run_sync(&session, opts, Direction::Download).await,
            Command::Delete(opts) => run_delete(&session, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List entries of the local repository or the remote store.
    #[command(override_usage = "chefsync list [options] [<path>]...")]
    List(ListArgs),

    /// Show differences between the remote store and the local repository.
    #[command(override_usage = "chefsync diff [options] [<path>]...")]
    Diff(DiffArgs),

    /// Upload local entries to the remote store.
    #[command(override_usage = "chefsync upload [options] <path>...")]
    Upload(SyncArgs),

    /// Download remote entries into the local repository.
    #[command(override_usage = "chefsync download [options] <path>...")]
    Download(SyncArgs),

    /// Delete entries from the remote store, the local repository, or both.
    #[command(override_usage = "chefsync delete [options] <path>...")]
    Delete(DeleteArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListArgs {
    /// Paths or glob patterns to list.
    #[arg(value_name = "path")]
    pub paths: Vec<String>,

    /// List directories recursively.
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Show full paths instead of grouping by directory.
    #[arg(short, long)]
    pub flat: bool,

    /// Append a slash to directories.
    #[arg(short = 'p', long = "slash")]
    pub slash_dirs: bool,

    /// List directories as themselves, not their children.
    #[arg(short = 'd', long = "directory")]
    pub bare_directories: bool,

    /// List the local repository instead of the remote store.
    #[arg(long)]
    pub local: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DiffArgs {
    /// Paths or glob patterns to diff.
    #[arg(value_name = "path")]
    pub paths: Vec<String>,

    /// Show only names of changed entries.
    #[arg(long, conflicts_with = "name_status")]
    pub name_only: bool,

    /// Show names and status letters of changed entries.
    #[arg(long)]
    pub name_status: bool,

    /// Select entries by status letter (A, D, M, T), lowercase excludes.
    #[arg(long, value_name = "letters")]
    pub diff_filter: Option<DiffFilter>,

    /// Do not descend into directories present on both sides.
    #[arg(long)]
    pub no_recurse: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncArgs {
    /// Paths or glob patterns to synchronize.
    #[arg(value_name = "path")]
    pub paths: Vec<String>,

    /// Delete destination entries missing from the source.
    #[arg(long)]
    pub purge: bool,

    /// Show what would be done without doing it.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Rewrite entries even when unchanged.
    #[arg(long)]
    pub force: bool,

    /// Only create missing entries, never update existing ones.
    #[arg(long)]
    pub no_diff: bool,

    /// Maximum number of concurrent cookbook uploads.
    #[arg(long, value_name = "count")]
    pub concurrency: Option<usize>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteArgs {
    /// Paths or glob patterns to delete.
    #[arg(value_name = "path")]
    pub paths: Vec<String>,

    /// Delete directories recursively.
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Delete from the local repository only.
    #[arg(long, conflicts_with = "both")]
    pub local: bool,

    /// Delete from both the remote store and the local repository.
    #[arg(long)]
    pub both: bool,

    /// Delete validator clients without asking.
    #[arg(short, long)]
    pub yes: bool,
}

/// Everything one invocation works with.
struct Session {
    config: RepoConfig,
    locator: Locator,
    diagnostics: Arc<Diagnostics>,
    local: Arc<LocalTree>,
    store: Arc<MemoryStore>,
}

impl Session {
    fn open(config_path: Option<PathBuf>, repo_path: Option<PathBuf>) -> Result<Self> {
        let cwd = current_dir().context("cannot determine current working directory")?;
        let mut config = match config_path {
            Some(path) => RepoConfig::load(path)?,
            None => {
                let path = default_config_file()?;
                if path.exists() {
                    RepoConfig::load(path)?
                } else {
                    debug!("no configuration at {:?}, using defaults", path.display());
                    RepoConfig::default()
                }
            }
        };

        if let Some(repo_path) = repo_path {
            config.chef_repo_path = Some(PathList::One(cwd.join(repo_path)));
        }

        let store = match &config.remote_store {
            Some(path) => MemoryStore::load(path)?,
            None => MemoryStore::new(),
        };

        let diagnostics = Arc::new(Diagnostics::new());
        let local = Arc::new(LocalTree::from_config(&config, diagnostics.clone()));
        let locator = Locator::new(config.root_mapping(), cwd);

        Ok(Self {
            config,
            locator,
            diagnostics,
            local,
            store: Arc::new(store),
        })
    }

    /// Resolve arguments into patterns, the current directory if none.
    fn patterns(&self, args: &[String]) -> Result<Vec<PathPattern>> {
        let mut patterns = Vec::new();
        if args.is_empty() {
            patterns.push(PathPattern::new(self.locator.resolve_arg("")?)?);
        }

        for arg in args {
            patterns.push(PathPattern::new(self.locator.resolve_arg(arg)?)?);
        }

        Ok(patterns)
    }

    fn remote(&self, direction: Option<Direction>) -> Result<Arc<dyn TreeView>> {
        let store: Arc<dyn RemoteStore> = self.store.clone();
        let remote = sync::remote_view(&self.config, store, self.local.as_ref(), direction)?;
        Ok(Arc::new(remote))
    }

    fn format(&self) -> impl Fn(&LogicalPath) -> String + '_ {
        |path: &LogicalPath| self.locator.format_path(path)
    }

    /// Persist the remote store after it changed.
    fn save(&self) -> Result<()> {
        match &self.config.remote_store {
            Some(path) => self.store.save(path)?,
            None => warn!("no remote_store configured, remote changes are discarded"),
        }

        Ok(())
    }

    /// Print pending warnings, then output lines.
    fn print(&self, lines: &[Line]) {
        for warning in self.diagnostics.drain() {
            eprintln!("WARN: {warning}");
        }

        for line in lines {
            match line {
                Line::Stdout(text) => println!("{text}"),
                Line::Stderr(text) => eprintln!("{text}"),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run().await {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

async fn run() -> Result<bool> {
    Cli::parse().run().await
}

fn run_list(session: &Session, opts: ListArgs) -> Result<bool> {
    let patterns = session.patterns(&opts.paths)?;
    let options = ListOptions {
        recursive: opts.recursive,
        flat: opts.flat,
        slash_dirs: opts.slash_dirs,
        bare_directories: opts.bare_directories,
    };

    let view = if opts.local {
        session.local.clone() as Arc<dyn TreeView>
    } else {
        session.remote(None)?
    };

    let listing = list(view.as_ref(), &patterns, options, &session.format())?;
    session.print(&listing.lines);
    Ok(!listing.failed)
}

fn run_diff(session: &Session, opts: DiffArgs) -> Result<bool> {
    let patterns = session.patterns(&opts.paths)?;
    let mode = if opts.name_only {
        OutputMode::NameOnly
    } else if opts.name_status {
        OutputMode::NameStatus
    } else {
        OutputMode::Patch
    };

    let options = DiffOptions {
        recursive: !opts.no_recurse,
        filter: opts.diff_filter,
        with_content: mode == OutputMode::Patch,
        ..Default::default()
    };

    let remote = session.remote(None)?;
    let engine = TreeDiffEngine::new(session.local.as_ref(), remote.as_ref(), options);

    let mut success = true;
    for pattern in &patterns {
        let output = engine.diff(pattern)?;
        success &= output.found && output.errors.is_empty();
        session.print(&render(&output, pattern, mode, &session.format()));
    }

    Ok(success)
}

async fn run_sync(session: &Session, opts: SyncArgs, direction: Direction) -> Result<bool> {
    if opts.paths.is_empty() {
        let verb = match direction {
            Direction::Upload => "upload",
            Direction::Download => "download",
        };
        eprintln!(
            "FATAL: You must specify at least one argument. If you want to {verb} everything in this directory, run \"chefsync {verb} .\""
        );
        return Ok(false);
    }

    let patterns = session.patterns(&opts.paths)?;
    let options = SyncOptions {
        purge: opts.purge,
        dry_run: opts.dry_run,
        force: opts.force,
        diff: !opts.no_diff,
        concurrency: opts.concurrency.unwrap_or(session.config.concurrency),
        show_progress: true,
    };

    let remote = session.remote(Some(direction))?;
    let executor = SyncExecutor::new(session.local.clone(), remote, options);

    let mut success = true;
    for pattern in &patterns {
        let report = executor.sync(pattern, direction).await?;
        success &= !report.has_failures();
        session.print(&report.lines(&session.locator));
    }

    if direction == Direction::Upload && !opts.dry_run {
        session.save()?;
    }

    Ok(success)
}

fn run_delete(session: &Session, opts: DeleteArgs) -> Result<bool> {
    if opts.paths.is_empty() {
        eprintln!("FATAL: You must specify at least one argument.");
        return Ok(false);
    }

    let patterns = session.patterns(&opts.paths)?;
    let remote = session.remote(None)?;
    let local: Arc<dyn TreeView> = session.local.clone();
    let views: Vec<&dyn TreeView> = if opts.both {
        vec![remote.as_ref(), local.as_ref()]
    } else if opts.local {
        vec![local.as_ref()]
    } else {
        vec![remote.as_ref()]
    };

    let yes = opts.yes;
    let mut confirm = |path: &LogicalPath| {
        yes || Confirm::new(&format!(
            "Do you really want to delete the validator client {}?",
            session.locator.format_path(path)
        ))
        .with_default(false)
        .prompt()
        .unwrap_or(false)
    };

    let mut success = true;
    for pattern in &patterns {
        let report = sync::delete(&views, pattern, opts.recursive, &mut confirm)?;
        success &= !report.has_failures();
        session.print(&report.lines(&session.locator));
    }

    if views.iter().any(|view| view.side() == Side::Remote) {
        session.save()?;
    }

    Ok(success)
}
