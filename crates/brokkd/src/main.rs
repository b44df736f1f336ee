//! `brokkd` — command-line entry point wiring the File Watch Service,
//! the Context Manager, and the Session Manager together around one
//! project root.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use brokk_core::context::Context;
use brokk_core::project_file::ProjectFile;
use brokk_edit::applier::{apply, ApplyInput, RealFileIo};
use brokk_edit::parser::parse;
use brokk_edit::resolver::ResolutionScope;
use brokk_git::command::GitCli;
use brokk_git::repo::discover_repo;
use brokk_git::tracked::list_tracked_files;
use brokk_watch::service::{FileWatchService, WatchConfig, WatchRoots};

use brokkd::context_manager::{ContextManager, TrackedFilesProvider};
use brokkd::session_manager::SessionManager;

#[derive(Parser)]
#[command(name = "brokkd")]
#[command(about = "Background daemon for the Brokk AI-assisted editing workbench")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watches a project for filesystem and git changes until interrupted.
    Watch {
        /// Project root directory.
        project_root: PathBuf,
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
        #[arg(long, default_value_t = 300)]
        debounce_ms: u64,
    },
    /// Applies an LLM response file's SEARCH/REPLACE blocks to a project.
    Apply {
        project_root: PathBuf,
        response_file: PathBuf,
    },
    /// Session archive management.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    New {
        project_root: PathBuf,
        name: String,
    },
    List {
        project_root: PathBuf,
    },
    Rename {
        project_root: PathBuf,
        id: Uuid,
        name: String,
    },
    Delete {
        project_root: PathBuf,
        id: Uuid,
    },
    Copy {
        project_root: PathBuf,
        id: Uuid,
        new_name: String,
    },
}

/// Resolves the project's tracked-file set through the real `git`
/// binary, falling back to an empty set outside a repository — a
/// non-git project simply never routes changes through the tracked
/// path of the Context Manager.
struct GitTrackedFiles {
    git: GitCli,
    repo: Option<brokk_git::repo::RepoHandle>,
}

impl GitTrackedFiles {
    fn discover(project_root: &Path) -> Self {
        let git = GitCli::default();
        let repo = discover_repo(project_root, &git).ok();
        Self { git, repo }
    }
}

impl TrackedFilesProvider for GitTrackedFiles {
    fn tracked_files(&self) -> HashSet<ProjectFile> {
        match &self.repo {
            Some(repo) => list_tracked_files(repo, &self.git).unwrap_or_default(),
            None => HashSet::new(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watch {
            project_root,
            poll_interval_ms,
            debounce_ms,
        } => run_watch(&project_root, poll_interval_ms, debounce_ms),
        Commands::Apply {
            project_root,
            response_file,
        } => run_apply(&project_root, &response_file),
        Commands::Session { action } => run_session(action),
    }
}

fn run_watch(project_root: &Path, poll_interval_ms: u64, debounce_ms: u64) -> anyhow::Result<()> {
    let tracked: Arc<dyn TrackedFilesProvider> = Arc::new(GitTrackedFiles::discover(project_root));
    let context_manager = Arc::new(ContextManager::new(Context::empty("watch session start"), tracked));

    context_manager.set_workspace_refresh_hook(|| {
        println!("[context] workspace refreshed");
    });
    context_manager.set_git_refresh_hook(|| {
        println!("[context] git state refreshed");
    });
    context_manager.set_commit_panel_hook(|| {
        println!("[context] commit panel refreshed");
    });

    let git = GitCli::default();
    let git_dir = discover_repo(project_root, &git).ok().map(|repo| repo.git_dir);
    let roots = WatchRoots {
        project_root: project_root.to_path_buf(),
        git_dir,
    };
    let mut config = WatchConfig::default();
    config.poll_interval_ms = poll_interval_ms;
    config.debounce_ms = debounce_ms;

    let mut service = FileWatchService::new(roots, config);
    let cm_for_listener = Arc::clone(&context_manager);
    service.add_listener(move |batch| {
        cm_for_listener.on_watch_batch(batch);
    });

    service.start(|| println!("[watch] baseline scan complete, watching {}", project_root.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())?;

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    service.stop();
    println!("[watch] brokkd watch stopped");
    Ok(())
}

fn run_apply(project_root: &Path, response_file: &Path) -> anyhow::Result<()> {
    let response = fs::read_to_string(response_file)?;
    let outcome = parse(&response);
    if let Some(error) = &outcome.parse_error {
        eprintln!("[apply] warning: {error}");
    }

    let workspace_files: Vec<ProjectFile> = Vec::new();
    let project_files: Vec<ProjectFile> = collect_project_files(project_root);

    let scope = ResolutionScope {
        project_root,
        workspace_files: &workspace_files,
        project_files: &project_files,
    };
    let io = RealFileIo;
    let input = ApplyInput {
        scope,
        analyzer: None,
        io: &io,
    };

    let report = apply(&input, &outcome.blocks);
    for succeeded in &report.succeeded_blocks {
        println!("[apply] applied {:?} to {}", succeeded.operation_kind, succeeded.file.rel_path_str());
    }
    for failed in &report.failed_blocks {
        let filename = failed.raw_filename.as_deref().unwrap_or("<unknown>");
        println!("[apply] failed {filename}: {:?} ({})", failed.reason, failed.commentary);
    }

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} block(s) failed to apply", report.failed_blocks.len())
    }
}

fn collect_project_files(project_root: &Path) -> Vec<ProjectFile> {
    let mut files = Vec::new();
    collect_project_files_into(project_root, project_root, &mut files);
    files
}

fn collect_project_files_into(project_root: &Path, dir: &Path, out: &mut Vec<ProjectFile>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name == ".git" || name == ".brokk" {
            continue;
        }
        if path.is_dir() {
            collect_project_files_into(project_root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(project_root) {
            out.push(ProjectFile::new(project_root, rel));
        }
    }
}

fn run_session(action: SessionAction) -> anyhow::Result<()> {
    match action {
        SessionAction::New { project_root, name } => {
            let manager = SessionManager::open(&project_root)?;
            let info = manager.new_session(name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        SessionAction::List { project_root } => {
            let manager = SessionManager::open(&project_root)?;
            let sessions = manager.list_sessions();
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        SessionAction::Rename { project_root, id, name } => {
            let manager = SessionManager::open(&project_root)?;
            let info = manager.rename_session(id, name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        SessionAction::Delete { project_root, id } => {
            let manager = SessionManager::open(&project_root)?;
            manager.delete_session(id)?;
            println!("[session] deleted {id}");
        }
        SessionAction::Copy { project_root, id, new_name } => {
            let manager = SessionManager::open(&project_root)?;
            let info = manager.copy_session(id, new_name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}
