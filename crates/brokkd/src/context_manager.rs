//! Context Manager — owns the live [`Context`], coordinates self-write
//! suppression and the pending-change set against the File Watch
//! Service, and drives UI-refresh hooks.
//!
//! Grounded on the teacher's `FileWatchService` dispatch discipline
//! (`crates/brokk-watch/src/service.rs`): a `Mutex`-guarded registry
//! consumed under one lock acquisition per batch, mirroring how the
//! watcher's own `Shared` struct serializes listener dispatch. The
//! cyclic-reference problem between a context manager and its history is
//! avoided per the design notes' "unidirectional handle" strategy: this
//! struct owns the [`ContextHistory`] outright rather than holding a
//! back-reference to it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use brokk_core::context::{Context, ContextHistory};
use brokk_core::project_file::ProjectFile;
use brokk_watch::classifier::{self, Classification};
use brokk_watch::service::EventBatch;

const DEFAULT_SUPPRESSION_TTL: Duration = Duration::from_secs(2);

type Hook = Box<dyn Fn() + Send + Sync>;

/// Registers files the tool itself is about to write so the watcher's
/// next batch doesn't mistake the write for an external change.
///
/// Consumption is atomic per watcher batch: the whole registry sits
/// behind a single mutex, and `consume` both tests membership and
/// removes the entry in one lock acquisition, so two concurrent batches
/// racing on the same file can never both observe it as suppressed.
struct SuppressionRegistry {
    entries: Mutex<std::collections::HashMap<ProjectFile, Instant>>,
    ttl: Mutex<Duration>,
}

impl SuppressionRegistry {
    fn new() -> Self {
        Self {
            entries: Mutex::new(std::collections::HashMap::new()),
            ttl: Mutex::new(DEFAULT_SUPPRESSION_TTL),
        }
    }

    fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    fn register(&self, file: ProjectFile) {
        let ttl = *self.ttl.lock().unwrap();
        self.entries
            .lock()
            .unwrap()
            .insert(file, Instant::now() + ttl);
    }

    /// Removes `file` from the registry and reports whether it was still
    /// live (not yet TTL-expired) at the moment of removal. Each call
    /// consumes at most one registration.
    fn consume(&self, file: &ProjectFile) -> bool {
        match self.entries.lock().unwrap().remove(file) {
            Some(expiry) => Instant::now() < expiry,
            None => false,
        }
    }
}

/// Process-wide set of files that arrived while a build was in progress
/// and were not suppressed; drained transactionally by
/// [`ContextManager::after_each_build`].
struct PendingChangeSet {
    files: Mutex<HashSet<ProjectFile>>,
}

impl PendingChangeSet {
    fn new() -> Self {
        Self {
            files: Mutex::new(HashSet::new()),
        }
    }

    fn add_all(&self, files: impl IntoIterator<Item = ProjectFile>) {
        self.files.lock().unwrap().extend(files);
    }

    /// Poll-all: atomically empties the set and returns what was there.
    fn drain(&self) -> HashSet<ProjectFile> {
        std::mem::take(&mut *self.files.lock().unwrap())
    }
}

/// Narrow seam so tests (and the real daemon) can supply `tracked_files`
/// without the context manager depending on `brokk-git` directly.
pub trait TrackedFilesProvider: Send + Sync {
    fn tracked_files(&self) -> HashSet<ProjectFile>;
}

pub struct ContextManager {
    history: Mutex<ContextHistory>,
    suppression: SuppressionRegistry,
    pending: PendingChangeSet,
    build_in_progress: std::sync::atomic::AtomicBool,
    tracked_files: Arc<dyn TrackedFilesProvider>,
    git_refresh_hook: Mutex<Option<Hook>>,
    commit_panel_hook: Mutex<Option<Hook>>,
    workspace_refresh_hook: Mutex<Option<Hook>>,
}

impl ContextManager {
    pub fn new(initial: Context, tracked_files: Arc<dyn TrackedFilesProvider>) -> Self {
        let mut history = ContextHistory::new();
        history.push(initial);
        Self {
            history: Mutex::new(history),
            suppression: SuppressionRegistry::new(),
            pending: PendingChangeSet::new(),
            build_in_progress: std::sync::atomic::AtomicBool::new(false),
            tracked_files,
            git_refresh_hook: Mutex::new(None),
            commit_panel_hook: Mutex::new(None),
            workspace_refresh_hook: Mutex::new(None),
        }
    }

    pub fn set_git_refresh_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.git_refresh_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set_commit_panel_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.commit_panel_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set_workspace_refresh_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.workspace_refresh_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Testing seam: shortens the suppression TTL so tests don't need to
    /// sleep for the production default.
    pub fn set_suppression_ttl_for_tests(&self, ttl: Duration) {
        self.suppression.set_ttl(ttl);
    }

    /// Testing seam: replaces the live history outright.
    pub fn set_context_history_for_tests(&self, history: ContextHistory) {
        *self.history.lock().unwrap() = history;
    }

    pub fn current_context(&self) -> Context {
        self.history
            .lock()
            .unwrap()
            .current()
            .cloned()
            .expect("context history always has at least one snapshot")
    }

    /// Applies `mutator` to the current snapshot and appends the result
    /// to history, returning the new snapshot.
    pub fn push_context<F>(&self, mutator: F) -> Context
    where
        F: FnOnce(&Context, usize) -> Context,
    {
        let mut history = self.history.lock().unwrap();
        let parent_index = history.current_index().expect("history is never empty");
        let current = history.get(parent_index).unwrap();
        let next = mutator(current, parent_index);
        history.push(next.clone());
        next
    }

    pub fn context_files(&self) -> HashSet<ProjectFile> {
        self.current_context()
            .file_fragments
            .iter()
            .filter_map(|f| match f {
                brokk_core::fragment::Fragment::ProjectPath { file, .. } => Some(file.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn handle_git_metadata_change(&self) {
        if let Some(hook) = self.git_refresh_hook.lock().unwrap().as_ref() {
            hook();
        }
    }

    /// `changed_files` empty is treated the same as a non-empty
    /// intersection, for backward compatibility with callers that don't
    /// know the precise change set (e.g. an overflowed batch).
    pub fn handle_tracked_file_change(&self, changed_files: &HashSet<ProjectFile>) {
        if let Some(hook) = self.commit_panel_hook.lock().unwrap().as_ref() {
            hook();
        }

        let context_files = self.context_files();
        let intersects = changed_files.is_empty()
            || changed_files.iter().any(|f| context_files.contains(f));
        if !intersects {
            return;
        }

        if self.external_change_snapshot(changed_files).is_some() {
            if let Some(hook) = self.workspace_refresh_hook.lock().unwrap().as_ref() {
                hook();
            }
        }
    }

    /// Produces a new snapshot recording that `changed` files were
    /// edited outside the tool, or `None` if there is nothing to record.
    fn external_change_snapshot(&self, changed: &HashSet<ProjectFile>) -> Option<Context> {
        if changed.is_empty() {
            // Backward-compatible "unknown file set" case: still refresh,
            // but there is nothing specific to name in the action
            // description.
            return Some(self.push_context(|ctx, parent| Context {
                action_description: "External changes".to_string(),
                parent: Some(parent),
                ..ctx.clone()
            }));
        }
        let mut names: Vec<&str> = changed.iter().map(|f| f.rel_path_str()).collect();
        names.sort_unstable();
        Some(self.push_context(|ctx, parent| Context {
            action_description: format!("External changes: {}", names.join(", ")),
            parent: Some(parent),
            ..ctx.clone()
        }))
    }

    /// Runs `thunk` with every file in `files` registered against the
    /// suppression registry for the configured TTL, so the next watcher
    /// batch that observes one of these writes drops it instead of
    /// treating it as an external change.
    pub fn with_file_change_notifications_paused<T>(
        &self,
        files: &[ProjectFile],
        thunk: impl FnOnce() -> T,
    ) -> T {
        for file in files {
            self.suppression.register(file.clone());
        }
        thunk()
    }

    pub fn set_build_in_progress(&self, value: bool) {
        self.build_in_progress
            .store(value, std::sync::atomic::Ordering::SeqCst);
    }

    /// The watcher listener entry point: classifies the batch, removes
    /// suppressed files, and either dispatches immediately or queues the
    /// remainder in the pending-change set depending on whether a build
    /// is in flight. `untracked_gitignore_changed` bypasses suppression
    /// entirely, per the component contract.
    pub fn on_watch_batch(&self, batch: &EventBatch) {
        let tracked = self.tracked_files.tracked_files();
        let classification: Classification = classifier::classify(batch, &tracked);

        if classification.git_metadata_changed {
            self.handle_git_metadata_change();
        }

        let mut remaining: HashSet<ProjectFile> = HashSet::new();
        for file in &batch.changed_files {
            if batch.untracked_gitignore_changed {
                remaining.insert(file.clone());
                continue;
            }
            if !self.suppression.consume(file) {
                remaining.insert(file.clone());
            }
        }

        if remaining.is_empty() && !classification.is_significant {
            return;
        }

        if self.build_in_progress.load(std::sync::atomic::Ordering::SeqCst) {
            self.pending.add_all(remaining);
        } else {
            self.handle_tracked_file_change(&remaining);
        }
    }

    /// Called once a background build finishes. Drains whatever
    /// accumulated in the pending set while the build was in progress
    /// and, if that produces a new "external change" snapshot, refreshes
    /// the workspace.
    pub fn after_each_build(&self, _had_error: bool) {
        self.set_build_in_progress(false);
        let drained = self.pending.drain();
        if drained.is_empty() {
            return;
        }
        if self.external_change_snapshot(&drained).is_some() {
            if let Some(hook) = self.workspace_refresh_hook.lock().unwrap().as_ref() {
                hook();
            }
        }
    }
}
