//! Session Manager — persists [`ContextHistory`] snapshots as
//! self-contained zip archives under `<project>/.brokk/sessions/`, with
//! an in-memory [`SessionInfo`] cache and a per-session background save
//! executor.
//!
//! On-disk layout:
//! ```text
//! <project>/.brokk/sessions/<uuid>.zip        — session archive
//! <project>/.brokk/sessions/<uuid>.tombstone  — local-deletion marker
//! <project>/.brokk/sessions/unreadable/<uuid>.zip — quarantined corrupt archives
//! ```
//!
//! Grounded on the teacher's atomic-write discipline (temp file, then
//! rename) and the per-session-id save serialization called for in the
//! component design: each session id gets its own worker thread reading
//! off an `mpsc` channel, so a later save for the same session queues
//! behind (and observes) the earlier one completing first; the worker
//! exits after a short idle period and is respawned lazily.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use brokk_core::context::{Context, ContextHistory};
use brokk_core::fragment::TaskListItem;
use brokk_core::session::SessionInfo;

const MANIFEST_ENTRY: &str = "manifest.json";
const HISTORY_ENTRY: &str = "history.json";
const LEGACY_TASKLIST_ENTRY: &str = "tasklist.json";
const SAVE_WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error for session {id}: {source}")]
    Zip {
        id: Uuid,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("json error for session {id}: {source}")]
    Json {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("session not found: {id}")]
    NotFound { id: Uuid },
    #[error("session archive is corrupt and was quarantined: {id}")]
    Corrupt { id: Uuid },
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct SaveJob {
    history: ContextHistory,
    result_tx: mpsc::Sender<Result<SessionInfo, SessionError>>,
}

struct SaveWorker {
    sender: mpsc::Sender<SaveJob>,
    handle: JoinHandle<()>,
}

struct Inner {
    sessions_dir: PathBuf,
    cache: Mutex<HashMap<Uuid, SessionInfo>>,
}

pub struct SessionManager {
    inner: Arc<Inner>,
    save_workers: Mutex<HashMap<Uuid, SaveWorker>>,
}

impl SessionManager {
    /// Opens (creating if necessary) the sessions directory under
    /// `project_root` and populates the in-memory cache from whatever
    /// manifests are readable on disk. Corrupt archives are quarantined
    /// into `unreadable/` rather than failing the open.
    pub fn open(project_root: &Path) -> Result<Self, SessionError> {
        let sessions_dir = project_root.join(".brokk").join("sessions");
        fs::create_dir_all(&sessions_dir).map_err(|source| SessionError::Io {
            path: sessions_dir.clone(),
            source,
        })?;
        fs::create_dir_all(sessions_dir.join("unreadable")).map_err(|source| SessionError::Io {
            path: sessions_dir.clone(),
            source,
        })?;

        let manager = Self {
            inner: Arc::new(Inner {
                sessions_dir,
                cache: Mutex::new(HashMap::new()),
            }),
            save_workers: Mutex::new(HashMap::new()),
        };
        manager.rebuild_cache()?;
        Ok(manager)
    }

    fn rebuild_cache(&self) -> Result<(), SessionError> {
        let entries = fs::read_dir(&self.inner.sessions_dir).map_err(|source| SessionError::Io {
            path: self.inner.sessions_dir.clone(),
            source,
        })?;

        let mut cache = self.inner.cache.lock().unwrap();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            match read_manifest(&path, id) {
                Ok(info) => {
                    cache.insert(id, info);
                }
                Err(_) => {
                    quarantine(&self.inner.sessions_dir, &path, id);
                }
            }
        }
        Ok(())
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.inner.sessions_dir
    }

    pub fn session_history_path(&self, id: Uuid) -> PathBuf {
        self.inner.sessions_dir.join(format!("{id}.zip"))
    }

    fn tombstone_path(&self, id: Uuid) -> PathBuf {
        self.inner.sessions_dir.join(format!("{id}.tombstone"))
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.inner.cache.lock().unwrap().values().cloned().collect()
    }

    pub fn get_session(&self, id: Uuid) -> Option<SessionInfo> {
        self.inner.cache.lock().unwrap().get(&id).cloned()
    }

    pub fn new_session(&self, name: impl Into<String>) -> Result<SessionInfo, SessionError> {
        let id = Uuid::new_v4();
        let created = now_ms();
        let info = SessionInfo {
            id,
            ..SessionInfo::new(name, created)
        };
        let mut seeded = ContextHistory::new();
        seeded.push(Context::empty("New session"));

        write_archive_atomic(&self.inner.sessions_dir, id, &info, &seeded)?;
        self.inner.cache.lock().unwrap().insert(id, info.clone());
        Ok(info)
    }

    /// Installs a full session (manifest + history) exactly as handed
    /// in, preserving its `ai_response_count` rather than recomputing
    /// it. Used by the synchronizer to materialize a downloaded remote
    /// session under its own id.
    pub fn install_session(&self, info: SessionInfo, history: &ContextHistory) -> Result<(), SessionError> {
        write_archive_atomic(&self.inner.sessions_dir, info.id, &info, history)?;
        self.inner.cache.lock().unwrap().insert(info.id, info);
        Ok(())
    }

    pub fn rename_session(&self, id: Uuid, name: impl Into<String>) -> Result<SessionInfo, SessionError> {
        let (old_info, history) = self.read_archive(id)?;
        let renamed = old_info.renamed(name, now_ms());
        write_archive_atomic(&self.inner.sessions_dir, id, &renamed, &history)?;
        self.inner.cache.lock().unwrap().insert(id, renamed.clone());
        Ok(renamed)
    }

    pub fn delete_session(&self, id: Uuid) -> Result<(), SessionError> {
        let path = self.session_history_path(id);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;
        }
        let tombstone = self.tombstone_path(id);
        fs::write(&tombstone, b"").map_err(|source| SessionError::Io {
            path: tombstone,
            source,
        })?;
        self.inner.cache.lock().unwrap().remove(&id);
        Ok(())
    }

    /// Removes the tombstone once its deletion has been propagated
    /// remotely.
    pub fn clear_tombstone(&self, id: Uuid) -> Result<(), SessionError> {
        let tombstone = self.tombstone_path(id);
        if tombstone.exists() {
            fs::remove_file(&tombstone).map_err(|source| SessionError::Io {
                path: tombstone,
                source,
            })?;
        }
        Ok(())
    }

    pub fn tombstones(&self) -> std::collections::HashSet<Uuid> {
        let Ok(entries) = fs::read_dir(&self.inner.sessions_dir) else {
            return std::collections::HashSet::new();
        };
        entries
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|e| e.to_str()) != Some("tombstone") {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .collect()
    }

    /// Deep copy of `src_id`'s archive under a new id/name, preserving
    /// the source's `ai_response_count` rather than recomputing it.
    pub fn copy_session(&self, src_id: Uuid, new_name: impl Into<String>) -> Result<SessionInfo, SessionError> {
        let (src_info, history) = self.read_archive(src_id)?;
        let new_id = Uuid::new_v4();
        let created = now_ms();
        let copy_info = SessionInfo {
            id: new_id,
            name: new_name.into(),
            created_ms: created,
            modified_ms: created,
            ai_response_count: src_info.ai_response_count,
        };
        write_archive_atomic(&self.inner.sessions_dir, new_id, &copy_info, &history)?;
        self.inner.cache.lock().unwrap().insert(new_id, copy_info.clone());
        Ok(copy_info)
    }

    pub fn load_history(&self, id: Uuid) -> Result<ContextHistory, SessionError> {
        let (_, history) = self.read_archive(id)?;
        Ok(history)
    }

    /// Low-level synchronous read, shared by every operation that needs
    /// the full archive.
    fn read_archive(&self, id: Uuid) -> Result<(SessionInfo, ContextHistory), SessionError> {
        let path = self.session_history_path(id);
        match read_archive_from(&path, id) {
            Ok(pair) => Ok(pair),
            Err(err) => {
                quarantine(&self.inner.sessions_dir, &path, id);
                self.inner.cache.lock().unwrap().remove(&id);
                let _ = err;
                Err(SessionError::Corrupt { id })
            }
        }
    }

    /// Queues a save on the per-session background worker, blocking
    /// until it completes. A second call for the same session issued
    /// while the first is still running queues behind it on the same
    /// worker and observes its result before starting.
    pub fn save_history(&self, history: &ContextHistory, id: Uuid) -> Result<SessionInfo, SessionError> {
        if self.get_session(id).is_none() {
            return Err(SessionError::NotFound { id });
        }
        let sender = self.save_worker_sender(id);
        let (result_tx, result_rx) = mpsc::channel();
        sender
            .send(SaveJob {
                history: history.clone(),
                result_tx,
            })
            .map_err(|_| SessionError::NotFound { id })?;
        result_rx.recv().map_err(|_| SessionError::NotFound { id })?
    }

    fn save_worker_sender(&self, id: Uuid) -> mpsc::Sender<SaveJob> {
        let mut workers = self.save_workers.lock().unwrap();
        if let Some(existing) = workers.get(&id) {
            if !existing.handle.is_finished() {
                return existing.sender.clone();
            }
        }

        let (tx, rx) = mpsc::channel::<SaveJob>();
        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(SAVE_WORKER_IDLE_TIMEOUT) {
                Ok(job) => {
                    let result = perform_save(&inner, id, job.history);
                    let _ = job.result_tx.send(result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        });
        workers.insert(id, SaveWorker { sender: tx.clone(), handle });
        tx
    }
}

fn perform_save(inner: &Inner, id: Uuid, history: ContextHistory) -> Result<SessionInfo, SessionError> {
    let existing = inner
        .cache
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or(SessionError::NotFound { id })?;

    let count = compute_ai_response_count(&history);
    let updated = existing.touched(now_ms()).with_ai_response_count(count);

    write_archive_atomic(&inner.sessions_dir, id, &updated, &history)?;
    inner.cache.lock().unwrap().insert(id, updated.clone());
    Ok(updated)
}

/// The number of task-history entries in the final snapshot whose log
/// is present and non-empty (or whose log has since been compressed
/// away, leaving only a summary) — every one of those originated from a
/// single parsed LLM response.
pub fn compute_ai_response_count(history: &ContextHistory) -> i64 {
    history
        .current()
        .map(|ctx| {
            ctx.task_history
                .iter()
                .filter(|entry| match &entry.log {
                    Some(log) => !log.is_empty(),
                    None => entry.is_compressed(),
                })
                .count() as i64
        })
        .unwrap_or(0)
}

fn read_manifest(path: &Path, id: Uuid) -> Result<SessionInfo, SessionError> {
    let file = File::open(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| SessionError::Zip { id, source })?;
    let mut manifest_file = archive
        .by_name(MANIFEST_ENTRY)
        .map_err(|source| SessionError::Zip { id, source })?;
    let mut contents = String::new();
    manifest_file
        .read_to_string(&mut contents)
        .map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&contents).map_err(|source| SessionError::Json { id, source })
}

fn read_archive_from(path: &Path, id: Uuid) -> Result<(SessionInfo, ContextHistory), SessionError> {
    let file = File::open(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| SessionError::Zip { id, source })?;

    let info: SessionInfo = {
        let mut manifest_file = archive
            .by_name(MANIFEST_ENTRY)
            .map_err(|source| SessionError::Zip { id, source })?;
        let mut contents = String::new();
        manifest_file
            .read_to_string(&mut contents)
            .map_err(|source| SessionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| SessionError::Json { id, source })?
    };

    let mut history: ContextHistory = match archive.by_name(HISTORY_ENTRY) {
        Ok(mut history_file) => {
            let mut contents = String::new();
            history_file
                .read_to_string(&mut contents)
                .map_err(|source| SessionError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            serde_json::from_str(&contents).map_err(|source| SessionError::Json { id, source })?
        }
        Err(_) => {
            let mut h = ContextHistory::new();
            h.push(Context::empty("New session"));
            h
        }
    };

    // Legacy migration: a `tasklist.json` entry predates the Task-List
    // StringFragment and must be folded into the latest snapshot on load.
    if let Ok(mut legacy_file) = archive.by_name(LEGACY_TASKLIST_ENTRY) {
        let mut contents = String::new();
        if legacy_file.read_to_string(&mut contents).is_ok() {
            if let Ok(items) = serde_json::from_str::<Vec<TaskListItem>>(&contents) {
                if let Some(current) = history.current() {
                    if current.task_list_fragment().is_none() {
                        let parent = history.current_index().unwrap_or(0);
                        let migrated = current.with_task_list_data(parent, &items, "Task list migrated");
                        history.replace_current(migrated);
                    }
                }
            }
        }
    }

    Ok((info, history))
}

fn write_archive_atomic(
    sessions_dir: &Path,
    id: Uuid,
    info: &SessionInfo,
    history: &ContextHistory,
) -> Result<(), SessionError> {
    let final_path = sessions_dir.join(format!("{id}.zip"));
    let temp_path = sessions_dir.join(format!("{id}.zip.tmp"));

    {
        let file = File::create(&temp_path).map_err(|source| SessionError::Io {
            path: temp_path.clone(),
            source,
        })?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        writer
            .start_file(MANIFEST_ENTRY, options)
            .map_err(|source| SessionError::Zip { id, source })?;
        let manifest_json = serde_json::to_string_pretty(info).map_err(|source| SessionError::Json { id, source })?;
        writer
            .write_all(manifest_json.as_bytes())
            .map_err(|source| SessionError::Io {
                path: temp_path.clone(),
                source,
            })?;

        writer
            .start_file(HISTORY_ENTRY, options)
            .map_err(|source| SessionError::Zip { id, source })?;
        let history_json = serde_json::to_string(history).map_err(|source| SessionError::Json { id, source })?;
        writer
            .write_all(history_json.as_bytes())
            .map_err(|source| SessionError::Io {
                path: temp_path.clone(),
                source,
            })?;

        writer.finish().map_err(|source| SessionError::Zip { id, source })?;
    }

    fs::rename(&temp_path, &final_path).map_err(|source| SessionError::Io {
        path: final_path,
        source,
    })
}

fn quarantine(sessions_dir: &Path, path: &Path, id: Uuid) {
    let dest = sessions_dir.join("unreadable").join(format!("{id}.zip"));
    let _ = fs::create_dir_all(sessions_dir.join("unreadable"));
    let _ = fs::rename(path, dest);
}
