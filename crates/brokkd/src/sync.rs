//! Session Synchronizer — a Plan/Execute protocol reconciling the local
//! `.brokk/sessions/` directory against a remote session store.
//!
//! Split into a pure planner (inputs -> ordered [`SyncAction`]s, no I/O)
//! and an executor that re-checks local state immediately before each
//! action runs, so a local edit that races the sync is skipped rather
//! than clobbered. Grounded on the teacher's plan/apply split in
//! `scheduler.rs`, which separates `SchedulePlan` computation from the
//! side-effecting apply step for the same reason: a plan computed
//! against a snapshot can go stale before it executes.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use brokk_core::context::ContextHistory;
use brokk_core::session::SessionInfo;

use crate::session_manager::{SessionError, SessionManager};

/// What the planner knows about a session on the remote side. Supplied
/// by whatever transport backs [`RemoteSessionStore::list_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSessionMeta {
    pub id: Uuid,
    pub modified_ms: i64,
    /// Set when the remote has recorded this session as deleted; its
    /// value is the deletion timestamp, unused by the planner beyond
    /// presence but kept for executor-side bookkeeping.
    pub deleted_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Download {
        id: Uuid,
        local_info: Option<SessionInfo>,
        remote_meta: RemoteSessionMeta,
    },
    Upload {
        id: Uuid,
        local_info: SessionInfo,
    },
    DeleteRemote {
        id: Uuid,
    },
    DeleteLocal {
        id: Uuid,
        local_info: SessionInfo,
    },
}

impl SyncAction {
    pub fn id(&self) -> Uuid {
        match self {
            SyncAction::Download { id, .. }
            | SyncAction::Upload { id, .. }
            | SyncAction::DeleteRemote { id, .. }
            | SyncAction::DeleteLocal { id, .. } => *id,
        }
    }

    /// The local manifest this action was planned against, if any —
    /// the executor rechecks the live cache against this before acting.
    pub fn planned_local_info(&self) -> Option<&SessionInfo> {
        match self {
            SyncAction::Download { local_info, .. } => local_info.as_ref(),
            SyncAction::Upload { local_info, .. } => Some(local_info),
            SyncAction::DeleteRemote { .. } => None,
            SyncAction::DeleteLocal { local_info, .. } => Some(local_info),
        }
    }
}

/// Computes the ordered action list. Pure — no I/O, no clock reads
/// (callers pass in whatever `local_sessions`/`remote_sessions`
/// snapshot they already gathered).
pub fn plan(
    local_sessions: &HashMap<Uuid, SessionInfo>,
    remote_sessions: &[RemoteSessionMeta],
    tombstones: &HashSet<Uuid>,
    unreadable: &HashSet<Uuid>,
) -> Vec<SyncAction> {
    let mut actions = Vec::new();
    let remote_by_id: HashMap<Uuid, &RemoteSessionMeta> = remote_sessions.iter().map(|r| (r.id, r)).collect();

    for id in tombstones {
        actions.push(SyncAction::DeleteRemote { id: *id });
    }

    for remote in remote_sessions {
        if remote.deleted_ms.is_some() {
            if let Some(local_info) = local_sessions.get(&remote.id) {
                actions.push(SyncAction::DeleteLocal {
                    id: remote.id,
                    local_info: local_info.clone(),
                });
            }
        }
    }

    let mut downloads: Vec<SyncAction> = remote_sessions
        .iter()
        .filter(|remote| remote.deleted_ms.is_none())
        .filter(|remote| !tombstones.contains(&remote.id) && !unreadable.contains(&remote.id))
        .filter_map(|remote| {
            let local_info = local_sessions.get(&remote.id);
            let is_newer = match local_info {
                Some(info) => remote.modified_ms > info.modified_ms,
                None => true,
            };
            is_newer.then(|| SyncAction::Download {
                id: remote.id,
                local_info: local_info.cloned(),
                remote_meta: remote.clone(),
            })
        })
        .collect();
    downloads.sort_by(|a, b| {
        let modified = |action: &SyncAction| match action {
            SyncAction::Download { remote_meta, .. } => remote_meta.modified_ms,
            _ => 0,
        };
        modified(b).cmp(&modified(a))
    });
    actions.extend(downloads);

    for (id, info) in local_sessions {
        if tombstones.contains(id) || remote_by_id.contains_key(id) {
            continue;
        }
        actions.push(SyncAction::Upload {
            id: *id,
            local_info: info.clone(),
        });
    }

    actions
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote error for session {id}: {message}")]
    Remote { id: Uuid, message: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The remote transport the executor drives. Implementations own
/// whatever network or filesystem protocol backs the remote store.
pub trait RemoteSessionStore: Send + Sync {
    fn list_remote(&self) -> Result<Vec<RemoteSessionMeta>, SyncError>;
    fn download(&self, id: Uuid) -> Result<(SessionInfo, ContextHistory), SyncError>;
    fn upload(&self, id: Uuid, info: &SessionInfo, history: &ContextHistory) -> Result<(), SyncError>;
    fn delete_remote(&self, id: Uuid) -> Result<(), SyncError>;
}

/// Callbacks into whatever owns the live UI/session state, so the
/// executor can react to a session changing out from under an open
/// view without depending on the Context Manager directly.
pub trait SyncHost: Send + Sync {
    fn is_open(&self, id: Uuid) -> bool;
    fn reload_session(&self, id: Uuid);
    fn open_replacement_session(&self, deleted_id: Uuid);
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub succeeded: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
    pub failed: HashMap<Uuid, SyncError>,
}

/// Runs a previously computed plan. Rechecks each action's planned
/// local manifest against the live cache immediately before acting;
/// a mismatch means a local edit raced the sync, and the action is
/// skipped rather than applied against stale assumptions.
pub fn execute(
    actions: Vec<SyncAction>,
    sessions: &SessionManager,
    remote: &dyn RemoteSessionStore,
    host: &dyn SyncHost,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();

    for action in actions {
        let id = action.id();
        if let Some(planned) = action.planned_local_info() {
            let current = sessions.get_session(id);
            let raced = match &current {
                Some(live) => live.modified_ms != planned.modified_ms,
                None => true,
            };
            if raced {
                outcome.skipped.push(id);
                continue;
            }
        }

        let is_download = matches!(action, SyncAction::Download { .. });
        let result = match action {
            SyncAction::Download { id, .. } => execute_download(id, sessions, remote),
            SyncAction::Upload { id, local_info } => execute_upload(id, &local_info, sessions, remote),
            SyncAction::DeleteRemote { id } => execute_delete_remote(id, sessions, remote),
            SyncAction::DeleteLocal { id, .. } => execute_delete_local(id, sessions, host),
        };

        match result {
            Ok(()) => {
                if is_download && host.is_open(id) {
                    host.reload_session(id);
                }
                outcome.succeeded.push(id);
            }
            Err(err) => {
                outcome.failed.insert(id, err);
            }
        }
    }

    outcome
}

fn execute_download(id: Uuid, sessions: &SessionManager, remote: &dyn RemoteSessionStore) -> Result<(), SyncError> {
    let (info, history) = remote.download(id)?;
    sessions.install_session(info, &history)?;
    Ok(())
}

fn execute_upload(
    id: Uuid,
    local_info: &SessionInfo,
    sessions: &SessionManager,
    remote: &dyn RemoteSessionStore,
) -> Result<(), SyncError> {
    let history = sessions.load_history(id)?;
    remote.upload(id, local_info, &history)
}

fn execute_delete_remote(id: Uuid, sessions: &SessionManager, remote: &dyn RemoteSessionStore) -> Result<(), SyncError> {
    remote.delete_remote(id)?;
    sessions.clear_tombstone(id)?;
    Ok(())
}

fn execute_delete_local(id: Uuid, sessions: &SessionManager, host: &dyn SyncHost) -> Result<(), SyncError> {
    let was_open = host.is_open(id);
    sessions.delete_session(id)?;
    if was_open {
        host.open_replacement_session(id);
    }
    Ok(())
}
