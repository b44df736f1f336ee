//! [`SessionInfo`] — the metadata record stored alongside a session's
//! history inside its manifest.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used for `ai_response_count` when the count has not yet
/// been computed from the session's task history (e.g. a session
/// created but never opened).
pub const AI_RESPONSE_COUNT_UNKNOWN: i64 = -1;

/// Session metadata persisted in a session archive's `manifest.json`.
///
/// `ai_response_count` distinguishes "never computed" (`-1`) from
/// "computed and zero" (`0`): a session with no assistant responses yet
/// must round-trip as `0`, not be treated as unknown on reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub name: String,
    pub created_ms: i64,
    pub modified_ms: i64,
    #[serde(default = "default_ai_response_count")]
    pub ai_response_count: i64,
}

fn default_ai_response_count() -> i64 {
    AI_RESPONSE_COUNT_UNKNOWN
}

impl SessionInfo {
    pub fn new(name: impl Into<String>, created_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_ms,
            modified_ms: created_ms,
            ai_response_count: AI_RESPONSE_COUNT_UNKNOWN,
        }
    }

    pub fn is_response_count_known(&self) -> bool {
        self.ai_response_count >= 0
    }

    /// Returns a copy with `modified_ms` advanced and, if `created_ms`
    /// would otherwise exceed it, `created_ms` clamped down to match —
    /// the manifest invariant is `created_ms <= modified_ms` always.
    pub fn touched(&self, now_ms: i64) -> Self {
        let modified_ms = now_ms.max(self.modified_ms);
        let created_ms = self.created_ms.min(modified_ms);
        Self {
            modified_ms,
            created_ms,
            ..self.clone()
        }
    }

    pub fn with_ai_response_count(&self, count: i64) -> Self {
        Self {
            ai_response_count: count,
            ..self.clone()
        }
    }

    pub fn renamed(&self, name: impl Into<String>, now_ms: i64) -> Self {
        let renamed = Self {
            name: name.into(),
            ..self.clone()
        };
        renamed.touched(now_ms)
    }
}
