//! Fragment variants and task-history entries that make up a [`crate::context::Context`]
//! snapshot.
//!
//! Modeled as a tagged variant with an explicit discriminator rather than
//! an inheritance hierarchy, per the re-architecture strategy for
//! "Inheritance hierarchies for fragments" — pattern-match on the
//! variant, never on dynamic dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::analyzer::CodeUnit;
use crate::project_file::ProjectFile;

static FRAGMENT_ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Allocates the next globally unique fragment id.
pub fn next_fragment_id() -> u64 {
    FRAGMENT_ID_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// Testing hook: raises the floor of subsequently allocated ids so test
/// suites can reset to a known baseline between runs, per
/// "Global fragment id counter with test reset" in the design notes.
pub fn set_minimum_fragment_id(minimum: u64) {
    let mut current = FRAGMENT_ID_SEQUENCE.load(Ordering::SeqCst);
    while current < minimum {
        match FRAGMENT_ID_SEQUENCE.compare_exchange(
            current,
            minimum,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    FileSkeletons,
    CodeUnitSkeleton,
}

/// Distinguishes rendering treatment for `StringFragment`s; the Task
/// List fragment is the only consumer that needs a distinguished style
/// today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxStyle {
    PlainText,
    Markdown,
    TaskList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One chat message, as carried inside a [`TaskFragment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A bag of chat messages kept for persistence (e.g. the raw
/// conversation log behind a task entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFragment {
    pub messages: Vec<ConversationMessage>,
    pub description: String,
}

impl TaskFragment {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Fragment discriminator and payload. Tagged with `type` on the wire so
/// session archives remain self-describing across format additions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Fragment {
    ProjectPath {
        id: u64,
        file: ProjectFile,
    },
    Summary {
        id: u64,
        target_identifier: String,
        summary_type: SummaryType,
        text: String,
    },
    Code {
        id: u64,
        code_units: Vec<CodeUnit>,
    },
    Usage {
        id: u64,
        target_identifier: String,
        include_test_files: bool,
        text: String,
    },
    CallGraph {
        id: u64,
        method_name: String,
        depth: u32,
        is_callee_graph: bool,
        text: String,
    },
    String {
        id: u64,
        text: String,
        description: String,
        syntax_style: SyntaxStyle,
    },
    Task {
        id: u64,
        task: TaskFragment,
    },
}

impl Fragment {
    pub fn id(&self) -> u64 {
        match self {
            Fragment::ProjectPath { id, .. }
            | Fragment::Summary { id, .. }
            | Fragment::Code { id, .. }
            | Fragment::Usage { id, .. }
            | Fragment::CallGraph { id, .. }
            | Fragment::String { id, .. }
            | Fragment::Task { id, .. } => *id,
        }
    }

    pub fn project_path(file: ProjectFile) -> Self {
        Fragment::ProjectPath {
            id: next_fragment_id(),
            file,
        }
    }

    pub fn string(text: impl Into<String>, description: impl Into<String>, syntax_style: SyntaxStyle) -> Self {
        Fragment::String {
            id: next_fragment_id(),
            text: text.into(),
            description: description.into(),
            syntax_style,
        }
    }

    pub fn task(task: TaskFragment) -> Self {
        Fragment::Task {
            id: next_fragment_id(),
            task,
        }
    }

    /// Is this the distinguished Task List string fragment?
    pub fn is_task_list(&self) -> bool {
        matches!(
            self,
            Fragment::String {
                syntax_style: SyntaxStyle::TaskList,
                ..
            }
        )
    }
}

/// One item in a Task List fragment's decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListItem {
    pub text: String,
    pub done: bool,
}

/// Arbitrary bookkeeping attached to a task entry (model used, token
/// counts, etc.) — opaque to the context model itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub model: Option<String>,
    pub tokens: Option<u64>,
}

/// One entry in a context's task history.
///
/// `is_compressed` iff `summary` is set; `has_log` iff `log` is set. Both
/// may be true — a summarized task whose original log is still retained.
/// Transitions only ever move `LogOnly -> Both -> SummaryOnly`: once a
/// summary lands it is never un-set without a new entry, and a caller
/// that drops the log also keeps the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub sequence: u64,
    pub log: Option<TaskFragment>,
    pub summary: Option<String>,
    pub meta: Option<TaskMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEntryState {
    LogOnly,
    Both,
    SummaryOnly,
}

impl TaskEntry {
    pub fn new(sequence: u64, log: TaskFragment, meta: Option<TaskMeta>) -> Self {
        Self {
            sequence,
            log: Some(log),
            summary: None,
            meta,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.summary.is_some()
    }

    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }

    pub fn state(&self) -> TaskEntryState {
        match (self.log.is_some(), self.summary.is_some()) {
            (true, false) => TaskEntryState::LogOnly,
            (true, true) => TaskEntryState::Both,
            (false, true) => TaskEntryState::SummaryOnly,
            (false, false) => TaskEntryState::LogOnly,
        }
    }

    /// Attaches a summary without discarding the log (`LogOnly -> Both`).
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Drops the retained log once a summary exists (`Both -> SummaryOnly`).
    pub fn without_log(mut self) -> Self {
        self.log = None;
        self
    }

    /// The text a model-facing prompt should use: the summary if
    /// present, else the log's messages concatenated.
    pub fn render_for_model(&self) -> String {
        if let Some(summary) = &self.summary {
            summary.clone()
        } else if let Some(log) = &self.log {
            log.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            String::new()
        }
    }

    /// The text a user-facing rendering should use: the log if present,
    /// else the summary.
    pub fn render_for_user(&self) -> String {
        if let Some(log) = &self.log {
            log.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else if let Some(summary) = &self.summary {
            summary.clone()
        } else {
            String::new()
        }
    }
}
