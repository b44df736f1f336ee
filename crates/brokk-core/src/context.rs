//! [`Context`] — an immutable snapshot of file fragments, virtual
//! fragments, and task history, plus [`ContextHistory`], the append-only
//! log of snapshots a session accumulates.
//!
//! Every mutation is a pure transform: `Context -> Context`. Callers
//! build the next snapshot from the previous one and push it onto the
//! history rather than mutating in place, mirroring the teacher's
//! `SchedulingInput -> SchedulePlan` pure-function shape in
//! `scheduler.rs`.

use serde::{Deserialize, Serialize};

use crate::fragment::{Fragment, SyntaxStyle, TaskEntry, TaskFragment, TaskListItem};

/// One immutable point-in-time view of a workspace's working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub file_fragments: Vec<Fragment>,
    pub virtual_fragments: Vec<Fragment>,
    pub task_history: Vec<TaskEntry>,
    pub action_description: String,
    /// Index into the owning [`ContextHistory`] of the snapshot this one
    /// was derived from; `None` for the initial snapshot.
    pub parent: Option<usize>,
}

impl Context {
    pub fn empty(action_description: impl Into<String>) -> Self {
        Self {
            file_fragments: Vec::new(),
            virtual_fragments: Vec::new(),
            task_history: Vec::new(),
            action_description: action_description.into(),
            parent: None,
        }
    }

    /// All fragments, file then virtual, in display order.
    pub fn all_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.file_fragments.iter().chain(self.virtual_fragments.iter())
    }

    pub fn task_list_fragment(&self) -> Option<&Fragment> {
        self.virtual_fragments.iter().find(|f| f.is_task_list())
    }

    /// Returns the next snapshot with `fragments` appended to the file
    /// set, deduplicated by fragment id against what's already present.
    pub fn add_fragments(&self, parent_index: usize, fragments: Vec<Fragment>, action_description: impl Into<String>) -> Self {
        let mut file_fragments = self.file_fragments.clone();
        for fragment in fragments {
            if !file_fragments.iter().any(|existing| existing.id() == fragment.id()) {
                file_fragments.push(fragment);
            }
        }
        Self {
            file_fragments,
            virtual_fragments: self.virtual_fragments.clone(),
            task_history: self.task_history.clone(),
            action_description: action_description.into(),
            parent: Some(parent_index),
        }
    }

    /// Returns the next snapshot with `fragments` appended to the
    /// virtual set, deduplicated by fragment id.
    pub fn add_virtual_fragments(&self, parent_index: usize, fragments: Vec<Fragment>, action_description: impl Into<String>) -> Self {
        let mut virtual_fragments = self.virtual_fragments.clone();
        for fragment in fragments {
            if !virtual_fragments.iter().any(|existing| existing.id() == fragment.id()) {
                virtual_fragments.push(fragment);
            }
        }
        Self {
            file_fragments: self.file_fragments.clone(),
            virtual_fragments,
            task_history: self.task_history.clone(),
            action_description: action_description.into(),
            parent: Some(parent_index),
        }
    }

    /// Returns the next snapshot with a new task entry appended.
    pub fn with_task_entry(&self, parent_index: usize, entry: TaskEntry, action_description: impl Into<String>) -> Self {
        let mut task_history = self.task_history.clone();
        task_history.push(entry);
        Self {
            file_fragments: self.file_fragments.clone(),
            virtual_fragments: self.virtual_fragments.clone(),
            task_history,
            action_description: action_description.into(),
            parent: Some(parent_index),
        }
    }

    /// Returns the next snapshot with the Task List virtual fragment
    /// replaced (there is ever only one). `action_description` must
    /// contain "Task list" (case-insensitive) per the component
    /// contract; callers that don't supply one get a default that does.
    pub fn with_task_list(&self, parent_index: usize, text: impl Into<String>, action_description: impl Into<String>) -> Self {
        let mut virtual_fragments: Vec<Fragment> = self
            .virtual_fragments
            .iter()
            .filter(|f| !f.is_task_list())
            .cloned()
            .collect();
        virtual_fragments.push(Fragment::string(text, "Task List", SyntaxStyle::TaskList));
        Self {
            file_fragments: self.file_fragments.clone(),
            virtual_fragments,
            task_history: self.task_history.clone(),
            action_description: action_description.into(),
            parent: Some(parent_index),
        }
    }

    /// Decodes the Task List fragment's text as JSON, if present.
    pub fn task_list_data(&self) -> Option<Vec<TaskListItem>> {
        let fragment = self.task_list_fragment()?;
        if let Fragment::String { text, .. } = fragment {
            serde_json::from_str(text).ok()
        } else {
            None
        }
    }

    /// Sets or replaces the Task List fragment from structured items. An
    /// empty list removes the fragment entirely rather than persisting
    /// an empty one.
    pub fn with_task_list_data(
        &self,
        parent_index: usize,
        items: &[TaskListItem],
        action_description: impl Into<String>,
    ) -> Self {
        if items.is_empty() {
            let virtual_fragments: Vec<Fragment> = self
                .virtual_fragments
                .iter()
                .filter(|f| !f.is_task_list())
                .cloned()
                .collect();
            return Self {
                file_fragments: self.file_fragments.clone(),
                virtual_fragments,
                task_history: self.task_history.clone(),
                action_description: action_description.into(),
                parent: Some(parent_index),
            };
        }
        let text = serde_json::to_string(items).expect("task list items always serialize");
        self.with_task_list(parent_index, text, action_description)
    }

    /// Appends a task entry built from a freshly parsed LLM response.
    /// Counts as one AI response when the Session Manager later
    /// recomputes `ai_response_count` from the saved history.
    pub fn with_parsed_output(
        &self,
        parent_index: usize,
        task: TaskFragment,
        action_description: impl Into<String>,
    ) -> Self {
        let sequence = self.task_history.len() as u64;
        let entry = TaskEntry::new(sequence, task, None);
        self.with_task_entry(parent_index, entry, action_description)
    }
}

/// Append-only sequence of [`Context`] snapshots for one session.
///
/// Indices are stable once assigned: snapshots are only ever pushed,
/// never removed or reordered, so a `parent` index recorded on a
/// `Context` remains valid for the lifetime of the history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextHistory {
    snapshots: Vec<Context>,
}

impl ContextHistory {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn push(&mut self, context: Context) -> usize {
        self.snapshots.push(context);
        self.snapshots.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Context> {
        self.snapshots.get(index)
    }

    pub fn current(&self) -> Option<&Context> {
        self.snapshots.last()
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.snapshots.len() - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.snapshots.iter()
    }

    /// Replaces the most recent snapshot in place rather than appending
    /// a new one, for load-time migrations that fold legacy on-disk data
    /// into the current snapshot without inflating history length.
    pub fn replace_current(&mut self, context: Context) {
        match self.snapshots.last_mut() {
            Some(last) => *last = context,
            None => self.snapshots.push(context),
        }
    }
}
