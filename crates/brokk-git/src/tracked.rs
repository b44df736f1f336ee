//! Tracked/changed-file queries used by the Change Classifier to decide
//! whether a batch of filesystem events touched git-tracked files.
//!
//! `parse_porcelain_status`/`FileState` are carried over from the
//! teacher's change-snapshot module; the snapshot/undo/redo machinery
//! built around them was task-branch specific and had no counterpart
//! here, so it was dropped.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use brokk_core::ProjectFile;

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
    Untracked,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub state: FileState,
    pub status_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub branch: String,
    pub clean: bool,
    pub changed_files: Vec<ChangedFile>,
}

/// `git ls-files`, resolved to [`ProjectFile`]s rooted at `repo.root`.
pub fn list_tracked_files(repo: &RepoHandle, git: &GitCli) -> Result<HashSet<ProjectFile>, GitError> {
    let output = git.run(&repo.root, ["ls-files"])?;
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| ProjectFile::new(repo.root.clone(), line))
        .collect())
}

/// `git status --porcelain=v1`, parsed into [`ChangedFile`]s.
pub fn capture_status(repo: &RepoHandle, git: &GitCli, branch: String) -> Result<StatusSnapshot, GitError> {
    let output = git.run(&repo.root, ["status", "--porcelain=v1"])?;
    let changed_files = parse_porcelain_status(&output.stdout)?;
    Ok(StatusSnapshot {
        branch,
        clean: changed_files.is_empty(),
        changed_files,
    })
}

/// Whether `path` (relative to `repo.root`) is tracked by git, via
/// `git ls-files --error-unmatch`.
pub fn is_tracked(repo: &RepoHandle, git: &GitCli, rel_path: &str) -> Result<bool, GitError> {
    match git.run(&repo.root, ["ls-files", "--error-unmatch", "--", rel_path]) {
        Ok(_) => Ok(true),
        Err(GitError::CommandFailed { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

pub fn parse_porcelain_status(raw: &str) -> Result<Vec<ChangedFile>, GitError> {
    let mut files = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.len() < 4 {
            return Err(GitError::Parse {
                context: format!("invalid porcelain status line: {line}"),
            });
        }

        let code = &line[0..2];
        let path = line[3..].to_string();
        let state = file_state_from_code(code);

        files.push(ChangedFile {
            path: PathBuf::from(path),
            state,
            status_code: code.to_string(),
        });
    }

    Ok(files)
}

fn file_state_from_code(code: &str) -> FileState {
    if code == "??" {
        return FileState::Untracked;
    }
    if code.contains('A') {
        return FileState::Added;
    }
    if code.contains('M') {
        return FileState::Modified;
    }
    if code.contains('D') {
        return FileState::Deleted;
    }
    if code.contains('R') {
        return FileState::Renamed;
    }
    if code.contains('C') {
        return FileState::Copied;
    }
    if code.contains('U') {
        return FileState::Unmerged;
    }
    FileState::Unknown
}
