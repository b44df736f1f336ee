//! Change Classifier — separates git-metadata churn from tracked-file
//! edits inside one delivered [`EventBatch`], intersecting it against the
//! workspace's tracked-file set.
//!
//! Grounded on the teacher's porcelain-status classification in
//! `brokk-git::tracked` (turning raw git output into typed buckets); this
//! module does the analogous job for watcher batches, with no git
//! process spawned — a batch only needs the caller-supplied
//! `tracked_files` set and its own paths.

use std::collections::HashSet;

use brokk_core::project_file::ProjectFile;

use crate::service::EventBatch;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub git_metadata_changed: bool,
    pub tracked_files_changed: bool,
    pub changed_tracked_files: HashSet<ProjectFile>,
    pub is_significant: bool,
}

/// True for any relative path rooted at `.git/` — `.github/...` must
/// never match (it lacks the trailing slash after `git`), and a bare
/// `.gitignore` at the project root must never match either.
pub fn is_git_metadata_rel_path(rel_path: &str) -> bool {
    rel_path.starts_with(".git/")
}

pub fn classify(batch: &EventBatch, tracked_files: &HashSet<ProjectFile>) -> Classification {
    let git_metadata_changed = batch
        .changed_files
        .iter()
        .any(|f| is_git_metadata_rel_path(f.rel_path_str()));

    let changed_tracked_files: HashSet<ProjectFile> = batch
        .changed_files
        .intersection(tracked_files)
        .cloned()
        .collect();

    Classification {
        git_metadata_changed,
        tracked_files_changed: !changed_tracked_files.is_empty(),
        changed_tracked_files,
        is_significant: !batch.changed_files.is_empty() || batch.is_overflowed,
    }
}

/// Files in `batch` whose name ends with one of `exts` (given without a
/// leading dot, e.g. `"rs"`).
pub fn files_with_extensions(batch: &EventBatch, exts: &[&str]) -> HashSet<ProjectFile> {
    batch
        .changed_files
        .iter()
        .filter(|f| {
            let name = f.get_file_name();
            exts.iter().any(|ext| {
                name.rsplit_once('.')
                    .map(|(_, got)| got.eq_ignore_ascii_case(ext))
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect()
}

/// Files in `batch` whose relative path lies under `dir` (a
/// project-root-relative directory, without a trailing slash).
pub fn files_in_directory(batch: &EventBatch, dir: &str) -> HashSet<ProjectFile> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    batch
        .changed_files
        .iter()
        .filter(|f| f.rel_path_str().starts_with(&prefix))
        .cloned()
        .collect()
}

pub fn contains_any(batch: &EventBatch, set: &HashSet<ProjectFile>) -> bool {
    batch.changed_files.iter().any(|f| set.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn pf(rel: &str) -> ProjectFile {
        ProjectFile::new(Path::new("/proj"), rel)
    }

    fn batch(files: &[&str], overflowed: bool) -> EventBatch {
        EventBatch {
            changed_files: files.iter().map(|f| pf(f)).collect(),
            is_overflowed: overflowed,
            untracked_gitignore_changed: false,
        }
    }

    #[test]
    fn git_dir_paths_classify_as_metadata() {
        let b = batch(&[".git/HEAD", ".git/refs/heads/main"], false);
        let c = classify(&b, &HashSet::new());
        assert!(c.git_metadata_changed);
    }

    #[test]
    fn github_directory_is_never_git_metadata() {
        let b = batch(&[".github/workflows/ci.yml"], false);
        let c = classify(&b, &HashSet::new());
        assert!(!c.git_metadata_changed);
    }

    #[test]
    fn root_gitignore_is_never_git_metadata() {
        let b = batch(&[".gitignore"], false);
        let c = classify(&b, &HashSet::new());
        assert!(!c.git_metadata_changed);
    }

    #[test]
    fn tracked_intersection_is_reported() {
        let tracked: HashSet<ProjectFile> = [pf("src/lib.rs")].into_iter().collect();
        let b = batch(&["src/lib.rs", "README.md"], false);
        let c = classify(&b, &tracked);
        assert!(c.tracked_files_changed);
        assert_eq!(c.changed_tracked_files.len(), 1);
        assert!(c.changed_tracked_files.contains(&pf("src/lib.rs")));
    }

    #[test]
    fn overflowed_empty_batch_is_still_significant() {
        let b = batch(&[], true);
        let c = classify(&b, &HashSet::new());
        assert!(c.is_significant);
    }

    #[test]
    fn empty_non_overflowed_batch_is_not_significant() {
        let b = batch(&[], false);
        let c = classify(&b, &HashSet::new());
        assert!(!c.is_significant);
    }

    #[test]
    fn files_with_extensions_matches_case_insensitively() {
        let b = batch(&["a.RS", "b.toml", "c.rs"], false);
        let rs = files_with_extensions(&b, &["rs"]);
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn files_in_directory_matches_prefix() {
        let b = batch(&["src/a.rs", "src/sub/b.rs", "tests/c.rs"], false);
        let in_src = files_in_directory(&b, "src");
        assert_eq!(in_src.len(), 2);
    }

    #[test]
    fn contains_any_checks_membership() {
        let set: HashSet<ProjectFile> = [pf("a.rs")].into_iter().collect();
        let b = batch(&["a.rs"], false);
        assert!(contains_any(&b, &set));
        let b2 = batch(&["b.rs"], false);
        assert!(!contains_any(&b2, &set));
    }
}
