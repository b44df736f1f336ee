//! Path Resolver — turns the raw filename line an LLM puts above a
//! SEARCH/REPLACE block into a concrete [`ProjectFile`].
//!
//! Grounded on the teacher's `discover_repo`-style "narrow the search
//! space in stages, fail loudly the moment it's ambiguous" approach:
//! resolution runs through a fixed precedence of match strategies and
//! stops at the first one that produces an answer.

use std::path::{Component, Path};

use brokk_core::project_file::{normalize_rel_components, ProjectFile};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid filename: {reason}")]
    Invalid { reason: String },
    #[error("ambiguous filename '{raw_filename}': candidates {candidates:?}")]
    Ambiguous {
        raw_filename: String,
        candidates: Vec<String>,
    },
}

/// The two file populations the resolver searches, in precedence order:
/// files already present in the working context, then the full project
/// file set.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionScope<'a> {
    pub project_root: &'a Path,
    pub workspace_files: &'a [ProjectFile],
    pub project_files: &'a [ProjectFile],
}

/// Strips a leading `//` or `#` line-comment marker when the remainder
/// looks like a path (contains no further leading whitespace run that
/// would indicate prose).
fn strip_comment_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    for prefix in ["//", "#"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            let candidate = rest.trim();
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    trimmed
}

fn normalize_raw_filename(raw_filename: &str) -> Result<String, ResolveError> {
    if raw_filename.contains('\0') {
        return Err(ResolveError::Invalid {
            reason: "filename contains a NUL byte".to_string(),
        });
    }

    let stripped = strip_comment_prefix(raw_filename);
    let replaced = stripped.replace('\\', "/");
    let trimmed = replaced.trim_end_matches('/');
    let without_dot_prefix = trimmed
        .strip_prefix("./")
        .unwrap_or(trimmed)
        .trim_start_matches('/');

    if without_dot_prefix.trim().is_empty() {
        return Err(ResolveError::Invalid {
            reason: "filename is blank after normalization".to_string(),
        });
    }

    Ok(without_dot_prefix.to_string())
}

fn is_absolute_like(raw_filename: &str) -> bool {
    Path::new(raw_filename).is_absolute()
}

fn basename(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn contains_separator(raw: &str) -> bool {
    raw.contains('/') || raw.contains('\\')
}

/// Resolves `raw_filename` against `scope`, per the precedence in the
/// component design: exact workspace match, unique workspace basename
/// match, unique project-wide basename match, else (if `allow_new` or
/// the name is path-qualified) a fresh relative path.
pub fn resolve(
    scope: &ResolutionScope<'_>,
    raw_filename: &str,
    allow_new: bool,
) -> Result<ProjectFile, ResolveError> {
    let has_separator = contains_separator(raw_filename);

    if is_absolute_like(raw_filename) {
        let path = Path::new(raw_filename);
        if let Ok(rel) = path.strip_prefix(scope.project_root) {
            let normalized = normalize_rel_components(rel);
            return Ok(ProjectFile::new(scope.project_root, normalized));
        }
        return Err(ResolveError::Invalid {
            reason: format!("absolute path '{raw_filename}' is outside the project root"),
        });
    }

    let normalized = normalize_raw_filename(raw_filename)?;

    // 1. Exact match against the workspace context.
    if let Some(found) = scope
        .workspace_files
        .iter()
        .find(|f| f.rel_path_str() == normalized)
    {
        return Ok(found.clone());
    }

    // Slashed-path authority rule: a path-qualified name that doesn't
    // exist exactly must not fall back to a basename fuzzy-match,
    // regardless of `allow_new`.
    if has_separator {
        return Ok(ProjectFile::new(scope.project_root, normalized));
    }

    // 2. Unique basename match among workspace-context files.
    let workspace_matches: Vec<&ProjectFile> = scope
        .workspace_files
        .iter()
        .filter(|f| basename(f.rel_path_str()) == normalized.as_str())
        .collect();
    if workspace_matches.len() == 1 {
        return Ok(workspace_matches[0].clone());
    }
    if workspace_matches.len() > 1 {
        return Err(ResolveError::Ambiguous {
            raw_filename: raw_filename.to_string(),
            candidates: workspace_matches
                .iter()
                .map(|f| f.rel_path_str().to_string())
                .collect(),
        });
    }

    // 3. Unique basename match across the full project file set.
    let project_matches: Vec<&ProjectFile> = scope
        .project_files
        .iter()
        .filter(|f| basename(f.rel_path_str()) == normalized.as_str())
        .collect();
    if project_matches.len() == 1 {
        return Ok(project_matches[0].clone());
    }
    if project_matches.len() > 1 {
        return Err(ResolveError::Ambiguous {
            raw_filename: raw_filename.to_string(),
            candidates: project_matches
                .iter()
                .map(|f| f.rel_path_str().to_string())
                .collect(),
        });
    }

    // 4. No existing match anywhere: treat as new if allowed or
    // path-qualified, else a non-existent ProjectFile.
    if allow_new || has_separator {
        return Ok(ProjectFile::new(scope.project_root, normalized));
    }

    Ok(ProjectFile::new(scope.project_root, normalized))
}

/// True when `path`'s components contain no `..` escaping the project
/// root — used by callers that want to reject traversal attempts before
/// calling [`resolve`] rather than relying on normalization alone.
pub fn is_safely_relative(path: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pf(root: &Path, rel: &str) -> ProjectFile {
        ProjectFile::new(root, rel)
    }

    #[test]
    fn exact_workspace_match_wins_first() {
        let root = Path::new("/proj");
        let workspace = vec![pf(root, "src/main.rs")];
        let project = vec![pf(root, "src/main.rs"), pf(root, "tests/main.rs")];
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &workspace,
            project_files: &project,
        };
        let resolved = resolve(&scope, "src/main.rs", false).unwrap();
        assert_eq!(resolved.rel_path_str(), "src/main.rs");
    }

    #[test]
    fn unique_basename_in_workspace_resolves() {
        let root = Path::new("/proj");
        let workspace = vec![pf(root, "src/lib.rs")];
        let project = vec![];
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &workspace,
            project_files: &project,
        };
        let resolved = resolve(&scope, "lib.rs", false).unwrap();
        assert_eq!(resolved.rel_path_str(), "src/lib.rs");
    }

    #[test]
    fn ambiguous_basename_in_workspace_fails() {
        let root = Path::new("/proj");
        let workspace = vec![pf(root, "a/lib.rs"), pf(root, "b/lib.rs")];
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &workspace,
            project_files: &[],
        };
        let err = resolve(&scope, "lib.rs", false).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }));
    }

    #[test]
    fn slashed_path_authority_rule_skips_basename_fuzzing() {
        let root = Path::new("/proj");
        let workspace = vec![pf(root, "other/lib.rs")];
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &workspace,
            project_files: &[],
        };
        let resolved = resolve(&scope, "new/lib.rs", true).unwrap();
        assert_eq!(resolved.rel_path_str(), "new/lib.rs");
    }

    #[test]
    fn blank_after_comment_strip_is_invalid() {
        let root = Path::new("/proj");
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let err = resolve(&scope, "// ", false).unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { .. }));
    }

    #[test]
    fn nul_byte_is_invalid() {
        let root = Path::new("/proj");
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let err = resolve(&scope, "a\0b", false).unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { .. }));
    }

    #[test]
    fn absolute_path_outside_root_is_invalid() {
        let root = Path::new("/proj");
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let err = resolve(&scope, "/elsewhere/file.rs", false).unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { .. }));
    }

    #[test]
    fn absolute_path_inside_root_is_made_relative() {
        let root = Path::new("/proj");
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let resolved = resolve(&scope, "/proj/src/main.rs", false).unwrap();
        assert_eq!(resolved.rel_path_str(), "src/main.rs");
    }

    #[test]
    fn is_safely_relative_rejects_escaping_paths() {
        assert!(is_safely_relative(Path::new("a/b")));
        assert!(is_safely_relative(Path::new("a/../b")));
        assert!(!is_safely_relative(Path::new("../a")));
    }
}
