//! Edit-Block Applier — consumes parsed [`EditBlock`]s and mutates files
//! on disk, producing an [`ApplyReport`] that distinguishes succeeded
//! from failed blocks with a failure taxonomy attached to each failure.

use std::collections::HashMap;
use std::io;

use brokk_core::analyzer::Analyzer;
use brokk_core::edit_op::OperationKind;
use brokk_core::project_file::ProjectFile;

use crate::parser::EditBlock;
use crate::resolver::{resolve, ResolutionScope, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    FileNotFound,
    NoMatch,
    AmbiguousMatch,
    InvalidFilename,
    IoError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SucceededBlock {
    pub file: ProjectFile,
    pub operation_kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBlock {
    pub raw_filename: Option<String>,
    pub reason: FailureReason,
    pub commentary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub succeeded_blocks: Vec<SucceededBlock>,
    pub failed_blocks: Vec<FailedBlock>,
    pub original_contents: HashMap<ProjectFile, String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed_blocks.is_empty()
    }
}

/// File I/O seam so the applier can be exercised against an in-memory
/// fixture in tests without touching the real filesystem, mirroring how
/// [`Analyzer`] keeps static-analysis out of this crate.
pub trait FileIo {
    fn read(&self, file: &ProjectFile) -> io::Result<String>;
    fn write(&self, file: &ProjectFile, content: &str) -> io::Result<()>;
    fn exists(&self, file: &ProjectFile) -> bool;
}

/// Reads/writes through the real filesystem via [`ProjectFile`]'s own
/// helpers.
pub struct RealFileIo;

impl FileIo for RealFileIo {
    fn read(&self, file: &ProjectFile) -> io::Result<String> {
        file.read_string()
    }

    fn write(&self, file: &ProjectFile, content: &str) -> io::Result<()> {
        file.write_string(content)
    }

    fn exists(&self, file: &ProjectFile) -> bool {
        file.exists()
    }
}

const COMMENTARY_ALREADY_PRESENT: &str = "replacement text is already present";
const COMMENTARY_NOT_UNIFIED_DIFF: &str = "not unified diff format";

fn looks_like_unified_diff(before_text: &str) -> bool {
    before_text
        .lines()
        .any(|line| line.starts_with('-') || line.starts_with('+'))
}

/// Finds `before_text` in `haystack`, tolerating a trailing-newline
/// mismatch between the two (the parser strips the final newline from
/// multi-line SEARCH sections; files on disk may or may not end with
/// one).
fn find_text_match(haystack: &str, before_text: &str) -> Option<(usize, usize)> {
    if let Some(start) = haystack.find(before_text) {
        return Some((start, start + before_text.len()));
    }
    let trimmed = before_text.trim_end_matches('\n');
    if trimmed != before_text {
        if let Some(start) = haystack.find(trimmed) {
            return Some((start, start + trimmed.len()));
        }
    }
    None
}

fn had_trailing_newline(text: &str) -> bool {
    text.ends_with('\n')
}

fn apply_trailing_newline_rule(new_text: String, file_had_trailing_newline: bool) -> String {
    let has_one = had_trailing_newline(&new_text);
    if file_had_trailing_newline && !has_one {
        format!("{new_text}\n")
    } else if !file_had_trailing_newline && has_one {
        new_text.trim_end_matches('\n').to_string()
    } else {
        new_text
    }
}

fn conflict_markers(label: &str) -> (String, String) {
    (
        format!("<<<<<<< BRK_CONFLICT_{label}"),
        format!(">>>>>>> BRK_CONFLICT_{label}"),
    )
}

pub struct ApplyInput<'a> {
    pub scope: ResolutionScope<'a>,
    pub analyzer: Option<&'a dyn Analyzer>,
    pub io: &'a dyn FileIo,
}

/// Applies every block in order against `input`, returning a single
/// [`ApplyReport`] covering the whole batch.
pub fn apply(input: &ApplyInput<'_>, blocks: &[EditBlock]) -> ApplyReport {
    let mut report = ApplyReport::default();

    for block in blocks {
        match apply_one(input, block, &mut report.original_contents) {
            Ok(succeeded) => report.succeeded_blocks.push(succeeded),
            Err(failed) => report.failed_blocks.push(failed),
        }
    }

    report
}

fn apply_one(
    input: &ApplyInput<'_>,
    block: &EditBlock,
    original_contents: &mut HashMap<ProjectFile, String>,
) -> Result<SucceededBlock, FailedBlock> {
    let op = &block.operation;
    let raw_filename = block.raw_filename.clone();

    let raw = raw_filename.as_deref().ok_or_else(|| FailedBlock {
        raw_filename: raw_filename.clone(),
        reason: FailureReason::InvalidFilename,
        commentary: "block has no associated filename".to_string(),
    })?;

    let allow_new = op.operation_kind == OperationKind::WholeFile;
    let file = resolve(&input.scope, raw, allow_new).map_err(|err| match err {
        ResolveError::Invalid { reason } => FailedBlock {
            raw_filename: raw_filename.clone(),
            reason: FailureReason::InvalidFilename,
            commentary: reason,
        },
        ResolveError::Ambiguous { candidates, .. } => FailedBlock {
            raw_filename: raw_filename.clone(),
            reason: FailureReason::AmbiguousMatch,
            commentary: format!("ambiguous filename; candidates: {}", candidates.join(", ")),
        },
    })?;

    match op.operation_kind {
        OperationKind::WholeFile => apply_whole_file(input, &file, op, original_contents),
        OperationKind::TextSearch => apply_text_search(input, &file, op, original_contents),
        OperationKind::SymbolFunction => apply_symbol(input, &file, op, original_contents, true),
        OperationKind::SymbolClass => apply_symbol(input, &file, op, original_contents, false),
        OperationKind::ConflictRegion => apply_conflict_region(input, &file, op, original_contents),
    }
    .map(|()| SucceededBlock {
        file,
        operation_kind: op.operation_kind,
    })
}

fn record_original(
    input: &ApplyInput<'_>,
    file: &ProjectFile,
    original_contents: &mut HashMap<ProjectFile, String>,
) -> io::Result<String> {
    if let Some(existing) = original_contents.get(file) {
        return Ok(existing.clone());
    }
    let current = if input.io.exists(file) {
        input.io.read(file)?
    } else {
        String::new()
    };
    original_contents.insert(file.clone(), current.clone());
    Ok(current)
}

fn apply_whole_file(
    input: &ApplyInput<'_>,
    file: &ProjectFile,
    op: &brokk_core::edit_op::EditOperation,
    original_contents: &mut HashMap<ProjectFile, String>,
) -> Result<(), FailedBlock> {
    let existed_before = input.io.exists(file);
    let current = record_original(input, file, original_contents).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })?;

    // A brand-new file is normalized to end with a newline regardless of
    // what the LLM's REPLACE section happened to contain; an overwrite of
    // an existing file instead preserves that file's prior trailing-newline
    // presence/absence, same as every other operation kind.
    let content = if existed_before {
        apply_trailing_newline_rule(op.after_text.clone(), had_trailing_newline(&current))
    } else {
        apply_trailing_newline_rule(op.after_text.clone(), true)
    };

    input.io.write(file, &content).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })
}

fn apply_text_search(
    input: &ApplyInput<'_>,
    file: &ProjectFile,
    op: &brokk_core::edit_op::EditOperation,
    original_contents: &mut HashMap<ProjectFile, String>,
) -> Result<(), FailedBlock> {
    if !input.io.exists(file) {
        return Err(FailedBlock {
            raw_filename: op.raw_filename.clone(),
            reason: FailureReason::FileNotFound,
            commentary: format!("{} does not exist", file.rel_path_str()),
        });
    }

    let current = record_original(input, file, original_contents).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })?;

    match find_text_match(&current, &op.before_text) {
        Some((start, end)) => {
            let file_had_trailing_newline = had_trailing_newline(&current);
            let mut updated = String::with_capacity(current.len());
            updated.push_str(&current[..start]);
            updated.push_str(&op.after_text);
            updated.push_str(&current[end..]);
            let updated = apply_trailing_newline_rule(updated, file_had_trailing_newline);

            input.io.write(file, &updated).map_err(|source| FailedBlock {
                raw_filename: op.raw_filename.clone(),
                reason: FailureReason::IoError,
                commentary: source.to_string(),
            })
        }
        None => {
            let commentary = if !op.after_text.is_empty() && current.contains(&op.after_text) {
                COMMENTARY_ALREADY_PRESENT.to_string()
            } else if looks_like_unified_diff(&op.before_text) {
                COMMENTARY_NOT_UNIFIED_DIFF.to_string()
            } else {
                "search text not found".to_string()
            };
            Err(FailedBlock {
                raw_filename: op.raw_filename.clone(),
                reason: FailureReason::NoMatch,
                commentary,
            })
        }
    }
}

fn apply_symbol(
    input: &ApplyInput<'_>,
    file: &ProjectFile,
    op: &brokk_core::edit_op::EditOperation,
    original_contents: &mut HashMap<ProjectFile, String>,
    is_function: bool,
) -> Result<(), FailedBlock> {
    let symbol_name = op.symbol_name().ok_or_else(|| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::InvalidFilename,
        commentary: "symbol marker missing a qualified name".to_string(),
    })?;

    let analyzer = input.analyzer.ok_or_else(|| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::NoMatch,
        commentary: "no analyzer available to resolve symbol source".to_string(),
    })?;

    let range = if is_function {
        analyzer.method_source(symbol_name).map_err(|err| match err {
            brokk_core::analyzer::MethodLookupError::NotFound { .. } => FailedBlock {
                raw_filename: op.raw_filename.clone(),
                reason: FailureReason::NoMatch,
                commentary: err.to_string(),
            },
            brokk_core::analyzer::MethodLookupError::Ambiguous { .. } => FailedBlock {
                raw_filename: op.raw_filename.clone(),
                reason: FailureReason::AmbiguousMatch,
                commentary: err.to_string(),
            },
        })?
    } else {
        analyzer.class_source(symbol_name).map_err(|err| FailedBlock {
            raw_filename: op.raw_filename.clone(),
            reason: FailureReason::NoMatch,
            commentary: err.to_string(),
        })?
    };

    let current = record_original(input, file, original_contents).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })?;

    let file_had_trailing_newline = had_trailing_newline(&current);
    match current.find(range.text.as_str()) {
        Some(start) => {
            let end = start + range.text.len();
            let mut updated = String::with_capacity(current.len());
            updated.push_str(&current[..start]);
            updated.push_str(&op.after_text);
            updated.push_str(&current[end..]);
            let updated = apply_trailing_newline_rule(updated, file_had_trailing_newline);
            input.io.write(file, &updated).map_err(|source| FailedBlock {
                raw_filename: op.raw_filename.clone(),
                reason: FailureReason::IoError,
                commentary: source.to_string(),
            })
        }
        None => Err(FailedBlock {
            raw_filename: op.raw_filename.clone(),
            reason: FailureReason::NoMatch,
            commentary: format!("analyzer-reported source for '{symbol_name}' not found verbatim in {}", file.rel_path_str()),
        }),
    }
}

fn apply_conflict_region(
    input: &ApplyInput<'_>,
    file: &ProjectFile,
    op: &brokk_core::edit_op::EditOperation,
    original_contents: &mut HashMap<ProjectFile, String>,
) -> Result<(), FailedBlock> {
    let label = op.conflict_label().ok_or_else(|| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::InvalidFilename,
        commentary: "conflict marker missing a label".to_string(),
    })?;

    let current = record_original(input, file, original_contents).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })?;

    let (begin_marker, end_marker) = conflict_markers(label);
    let begin = current.find(&begin_marker).ok_or_else(|| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::NoMatch,
        commentary: format!("conflict region '{label}' not found in {}", file.rel_path_str()),
    })?;
    let after_begin = begin + begin_marker.len();
    let end_rel = current[after_begin..].find(&end_marker).ok_or_else(|| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::NoMatch,
        commentary: format!("conflict region '{label}' has no closing marker in {}", file.rel_path_str()),
    })?;
    let end = after_begin + end_rel + end_marker.len();

    let file_had_trailing_newline = had_trailing_newline(&current);
    let mut updated = String::with_capacity(current.len());
    updated.push_str(&current[..begin]);
    updated.push_str(&op.after_text);
    updated.push_str(&current[end..]);
    let updated = apply_trailing_newline_rule(updated, file_had_trailing_newline);

    input.io.write(file, &updated).map_err(|source| FailedBlock {
        raw_filename: op.raw_filename.clone(),
        reason: FailureReason::IoError,
        commentary: source.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    use brokk_core::edit_op::EditOperation;

    struct FakeIo {
        files: RefCell<StdHashMap<ProjectFile, String>>,
    }

    impl FakeIo {
        fn new(initial: Vec<(ProjectFile, &str)>) -> Self {
            Self {
                files: RefCell::new(initial.into_iter().map(|(f, c)| (f, c.to_string())).collect()),
            }
        }
    }

    impl FileIo for FakeIo {
        fn read(&self, file: &ProjectFile) -> io::Result<String> {
            self.files
                .borrow()
                .get(file)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }

        fn write(&self, file: &ProjectFile, content: &str) -> io::Result<()> {
            self.files.borrow_mut().insert(file.clone(), content.to_string());
            Ok(())
        }

        fn exists(&self, file: &ProjectFile) -> bool {
            self.files.borrow().contains_key(file)
        }
    }

    fn block(filename: &str, before: &str, after: &str) -> EditBlock {
        EditBlock {
            raw_filename: Some(filename.to_string()),
            operation: EditOperation::new(Some(filename.to_string()), before.to_string(), after.to_string()),
        }
    }

    #[test]
    fn text_search_replaces_matched_span() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "a.txt");
        let io = FakeIo::new(vec![(file.clone(), "hello world\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("a.txt", "world", "brokk")];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&file).unwrap(), "hello brokk\n");
        assert_eq!(report.original_contents.get(&file).unwrap(), "hello world\n");
    }

    #[test]
    fn text_search_preserves_trailing_newline_absence() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "a.txt");
        let io = FakeIo::new(vec![(file.clone(), "hello world")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("a.txt", "world", "brokk")];
        apply(&input, &blocks);
        assert_eq!(io.files.borrow().get(&file).unwrap(), "hello brokk");
    }

    #[test]
    fn no_match_reports_already_present_commentary() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "a.txt");
        let io = FakeIo::new(vec![(file.clone(), "hello brokk\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("a.txt", "world", "brokk")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks.len(), 1);
        assert_eq!(report.failed_blocks[0].commentary, COMMENTARY_ALREADY_PRESENT);
        assert_eq!(report.failed_blocks[0].reason, FailureReason::NoMatch);
    }

    #[test]
    fn no_match_reports_not_unified_diff_commentary() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "a.txt");
        let io = FakeIo::new(vec![(file.clone(), "unrelated content\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("a.txt", "-old\n+new", "new")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks[0].commentary, COMMENTARY_NOT_UNIFIED_DIFF);
    }

    #[test]
    fn whole_file_creates_new_file_and_records_empty_original() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "new.txt");
        let io = FakeIo::new(vec![]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("new.txt", brokk_core::edit_op::MARKER_ENTIRE_FILE, "brand new content\n")];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&file).unwrap(), "brand new content\n");
        assert_eq!(report.original_contents.get(&file).unwrap(), "");
    }

    #[test]
    fn whole_file_creation_normalizes_to_trailing_newline_even_without_one() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "newFile.txt");
        let io = FakeIo::new(vec![]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block(
            "newFile.txt",
            brokk_core::edit_op::MARKER_ENTIRE_FILE,
            "Created content",
        )];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&file).unwrap(), "Created content\n");
    }

    #[test]
    fn whole_file_creation_targets_slashed_path_leaving_sibling_untouched() {
        let root = std::path::Path::new("/proj");
        let existing = ProjectFile::new(root, "a/b/c/file.java");
        let target = ProjectFile::new(root, "b/c/file.java");
        let io = FakeIo::new(vec![(existing.clone(), "old\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[existing.clone()],
            project_files: &[existing.clone()],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block(
            "b/c/file.java",
            brokk_core::edit_op::MARKER_ENTIRE_FILE,
            "new",
        )];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&target).unwrap(), "new\n");
        assert_eq!(io.files.borrow().get(&existing).unwrap(), "old\n");
    }

    #[test]
    fn missing_file_for_text_search_is_file_not_found() {
        let root = std::path::Path::new("/proj");
        let io = FakeIo::new(vec![]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("missing.txt", "old", "new")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks[0].reason, FailureReason::FileNotFound);
    }

    #[test]
    fn conflict_region_replaces_labeled_span() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "c.txt");
        let contents = "before\n<<<<<<< BRK_CONFLICT_1\nours\n=======\ntheirs\n>>>>>>> BRK_CONFLICT_1\nafter\n";
        let io = FakeIo::new(vec![(file.clone(), contents)]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("c.txt", "BRK_CONFLICT_1\nanything", "resolved")];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&file).unwrap(), "before\nresolved\nafter\n");
    }

    struct FakeAnalyzer {
        method_result: Result<brokk_core::analyzer::SourceRange, brokk_core::analyzer::MethodLookupError>,
        class_result: Result<brokk_core::analyzer::SourceRange, brokk_core::analyzer::ClassNotFound>,
    }

    impl Analyzer for FakeAnalyzer {
        fn all_declarations(&self) -> Vec<brokk_core::analyzer::CodeUnit> {
            Vec::new()
        }

        fn search_symbols(&self, _query: &str) -> Vec<brokk_core::analyzer::CodeUnit> {
            Vec::new()
        }

        fn class_source(&self, _fqn: &str) -> Result<brokk_core::analyzer::SourceRange, brokk_core::analyzer::ClassNotFound> {
            self.class_result.clone()
        }

        fn method_source(&self, _fqn: &str) -> Result<brokk_core::analyzer::SourceRange, brokk_core::analyzer::MethodLookupError> {
            self.method_result.clone()
        }

        fn imported_code_units_of(&self, _file: &ProjectFile) -> std::collections::HashSet<brokk_core::analyzer::CodeUnit> {
            std::collections::HashSet::new()
        }

        fn import_statements_of(&self, _file: &ProjectFile) -> Vec<String> {
            Vec::new()
        }

        fn usages(&self, symbol: &str) -> Result<brokk_core::analyzer::UsageResult, brokk_core::analyzer::TooManyCallsites> {
            Ok(brokk_core::analyzer::UsageResult {
                symbol: symbol.to_string(),
                sites: Vec::new(),
            })
        }
    }

    #[test]
    fn symbol_function_with_overloaded_name_is_ambiguous_match() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "B.java");
        let candidate = brokk_core::analyzer::CodeUnit::new(
            file.clone(),
            "",
            "B.foo",
            brokk_core::analyzer::SymbolKind::Function,
        );
        let analyzer = FakeAnalyzer {
            method_result: Err(brokk_core::analyzer::MethodLookupError::Ambiguous {
                fqn: "B.foo".to_string(),
                candidates: vec![candidate.clone(), candidate],
            }),
            class_result: Err(brokk_core::analyzer::ClassNotFound { fqn: "B".to_string() }),
        };
        let io = FakeIo::new(vec![(file.clone(), "class B {}\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: Some(&analyzer),
            io: &io,
        };
        let blocks = vec![block("B.java", "BRK_FUNCTION B.foo", "int foo() { return 1; }")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks.len(), 1);
        assert_eq!(report.failed_blocks[0].reason, FailureReason::AmbiguousMatch);
        assert!(report.failed_blocks[0].commentary.contains("Multiple overloads found for 'B.foo'"));
        assert!(report.failed_blocks[0].commentary.contains("Please provide a non-overloaded, unique name"));
    }

    #[test]
    fn symbol_function_not_found_reports_no_match() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "B.java");
        let analyzer = FakeAnalyzer {
            method_result: Err(brokk_core::analyzer::MethodLookupError::NotFound { fqn: "B.bar".to_string() }),
            class_result: Err(brokk_core::analyzer::ClassNotFound { fqn: "B".to_string() }),
        };
        let io = FakeIo::new(vec![(file.clone(), "class B {}\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: Some(&analyzer),
            io: &io,
        };
        let blocks = vec![block("B.java", "BRK_FUNCTION B.bar", "void bar() {}")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks.len(), 1);
        assert_eq!(report.failed_blocks[0].reason, FailureReason::NoMatch);
        assert!(report.failed_blocks[0].commentary.contains("No method source found for 'B.bar'"));
    }

    #[test]
    fn symbol_class_replaces_analyzer_reported_range() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "B.java");
        let analyzer = FakeAnalyzer {
            method_result: Err(brokk_core::analyzer::MethodLookupError::NotFound { fqn: "B".to_string() }),
            class_result: Ok(brokk_core::analyzer::SourceRange {
                file: file.clone(),
                start_line: 1,
                end_line: 1,
                text: "class B { int x; }".to_string(),
            }),
        };
        let io = FakeIo::new(vec![(file.clone(), "package p;\nclass B { int x; }\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: Some(&analyzer),
            io: &io,
        };
        let blocks = vec![block("B.java", "BRK_CLASS B", "class B { int x; int y; }")];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(io.files.borrow().get(&file).unwrap(), "package p;\nclass B { int x; int y; }\n");
    }

    #[test]
    fn symbol_operation_without_analyzer_reports_no_match() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "B.java");
        let io = FakeIo::new(vec![(file.clone(), "class B {}\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("B.java", "BRK_FUNCTION B.foo", "int foo() { return 1; }")];
        let report = apply(&input, &blocks);
        assert_eq!(report.failed_blocks.len(), 1);
        assert_eq!(report.failed_blocks[0].reason, FailureReason::NoMatch);
    }

    #[test]
    fn original_contents_recorded_only_once_per_file_across_blocks() {
        let root = std::path::Path::new("/proj");
        let file = ProjectFile::new(root, "a.txt");
        let io = FakeIo::new(vec![(file.clone(), "one two\n")]);
        let scope = ResolutionScope {
            project_root: root,
            workspace_files: &[file.clone()],
            project_files: &[],
        };
        let input = ApplyInput {
            scope,
            analyzer: None,
            io: &io,
        };
        let blocks = vec![block("a.txt", "one", "1"), block("a.txt", "two", "2")];
        let report = apply(&input, &blocks);
        assert!(report.is_clean());
        assert_eq!(report.original_contents.len(), 1);
        assert_eq!(report.original_contents.get(&file).unwrap(), "one two\n");
        assert_eq!(io.files.borrow().get(&file).unwrap(), "1 2\n");
    }
}
