//! [`EditOperation`] — the structured unit the Edit-Block Parser produces
//! and the Edit-Block Applier consumes.

/// The reserved first-line markers that select a symbolic or whole-file
/// replacement instead of a literal text search.
pub const MARKER_ENTIRE_FILE: &str = "BRK_ENTIRE_FILE";
pub const MARKER_FUNCTION: &str = "BRK_FUNCTION";
pub const MARKER_CLASS: &str = "BRK_CLASS";
pub const MARKER_CONFLICT_PREFIX: &str = "BRK_CONFLICT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    TextSearch,
    WholeFile,
    SymbolFunction,
    SymbolClass,
    ConflictRegion,
}

/// One parsed SEARCH/REPLACE unit. Immutable once produced by the
/// parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    pub raw_filename: Option<String>,
    pub before_text: String,
    pub after_text: String,
    pub operation_kind: OperationKind,
}

impl EditOperation {
    /// Classifies `before_text` per the marker grammar and builds the
    /// operation. `raw_filename` may be `None`; the applier rejects
    /// filename-less blocks.
    pub fn new(raw_filename: Option<String>, before_text: String, after_text: String) -> Self {
        let operation_kind = classify_before_text(&before_text);
        Self {
            raw_filename,
            before_text,
            after_text,
            operation_kind,
        }
    }

    /// The qualified symbol name for `symbol_function`/`symbol_class`
    /// operations (the remainder of the marker's first line).
    pub fn symbol_name(&self) -> Option<&str> {
        match self.operation_kind {
            OperationKind::SymbolFunction => {
                self.before_text.trim().strip_prefix(MARKER_FUNCTION)
            }
            OperationKind::SymbolClass => self.before_text.trim().strip_prefix(MARKER_CLASS),
            _ => None,
        }
        .map(str::trim)
        .filter(|s| !s.is_empty())
    }

    /// The conflict-region label (`<n>`) for `conflict_region`
    /// operations.
    pub fn conflict_label(&self) -> Option<&str> {
        if self.operation_kind != OperationKind::ConflictRegion {
            return None;
        }
        self.before_text
            .trim()
            .lines()
            .next()
            .and_then(|line| line.strip_prefix(MARKER_CONFLICT_PREFIX))
    }
}

fn classify_before_text(before_text: &str) -> OperationKind {
    let first_line = before_text.lines().next().unwrap_or("").trim();
    if before_text.trim() == MARKER_ENTIRE_FILE {
        OperationKind::WholeFile
    } else if first_line.starts_with(MARKER_FUNCTION) {
        OperationKind::SymbolFunction
    } else if first_line.starts_with(MARKER_CLASS) {
        OperationKind::SymbolClass
    } else if first_line.starts_with(MARKER_CONFLICT_PREFIX) {
        OperationKind::ConflictRegion
    } else {
        OperationKind::TextSearch
    }
}
