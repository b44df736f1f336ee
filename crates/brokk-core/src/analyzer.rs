//! The [`Analyzer`] interface boundary and the [`CodeUnit`] value type it
//! produces.
//!
//! Language-specific static analysis lives outside this workspace; every
//! crate here depends only on this trait, mirroring how the teacher's
//! daemon crate depends on `GitCli`/`RepoHandle` as narrow seams onto an
//! external tool rather than embedding git internals.

use std::collections::HashSet;
use std::fmt;

use crate::project_file::ProjectFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Class,
    Function,
    Field,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Field => "field",
        })
    }
}

/// Identifier of a declared symbol, as produced by the Analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeUnit {
    pub file: ProjectFile,
    pub package: String,
    pub short_name: String,
    pub kind: SymbolKind,
}

impl CodeUnit {
    pub fn new(
        file: ProjectFile,
        package: impl Into<String>,
        short_name: impl Into<String>,
        kind: SymbolKind,
    ) -> Self {
        Self {
            file,
            package: package.into(),
            short_name: short_name.into(),
            kind,
        }
    }

    /// Fully qualified name: `package.short_name`, or just `short_name`
    /// when the package is empty.
    pub fn fqn(&self) -> String {
        if self.package.is_empty() {
            self.short_name.clone()
        } else {
            format!("{}.{}", self.package, self.short_name)
        }
    }
}

impl fmt::Display for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fqn(), self.kind)
    }
}

/// A source range with the text it spans, as returned by
/// `class_source`/`method_source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub file: ProjectFile,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodLookupError {
    #[error("No method source found for '{fqn}'")]
    NotFound { fqn: String },
    #[error(
        "Multiple overloads found for '{fqn}'. Please provide a non-overloaded, unique name"
    )]
    Ambiguous {
        fqn: String,
        candidates: Vec<CodeUnit>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No class source found for '{fqn}'")]
pub struct ClassNotFound {
    pub fqn: String,
}

/// Bounds unbounded usage-search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooManyCallsites {
    pub symbol: String,
    pub observed: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageResult {
    pub symbol: String,
    pub sites: Vec<SourceRange>,
}

/// Interface onto a language-specific static analyzer. Implementations
/// live outside this workspace (an external collaborator); this crate
/// only depends on the trait boundary.
pub trait Analyzer: Send + Sync {
    fn all_declarations(&self) -> Vec<CodeUnit>;

    /// Prefix, camel-case, and substring search modes. When `query`
    /// equals a symbol's short name exactly, the result includes the
    /// parent class as well.
    fn search_symbols(&self, query: &str) -> Vec<CodeUnit>;

    fn class_source(&self, fqn: &str) -> Result<SourceRange, ClassNotFound>;

    fn method_source(&self, fqn: &str) -> Result<SourceRange, MethodLookupError>;

    fn imported_code_units_of(&self, file: &ProjectFile) -> HashSet<CodeUnit>;

    fn import_statements_of(&self, file: &ProjectFile) -> Vec<String>;

    fn usages(&self, symbol: &str) -> Result<UsageResult, TooManyCallsites>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqn_joins_package_and_short_name() {
        let pf = ProjectFile::new("/proj", "B.java");
        let cu = CodeUnit::new(pf, "com.example", "B.foo", SymbolKind::Function);
        assert_eq!(cu.fqn(), "com.example.B.foo");
    }

    #[test]
    fn fqn_without_package_is_just_short_name() {
        let pf = ProjectFile::new("/proj", "B.java");
        let cu = CodeUnit::new(pf, "", "foo", SymbolKind::Function);
        assert_eq!(cu.fqn(), "foo");
    }
}
