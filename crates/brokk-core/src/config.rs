//! [`BuildDetails`] — the per-project build/test/lint configuration,
//! persisted as a JSON document embedded under the `buildDetailsJson`
//! key of `<project>/.brokk/project.properties`, a flat `key=value`
//! properties file holding that one JSON blob alongside whatever other
//! scalar settings a project carries.
//!
//! Load/save follows the canonicalizing pattern the teacher's
//! `orch-core::config` module uses: read, parse, and on any structural
//! problem surface a distinct [`ConfigError`] variant rather than a
//! single opaque error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const BUILD_DETAILS_KEY: &str = "buildDetailsJson";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {key} at {path}: {source}")]
    Parse {
        path: PathBuf,
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build/test/lint commands and exclusion rules for a project,
/// persisted across sessions.
///
/// `exclusion_patterns` supersedes the legacy `excludedDirectories`
/// field: on load, a present `excludedDirectories` list is folded into
/// `exclusion_patterns` by appending a trailing `/**` glob to each
/// entry, then dropped — the document is rewritten in the new shape the
/// next time it's saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    #[serde(default)]
    pub build_lint_command: Option<String>,
    #[serde(default)]
    pub test_all_command: Option<String>,
    #[serde(default)]
    pub test_some_command: Option<String>,
    #[serde(default)]
    pub exclusion_patterns: Vec<String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

/// Mirrors the on-disk legacy shape so a document written before
/// `exclusionPatterns` existed still loads.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBuildDetails {
    #[serde(default)]
    build_lint_command: Option<String>,
    #[serde(default)]
    test_all_command: Option<String>,
    #[serde(default)]
    test_some_command: Option<String>,
    #[serde(default)]
    exclusion_patterns: Vec<String>,
    #[serde(default)]
    excluded_directories: Option<Vec<String>>,
    #[serde(default)]
    environment_variables: BTreeMap<String, String>,
}

impl Default for BuildDetails {
    fn default() -> Self {
        Self {
            build_lint_command: None,
            test_all_command: None,
            test_some_command: None,
            exclusion_patterns: Vec::new(),
            environment_variables: BTreeMap::new(),
        }
    }
}

impl BuildDetails {
    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(".brokk").join("project.properties")
    }

    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = Self::config_path(project_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let properties = parse_properties(&raw);
        let Some(json) = properties.get(BUILD_DETAILS_KEY) else {
            return Ok(Self::default());
        };
        let legacy: LegacyBuildDetails = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            key: BUILD_DETAILS_KEY,
            source,
        })?;
        Ok(Self::from_legacy(legacy))
    }

    fn from_legacy(legacy: LegacyBuildDetails) -> Self {
        let mut exclusion_patterns = legacy.exclusion_patterns;
        if let Some(dirs) = legacy.excluded_directories {
            for dir in dirs {
                let trimmed = dir.trim_end_matches('/');
                exclusion_patterns.push(format!("{trimmed}/**"));
            }
        }
        Self {
            build_lint_command: legacy.build_lint_command,
            test_all_command: legacy.test_all_command,
            test_some_command: legacy.test_some_command,
            exclusion_patterns,
            environment_variables: legacy.environment_variables,
        }
    }

    /// Writes `self` back into `project.properties` under
    /// `buildDetailsJson`, preserving any other keys the file already
    /// held (e.g. `jdk.home`, migrated from the legacy
    /// `JAVA_HOME` environment-variable entry).
    pub fn save(&self, project_root: &Path) -> Result<(), ConfigError> {
        let path = Self::config_path(project_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut properties = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            parse_properties(&raw)
        } else {
            BTreeMap::new()
        };

        let json = serde_json::to_string(self).map_err(|source| ConfigError::Serialize { source })?;
        properties.insert(BUILD_DETAILS_KEY.to_string(), json);

        let serialized = render_properties(&properties);
        let temp_path = path.with_extension("properties.tmp");
        fs::write(&temp_path, serialized).map_err(|source| ConfigError::Write {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| ConfigError::Write { path, source })
    }

    /// Normalizes an exclusion pattern the way the build-details editor
    /// does before persisting it: backslashes become `/`, a trailing
    /// `/` is trimmed, a leading `./` is stripped, and a pattern given
    /// as an absolute path inside `project_root` is rewritten relative
    /// to it. A leading `/` is only preserved when the path resolves
    /// outside the project root (left untouched — callers reject those
    /// separately; canonicalization never escapes the caller's value
    /// further than necessary to compare against the root).
    pub fn canonicalize_pattern(project_root: &Path, raw: &str) -> String {
        let mut normalized = raw.replace('\\', "/");
        if let Some(stripped) = normalized.strip_prefix("./") {
            normalized = stripped.to_string();
        }
        while normalized.ends_with('/') && normalized.len() > 1 {
            normalized.pop();
        }

        if Path::new(&normalized).is_absolute() {
            if let Ok(canonical_root) = project_root.canonicalize() {
                let root_str = canonical_root.to_string_lossy().replace('\\', "/");
                if let Some(rel) = normalized.strip_prefix(root_str.as_str()) {
                    return rel.trim_start_matches('/').to_string();
                }
            }
        }
        normalized
    }
}

/// Parses a minimal Java-properties-style `key=value` document: one
/// entry per non-blank, non-`#`-comment line, `\n`/`\\`/`\=`/`\:`
/// escapes unescaped in the value. Good enough for the single
/// machine-written `buildDetailsJson` entry this module cares about
/// plus whatever other scalar keys a project file already carries.
fn parse_properties(raw: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let Some(eq) = find_unescaped_separator(trimmed) else {
            continue;
        };
        let key = unescape_property(trimmed[..eq].trim());
        let value = unescape_property(trimmed[eq + 1..].trim());
        entries.insert(key, value);
    }
    entries
}

fn find_unescaped_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'=' | b':' => return Some(i),
            _ => {}
        }
    }
    None
}

fn unescape_property(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn escape_property(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' => out.push_str("\\="),
            ':' => out.push_str("\\:"),
            other => out.push(other),
        }
    }
    out
}

fn render_properties(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(&escape_property(key));
        out.push('=');
        out.push_str(&escape_property(value));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_commands_or_exclusions() {
        let details = BuildDetails::default();
        assert!(details.build_lint_command.is_none());
        assert!(details.exclusion_patterns.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut details = BuildDetails::default();
        details.build_lint_command = Some("cargo check".into());
        details.exclusion_patterns.push("target/**".into());
        details.save(dir.path()).unwrap();

        let loaded = BuildDetails::load(dir.path()).unwrap();
        assert_eq!(loaded, details);
    }

    #[test]
    fn save_writes_through_a_temp_file_and_leaves_none_behind() {
        let dir = tempdir().unwrap();
        let details = BuildDetails {
            build_lint_command: Some("make lint".into()),
            ..BuildDetails::default()
        };
        details.save(dir.path()).unwrap();

        let path = BuildDetails::config_path(dir.path());
        let temp_path = path.with_extension("properties.tmp");
        assert!(path.exists());
        assert!(!temp_path.exists());
    }

    #[test]
    fn missing_config_loads_as_default() {
        let dir = tempdir().unwrap();
        let loaded = BuildDetails::load(dir.path()).unwrap();
        assert_eq!(loaded, BuildDetails::default());
    }

    #[test]
    fn save_preserves_unrelated_properties_keys() {
        let dir = tempdir().unwrap();
        let path = BuildDetails::config_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "jdk.home=/usr/lib/jvm/17\n").unwrap();

        let details = BuildDetails {
            build_lint_command: Some("make lint".into()),
            ..BuildDetails::default()
        };
        details.save(dir.path()).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("jdk.home=/usr/lib/jvm/17"));
        assert!(raw.contains(BUILD_DETAILS_KEY));
        assert_eq!(BuildDetails::load(dir.path()).unwrap(), details);
    }

    #[test]
    fn build_details_is_stored_as_json_under_the_documented_key() {
        let dir = tempdir().unwrap();
        let details = BuildDetails {
            build_lint_command: Some("cargo check".into()),
            exclusion_patterns: vec!["target/**".into()],
            ..BuildDetails::default()
        };
        details.save(dir.path()).unwrap();

        let raw = fs::read_to_string(BuildDetails::config_path(dir.path())).unwrap();
        let properties = parse_properties(&raw);
        let json = properties.get(BUILD_DETAILS_KEY).unwrap();
        let decoded: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(decoded["buildLintCommand"], "cargo check");
        assert_eq!(decoded["exclusionPatterns"][0], "target/**");
    }

    #[test]
    fn legacy_excluded_directories_fold_into_exclusion_patterns() {
        let dir = tempdir().unwrap();
        let legacy_json = r#"{"buildLintCommand":"make lint","excludedDirectories":["build","vendor/"]}"#;
        let path = BuildDetails::config_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{BUILD_DETAILS_KEY}={}\n", escape_property(legacy_json))).unwrap();

        let loaded = BuildDetails::load(dir.path()).unwrap();
        assert_eq!(loaded.build_lint_command.as_deref(), Some("make lint"));
        assert!(loaded.exclusion_patterns.contains(&"build/**".to_string()));
        assert!(loaded.exclusion_patterns.contains(&"vendor/**".to_string()));
    }

    #[test]
    fn canonicalize_pattern_normalizes_slashes_and_dot_prefix() {
        let dir = tempdir().unwrap();
        assert_eq!(
            BuildDetails::canonicalize_pattern(dir.path(), "./a\\b/"),
            "a/b"
        );
    }

    #[test]
    fn canonicalize_pattern_rewrites_absolute_within_root_as_relative() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let absolute = canonical.join("src").join("main.rs");
        let result = BuildDetails::canonicalize_pattern(dir.path(), absolute.to_str().unwrap());
        assert_eq!(result, "src/main.rs");
    }
}
