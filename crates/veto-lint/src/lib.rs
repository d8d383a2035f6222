//! Rule file linting for veto.
//!
//! Checks JSON and YAML rule files the way the engine would see them at
//! registration, without registering anything. Usable as a library or via
//! the `veto-lint` binary.
//!
//! ```no_run
//! use veto_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("rules.yaml"), &LintOptions::default());
//! let all = lint_directory(Path::new("./rules"), &LintOptions::default());
//!
//! if result.has_errors() || all.has_errors() {
//!     eprintln!("{} error(s)", result.errors + all.errors);
//! }
//! ```

mod types;
mod validator;

use serde_json::Value;
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};
pub use validator::validate_document;

/// Extensions `lint_directory` picks up.
pub const RULE_FILE_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Guess from the extension; anything unknown is parsed as YAML, which
    /// also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }

    fn parse(self, content: &str) -> Result<Value, String> {
        match self {
            Format::Json => serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {e}")),
            Format::Yaml => serde_yaml::from_str(content).map_err(|e| format!("Invalid YAML: {e}")),
        }
    }
}

pub fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RULE_FILE_EXTENSIONS.contains(&ext))
}

pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LintIssue::error("E001", format!("Failed to read file: {e}"), path));
            return result;
        }
    };
    lint_str(&content, Format::from_path(path), path, options)
}

/// Lint every rule file directly inside `path` (non-recursive), in name order.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    match collect_rule_files(path) {
        Ok(files) => {
            for file in files {
                result.merge(lint_file(&file, options));
            }
        }
        Err(e) => result.add_issue(LintIssue::error(
            "E001",
            format!("Failed to read directory: {e}"),
            path,
        )),
    }
    result
}

/// Rule files under `path`: the file itself, or the rule files of a directory.
pub fn collect_rule_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|file| file.is_file() && is_rule_file(file))
        .collect();
    files.sort();
    Ok(files)
}

/// Lint an in-memory document; `source` names it in the issues.
pub fn lint_str(content: &str, format: Format, source: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    match format.parse(content) {
        Ok(document) => validate_document(source, &document, &mut result, options),
        Err(message) => result.add_issue(
            LintIssue::error("E002", message, source)
                .with_suggestion("Check the document syntax"),
        ),
    }
    result
}

pub fn lint_value(document: &Value, source: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    validate_document(source, document, &mut result, options);
    result
}
