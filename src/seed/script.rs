//! Declarative seed scripts.
//!
//! A script is a sequence of semicolon-terminated SQL statements. Lines whose
//! first non-blank characters are `--` are dropped before splitting; a
//! semicolon inside a single-quoted literal does not end a statement.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, Result};

/// Catalog script compiled into the crate.
pub const EMBEDDED_PROGRAM_SCRIPT: &str = include_str!("../../seeds/programs.sql");

/// Where a seed script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(Cow<'static, str>),
    File(PathBuf),
}

impl ScriptSource {
    /// The catalog script shipped with the crate.
    pub fn embedded() -> Self {
        Self::Inline(Cow::Borrowed(EMBEDDED_PROGRAM_SCRIPT))
    }

    pub fn load(&self) -> Result<String> {
        match self {
            Self::Inline(text) => Ok(text.to_string()),
            Self::File(path) => read_script(path),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Inline(text) => format!("inline script ({} bytes)", text.len()),
            Self::File(path) => path.display().to_string(),
        }
    }
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Split a script into trimmed, non-empty statements without their
/// terminating semicolons.
pub fn split_statements(script: &str) -> Vec<String> {
    let body = script
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("--")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_literal = false;

    for ch in body.chars() {
        match ch {
            // A doubled quote toggles twice, which leaves us inside the literal.
            '\'' => {
                in_literal = !in_literal;
                current.push(ch);
            }
            ';' if !in_literal => push_statement(&mut statements, &mut current),
            _ => current.push(ch),
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comment_lines_and_blank_statements() {
        let script = "-- header\nINSERT INTO t VALUES (1);\n\n  -- indented comment\nINSERT INTO t VALUES (2);;\n";
        assert_eq!(
            split_statements(script),
            vec!["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)"]
        );
    }

    #[test]
    fn semicolon_inside_literal_is_kept() {
        let script = "INSERT INTO t VALUES ('a; b', 'it''s');\nINSERT INTO t VALUES ('c')";
        assert_eq!(
            split_statements(script),
            vec![
                "INSERT INTO t VALUES ('a; b', 'it''s')",
                "INSERT INTO t VALUES ('c')"
            ]
        );
    }

    #[test]
    fn embedded_catalog_has_fifty_statements() {
        assert_eq!(split_statements(EMBEDDED_PROGRAM_SCRIPT).len(), 50);
    }

    #[test]
    fn file_source_is_read_and_described() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"INSERT INTO t (a) VALUES (1);").unwrap();
        let source = ScriptSource::File(file.path().to_path_buf());

        assert_eq!(source.load().unwrap(), "INSERT INTO t (a) VALUES (1);");
        assert_eq!(source.describe(), file.path().display().to_string());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = ScriptSource::File("/nonexistent/programs.sql".into());
        assert!(matches!(source.load(), Err(BootstrapError::Io { .. })));
    }
}
