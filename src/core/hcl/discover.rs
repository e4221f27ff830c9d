//! File discovery: `.tm`/`.tm.hcl` suffix matching and `.tmskip` handling.

use std::fs;
use std::path::{Path, PathBuf};

use super::ast::RawFile;
use crate::core::error::{Result, TmError};

/// True if `name` matches one of the two Terramate configuration suffixes.
///
/// A leading dot does not disqualify a file: dotfiles are parsed like any
/// other match (4.1).
pub fn is_terramate_file(name: &str) -> bool {
    name.ends_with(".tm") || name.ends_with(".tm.hcl")
}

/// A parsed file plus whatever parse error it produced, if any. Config
/// loading tolerates per-file parse failures by recording them here rather
/// than aborting the whole directory walk (schema errors are fatal only for
/// their own directory).
pub struct ParsedFile {
    pub raw: Option<RawFile>,
    pub error: Option<TmError>,
}

/// List the `.tm`/`.tm.hcl` files directly inside `dir` (not recursive),
/// in lexical order, unless the directory contains a `.tmskip` marker.
pub fn discover_config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if dir.join(".tmskip").exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if is_terramate_file(name) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Parse a single file, recording (rather than propagating) any parse
/// error so sibling files/directories can still load.
pub fn parse_file(path: &Path) -> ParsedFile {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return ParsedFile {
                raw: None,
                error: Some(TmError::IOError(e)),
            }
        }
    };
    match hcl::from_str::<hcl::Body>(&content) {
        Ok(body) => ParsedFile {
            raw: Some(RawFile {
                path: path.to_path_buf(),
                content,
                body,
            }),
            error: None,
        },
        Err(e) => ParsedFile {
            raw: None,
            error: Some(TmError::ParseError {
                file: path.to_path_buf(),
                message: e.to_string(),
                range: None,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn matches_both_suffixes() {
        assert!(is_terramate_file("stack.tm"));
        assert!(is_terramate_file("stack.tm.hcl"));
        assert!(is_terramate_file(".hidden.tm"));
        assert!(!is_terramate_file("main.tf"));
    }

    #[test]
    fn tmskip_suppresses_discovery() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.tm"), "x = 1").unwrap();
        fs::write(dir.path().join(".tmskip"), "").unwrap();
        let found = discover_config_files(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn discovers_and_sorts_lexically() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.tm"), "x = 1").unwrap();
        fs::write(dir.path().join("a.tm.hcl"), "y = 2").unwrap();
        fs::write(dir.path().join("ignore.tf"), "z = 3").unwrap();
        let found = discover_config_files(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.tm.hcl", "b.tm"]);
    }

    #[test]
    fn parse_file_records_error_without_panicking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.tm");
        fs::write(&path, "this is not { valid hcl").unwrap();
        let parsed = parse_file(&path);
        assert!(parsed.raw.is_none());
        assert!(parsed.error.is_some());
    }
}
