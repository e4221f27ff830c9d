//! Thin AST wrappers pairing `hcl` crate nodes with source ranges.

use std::path::{Path, PathBuf};

use hcl::{Block, Body, Structure};

/// A best-effort source location, recovered by locating a block or
/// attribute's lexical text within the original file. Precise enough for
/// error messages and the report layer; not a substitute for a real
/// span-tracking lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub file: PathBuf,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceRange {
    pub fn whole_file(file: &Path) -> Self {
        SourceRange {
            file: file.to_path_buf(),
            start_line: 1,
            start_col: 1,
            end_line: 1,
            end_col: 1,
        }
    }
}

impl std::fmt::Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file.display(),
            self.start_line,
            self.start_col
        )
    }
}

/// A fully parsed `.tm`/`.tm.hcl` file: its path, raw text (kept so ranges
/// can be recovered lazily) and parsed body.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub path: PathBuf,
    pub content: String,
    pub body: Body,
}

/// A block paired with the file it came from and a source range.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub file: PathBuf,
    pub block: Block,
    pub range: SourceRange,
}

/// An attribute paired with the file it came from and a source range.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub file: PathBuf,
    pub key: String,
    pub expr: hcl::Expression,
    pub range: SourceRange,
}

impl RawFile {
    /// All top-level blocks in this file, each carrying a best-effort range.
    pub fn blocks(&self) -> Vec<RawBlock> {
        self.body
            .iter()
            .filter_map(|s| match s {
                Structure::Block(b) => Some(b),
                Structure::Attribute(_) => None,
            })
            .map(|b| RawBlock {
                file: self.path.clone(),
                block: b.clone(),
                range: self.locate_block(b),
            })
            .collect()
    }

    /// All top-level attributes in this file (rare for Terramate files, but
    /// legal HCL), each carrying a best-effort range.
    pub fn attributes(&self) -> Vec<RawAttribute> {
        self.body
            .iter()
            .filter_map(|s| match s {
                Structure::Attribute(a) => Some(a),
                Structure::Block(_) => None,
            })
            .map(|a| RawAttribute {
                file: self.path.clone(),
                key: a.key.as_str().to_string(),
                expr: a.expr.clone(),
                range: self.locate_attribute(a.key.as_str()),
            })
            .collect()
    }

    fn locate_block(&self, block: &Block) -> SourceRange {
        locate_text(&self.content, block.identifier.as_str(), &self.path)
            .unwrap_or_else(|| SourceRange::whole_file(&self.path))
    }

    fn locate_attribute(&self, key: &str) -> SourceRange {
        locate_text(&self.content, key, &self.path).unwrap_or_else(|| SourceRange::whole_file(&self.path))
    }
}

/// Find the first occurrence of `needle` as a standalone lexical token in
/// `content` and return its line/column. Used only for diagnostics, so a
/// false match (e.g. the same identifier used elsewhere first) degrades to
/// a slightly wrong line number rather than a hard failure.
fn locate_text(content: &str, needle: &str, file: &Path) -> Option<SourceRange> {
    let idx = content.find(needle)?;
    let (line, col) = line_col_at(content, idx);
    Some(SourceRange {
        file: file.to_path_buf(),
        start_line: line,
        start_col: col,
        end_line: line,
        end_col: col + needle.len(),
    })
}

fn line_col_at(content: &str, byte_idx: usize) -> (usize, usize) {
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in content.char_indices() {
        if i >= byte_idx {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_tracks_newlines() {
        let content = "a\nbc\ndef";
        assert_eq!(line_col_at(content, 0), (1, 1));
        assert_eq!(line_col_at(content, 2), (2, 1));
        assert_eq!(line_col_at(content, 6), (3, 2));
    }

    #[test]
    fn blocks_and_attributes_are_split_correctly() {
        let content = r#"
globals {
  a = 1
}
top_attr = 2
"#;
        let body: Body = hcl::from_str(content).unwrap();
        let raw = RawFile {
            path: PathBuf::from("x.tm"),
            content: content.to_string(),
            body,
        };
        assert_eq!(raw.blocks().len(), 1);
        assert_eq!(raw.attributes().len(), 1);
        assert_eq!(raw.attributes()[0].key, "top_attr");
    }
}
