//! Walks the project, merges blocks per directory, resolves `import`,
//! and validates the minimal schema this core cares about
//! (`terramate.required_version`).

use std::path::{Path, PathBuf};

use globset::Glob;

use crate::core::error::TmError;
use crate::core::hcl::{discover_config_files, parse_file, RawBlock};
use crate::core::path::ProjectPath;
use crate::core::tree::ConfigTree;
use crate::core::version;

/// Result of a load: the merged tree plus any per-directory errors that
/// did not abort the whole walk (schema/parse errors are fatal only for
/// their own directory).
pub struct LoadResult {
    pub tree: ConfigTree,
    pub errors: Vec<TmError>,
}

/// Walk `root`, building the [`ConfigTree`]. `.tmskip` prunes a directory
/// and everything below it.
pub fn load(root: &Path) -> LoadResult {
    let mut tree = ConfigTree::new();
    let mut errors = Vec::new();
    walk(root, root, &mut tree, &mut errors);
    for node in tree.nodes.values() {
        if let Err(e) = validate_required_version(node) {
            errors.push(e);
        }
    }
    LoadResult { tree, errors }
}

fn walk(root: &Path, dir: &Path, tree: &mut ConfigTree, errors: &mut Vec<TmError>) {
    let files = match discover_config_files(dir) {
        Ok(files) => files,
        Err(e) => {
            errors.push(e);
            Vec::new()
        }
    };

    if !files.is_empty() {
        let project_dir = ProjectPath::from_fs(root, dir).unwrap_or_else(ProjectPath::root);
        let node = tree.node_mut(&project_dir);
        for file in &files {
            let parsed = parse_file(file);
            if let Some(e) = parsed.error {
                errors.push(e);
                continue;
            }
            let Some(raw) = parsed.raw else { continue };
            for block in raw.blocks() {
                classify(node, block, root, errors);
            }
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            errors.push(TmError::IOError(e));
            return;
        }
    };
    let mut subdirs: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();
    for sub in subdirs {
        walk(root, &sub, tree, errors);
    }
}

fn classify(node: &mut crate::core::tree::ConfigNode, block: RawBlock, root: &Path, errors: &mut Vec<TmError>) {
    match block.block.identifier.as_str() {
        "terramate" => node.terramate_blocks.push(block),
        "globals" => node.globals_blocks.push(block),
        "stack" => node.stack_blocks.push(block),
        "generate_hcl" | "generate_file" => node.generate_blocks.push(block),
        "script" => node.script_blocks.push(block),
        "import" => resolve_import(node, block, root, errors),
        _ => {}
    }
}

/// Find a top-level string-valued attribute named `key` directly inside
/// `body` (not recursive).
fn body_string_attr(body: &hcl::Body, key: &str) -> Option<String> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => match &a.expr {
            hcl::Expression::String(s) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    })
}

/// Find the first top-level nested block named `name` directly inside
/// `body`.
fn body_block<'a>(body: &'a hcl::Body, name: &str) -> Option<&'a hcl::Block> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Block(b) if b.identifier.as_str() == name => Some(b),
        _ => None,
    })
}

/// `import { source = "glob/relative/to/root" }` loads every matched file
/// as if its blocks appeared in the importing directory.
fn resolve_import(node: &mut crate::core::tree::ConfigNode, block: RawBlock, root: &Path, errors: &mut Vec<TmError>) {
    let Some(source) = find_attr_literal(&block, "source") else {
        errors.push(TmError::SchemaError {
            file: block.file.clone(),
            message: "import block requires a source attribute".to_string(),
            range: Some(block.range.clone()),
        });
        return;
    };

    let glob = match Glob::new(&source) {
        Ok(g) => g.compile_matcher(),
        Err(e) => {
            errors.push(TmError::SchemaError {
                file: block.file.clone(),
                message: format!("invalid import glob {source:?}: {e}"),
                range: Some(block.range.clone()),
            });
            return;
        }
    };

    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !glob.is_match(rel) {
            continue;
        }
        let parsed = parse_file(entry.path());
        if let Some(e) = parsed.error {
            errors.push(e);
            continue;
        }
        let Some(raw) = parsed.raw else { continue };
        for imported in raw.blocks() {
            classify(node, imported, root, errors);
        }
    }
}

fn find_attr_literal(block: &RawBlock, key: &str) -> Option<String> {
    body_string_attr(&block.block.body, key)
}

fn validate_required_version(node: &crate::core::tree::ConfigNode) -> Result<(), TmError> {
    for block in &node.terramate_blocks {
        let Some(config) = body_block(&block.block.body, "config") else { continue };
        let Some(required) = body_string_attr(&config.body, "required_version") else { continue };
        version::check_required(&required)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_nested_globals_and_stack_blocks() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("root.tm"), "globals {\n  a = 1\n}\n").unwrap();
        let child = dir.path().join("child");
        fs::create_dir(&child).unwrap();
        fs::write(child.join("stack.tm"), "stack {\n  name = \"child\"\n}\n").unwrap();

        let result = load(dir.path());
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>());
        let stacks = result.tree.stack_dirs();
        assert_eq!(stacks, vec![ProjectPath::new("/child")]);
        assert_eq!(result.tree.node(&ProjectPath::root()).unwrap().globals_blocks.len(), 1);
    }

    #[test]
    fn tmskip_prunes_the_subtree() {
        let dir = tempdir().unwrap();
        let child = dir.path().join("skipped");
        fs::create_dir(&child).unwrap();
        fs::write(child.join("stack.tm"), "stack {}\n").unwrap();
        fs::write(child.join(".tmskip"), "").unwrap();

        let result = load(dir.path());
        assert!(result.tree.stack_dirs().is_empty());
    }
}
