//! Code generation.
//!
//! Per stack: resolve visible `generate_hcl`/`generate_file` blocks,
//! filter by `condition`/`stack_filter`, render content, validate the
//! target label, detect conflicts, and write/delete to converge the
//! stack's generated files with what's declared. Parallel across stacks
//! via `rayon::scope`, since stacks are independent and generation has
//! no shared mutable state beyond the final report.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Result, TmError};
use crate::core::eval::EvalContext;
use crate::core::hcl::RawBlock;
use crate::core::path::{clean_relative, ProjectPath};
use crate::core::tree::ConfigTree;
use crate::core::value::Value;

pub const MAGIC_HEADER_SLASH: &str = "// TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT";
pub const MAGIC_HEADER_HASH: &str = "# TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    Slash,
    Hash,
}

impl HeaderStyle {
    pub fn header(self) -> &'static str {
        match self {
            HeaderStyle::Slash => MAGIC_HEADER_SLASH,
            HeaderStyle::Hash => MAGIC_HEADER_HASH,
        }
    }
}

/// One file this run either created, changed, deleted, or left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
    Unchanged(PathBuf),
}

/// The aggregate result of a generate run across every stack, plus any
/// per-stack failures (label conflicts, escapes) that did not stop
/// sibling stacks from converging.
#[derive(Debug, Default)]
pub struct GenerateReport {
    pub outcomes: Vec<FileOutcome>,
    pub errors: Vec<(ProjectPath, TmError)>,
}

impl GenerateReport {
    pub fn has_changes(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| !matches!(o, FileOutcome::Unchanged(_)))
    }
}

struct ResolvedBlock {
    label: String,
    is_hcl: bool,
    content: String,
}

/// Run generation for every stack in `tree`, rooted at `fs_root`, plus the
/// project's `context = root` blocks (evaluated once, not per stack).
/// Stacks are independent directory subtrees, so the pool fans out with
/// `rayon::scope`; each worker appends to the shared, mutex-guarded report.
pub fn generate_all(tree: &ConfigTree, fs_root: &Path, header: HeaderStyle) -> GenerateReport {
    let stacks = tree.stack_dirs();
    let report = std::sync::Mutex::new(GenerateReport::default());

    rayon::scope(|scope| {
        for stack in &stacks {
            let report = &report;
            scope.spawn(move |_| {
                let result = generate_stack(tree, fs_root, stack, header);
                let mut report = report.lock().unwrap();
                match result {
                    Ok((outcomes, errs)) => {
                        report.outcomes.extend(outcomes);
                        for e in errs {
                            report.errors.push((stack.clone(), e));
                        }
                    }
                    Err(e) => report.errors.push((stack.clone(), e)),
                }
            });
        }
    });

    let (root_outcomes, root_errors) = generate_root(tree, fs_root, header);
    let mut report = report.into_inner().unwrap();
    report.outcomes.extend(root_outcomes);
    for e in root_errors {
        report.errors.push((ProjectPath::root(), e));
    }
    report
}

/// Resolve, render, and converge the generated files for a single stack.
/// Label-validation failures are per-block: they're collected into the
/// returned error list rather than aborting the rest of the stack's blocks.
fn generate_stack(
    tree: &ConfigTree,
    fs_root: &Path,
    stack_dir: &ProjectPath,
    header: HeaderStyle,
) -> Result<(Vec<FileOutcome>, Vec<TmError>)> {
    let blocks = resolve_visible_blocks(tree, stack_dir)?;
    let ctx = stack_eval_context(tree, stack_dir);
    let other_stacks: Vec<ProjectPath> = tree.stack_dirs().into_iter().filter(|d| d != stack_dir).collect();

    let mut resolved: BTreeMap<String, ResolvedBlock> = BTreeMap::new();
    for block in blocks {
        if let Some(r) = eval_block(&block, &ctx, stack_dir)? {
            if resolved.contains_key(&r.label) {
                return Err(TmError::ConflictingConfig {
                    message: format!("two generate blocks target label {:?}", r.label),
                    range: Some(block.range.clone()),
                });
            }
            resolved.insert(r.label.clone(), r);
        }
    }

    let stack_fs_dir = stack_dir.to_fs(fs_root);
    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    let mut emitted = HashSet::new();

    for (label, resolved_block) in &resolved {
        let rel = match validate_label(label, stack_dir, &other_stacks) {
            Ok(rel) => rel,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let target = stack_fs_dir.join(&rel);
        emitted.insert(target.clone());

        let body = if resolved_block.is_hcl {
            format!("{}\n\n{}", header.header(), resolved_block.content)
        } else {
            format!("{}\n{}", header.header(), resolved_block.content)
        };

        match write_converged(&target, &body, header) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => errors.push(e),
        }
    }

    outcomes.extend(sweep_orphans(&stack_fs_dir, &emitted, header, &[])?);
    Ok((outcomes, errors))
}

/// Evaluate and converge every `context = root` generate block once for
/// the whole project. Labels must stay under `fs_root` and outside every
/// stack directory; the orphan sweep walks the project minus stack dirs.
fn generate_root(tree: &ConfigTree, fs_root: &Path, header: HeaderStyle) -> (Vec<FileOutcome>, Vec<TmError>) {
    let blocks = resolve_root_blocks(tree);
    let ctx = root_eval_context(tree);
    let stack_dirs = tree.stack_dirs();

    let mut resolved: BTreeMap<String, ResolvedBlock> = BTreeMap::new();
    let mut errors = Vec::new();
    for block in blocks {
        match eval_block(&block, &ctx, &ProjectPath::root()) {
            Ok(Some(r)) => {
                if resolved.contains_key(&r.label) {
                    errors.push(TmError::ConflictingConfig {
                        message: format!("two root generate blocks target label {:?}", r.label),
                        range: Some(block.range.clone()),
                    });
                    continue;
                }
                resolved.insert(r.label.clone(), r);
            }
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    let mut outcomes = Vec::new();
    let mut emitted = HashSet::new();
    for (label, resolved_block) in &resolved {
        let rel = match validate_label(label, &ProjectPath::root(), &stack_dirs) {
            Ok(rel) => rel,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let target = fs_root.join(&rel);
        emitted.insert(target.clone());

        let body = if resolved_block.is_hcl {
            format!("{}\n\n{}", header.header(), resolved_block.content)
        } else {
            format!("{}\n{}", header.header(), resolved_block.content)
        };

        match write_converged(&target, &body, header) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => errors.push(e),
        }
    }

    let exclude: Vec<PathBuf> = stack_dirs.iter().map(|d| d.to_fs(fs_root)).collect();
    match sweep_orphans(fs_root, &emitted, header, &exclude) {
        Ok(o) => outcomes.extend(o),
        Err(e) => errors.push(e),
    }

    (outcomes, errors)
}

/// Validate a generate-block label: a clean relative path that neither
/// escapes `base` nor resolves inside any of `forbidden_stacks` — a
/// descendant stack (or, for a root-context block, any stack at all) that
/// the label must not traverse into.
fn validate_label(label: &str, base: &ProjectPath, forbidden_stacks: &[ProjectPath]) -> Result<PathBuf> {
    let rel = clean_relative(label).ok_or_else(|| TmError::InvalidGenBlockLabel {
        label: label.to_string(),
        message: "label must be a clean relative path with no escape".to_string(),
    })?;
    let mut target = base.clone();
    for seg in rel.iter() {
        target = target.join(&seg.to_string_lossy());
    }
    if forbidden_stacks.iter().any(|s| target.is_inside(s)) {
        return Err(TmError::InvalidGenBlockLabel {
            label: label.to_string(),
            message: format!("label resolves to {:?}, which traverses into another stack", target.as_str()),
        });
    }
    Ok(rel)
}

/// Write `body` to `target`, refusing to clobber hand-written content and
/// reporting whether the file was created, changed, or left unchanged.
fn write_converged(target: &Path, body: &str, header: HeaderStyle) -> Result<FileOutcome> {
    if target.exists() {
        let existing = fs::read_to_string(target).unwrap_or_default();
        if !existing.starts_with(header.header()) && existing != body {
            return Err(TmError::ManualCodeExists { path: target.to_path_buf() });
        }
        if existing == body {
            return Ok(FileOutcome::Unchanged(target.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(TmError::IOError)?;
        }
        fs::write(target, body).map_err(TmError::IOError)?;
        Ok(FileOutcome::Changed(target.to_path_buf()))
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(TmError::IOError)?;
        }
        fs::write(target, body).map_err(TmError::IOError)?;
        Ok(FileOutcome::Created(target.to_path_buf()))
    }
}

/// Delete every previously generated file under `dir` (recursively, except
/// beneath `exclude`d subtrees) that bears the magic header but was not
/// re-emitted this cycle.
fn sweep_orphans(dir: &Path, emitted: &HashSet<PathBuf>, header: HeaderStyle, exclude: &[PathBuf]) -> Result<Vec<FileOutcome>> {
    let mut outcomes = Vec::new();
    if !dir.exists() {
        return Ok(outcomes);
    }
    let walker = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|ex| e.path() == ex || e.path().starts_with(ex)));
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        if emitted.contains(&path) {
            continue;
        }
        let content = fs::read_to_string(&path).unwrap_or_default();
        if content.starts_with(header.header()) {
            fs::remove_file(&path).map_err(TmError::IOError)?;
            outcomes.push(FileOutcome::Deleted(path));
        }
    }
    Ok(outcomes)
}

/// Walk root → stack, collecting generate blocks, honoring per-label
/// `inherit = false` suppression from closer scopes. `context = root`
/// blocks are excluded here; they're handled once per project instead.
fn resolve_visible_blocks(tree: &ConfigTree, stack_dir: &ProjectPath) -> Result<Vec<RawBlock>> {
    let mut by_label: BTreeMap<String, RawBlock> = BTreeMap::new();
    let mut suppressed: HashSet<String> = HashSet::new();

    for node in tree.scope_chain(stack_dir) {
        for block in &node.generate_blocks {
            if is_root_context(block) {
                continue;
            }
            let Some(label) = block.block.labels.first().map(|l| l.as_str().to_string()) else {
                continue;
            };
            if attr_bool(block, "inherit") == Some(false) {
                suppressed.insert(label.clone());
                by_label.remove(&label);
                continue;
            }
            suppressed.remove(&label);
            by_label.insert(label, block.clone());
        }
    }
    Ok(by_label.into_values().filter(|b| !suppressed.contains(b.block.labels.first().map(|l| l.as_str()).unwrap_or(""))).collect())
}

/// Collect every `context = root` generate block across the whole tree,
/// applying the same `inherit = false` suppression rule in directory
/// order (shallower declarations first, so a deeper one still overrides).
fn resolve_root_blocks(tree: &ConfigTree) -> Vec<RawBlock> {
    let mut by_label: BTreeMap<String, RawBlock> = BTreeMap::new();
    let mut suppressed: HashSet<String> = HashSet::new();

    for node in tree.nodes.values() {
        for block in &node.generate_blocks {
            if !is_root_context(block) {
                continue;
            }
            let Some(label) = block.block.labels.first().map(|l| l.as_str().to_string()) else {
                continue;
            };
            if attr_bool(block, "inherit") == Some(false) {
                suppressed.insert(label.clone());
                by_label.remove(&label);
                continue;
            }
            suppressed.remove(&label);
            by_label.insert(label, block.clone());
        }
    }
    by_label.into_values().filter(|b| !suppressed.contains(b.block.labels.first().map(|l| l.as_str()).unwrap_or(""))).collect()
}

/// True if a generate block declares `context = root` (as a bare
/// identifier or a string), meaning it's evaluated once for the whole
/// project instead of once per stack.
fn is_root_context(block: &RawBlock) -> bool {
    block.block.body.iter().any(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == "context" => match &a.expr {
            hcl::Expression::String(s) => s == "root",
            hcl::Expression::Variable(v) => v.as_str() == "root",
            _ => false,
        },
        _ => false,
    })
}

fn attr_bool(block: &RawBlock, key: &str) -> Option<bool> {
    block.block.body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => match &a.expr {
            hcl::Expression::Bool(b) => Some(*b),
            _ => None,
        },
        _ => None,
    })
}

fn attr_string(block: &RawBlock, key: &str, ctx: &EvalContext) -> Result<Option<String>> {
    let found = block.block.body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => Some(a.expr.clone()),
        _ => None,
    });
    match found {
        Some(expr) => {
            let v = crate::core::eval::eval(&expr, ctx, &block.file)?;
            Ok(v.as_str().map(str::to_string).or(Some(v.to_string())))
        }
        None => Ok(None),
    }
}

fn attr_condition(block: &RawBlock, ctx: &EvalContext) -> Result<bool> {
    let found = block.block.body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == "condition" => Some(a.expr.clone()),
        _ => None,
    });
    match found {
        Some(expr) => Ok(crate::core::eval::eval(&expr, ctx, &block.file)?.is_truthy()),
        None => Ok(true),
    }
}

/// `stack_filter` sub-blocks select a generate block for a subset of
/// stacks by project/repository path globs. A block with no `stack_filter`
/// sub-blocks always applies; otherwise it applies if *any* sub-block
/// matches (OR across sub-blocks, AND within one sub-block's lists).
fn matches_stack_filter(block: &RawBlock, stack_dir: &ProjectPath) -> bool {
    let filters: Vec<&hcl::Block> = block
        .block
        .body
        .iter()
        .filter_map(|s| match s {
            hcl::Structure::Block(b) if b.identifier.as_str() == "stack_filter" => Some(b),
            _ => None,
        })
        .collect();
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|f| filter_matches(f, stack_dir))
}

fn filter_matches(filter: &hcl::Block, stack_dir: &ProjectPath) -> bool {
    let project_paths = string_list_attr(&filter.body, "project_paths");
    let repository_paths = string_list_attr(&filter.body, "repository_paths");
    let project_ok = project_paths
        .as_ref()
        .map(|patterns| patterns.iter().all(|p| stack_dir.matches_glob(p)))
        .unwrap_or(true);
    let repo_ok = repository_paths
        .as_ref()
        .map(|patterns| patterns.iter().all(|p| stack_dir.matches_glob(p)))
        .unwrap_or(true);
    project_ok && repo_ok
}

fn string_list_attr(body: &hcl::Body, key: &str) -> Option<Vec<String>> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => match &a.expr {
            hcl::Expression::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|i| match i {
                        hcl::Expression::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        },
        _ => None,
    })
}

fn eval_block(block: &RawBlock, ctx: &EvalContext, stack_dir: &ProjectPath) -> Result<Option<ResolvedBlock>> {
    if !attr_condition(block, ctx)? {
        return Ok(None);
    }
    if !matches_stack_filter(block, stack_dir) {
        return Ok(None);
    }
    let label = block
        .block
        .labels
        .first()
        .map(|l| l.as_str().to_string())
        .ok_or_else(|| TmError::SchemaError {
            file: block.file.clone(),
            message: "generate block requires a label".to_string(),
            range: Some(block.range.clone()),
        })?;
    let is_hcl = block.block.identifier.as_str() == "generate_hcl";
    let content = if is_hcl {
        render_hcl_content(block, ctx)?
    } else {
        attr_string(block, "content", ctx)?.unwrap_or_default()
    };
    Ok(Some(ResolvedBlock { label, is_hcl, content }))
}

/// Render a `generate_hcl` block's nested `content { ... }` sub-block to
/// HCL text. Attributes evaluate to a [`Value`] and re-serialize through
/// [`literal`]; nested blocks render recursively; a `tm_dynamic` block
/// expands into one sibling block per `for_each` entry.
fn render_hcl_content(block: &RawBlock, ctx: &EvalContext) -> Result<String> {
    let content_block = block.block.body.iter().find_map(|s| match s {
        hcl::Structure::Block(b) if b.identifier.as_str() == "content" => Some(b),
        _ => None,
    });
    match content_block {
        Some(b) => render_body(&b.body, ctx, &block.file),
        None => Ok(String::new()),
    }
}

fn render_body(body: &hcl::Body, ctx: &EvalContext, file: &Path) -> Result<String> {
    let mut out = String::new();
    for structure in body.iter() {
        match structure {
            hcl::Structure::Attribute(a) => {
                let v = crate::core::eval::eval(&a.expr, ctx, file)?;
                out.push_str(&format!("{} = {}\n", a.key.as_str(), literal(&v)));
            }
            hcl::Structure::Block(b) if b.identifier.as_str() == "tm_dynamic" => {
                out.push_str(&render_tm_dynamic(b, ctx, file)?);
            }
            hcl::Structure::Block(b) => {
                out.push_str(&render_block(b, ctx, file)?);
            }
        }
    }
    Ok(out)
}

fn render_block(b: &hcl::Block, ctx: &EvalContext, file: &Path) -> Result<String> {
    let mut header = b.identifier.as_str().to_string();
    for label in b.labels.iter() {
        header.push_str(&format!(" {:?}", label.as_str()));
    }
    let body = render_body(&b.body, ctx, file)?;
    Ok(format!("{header} {{\n{body}}}\n"))
}

/// Expand a `tm_dynamic "name" { for_each = ...; content { ... } }` block
/// into one `name { ... }` sibling block per entry of the evaluated
/// `for_each` collection, binding `<iterator>.key`/`<iterator>.value` (the
/// iterator name defaults to the block's own label) in each iteration's
/// evaluation context.
fn render_tm_dynamic(b: &hcl::Block, ctx: &EvalContext, file: &Path) -> Result<String> {
    let target_name = b.labels.first().map(|l| l.as_str().to_string()).ok_or_else(|| TmError::SchemaError {
        file: file.to_path_buf(),
        message: "tm_dynamic requires a block-name label".to_string(),
        range: None,
    })?;

    let for_each_expr = b.body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == "for_each" => Some(a.expr.clone()),
        _ => None,
    });
    let iterator_name = b
        .body
        .iter()
        .find_map(|s| match s {
            hcl::Structure::Attribute(a) if a.key.as_str() == "iterator" => match &a.expr {
                hcl::Expression::String(s) => Some(s.clone()),
                hcl::Expression::Variable(v) => Some(v.as_str().to_string()),
                _ => None,
            },
            _ => None,
        })
        .unwrap_or_else(|| target_name.clone());

    let content_block = b.body.iter().find_map(|s| match s {
        hcl::Structure::Block(inner) if inner.identifier.as_str() == "content" => Some(inner),
        _ => None,
    });
    let Some(content_block) = content_block else {
        return Ok(String::new());
    };
    let Some(for_each_expr) = for_each_expr else {
        return Err(TmError::SchemaError {
            file: file.to_path_buf(),
            message: "tm_dynamic requires a for_each attribute".to_string(),
            range: None,
        });
    };

    let collection = crate::core::eval::eval(&for_each_expr, ctx, file)?;
    let entries: Vec<(Value, Value)> = match &collection {
        Value::List(items) => items
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, v)| (Value::int(i as i64), v))
            .collect(),
        Value::Map(m) => m.iter().map(|(k, v)| (Value::string(k.clone()), v.clone())).collect(),
        _ => Vec::new(),
    };

    let mut out = String::new();
    for (key, value) in entries {
        let mut iter_map = crate::core::value::ValueMap::new();
        iter_map.insert("key", key);
        iter_map.insert("value", value);
        let child_ctx = ctx.clone().with(iterator_name.clone(), Value::Map(iter_map));
        let body = render_body(&content_block.body, &child_ctx, file)?;
        out.push_str(&format!("{target_name} {{\n{body}}}\n"));
    }
    Ok(out)
}

/// Serialize a [`Value`] as an HCL literal suitable for an attribute's
/// right-hand side. Unlike `Value`'s `Display` (plain, unquoted text meant
/// for error messages and globals debug output) this quotes strings and
/// nests lists/maps as real HCL expressions.
fn literal(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Unknown => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(m) => {
            let inner: Vec<String> = m.iter().map(|(k, v)| format!("{k} = {}", literal(v))).collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// The evaluation context for a `context = root` block: just `global`,
/// evaluated at the project root's own scope — there's no enclosing
/// stack to expose under `terramate.stack`.
fn root_eval_context(tree: &ConfigTree) -> EvalContext {
    let global = crate::core::globals::evaluate(tree, &ProjectPath::root()).unwrap_or(Value::Unknown);
    EvalContext::new().with("global", global)
}

fn stack_eval_context(tree: &ConfigTree, stack_dir: &ProjectPath) -> EvalContext {
    let global = crate::core::globals::evaluate(tree, stack_dir).unwrap_or(Value::Unknown);
    let mut ctx = EvalContext::new().with("global", global);
    let mut terramate = crate::core::value::ValueMap::new();
    let mut stack_map = crate::core::value::ValueMap::new();
    stack_map.insert("path", Value::string(stack_dir.as_str()));
    stack_map.insert("name", Value::string(stack_dir.basename()));
    terramate.insert("stack", Value::Map(stack_map));
    ctx.set("terramate", Value::Map(terramate));
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn build(files: &[(&str, &str)]) -> (tempfile::TempDir, ConfigTree) {
        let dir = tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
        }
        let result = crate::core::loader::load(dir.path());
        (dir, result.tree)
    }

    #[test]
    fn condition_false_sweeps_previously_generated_file_s3() {
        let (dir, tree) = build(&[(
            "s/stack.tm",
            "stack {}\ngenerate_file \"f\" {\n  condition = true\n  content = \"x\"\n}\n",
        )]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert!(report.errors.is_empty());
        let target = dir.path().join("s/f");
        assert!(target.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), format!("{}\n{}", MAGIC_HEADER_SLASH, "x"));

        fs::write(
            dir.path().join("s/stack.tm"),
            "stack {}\ngenerate_file \"f\" {\n  condition = false\n  content = \"x\"\n}\n",
        )
        .unwrap();
        let result = crate::core::loader::load(dir.path());
        let report = generate_all(&result.tree, dir.path(), HeaderStyle::Slash);
        assert!(!target.exists());
        assert!(report.outcomes.iter().any(|o| matches!(o, FileOutcome::Deleted(_))));
    }

    #[test]
    fn regenerating_unchanged_content_is_a_no_op() {
        let (dir, tree) = build(&[(
            "s/stack.tm",
            "stack {}\ngenerate_file \"f\" {\n  content = \"x\"\n}\n",
        )]);
        generate_all(&tree, dir.path(), HeaderStyle::Slash);
        let second = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert!(second.outcomes.iter().all(|o| matches!(o, FileOutcome::Unchanged(_))));
    }

    #[test]
    fn refuses_to_overwrite_manual_file() {
        let (dir, tree) = build(&[(
            "s/stack.tm",
            "stack {}\ngenerate_file \"f\" {\n  content = \"x\"\n}\n",
        )]);
        fs::write(dir.path().join("s/f"), "hand written").unwrap();
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].1.kind(), "ManualCodeExists");
    }

    #[test]
    fn generate_hcl_renders_nested_content_block() {
        let (dir, tree) = build(&[(
            "s/stack.tm",
            "stack {}\ngenerate_hcl \"out.tf\" {\n  content {\n    resource \"aws_instance\" \"main\" {\n      ami = \"abc\"\n    }\n  }\n}\n",
        )]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert!(report.errors.is_empty());
        let written = fs::read_to_string(dir.path().join("s/out.tf")).unwrap();
        assert!(written.contains("resource \"aws_instance\" \"main\""));
        assert!(written.contains("ami = \"abc\""));
    }

    #[test]
    fn tm_dynamic_expands_one_block_per_for_each_entry() {
        let (dir, tree) = build(&[(
            "s/stack.tm",
            concat!(
                "stack {}\n",
                "generate_hcl \"out.tf\" {\n",
                "  content {\n",
                "    resource \"aws_instance\" \"main\" {\n",
                "      tm_dynamic \"tag\" {\n",
                "        for_each = [\"a\", \"b\"]\n",
                "        content {\n",
                "          value = tag.value\n",
                "        }\n",
                "      }\n",
                "    }\n",
                "  }\n",
                "}\n",
            ),
        )]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert!(report.errors.is_empty());
        let written = fs::read_to_string(dir.path().join("s/out.tf")).unwrap();
        assert_eq!(written.matches("tag {").count(), 2);
        assert!(written.contains("value = \"a\""));
        assert!(written.contains("value = \"b\""));
    }

    #[test]
    fn root_context_block_generates_once_outside_stacks() {
        let (dir, tree) = build(&[
            ("stack.tm", "generate_file \"shared.txt\" {\n  context = root\n  content = \"shared\"\n}\n"),
            ("s/stack.tm", "stack {}\n"),
        ]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let target = dir.path().join("shared.txt");
        assert!(target.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), format!("{}\n{}", MAGIC_HEADER_SLASH, "shared"));
    }

    #[test]
    fn root_context_label_cannot_resolve_into_a_stack() {
        let (dir, tree) = build(&[
            ("stack.tm", "generate_file \"s/leak.txt\" {\n  context = root\n  content = \"x\"\n}\n"),
            ("s/stack.tm", "stack {}\n"),
        ]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].1.kind(), "InvalidGenBlockLabel");
        assert!(!dir.path().join("s/leak.txt").exists());
    }

    #[test]
    fn stack_label_cannot_resolve_into_a_descendant_stack() {
        let (dir, tree) = build(&[
            ("a/stack.tm", "stack {}\ngenerate_file \"child/leak.txt\" {\n  content = \"x\"\n}\n"),
            ("a/child/stack.tm", "stack {}\n"),
        ]);
        let report = generate_all(&tree, dir.path(), HeaderStyle::Slash);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].1.kind(), "InvalidGenBlockLabel");
        assert!(!dir.path().join("a/child/leak.txt").exists());
    }
}
