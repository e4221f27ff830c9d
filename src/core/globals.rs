//! Produces the fully evaluated `global` namespace for any stack
//! directory.
//!
//! A *globals statement* is `(scope, origin-ref, expression)`. Statements
//! are collected along the scope chain root → stack, built into a
//! dependency graph keyed by the reference each statement *provides*, and
//! evaluated in topological order so that later statements can reference
//! earlier ones regardless of declaration order.

use std::collections::{HashMap, HashSet};

use rustc_hash::FxHashMap;

use crate::core::error::{Result, TmError};
use crate::core::eval::{eval, EvalContext};
use crate::core::hcl::{RawBlock, SourceRange};
use crate::core::path::ProjectPath;
use crate::core::tree::ConfigTree;
use crate::core::value::{Value, ValueMap};

/// One `(origin-ref, expression)` pair contributed by a `globals` block.
#[derive(Debug, Clone)]
pub struct Statement {
    pub scope: ProjectPath,
    /// The full dotted path this statement writes to: block labels
    /// followed by the attribute name.
    pub origin: Vec<String>,
    pub expr: hcl::Expression,
    pub range: SourceRange,
}

impl Statement {
    fn origin_key(&self) -> String {
        self.origin.join(".")
    }
}

/// Collect every globals statement visible from `stack_dir`'s scope
/// chain, deeper scopes overriding shallower ones that share an
/// origin-ref. Two statements contributed by the *same* scope for the
/// same origin-ref never override one another — that's a conflict.
pub fn collect_statements(tree: &ConfigTree, stack_dir: &ProjectPath) -> Result<Vec<Statement>> {
    let mut by_origin: HashMap<String, Statement> = HashMap::new();
    for node in tree.scope_chain(stack_dir) {
        let mut seen_in_scope: HashSet<String> = HashSet::new();
        for block in &node.globals_blocks {
            for stmt in statements_from_block(node.dir.clone(), block) {
                let key = stmt.origin_key();
                if !seen_in_scope.insert(key.clone()) {
                    return Err(TmError::ConflictingConfig {
                        message: format!("two globals statements in {:?} target the same reference {:?}", node.dir.as_str(), key),
                        range: Some(stmt.range.clone()),
                    });
                }
                by_origin.insert(key, stmt);
            }
        }
    }
    let mut out: Vec<Statement> = by_origin.into_values().collect();
    out.sort_by(|a, b| (a.origin_key(), a.scope.as_str().len()).cmp(&(b.origin_key(), b.scope.as_str().len())));
    Ok(out)
}

fn statements_from_block(scope: ProjectPath, block: &RawBlock) -> Vec<Statement> {
    let labels: Vec<String> = block.block.labels.iter().map(|l| l.as_str().to_string()).collect();
    let mut out = Vec::new();
    collect_attrs(&block.block.body, &labels, &scope, &block.range, &mut out);
    out
}

fn collect_attrs(
    body: &hcl::Body,
    prefix: &[String],
    scope: &ProjectPath,
    range: &SourceRange,
    out: &mut Vec<Statement>,
) {
    for structure in body.iter() {
        match structure {
            hcl::Structure::Attribute(attr) => {
                let mut origin = prefix.to_vec();
                origin.push(attr.key.as_str().to_string());
                out.push(Statement {
                    scope: scope.clone(),
                    origin,
                    expr: attr.expr.clone(),
                    range: range.clone(),
                });
            }
            hcl::Structure::Block(inner) => {
                // A nested `map`/sub-block under `globals` extends the
                // origin-ref prefix; treated as an object constructor whose
                // attributes are the map entries.
                let mut sub_prefix = prefix.to_vec();
                sub_prefix.push(inner.identifier.as_str().to_string());
                collect_attrs(&inner.body, &sub_prefix, scope, range, out);
            }
        }
    }
}

/// Evaluate the effective `global.*` value visible at `stack_dir`.
pub fn evaluate(tree: &ConfigTree, stack_dir: &ProjectPath) -> Result<Value> {
    let statements = collect_statements(tree, stack_dir)?;
    let order = topological_order(&statements)?;

    let mut resolved: FxHashMap<String, Value> = FxHashMap::default();
    for idx in order {
        let stmt = &statements[idx];
        let ctx = EvalContext::new().with("global", build_partial_global(&resolved));
        let value = eval(&stmt.expr, &ctx, &stmt.range.file)?;
        write_origin(&mut resolved, &stmt.origin, value);
    }

    Ok(build_partial_global(&resolved))
}

/// Assemble the flat `origin-ref -> Value` map back into a nested
/// `global` object, materializing intermediate keys for multi-segment
/// origins (the "labels implicitly materialize intermediate object keys"
/// edge policy).
fn build_partial_global(resolved: &FxHashMap<String, Value>) -> Value {
    let mut root = Value::Map(ValueMap::new());
    let mut entries: Vec<(&String, &Value)> = resolved.iter().collect();
    entries.sort_by_key(|(k, _)| k.len());
    for (origin_key, value) in entries {
        let path: Vec<&str> = origin_key.split('.').collect();
        root = set_path(root, &path, value.clone());
    }
    root
}

fn write_origin(resolved: &mut FxHashMap<String, Value>, origin: &[String], value: Value) {
    resolved.insert(origin.join("."), value);
}

fn set_path(root: Value, path: &[&str], value: Value) -> Value {
    if path.is_empty() {
        return value;
    }
    let mut map = match root {
        Value::Map(m) => m,
        _ => ValueMap::new(),
    };
    if path.len() == 1 {
        let merged = match map.get(path[0]) {
            Some(existing) => existing.clone().merge_into(value),
            None => value,
        };
        map.insert(path[0], merged);
    } else {
        let existing = map.get(path[0]).cloned().unwrap_or(Value::Map(ValueMap::new()));
        let merged = set_path(existing, &path[1..], value);
        map.insert(path[0], merged);
    }
    Value::Map(map)
}

/// Order statement indices so that a statement providing a shorter
/// origin-ref (a prefix of another) evaluates first, and any statement
/// referencing another's origin-ref evaluates after it. Cycles are a
/// fatal [`TmError::CycleError`].
fn topological_order(statements: &[Statement]) -> Result<Vec<usize>> {
    let n = statements.len();
    let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); n];

    for (i, stmt) in statements.iter().enumerate() {
        for (j, other) in statements.iter().enumerate() {
            if i == j {
                continue;
            }
            if is_prefix(&other.origin, &stmt.origin) && other.origin.len() < stmt.origin.len() {
                edges[i].insert(j);
            }
            if references(&stmt.expr, &other.origin_key()) {
                edges[i].insert(j);
            }
        }
    }

    let mut visited = vec![0u8; n]; // 0=unvisited, 1=in-progress, 2=done
    let mut order = Vec::with_capacity(n);
    let mut stack_trace = Vec::new();

    fn visit(
        i: usize,
        statements: &[Statement],
        edges: &[HashSet<usize>],
        visited: &mut [u8],
        order: &mut Vec<usize>,
        trace: &mut Vec<usize>,
    ) -> Result<()> {
        match visited[i] {
            2 => return Ok(()),
            1 => {
                let cycle: Vec<String> = trace
                    .iter()
                    .skip_while(|&&x| x != i)
                    .map(|&x| statements[x].origin.join("."))
                    .collect();
                return Err(TmError::CycleError {
                    description: format!("globals cycle: {}", cycle.join(" -> ")),
                });
            }
            _ => {}
        }
        visited[i] = 1;
        trace.push(i);
        let mut deps: Vec<usize> = edges[i].iter().copied().collect();
        deps.sort();
        for dep in deps {
            visit(dep, statements, edges, visited, order, trace)?;
        }
        trace.pop();
        visited[i] = 2;
        order.push(i);
        Ok(())
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by_key(|&i| (statements[i].origin.len(), statements[i].scope.as_str().len()));
    for i in indices {
        visit(i, statements, &edges, &mut visited, &mut order, &mut stack_trace)?;
    }
    Ok(order)
}

fn is_prefix(shorter: &[String], longer: &[String]) -> bool {
    shorter.len() <= longer.len() && shorter.iter().zip(longer.iter()).all(|(a, b)| a == b)
}

/// Does `expr` depend on the `global.<origin_key>` reference? Walks the
/// expression tree the same way `eval.rs` does, collecting every
/// `global.*` traversal's dotted path, and reports a dependency if either
/// path is a prefix of the other (referencing `global.a` depends on
/// everything under `a`; referencing `global.a.b` depends on whatever
/// produces the `a` object even when `origin_key` is just `"a"`).
fn references(expr: &hcl::Expression, origin_key: &str) -> bool {
    let origin_path: Vec<&str> = origin_key.split('.').collect();
    let mut refs = Vec::new();
    collect_global_refs(expr, &mut refs);
    refs.iter().any(|path| {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        is_prefix(&origin_path, &path) || is_prefix(&path, &origin_path)
    })
}

/// Collect the dotted path of every `global.*` traversal reachable from
/// `expr`, recursing into every sub-expression position the evaluator
/// itself walks.
fn collect_global_refs(expr: &hcl::Expression, out: &mut Vec<Vec<String>>) {
    match expr {
        hcl::Expression::Traversal(t) => {
            if let Some(path) = global_traversal_path(t) {
                out.push(path);
            } else {
                collect_global_refs(&t.expr, out);
            }
            for op in &t.operators {
                if let hcl::expr::TraversalOperator::Index(e) = op {
                    collect_global_refs(e, out);
                }
            }
        }
        hcl::Expression::Array(items) => {
            for item in items {
                collect_global_refs(item, out);
            }
        }
        hcl::Expression::Object(obj) => {
            for (k, v) in obj.iter() {
                if let hcl::ObjectKey::Expression(e) = k {
                    collect_global_refs(e, out);
                }
                collect_global_refs(v, out);
            }
        }
        hcl::Expression::Parenthesis(inner) => collect_global_refs(inner, out),
        hcl::Expression::Conditional(cond) => {
            collect_global_refs(&cond.cond_expr, out);
            collect_global_refs(&cond.true_expr, out);
            collect_global_refs(&cond.false_expr, out);
        }
        hcl::Expression::Operation(op) => match op {
            hcl::expr::Operation::Unary(u) => collect_global_refs(&u.expr, out),
            hcl::expr::Operation::Binary(b) => {
                collect_global_refs(&b.lhs_expr, out);
                collect_global_refs(&b.rhs_expr, out);
            }
        },
        hcl::Expression::ForExpr(for_expr) => {
            collect_global_refs(&for_expr.collection_expr, out);
            if let Some(cond) = &for_expr.cond_expr {
                collect_global_refs(cond, out);
            }
            if let Some(key_expr) = &for_expr.key_expr {
                collect_global_refs(key_expr, out);
            }
            collect_global_refs(&for_expr.value_expr, out);
        }
        hcl::Expression::FuncCall(call) => {
            for arg in &call.args {
                collect_global_refs(arg, out);
            }
        }
        hcl::Expression::TemplateExpr(tpl) => {
            for element in tpl.elements() {
                if let hcl::template::Element::Interpolation(interp) = element {
                    collect_global_refs(&interp.expr, out);
                }
            }
        }
        _ => {}
    }
}

/// If `t` is a traversal rooted at the `global` variable, its dotted
/// `GetAttr` path (stopping at the first non-attribute operator, since an
/// index expression's own references are walked separately).
fn global_traversal_path(t: &hcl::expr::Traversal) -> Option<Vec<String>> {
    if !matches!(&t.expr, hcl::Expression::Variable(v) if v.as_str() == "global") {
        return None;
    }
    let mut path = Vec::new();
    for op in &t.operators {
        match op {
            hcl::expr::TraversalOperator::GetAttr(ident) => path.push(ident.as_str().to_string()),
            _ => break,
        }
    }
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hcl::parse_file;
    use std::fs;
    use tempfile::tempdir;

    fn load_tree(files: &[(&str, &str)]) -> (tempfile::TempDir, ConfigTree) {
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
    fn global_inheritance_s1() {
        let (_dir, tree) = load_tree(&[
            ("root.tm", "globals {\n  a = 1\n}\n"),
            ("child/child.tm", "globals {\n  b = global.a\n}\nstack {}\n"),
        ]);
        let value = evaluate(&tree, &ProjectPath::new("/child")).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::int(1)));
        assert_eq!(map.get("b"), Some(&Value::int(1)));
    }

    #[test]
    fn origin_ref_merge_s2() {
        let (_dir, tree) = load_tree(&[(
            "root.tm",
            "globals \"a\" \"b\" {\n  c = { d = 1 }\n}\nglobals {\n  a = { b = { c = { e = 2 } } }\n}\nstack {}\n",
        )]);
        let value = evaluate(&tree, &ProjectPath::root()).unwrap();
        let a = value.as_map().unwrap().get("a").unwrap().as_map().unwrap();
        let b = a.get("b").unwrap().as_map().unwrap();
        let c = b.get("c").unwrap().as_map().unwrap();
        assert_eq!(c.get("d"), Some(&Value::int(1)));
        assert_eq!(c.get("e"), Some(&Value::int(2)));
    }

    #[test]
    fn same_scope_duplicate_origin_ref_is_a_conflict() {
        let (_dir, tree) = load_tree(&[(
            "root.tm",
            "globals {\n  a = 1\n}\nglobals {\n  a = 2\n}\nstack {}\n",
        )]);
        let err = evaluate(&tree, &ProjectPath::root()).unwrap_err();
        assert_eq!(err.kind(), "ConflictingConfig");
    }

    #[test]
    fn deeper_scope_still_overrides_a_shallower_same_origin_statement() {
        let (_dir, tree) = load_tree(&[
            ("root.tm", "globals {\n  a = 1\n}\n"),
            ("child/child.tm", "globals {\n  a = 2\n}\nstack {}\n"),
        ]);
        let value = evaluate(&tree, &ProjectPath::new("/child")).unwrap();
        assert_eq!(value.as_map().unwrap().get("a"), Some(&Value::int(2)));
    }

    fn attr_expr(source: &str, key: &str) -> hcl::Expression {
        let body: hcl::Body = hcl::from_str(source).unwrap();
        body.iter()
            .find_map(|s| match s {
                hcl::Structure::Attribute(a) if a.key.as_str() == key => Some(a.expr.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn string_literal_matching_an_origin_name_is_not_a_reference() {
        let expr = attr_expr("x = \"b\"\n", "x");
        assert!(!references(&expr, "b"));
    }

    #[test]
    fn traversal_reference_is_detected_by_ast_not_substring() {
        let expr = attr_expr("x = global.b\n", "x");
        assert!(references(&expr, "b"));
        assert!(!references(&expr, "c"));
    }

    #[test]
    fn _unused_parse_file_import_check() {
        let _ = parse_file;
    }
}
