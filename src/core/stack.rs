//! Stack model.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::eval::EvalContext;
use crate::core::path::ProjectPath;
use crate::core::tree::ConfigTree;
use crate::core::value::Value;

/// A stack identifier. Display/storage preserve the original case; `Eq`
/// and `Hash` fold to lowercase so `ABC123` and `abc123` are the same
/// stack id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackId(String);

impl StackId {
    pub fn new(raw: impl Into<String>) -> Self {
        StackId(raw.into())
    }

    /// Generate a fresh random id (v4 UUID), used the first time `create`
    /// needs an id and none was supplied.
    pub fn generate() -> Self {
        StackId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased form used for equality, hashing, and sort order.
    pub fn fold(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for StackId {
    fn eq(&self, other: &Self) -> bool {
        self.fold() == other.fold()
    }
}
impl Eq for StackId {}

impl std::hash::Hash for StackId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.fold().hash(state);
    }
}

impl PartialOrd for StackId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for StackId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fold().cmp(&other.fold())
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tag: lowercase only, dots allowed, no leading digit, no trailing
/// hyphen.
pub fn validate_tag(tag: &str) -> bool {
    static PATTERN: &str = r"^[a-z_][a-z0-9_.-]*[a-z0-9_.]$|^[a-z_]$";
    Regex::new(PATTERN).unwrap().is_match(tag)
}

/// A reference to another stack, either by project path or by `tag:NAME`,
/// used in `before`/`after`/`wants`/`wanted_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackRef {
    Path(String),
    Tag(String),
}

impl StackRef {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("tag:") {
            Some(tag) => StackRef::Tag(tag.to_string()),
            None => StackRef::Path(raw.to_string()),
        }
    }

    /// Resolve this reference against the full stack set, returning the
    /// project paths of every matching stack.
    pub fn resolve<'a>(&self, stacks: &'a [Stack]) -> Vec<&'a ProjectPath> {
        match self {
            StackRef::Path(p) => {
                let target = ProjectPath::new(p);
                stacks.iter().filter(|s| s.dir == target).map(|s| &s.dir).collect()
            }
            StackRef::Tag(tag) => stacks
                .iter()
                .filter(|s| s.tags.contains(tag))
                .map(|s| &s.dir)
                .collect(),
        }
    }
}

/// A stack: a directory declaring a `stack {}` block.
#[derive(Debug, Clone)]
pub struct Stack {
    pub dir: ProjectPath,
    pub id: StackId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub before: Vec<StackRef>,
    pub after: Vec<StackRef>,
    pub wants: Vec<StackRef>,
    pub wanted_by: Vec<StackRef>,
    pub watch: Vec<ProjectPath>,
}

impl Stack {
    pub fn new(dir: ProjectPath) -> Self {
        let name = dir.basename().to_string();
        Stack {
            id: StackId::generate(),
            name,
            description: String::new(),
            tags: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            wants: Vec::new(),
            wanted_by: Vec::new(),
            watch: Vec::new(),
            dir,
        }
    }

    /// True if `self`'s directory is a strict ancestor of `other`'s.
    pub fn is_parent_of(&self, other: &Stack) -> bool {
        self.dir.is_ancestor_of(&other.dir)
    }
}

/// Parse every `stack {}` block in `tree` into a [`Stack`], generating a
/// fresh id the first time one is missing.
pub fn build_stacks(tree: &ConfigTree) -> Vec<Stack> {
    let mut stacks: Vec<Stack> = Vec::new();
    for node in tree.nodes.values() {
        let Some(block) = node.stack_blocks.first() else { continue };
        let mut stack = Stack::new(node.dir.clone());
        let ctx = EvalContext::new();

        if let Some(id) = string_attr(&block.block.body, "id", &ctx, &block.file) {
            stack.id = StackId::new(id);
        }
        if let Some(name) = string_attr(&block.block.body, "name", &ctx, &block.file) {
            stack.name = name;
        }
        if let Some(desc) = string_attr(&block.block.body, "description", &ctx, &block.file) {
            stack.description = desc;
        }
        stack.tags = string_list_attr(&block.block.body, "tags", &ctx, &block.file);
        stack.before = string_list_attr(&block.block.body, "before", &ctx, &block.file)
            .into_iter()
            .map(|s| StackRef::parse(&s))
            .collect();
        stack.after = string_list_attr(&block.block.body, "after", &ctx, &block.file)
            .into_iter()
            .map(|s| StackRef::parse(&s))
            .collect();
        stack.wants = string_list_attr(&block.block.body, "wants", &ctx, &block.file)
            .into_iter()
            .map(|s| StackRef::parse(&s))
            .collect();
        stack.wanted_by = string_list_attr(&block.block.body, "wanted_by", &ctx, &block.file)
            .into_iter()
            .map(|s| StackRef::parse(&s))
            .collect();
        stack.watch = string_list_attr(&block.block.body, "watch", &ctx, &block.file)
            .into_iter()
            .map(|s| ProjectPath::new(&s))
            .collect();

        stacks.push(stack);
    }
    stacks.sort_by(|a, b| a.dir.cmp(&b.dir));
    stacks
}

fn string_attr(body: &hcl::Body, key: &str, ctx: &EvalContext, file: &std::path::Path) -> Option<String> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => {
            crate::core::eval::eval(&a.expr, ctx, file).ok().and_then(|v| match v {
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
        }
        _ => None,
    })
}

fn string_list_attr(body: &hcl::Body, key: &str, ctx: &EvalContext, file: &std::path::Path) -> Vec<String> {
    body.iter()
        .find_map(|s| match s {
            hcl::Structure::Attribute(a) if a.key.as_str() == key => {
                crate::core::eval::eval(&a.expr, ctx, file).ok()
            }
            _ => None,
        })
        .and_then(|v| match v {
            Value::List(items) => Some(
                items
                    .into_iter()
                    .filter_map(|i| match i {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_id_equality_is_case_insensitive_but_preserves_display() {
        let a = StackId::new("ABC123");
        let b = StackId::new("abc123");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ABC123");
    }

    #[test]
    fn tag_rejects_leading_digit_and_trailing_hyphen() {
        assert!(validate_tag("db"));
        assert!(validate_tag("prod_east"));
        assert!(!validate_tag("1db"));
        assert!(!validate_tag("db-"));
    }

    #[test]
    fn tag_allows_dots_and_rejects_uppercase() {
        assert!(validate_tag("env.prod"));
        assert!(!validate_tag("Prod"));
    }

    #[test]
    fn stack_ref_parses_tag_prefix() {
        assert_eq!(StackRef::parse("tag:db"), StackRef::Tag("db".to_string()));
        assert_eq!(StackRef::parse("/a/b"), StackRef::Path("/a/b".to_string()));
    }

    #[test]
    fn tag_resolves_to_matching_stacks() {
        let mut a = Stack::new(ProjectPath::new("/a"));
        a.tags.push("db".to_string());
        let b = Stack::new(ProjectPath::new("/b"));
        let stacks = vec![a, b];
        let refs = StackRef::Tag("db".to_string()).resolve(&stacks);
        assert_eq!(refs, vec![&ProjectPath::new("/a")]);
    }

    #[test]
    fn build_stacks_parses_tags_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("stack.tm"),
            "stack {\n  name = \"web\"\n  tags = [\"db\", \"prod\"]\n}\n",
        )
        .unwrap();
        let result = crate::core::loader::load(dir.path());
        let stacks = build_stacks(&result.tree);
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].name, "web");
        assert_eq!(stacks[0].tags, vec!["db".to_string(), "prod".to_string()]);
    }
}
