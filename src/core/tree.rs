//! Directory tree of configuration nodes.
//!
//! The [`ConfigTree`] is the config loader's output and everything
//! downstream's input: globals, the stack model, code generation, and
//! scheduling all walk it read-only.

use std::collections::BTreeMap;

use crate::core::hcl::RawBlock;
use crate::core::path::ProjectPath;

/// Everything a single directory in the project contributed, after
/// per-directory block merging (import resolution already applied).
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
    pub dir: ProjectPath,
    pub terramate_blocks: Vec<RawBlock>,
    pub globals_blocks: Vec<RawBlock>,
    pub stack_blocks: Vec<RawBlock>,
    pub generate_blocks: Vec<RawBlock>,
    pub script_blocks: Vec<RawBlock>,
}

impl ConfigNode {
    pub fn new(dir: ProjectPath) -> Self {
        ConfigNode {
            dir,
            ..Default::default()
        }
    }
}

/// The whole project, keyed by project path. Nodes for directories that
/// contained no matching configuration files are omitted; callers that
/// need "every directory under X" should derive it from the stack set
/// plus explicit ancestors instead of iterating this map directly.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    pub nodes: BTreeMap<ProjectPath, ConfigNode>,
}

impl ConfigTree {
    pub fn new() -> Self {
        ConfigTree::default()
    }

    pub fn node(&self, dir: &ProjectPath) -> Option<&ConfigNode> {
        self.nodes.get(dir)
    }

    pub fn node_mut(&mut self, dir: &ProjectPath) -> &mut ConfigNode {
        self.nodes.entry(dir.clone()).or_insert_with(|| ConfigNode::new(dir.clone()))
    }

    /// Every node on the path from the project root down to (and
    /// including) `dir`, in root-to-leaf order — the scope chain globals
    /// evaluation and config-merge rules walk.
    pub fn scope_chain(&self, dir: &ProjectPath) -> Vec<&ConfigNode> {
        let mut chain: Vec<&ConfigNode> = Vec::new();
        for ancestor in dir.ancestors() {
            if let Some(n) = self.nodes.get(&ancestor) {
                chain.push(n);
            }
        }
        if let Some(n) = self.nodes.get(dir) {
            chain.push(n);
        }
        chain
    }

    /// Every directory whose node declares a `stack {}` block.
    pub fn stack_dirs(&self) -> Vec<ProjectPath> {
        self.nodes
            .values()
            .filter(|n| !n.stack_blocks.is_empty())
            .map(|n| n.dir.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_is_root_to_leaf() {
        let mut tree = ConfigTree::new();
        tree.node_mut(&ProjectPath::root());
        tree.node_mut(&ProjectPath::new("/a"));
        tree.node_mut(&ProjectPath::new("/a/b"));

        let chain = tree.scope_chain(&ProjectPath::new("/a/b"));
        let dirs: Vec<_> = chain.iter().map(|n| n.dir.as_str()).collect();
        assert_eq!(dirs, vec!["/", "/a", "/a/b"]);
    }

    #[test]
    fn scope_chain_skips_directories_with_no_node() {
        let mut tree = ConfigTree::new();
        tree.node_mut(&ProjectPath::root());
        tree.node_mut(&ProjectPath::new("/a/b"));
        let chain = tree.scope_chain(&ProjectPath::new("/a/b"));
        let dirs: Vec<_> = chain.iter().map(|n| n.dir.as_str()).collect();
        assert_eq!(dirs, vec!["/", "/a/b"]);
    }
}
