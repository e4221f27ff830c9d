//! Run DAG construction: vertices are candidate stacks, edges come from
//! `before`/`after`/nesting/output-sharing, and the graph must be acyclic
//! before the scheduler will dispatch anything.

use std::collections::{HashMap, HashSet};

use crate::core::error::{Result, TmError};
use crate::core::path::ProjectPath;
use crate::core::stack::Stack;

#[derive(Debug, Default, Clone)]
pub struct RunDag {
    pub stacks: Vec<ProjectPath>,
    /// `edges[a]` is the set of stacks that must complete before `a` runs.
    edges: HashMap<ProjectPath, HashSet<ProjectPath>>,
}

impl RunDag {
    pub fn predecessors(&self, dir: &ProjectPath) -> &HashSet<ProjectPath> {
        static EMPTY: std::sync::OnceLock<HashSet<ProjectPath>> = std::sync::OnceLock::new();
        self.edges.get(dir).unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }
}

/// Build the DAG for `candidates` (a subset of `all_stacks`, e.g. the
/// changed set). `before(S)` becomes an edge `S -> T` (T waits on S) for
/// each resolved `T`; `after(S)` becomes `T -> S`. Nested stacks add an
/// implicit parent-before-child edge.
pub fn build(all_stacks: &[Stack], candidates: &[ProjectPath]) -> Result<RunDag> {
    let candidate_set: HashSet<&ProjectPath> = candidates.iter().collect();
    let mut edges: HashMap<ProjectPath, HashSet<ProjectPath>> = HashMap::new();
    for c in candidates {
        edges.entry(c.clone()).or_default();
    }

    let by_dir: HashMap<&ProjectPath, &Stack> = all_stacks.iter().map(|s| (&s.dir, s)).collect();

    for stack in all_stacks {
        if !candidate_set.contains(&stack.dir) {
            continue;
        }
        for before_ref in &stack.before {
            for target in before_ref.resolve(all_stacks) {
                if candidate_set.contains(target) {
                    edges.entry(target.clone()).or_default().insert(stack.dir.clone());
                }
            }
        }
        for after_ref in &stack.after {
            for target in after_ref.resolve(all_stacks) {
                if candidate_set.contains(target) {
                    edges.entry(stack.dir.clone()).or_default().insert(target.clone());
                }
            }
        }
        if let Some(parent_dir) = stack.dir.parent() {
            if let Some(parent) = by_dir.get(&parent_dir) {
                if candidate_set.contains(&parent.dir) {
                    edges.entry(stack.dir.clone()).or_default().insert(parent.dir.clone());
                }
            }
        }
    }

    validate_acyclic(&edges)?;

    let mut stacks: Vec<ProjectPath> = candidates.to_vec();
    stacks.sort();
    Ok(RunDag { stacks, edges })
}

fn validate_acyclic(edges: &HashMap<ProjectPath, HashSet<ProjectPath>>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        InProgress,
        Done,
    }
    let mut state: HashMap<ProjectPath, State> = edges.keys().map(|k| (k.clone(), State::Unvisited)).collect();
    let mut trace = Vec::new();

    fn visit(
        node: &ProjectPath,
        edges: &HashMap<ProjectPath, HashSet<ProjectPath>>,
        state: &mut HashMap<ProjectPath, State>,
        trace: &mut Vec<ProjectPath>,
    ) -> Result<()> {
        match state.get(node).copied().unwrap_or(State::Unvisited) {
            State::Done => return Ok(()),
            State::InProgress => {
                let cycle: Vec<String> = trace
                    .iter()
                    .skip_while(|n| *n != node)
                    .map(|n| n.to_string())
                    .collect();
                return Err(TmError::CycleError {
                    description: format!("run order cycle: {}", cycle.join(" -> ")),
                });
            }
            State::Unvisited => {}
        }
        state.insert(node.clone(), State::InProgress);
        trace.push(node.clone());
        if let Some(deps) = edges.get(node) {
            let mut deps: Vec<&ProjectPath> = deps.iter().collect();
            deps.sort();
            for dep in deps {
                visit(dep, edges, state, trace)?;
            }
        }
        trace.pop();
        state.insert(node.clone(), State::Done);
        Ok(())
    }

    let mut nodes: Vec<ProjectPath> = edges.keys().cloned().collect();
    nodes.sort();
    for node in &nodes {
        visit(node, edges, &mut state, &mut trace)?;
    }
    Ok(())
}

/// A deterministic topological order, tie-broken lexicographically by
/// project path. `reverse` reverses the finished order (not the edges).
pub fn topological_order(dag: &RunDag, reverse: bool) -> Vec<ProjectPath> {
    let mut remaining: HashMap<ProjectPath, usize> = dag
        .stacks
        .iter()
        .map(|s| (s.clone(), dag.predecessors(s).len()))
        .collect();
    let mut order = Vec::with_capacity(dag.stacks.len());
    let mut ready: Vec<ProjectPath> = remaining.iter().filter(|(_, c)| **c == 0).map(|(s, _)| s.clone()).collect();
    ready.sort();

    let successors: HashMap<&ProjectPath, Vec<&ProjectPath>> = {
        let mut m: HashMap<&ProjectPath, Vec<&ProjectPath>> = HashMap::new();
        for s in &dag.stacks {
            for pred in dag.predecessors(s) {
                m.entry(pred).or_default().push(s);
            }
        }
        m
    };

    while !ready.is_empty() {
        ready.sort();
        let next = ready.remove(0);
        order.push(next.clone());
        if let Some(succs) = successors.get(&next) {
            let mut succs = succs.clone();
            succs.sort();
            for succ in succs {
                if let Some(count) = remaining.get_mut(succ) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(succ.clone());
                    }
                }
            }
        }
    }

    if reverse {
        order.reverse();
    }
    order
}

/// A DAG that's just `order` laid out as a straight line — stack `i`
/// waits only on stack `i-1`. Lets the scheduler be driven off a fixed,
/// precomputed total order (e.g. a reversed topological order) without
/// inventing edges the original DAG never had.
pub fn chain(order: &[ProjectPath]) -> RunDag {
    let mut edges: HashMap<ProjectPath, HashSet<ProjectPath>> = HashMap::new();
    for pair in order.windows(2) {
        let mut preds = HashSet::new();
        preds.insert(pair[0].clone());
        edges.insert(pair[1].clone(), preds);
    }
    if let Some(first) = order.first() {
        edges.entry(first.clone()).or_default();
    }
    RunDag { stacks: order.to_vec(), edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::StackRef;

    fn stack(dir: &str) -> Stack {
        Stack::new(ProjectPath::new(dir))
    }

    #[test]
    fn run_order_with_tags_s5() {
        let mut a = stack("/a");
        a.tags.push("db".to_string());
        let mut b = stack("/b");
        b.after.push(StackRef::Tag("db".to_string()));
        let mut c = stack("/c");
        c.before.push(StackRef::Tag("db".to_string()));

        let stacks = vec![a, b, c];
        let candidates: Vec<ProjectPath> = stacks.iter().map(|s| s.dir.clone()).collect();
        let dag = build(&stacks, &candidates).unwrap();
        let order = topological_order(&dag, false);
        assert_eq!(
            order,
            vec![ProjectPath::new("/c"), ProjectPath::new("/a"), ProjectPath::new("/b")]
        );
        let reversed = topological_order(&dag, true);
        assert_eq!(
            reversed,
            vec![ProjectPath::new("/b"), ProjectPath::new("/a"), ProjectPath::new("/c")]
        );
    }

    #[test]
    fn cycle_is_rejected_s6() {
        let mut x = stack("/x");
        x.after.push(StackRef::Path("/y".to_string()));
        let mut y = stack("/y");
        y.after.push(StackRef::Path("/x".to_string()));
        let stacks = vec![x, y];
        let candidates: Vec<ProjectPath> = stacks.iter().map(|s| s.dir.clone()).collect();
        let err = build(&stacks, &candidates).unwrap_err();
        assert_eq!(err.kind(), "CycleError");
    }
}
