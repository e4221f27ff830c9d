//! Change detection.
//!
//! A stack is changed if the VCS diff touches a file inside it, or inside
//! a Terraform module / Terragrunt dependency it references, transitively.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::error::Result;
use crate::core::path::ProjectPath;
use crate::core::tree::ConfigTree;
use crate::core::vcs::VcsClient;

/// A changed stack plus a human-readable reason (used by S4's "mentions
/// modules/m1 and ../m2" expectation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedStack {
    pub dir: ProjectPath,
    pub reasons: Vec<String>,
}

/// Compute the changed-stack set for every stack in `tree`, given a VCS
/// diff between `from` and `to` plus optional uncommitted/untracked status.
pub fn detect(
    tree: &ConfigTree,
    fs_root: &Path,
    vcs: &dyn VcsClient,
    from: &str,
    to: &str,
    include_untracked: bool,
    include_uncommitted: bool,
) -> Result<Vec<ChangedStack>> {
    let mut diff: HashSet<String> = vcs.diff_name_only(from, to)?.into_iter().collect();
    if include_untracked || include_uncommitted {
        for entry in vcs.status(include_untracked, include_uncommitted)? {
            diff.insert(entry.path);
        }
    }

    let stacks = tree.stack_dirs();
    let mut out = Vec::new();

    for stack in &stacks {
        let mut reasons = Vec::new();
        let stack_fs = stack.to_fs(fs_root);

        for path in &diff {
            let abs = fs_root.join(path);
            if abs.starts_with(&stack_fs) {
                reasons.push(format!("{path} is inside the stack"));
            }
        }

        let closure = dependency_closure(&stack_fs, fs_root);
        for path in &diff {
            let abs = fs_root.join(path);
            for chain in &closure {
                let Some(last) = chain.last() else { continue };
                if abs.starts_with(&last.dir) {
                    let rel = last.dir.strip_prefix(fs_root).unwrap_or(&last.dir);
                    let via: Vec<&str> = chain.iter().map(|hop| hop.via.as_str()).collect();
                    reasons.push(format!(
                        "{path} is inside referenced module {} (via {})",
                        rel.display(),
                        via.join(" -> ")
                    ));
                }
            }
        }

        if !reasons.is_empty() {
            out.push(ChangedStack { dir: stack.clone(), reasons });
        }
    }

    Ok(out)
}

/// One hop in a dependency chain: the directory reached, and the local
/// reference string (as written in the `module`/`dependency` block, e.g.
/// `"../modules/m1"`) used to reach it from the previous hop.
#[derive(Debug, Clone)]
struct DependencyHop {
    dir: PathBuf,
    via: String,
}

/// The transitive set of local directories a stack's Terraform `module`
/// blocks and Terragrunt dependency declarations pull in, each paired with
/// the chain of references (stack -> ... -> that directory) that reached
/// it, so callers can report which intermediate modules were traversed.
fn dependency_closure(stack_fs: &Path, fs_root: &Path) -> Vec<Vec<DependencyHop>> {
    let mut visited = HashSet::new();
    let mut queue: Vec<(PathBuf, Vec<DependencyHop>)> = vec![(stack_fs.to_path_buf(), Vec::new())];
    let mut chains = Vec::new();

    while let Some((dir, chain)) = queue.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        for dep in local_module_sources(&dir).into_iter().chain(terragrunt_dependencies(&dir)) {
            let resolved = normalize(&dir.join(&dep));
            if resolved.starts_with(fs_root) && !visited.contains(&resolved) {
                let mut next_chain = chain.clone();
                next_chain.push(DependencyHop { dir: resolved.clone(), via: dep });
                chains.push(next_chain.clone());
                queue.push((resolved, next_chain));
            }
        }
    }
    chains
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Scan every `.tf` file directly in `dir` for `module "x" { source = "..." }`
/// blocks whose source is a local path (starts with `.` or `/`).
fn local_module_sources(dir: &Path) -> Vec<String> {
    let module_re = Regex::new(r#"source\s*=\s*"([^"]+)""#).unwrap();
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else { return out };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tf") {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else { continue };
        for cap in module_re.captures_iter(&content) {
            let source = &cap[1];
            if source.starts_with('.') || source.starts_with('/') {
                out.push(source.to_string());
            }
        }
    }
    out
}

/// Scan `terragrunt.hcl` in `dir` for `dependency`/`dependencies` blocks,
/// `include`, and `find_in_parent_folders()`/`read_terragrunt_config()`/
/// `file(...)` calls, returning the local paths they reference.
fn terragrunt_dependencies(dir: &Path) -> Vec<String> {
    let path = dir.join("terragrunt.hcl");
    let Ok(content) = fs::read_to_string(&path) else { return Vec::new() };
    let mut out = Vec::new();

    let config_path_re = Regex::new(r#"config_path\s*=\s*"([^"]+)""#).unwrap();
    for cap in config_path_re.captures_iter(&content) {
        out.push(cap[1].to_string());
    }

    let find_parent_re = Regex::new(r"find_in_parent_folders\(\)").unwrap();
    if find_parent_re.is_match(&content) {
        out.push("..".to_string());
    }

    let file_re = Regex::new(r#"(?:file|read_terragrunt_config)\("([^"]+)"\)"#).unwrap();
    for cap in file_re.captures_iter(&content) {
        out.push(cap[1].to_string());
    }

    let include_re = Regex::new(r#"path\s*=\s*"([^"]+)""#).unwrap();
    for cap in include_re.captures_iter(&content) {
        out.push(cap[1].to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vcs::FakeVcs;
    use tempfile::tempdir;

    #[test]
    fn stack_changed_via_module_closure_s4() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stack")).unwrap();
        fs::write(dir.path().join("stack/stack.tm"), "stack {}\n").unwrap();
        fs::write(dir.path().join("stack/main.tf"), r#"module "m1" { source = "../modules/m1" }"#).unwrap();

        fs::create_dir_all(dir.path().join("modules/m1")).unwrap();
        fs::write(dir.path().join("modules/m1/main.tf"), r#"module "m2" { source = "../m2" }"#).unwrap();

        fs::create_dir_all(dir.path().join("modules/m2")).unwrap();
        fs::write(dir.path().join("modules/m2/main.tf"), "# root module\n").unwrap();

        let result = crate::core::loader::load(dir.path());
        let vcs = FakeVcs::new();
        vcs.set_diff("a", "b", vec!["modules/m2/main.tf".to_string()]);

        let changed = detect(&result.tree, dir.path(), &vcs, "a", "b", false, false).unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].dir, ProjectPath::new("/stack"));
        assert_eq!(
            changed[0].reasons,
            vec!["modules/m2/main.tf is inside referenced module modules/m2 (via ../modules/m1 -> ../m2)".to_string()]
        );
    }

    #[test]
    fn unrelated_stack_is_not_changed() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stack")).unwrap();
        fs::write(dir.path().join("stack/stack.tm"), "stack {}\n").unwrap();

        let result = crate::core::loader::load(dir.path());
        let vcs = FakeVcs::new();
        vcs.set_diff("a", "b", vec!["unrelated/file.tf".to_string()]);

        let changed = detect(&result.tree, dir.path(), &vcs, "a", "b", false, false).unwrap();
        assert!(changed.is_empty());
    }
}
