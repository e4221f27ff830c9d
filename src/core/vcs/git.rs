//! Shell-backed `git` implementation: every call runs
//! `git -C <dir> <subcommand>` and captures stdout.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::error::{Result, TmError};

use super::{StatusEntry, VcsClient};

pub struct GitVcs {
    root: PathBuf,
}

impl GitVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitVcs { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["-C", self.root.to_str().unwrap_or(".")];
        full.extend_from_slice(args);
        let output = Command::new("git")
            .args(&full)
            .output()
            .map_err(TmError::IOError)?;
        if !output.status.success() {
            return Err(TmError::VCSError(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VcsClient for GitVcs {
    fn current_ref(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.run(&["merge-base", a, b])
    }

    fn diff_name_only(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let out = self.run(&["diff", "--name-only", &format!("{from}..{to}")])?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    fn status(&self, include_untracked: bool, include_uncommitted: bool) -> Result<Vec<StatusEntry>> {
        let out = self.run(&["status", "--porcelain"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.len() < 4 {
                continue;
            }
            let code = &line[..2];
            let path = line[3..].to_string();
            let untracked = code == "??";
            if untracked && !include_untracked {
                continue;
            }
            if !untracked && !include_uncommitted {
                continue;
            }
            entries.push(StatusEntry { path, untracked });
        }
        Ok(entries)
    }

    fn is_repo_root(&self, path: &Path) -> bool {
        Command::new("git")
            .args(["-C", path.to_str().unwrap_or("."), "rev-parse", "--show-toplevel"])
            .output()
            .ok()
            .map(|out| {
                out.status.success()
                    && PathBuf::from(String::from_utf8_lossy(&out.stdout).trim()) == path
            })
            .unwrap_or(false)
    }
}
