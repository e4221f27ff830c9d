//! In-memory `VcsClient` fake, used by scheduler/change-detector tests
//! that need deterministic VCS answers without a real repository.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::core::error::Result;

use super::{StatusEntry, VcsClient};

#[derive(Default)]
pub struct FakeVcs {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    current_ref: String,
    merge_bases: HashMap<(String, String), String>,
    diffs: HashMap<(String, String), Vec<String>>,
    status: Vec<StatusEntry>,
    repo_root: Option<std::path::PathBuf>,
}

impl FakeVcs {
    pub fn new() -> Self {
        FakeVcs {
            inner: Mutex::new(Inner {
                current_ref: "main".to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn set_current_ref(&self, r: impl Into<String>) {
        self.inner.lock().unwrap().current_ref = r.into();
    }

    pub fn set_diff(&self, from: &str, to: &str, paths: Vec<String>) {
        self.inner
            .lock()
            .unwrap()
            .diffs
            .insert((from.to_string(), to.to_string()), paths);
    }

    pub fn set_status(&self, entries: Vec<StatusEntry>) {
        self.inner.lock().unwrap().status = entries;
    }

    pub fn set_repo_root(&self, path: impl Into<std::path::PathBuf>) {
        self.inner.lock().unwrap().repo_root = Some(path.into());
    }
}

impl VcsClient for FakeVcs {
    fn current_ref(&self) -> Result<String> {
        Ok(self.inner.lock().unwrap().current_ref.clone())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .merge_bases
            .get(&(a.to_string(), b.to_string()))
            .cloned()
            .unwrap_or_else(|| a.to_string()))
    }

    fn diff_name_only(&self, from: &str, to: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .diffs
            .get(&(from.to_string(), to.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn status(&self, include_untracked: bool, include_uncommitted: bool) -> Result<Vec<StatusEntry>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .status
            .iter()
            .filter(|e| (e.untracked && include_untracked) || (!e.untracked && include_uncommitted))
            .cloned()
            .collect())
    }

    fn is_repo_root(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().repo_root.as_deref() == Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filters_by_flags() {
        let vcs = FakeVcs::new();
        vcs.set_status(vec![
            StatusEntry { path: "a.tf".to_string(), untracked: false },
            StatusEntry { path: "b.tf".to_string(), untracked: true },
        ]);
        assert_eq!(vcs.status(false, true).unwrap().len(), 1);
        assert_eq!(vcs.status(true, false).unwrap().len(), 1);
        assert_eq!(vcs.status(true, true).unwrap().len(), 2);
    }
}
