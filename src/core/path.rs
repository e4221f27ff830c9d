//! Project-relative path algebra.
//!
//! A [`ProjectPath`] is always slash-rooted and normalized relative to the
//! project root (`/` is the root). Comparisons are byte-exact: Terramate
//! paths are case-sensitive on every platform, independent of the
//! underlying filesystem.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A normalized, slash-rooted path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectPath(String);

impl ProjectPath {
    pub const ROOT: &'static str = "/";

    /// The project root path, `/`.
    pub fn root() -> Self {
        ProjectPath("/".to_string())
    }

    /// Build a `ProjectPath` from a string that must start with `/`.
    ///
    /// Normalizes away `.` segments and duplicate slashes but does **not**
    /// resolve `..` against a filesystem; `..` segments are only legal
    /// before being joined into a fully normalized path (see [`Self::join`]).
    pub fn new(raw: &str) -> Self {
        if raw.is_empty() || raw == "/" {
            return Self::root();
        }
        let mut segments: Vec<&str> = Vec::new();
        for seg in raw.split('/') {
            if seg.is_empty() || seg == "." {
                continue;
            }
            segments.push(seg);
        }
        if segments.is_empty() {
            return Self::root();
        }
        ProjectPath(format!("/{}", segments.join("/")))
    }

    /// Construct the project path of `abs_path` relative to `root`.
    ///
    /// Returns `None` if `abs_path` is not inside `root`.
    pub fn from_fs(root: &Path, abs_path: &Path) -> Option<Self> {
        let rel = abs_path.strip_prefix(root).ok()?;
        let mut parts = Vec::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            Some(Self::root())
        } else {
            Some(ProjectPath(format!("/{}", parts.join("/"))))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Join a relative component onto this path.
    pub fn join(&self, child: &str) -> ProjectPath {
        if self.is_root() {
            ProjectPath::new(&format!("/{child}"))
        } else {
            ProjectPath::new(&format!("{}/{child}", self.0))
        }
    }

    /// The parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<ProjectPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(ProjectPath::root()),
            Some(idx) => Some(ProjectPath(self.0[..idx].to_string())),
            None => Some(ProjectPath::root()),
        }
    }

    /// The final path segment, or `""` for the root.
    pub fn basename(&self) -> &str {
        if self.is_root() {
            return "";
        }
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// True if `self` is `other` or a descendant of `other`.
    pub fn is_inside(&self, other: &ProjectPath) -> bool {
        if other.is_root() {
            return true;
        }
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &ProjectPath) -> bool {
        self != other && other.is_inside(self)
    }

    /// Resolve `abs_path` against the project root to produce the
    /// corresponding absolute filesystem path.
    pub fn to_fs(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            return root.to_path_buf();
        }
        root.join(self.0.trim_start_matches('/'))
    }

    /// Every ancestor of `self`, from the root down to (but excluding)
    /// `self` itself.
    pub fn ancestors(&self) -> Vec<ProjectPath> {
        let mut out = Vec::new();
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            out.push(p.clone());
            cur = p;
        }
        out.reverse();
        out
    }

    /// Match this path against a glob pattern, relative to the project root.
    pub fn matches_glob(&self, pattern: &str) -> bool {
        globset::Glob::new(pattern)
            .map(|g| g.compile_matcher().is_match(self.0.trim_start_matches('/')))
            .unwrap_or(false)
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectPath {
    fn from(s: &str) -> Self {
        ProjectPath::new(s)
    }
}

impl From<String> for ProjectPath {
    fn from(s: String) -> Self {
        ProjectPath::new(&s)
    }
}

/// Normalize a `..`/`.`-bearing relative path string into a clean relative
/// path, rejecting any path that escapes its own root (used to validate
/// generate-block labels).
pub fn clean_relative(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return None;
    }
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(_) => out.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.pop().is_none() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.is_empty() {
        return None;
    }
    Some(out.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_dots_and_slashes() {
        assert_eq!(ProjectPath::new("//a//./b/").as_str(), "/a/b");
        assert_eq!(ProjectPath::new("").as_str(), "/");
    }

    #[test]
    fn join_and_parent_roundtrip() {
        let root = ProjectPath::root();
        let child = root.join("stacks").join("a");
        assert_eq!(child.as_str(), "/stacks/a");
        assert_eq!(child.parent().unwrap().as_str(), "/stacks");
        assert_eq!(child.basename(), "a");
    }

    #[test]
    fn is_inside_is_prefix_aware_not_substring_aware() {
        let a = ProjectPath::new("/stacks/a");
        let ab = ProjectPath::new("/stacks/ab");
        assert!(!ab.is_inside(&a));
        assert!(a.is_inside(&a));
    }

    #[test]
    fn case_sensitive_comparison() {
        assert_ne!(ProjectPath::new("/Foo"), ProjectPath::new("/foo"));
    }

    #[test]
    fn ancestors_are_root_to_parent_order() {
        let p = ProjectPath::new("/a/b/c");
        let anc: Vec<String> = p.ancestors().iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(anc, vec!["/", "/a", "/a/b"]);
    }

    #[test]
    fn clean_relative_rejects_escape() {
        assert!(clean_relative("../x").is_none());
        assert!(clean_relative("a/../../b").is_none());
        assert_eq!(clean_relative("a/../b").unwrap(), PathBuf::from("b"));
        assert!(clean_relative("/abs").is_none());
    }
}
