//! Aggregates per-directory results and renders both a minimal
//! per-file listing and a grouped "full" view.

use std::collections::BTreeMap;
use std::sync::Mutex;

use colored::Colorize;

use crate::core::error::TmError;
use crate::core::path::ProjectPath;

#[derive(Debug, Clone)]
pub enum Entry {
    Ok { message: String },
    Error(TmError),
}

/// Mutex-guarded so generation/run workers can append concurrently; the
/// lock is never held across I/O.
#[derive(Default)]
pub struct Report {
    entries: Mutex<BTreeMap<String, Vec<Entry>>>,
}

impl Report {
    pub fn new() -> Self {
        Report::default()
    }

    pub fn record(&self, dir: &ProjectPath, entry: Entry) {
        self.entries
            .lock()
            .unwrap()
            .entry(dir.as_str().to_string())
            .or_default()
            .push(entry);
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .unwrap()
            .values()
            .any(|entries| entries.iter().any(|e| matches!(e, Entry::Error(_))))
    }

    /// One line per file/stack, in directory order — the `--quiet`/CI view.
    pub fn render_minimal(&self) -> String {
        let entries = self.entries.lock().unwrap();
        let mut out = String::new();
        for (dir, items) in entries.iter() {
            for item in items {
                match item {
                    Entry::Ok { message } => out.push_str(&format!("{dir}: {message}\n")),
                    Entry::Error(e) => out.push_str(&format!("{dir}: {} {}\n", e.kind(), e)),
                }
            }
        }
        out
    }

    /// Grouped by directory, with errors colorized — the default
    /// human-facing view.
    pub fn render_full(&self) -> String {
        let entries = self.entries.lock().unwrap();
        let mut out = String::new();
        for (dir, items) in entries.iter() {
            out.push_str(&format!("{}\n", dir.bold()));
            for item in items {
                match item {
                    Entry::Ok { message } => out.push_str(&format!("  {} {message}\n", "ok".green())),
                    Entry::Error(e) => {
                        out.push_str(&format!("  {} [{}] {}\n", "error".red().bold(), e.kind(), e));
                        if let Some(range) = e.range() {
                            out.push_str(&format!("    at {range}\n"));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_reflects_recorded_entries() {
        let report = Report::new();
        report.record(&ProjectPath::new("/a"), Entry::Ok { message: "done".to_string() });
        assert!(!report.has_errors());
        report.record(
            &ProjectPath::new("/b"),
            Entry::Error(TmError::CycleError { description: "x".to_string() }),
        );
        assert!(report.has_errors());
    }

    #[test]
    fn minimal_render_has_one_line_per_entry() {
        let report = Report::new();
        report.record(&ProjectPath::new("/a"), Entry::Ok { message: "done".to_string() });
        let rendered = report.render_minimal();
        assert_eq!(rendered.lines().count(), 1);
    }
}
