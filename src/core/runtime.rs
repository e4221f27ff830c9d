//! `RuntimeConfig`: the explicit context threaded into every `run_*`
//! command function instead of global state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::cancel::CancellationToken;
use crate::core::exec::Executor;
use crate::core::vcs::VcsClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Resolve from `-v`/`-q` counts and an optional `TM_LOG` override,
    /// `-v` taking precedence since it is the more specific, CLI-local
    /// signal.
    pub fn resolve(verbose: u8, quiet: u8, env_override: Option<&str>) -> Self {
        if verbose > 0 {
            return if verbose > 1 { LogLevel::Debug } else { LogLevel::Info };
        }
        if quiet > 0 {
            return LogLevel::Quiet;
        }
        match env_override.map(str::to_lowercase).as_deref() {
            Some("debug" | "trace") => LogLevel::Debug,
            Some("info") => LogLevel::Info,
            Some("quiet" | "error" | "off") => LogLevel::Quiet,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Quiet => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Everything a command needs to run, constructed once in `main.rs` and
/// passed down explicitly (the design-notes preference for
/// context-passing over global state).
#[derive(Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub log_level: LogLevel,
    pub vcs: Arc<dyn VcsClient>,
    pub exec: Arc<dyn Executor>,
    pub cancellation: CancellationToken,
    pub parallelism: usize,
}

impl RuntimeConfig {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn VcsClient>, exec: Arc<dyn Executor>) -> Self {
        RuntimeConfig {
            root: root.into(),
            log_level: LogLevel::Warn,
            vcs,
            exec,
            cancellation: CancellationToken::new(),
            parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_outranks_env_override() {
        assert_eq!(LogLevel::resolve(1, 0, Some("debug")), LogLevel::Info);
        assert_eq!(LogLevel::resolve(2, 0, None), LogLevel::Debug);
        assert_eq!(LogLevel::resolve(0, 1, None), LogLevel::Quiet);
        assert_eq!(LogLevel::resolve(0, 0, Some("info")), LogLevel::Info);
        assert_eq!(LogLevel::resolve(0, 0, None), LogLevel::Warn);
    }
}
