//! Deterministic in-memory `Executor`, used by scheduler tests that need
//! to control exit codes and timing without spawning real processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use crate::core::error::Result;

use super::{Child, Executor};

#[derive(Default)]
pub struct FakeExecutor {
    exit_codes: Mutex<HashMap<String, i32>>,
    running_polls: Mutex<HashMap<String, i32>>,
    invocations: Mutex<Vec<(PathBuf, String, Vec<String>)>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exit code `spawn` should report for commands run in `stack_dir`.
    pub fn set_exit_code(&self, stack_dir: &Path, code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(stack_dir.to_string_lossy().to_string(), code);
    }

    /// Make `try_wait` report "still running" for the first `n` polls
    /// before the child's exit code (or interrupt/kill) takes effect —
    /// simulates a long-running child for cancellation-polling tests.
    pub fn set_running_polls(&self, stack_dir: &Path, n: i32) {
        self.running_polls
            .lock()
            .unwrap()
            .insert(stack_dir.to_string_lossy().to_string(), n);
    }

    pub fn invocations(&self) -> Vec<(PathBuf, String, Vec<String>)> {
        self.invocations.lock().unwrap().clone()
    }
}

impl Executor for FakeExecutor {
    fn spawn(
        &self,
        stack_dir: &Path,
        cmd: &str,
        args: &[String],
        _env: &[(String, String)],
    ) -> Result<Box<dyn Child>> {
        self.invocations
            .lock()
            .unwrap()
            .push((stack_dir.to_path_buf(), cmd.to_string(), args.to_vec()));
        let key = stack_dir.to_string_lossy().to_string();
        let code = *self.exit_codes.lock().unwrap().get(&key).unwrap_or(&0);
        let polls = *self.running_polls.lock().unwrap().get(&key).unwrap_or(&0);
        Ok(Box::new(FakeChild {
            exit_code: AtomicI32::new(code),
            interrupted: Mutex::new(false),
            remaining_polls: AtomicI32::new(polls),
        }))
    }
}

struct FakeChild {
    exit_code: AtomicI32,
    interrupted: Mutex<bool>,
    remaining_polls: AtomicI32,
}

impl Child for FakeChild {
    fn wait(&mut self) -> Result<i32> {
        if *self.interrupted.lock().unwrap() {
            return Ok(130);
        }
        Ok(self.exit_code.load(Ordering::SeqCst))
    }

    fn try_wait(&mut self) -> Result<Option<i32>> {
        if *self.interrupted.lock().unwrap() {
            return Ok(Some(130));
        }
        let remaining = self.remaining_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_polls.store(remaining - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(Some(self.exit_code.load(Ordering::SeqCst)))
    }

    fn interrupt(&mut self) -> Result<()> {
        *self.interrupted.lock().unwrap() = true;
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        *self.interrupted.lock().unwrap() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_configured_exit_code() {
        let exec = FakeExecutor::new();
        exec.set_exit_code(Path::new("/s"), 3);
        let mut child = exec.spawn(Path::new("/s"), "echo", &[], &[]).unwrap();
        assert_eq!(child.wait().unwrap(), 3);
    }

    #[test]
    fn interrupt_is_observed_by_wait() {
        let exec = FakeExecutor::new();
        let mut child = exec.spawn(Path::new("/s"), "sleep", &[], &[]).unwrap();
        child.interrupt().unwrap();
        assert_eq!(child.wait().unwrap(), 130);
    }
}
