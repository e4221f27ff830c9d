//! The seam the scheduler drives to run stack-level commands.

mod fake;
mod process;

pub use fake::FakeExecutor;
pub use process::ProcessExecutor;

use std::path::Path;

use crate::core::error::Result;

/// A running (or finished) child process, abstracted enough to let
/// [`FakeExecutor`] simulate one without spawning anything.
pub trait Child: Send {
    /// Block until the child exits, returning its exit code (0 on success).
    fn wait(&mut self) -> Result<i32>;

    /// Non-blocking poll: `Some(code)` once the child has exited, `None`
    /// while it's still running. Lets callers re-check cancellation state
    /// between polls instead of blocking uninterruptibly in `wait`.
    fn try_wait(&mut self) -> Result<Option<i32>>;

    /// Send a graceful interrupt (SIGINT-equivalent).
    fn interrupt(&mut self) -> Result<()>;

    /// Terminate forcibly (SIGKILL-equivalent).
    fn kill(&mut self) -> Result<()>;
}

/// Spawns and controls stack-level commands. `ProcessExecutor` is the
/// real, `std::process::Command`-backed default; `FakeExecutor` is for
/// deterministic scheduler tests.
pub trait Executor: Send + Sync {
    fn spawn(
        &self,
        stack_dir: &Path,
        cmd: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<Box<dyn Child>>;
}
