//! The default `Executor`, backed directly by `std::process::Command`.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::core::error::{Result, TmError};

use super::{Child as ChildTrait, Executor};

pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        ProcessExecutor
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ProcessExecutor {
    fn spawn(
        &self,
        stack_dir: &Path,
        cmd: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<Box<dyn ChildTrait>> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .current_dir(stack_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (k, v) in env {
            command.env(k, v);
        }
        let child = command.spawn().map_err(TmError::IOError)?;
        Ok(Box::new(ProcessChild { inner: child, stack_dir: stack_dir.to_path_buf() }))
    }
}

struct ProcessChild {
    inner: std::process::Child,
    stack_dir: std::path::PathBuf,
}

impl ChildTrait for ProcessChild {
    fn wait(&mut self) -> Result<i32> {
        let status = self.inner.wait().map_err(TmError::IOError)?;
        Ok(status.code().unwrap_or(-1))
    }

    fn try_wait(&mut self) -> Result<Option<i32>> {
        match self.inner.try_wait().map_err(TmError::IOError)? {
            Some(status) => Ok(Some(status.code().unwrap_or(-1))),
            None => Ok(None),
        }
    }

    fn interrupt(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            let pid = self.inner.id() as i32;
            // SAFETY: signaling a child process this struct owns by pid.
            unsafe {
                libc::kill(pid, libc::SIGINT);
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    fn kill(&mut self) -> Result<()> {
        self.inner.kill().map_err(|e| TmError::ExecFailed {
            stack: self.stack_dir.clone(),
            message: e.to_string(),
        })
    }
}
