//! A hand-rolled worker pool over the run DAG, built with `std::thread`
//! + `Mutex`/`Condvar` rather than `rayon` because dispatch order depends
//! on runtime completion events (a stack unlocks only once its
//! predecessors finish), not a static task list.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::cancel::{self, CancellationToken};
use crate::core::exec::Executor;
use crate::core::path::ProjectPath;
use crate::core::rundag::RunDag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Pending,
    Running,
    Ok,
    Failed,
    Canceled,
    Skipped,
}

pub struct RunOptions {
    pub workers: usize,
    pub continue_on_error: bool,
    pub env: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            workers: 1,
            continue_on_error: false,
            env: Vec::new(),
        }
    }
}

struct Queue {
    remaining_preds: HashMap<ProjectPath, usize>,
    successors: HashMap<ProjectPath, Vec<ProjectPath>>,
    status: HashMap<ProjectPath, StackStatus>,
    ready: Vec<ProjectPath>,
    in_flight: usize,
}

pub struct SchedulerResult {
    pub status: HashMap<ProjectPath, StackStatus>,
}

/// Run every stack in `dag`, `cmd`/`args` as the command, respecting
/// predecessor completion, `continue_on_error`, and `cancellation`. A
/// stack transitions to `Running` only at the moment its command is
/// actually invoked, never at dispatch queuing.
pub fn run(
    dag: &RunDag,
    cmd: &str,
    args: &[String],
    executor: &dyn Executor,
    fs_root: &std::path::Path,
    cancellation: &CancellationToken,
    opts: RunOptions,
) -> SchedulerResult {
    let mut remaining_preds = HashMap::new();
    let mut successors: HashMap<ProjectPath, Vec<ProjectPath>> = HashMap::new();
    let mut status = HashMap::new();
    for s in &dag.stacks {
        remaining_preds.insert(s.clone(), dag.predecessors(s).len());
        status.insert(s.clone(), StackStatus::Pending);
        for pred in dag.predecessors(s) {
            successors.entry(pred.clone()).or_default().push(s.clone());
        }
    }
    let ready: Vec<ProjectPath> = remaining_preds
        .iter()
        .filter(|(_, c)| **c == 0)
        .map(|(s, _)| s.clone())
        .collect();

    let state = Arc::new(Mutex::new(Queue {
        remaining_preds,
        successors,
        status,
        ready,
        in_flight: 0,
    }));
    let cv = Arc::new(Condvar::new());

    let workers = opts.workers.max(1);
    thread::scope(|scope| {
        for _ in 0..workers {
            let state = Arc::clone(&state);
            let cv = Arc::clone(&cv);
            let cmd = cmd.to_string();
            let args = args.to_vec();
            let env = opts.env.clone();
            scope.spawn(|| {
                worker_loop(
                    &state,
                    &cv,
                    &cmd,
                    &args,
                    &env,
                    executor,
                    fs_root,
                    cancellation,
                    opts.continue_on_error,
                );
            });
        }
    });

    let state = state.lock().unwrap();
    SchedulerResult { status: state.status.clone() }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    state: &Mutex<Queue>,
    cv: &Condvar,
    cmd: &str,
    args: &[String],
    base_env: &[(String, String)],
    executor: &dyn Executor,
    fs_root: &std::path::Path,
    cancellation: &CancellationToken,
    continue_on_error: bool,
) {
    loop {
        let next = {
            let mut guard = state.lock().unwrap();
            loop {
                if cancellation.stage() >= cancel::GRACEFUL && guard.ready.is_empty() {
                    return;
                }
                if let Some(pos) = guard
                    .ready
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.cmp(b))
                    .map(|(i, _)| i)
                {
                    let dir = guard.ready.remove(pos);
                    guard.in_flight += 1;
                    break Some(dir);
                }
                if guard.in_flight == 0 {
                    return;
                }
                guard = cv.wait(guard).unwrap();
            }
        };

        let Some(dir) = next else { return };

        if cancellation.is_canceled() {
            let mut guard = state.lock().unwrap();
            guard.status.insert(dir.clone(), StackStatus::Canceled);
            guard.in_flight -= 1;
            complete(&mut guard, &dir, false, continue_on_error);
            cv.notify_all();
            continue;
        }

        state.lock().unwrap().status.insert(dir.clone(), StackStatus::Running);

        let stack_dir = dir.to_fs(fs_root);
        let succeeded = match executor.spawn(&stack_dir, cmd, args, base_env) {
            Ok(mut child) => run_to_completion(&mut *child, cancellation),
            Err(_) => false,
        };

        let mut guard = state.lock().unwrap();
        guard.status.insert(
            dir.clone(),
            if succeeded { StackStatus::Ok } else { StackStatus::Failed },
        );
        guard.in_flight -= 1;
        complete(&mut guard, &dir, succeeded, continue_on_error);
        cv.notify_all();
    }
}

/// Drive a child to completion without ever blocking uninterruptibly: poll
/// `try_wait` in a loop, re-checking `cancellation`'s stage on every pass
/// so an escalation to FORWARD/FORCE is acted on immediately instead of
/// only once the child happens to exit on its own.
fn run_to_completion(child: &mut dyn crate::core::exec::Child, cancellation: &CancellationToken) -> bool {
    let mut interrupted = false;
    let mut killed = false;
    loop {
        match child.try_wait() {
            Ok(Some(code)) => return code == 0,
            Ok(None) => {}
            Err(_) => return false,
        }

        let stage = cancellation.stage();
        if stage >= cancel::FORCE && !killed {
            let _ = child.kill();
            killed = true;
        } else if stage >= cancel::FORWARD && !interrupted {
            let _ = child.interrupt();
            interrupted = true;
        }

        thread::sleep(Duration::from_millis(25));
    }
}

/// Unblock successors: on success, decrement their predecessor count and
/// queue them when it hits zero; on failure (without continue-on-error),
/// mark every descendant `Skipped` instead.
fn complete(queue: &mut Queue, dir: &ProjectPath, succeeded: bool, continue_on_error: bool) {
    let successors = queue.successors.get(dir).cloned().unwrap_or_default();
    for succ in successors {
        if succeeded || continue_on_error {
            if let Some(count) = queue.remaining_preds.get_mut(&succ) {
                *count -= 1;
                if *count == 0 && queue.status.get(&succ) == Some(&StackStatus::Pending) {
                    queue.ready.push(succ);
                }
            }
        } else {
            skip_descendants(queue, &succ);
        }
    }
}

fn skip_descendants(queue: &mut Queue, dir: &ProjectPath) {
    if queue.status.get(dir) != Some(&StackStatus::Pending) {
        return;
    }
    queue.status.insert(dir.clone(), StackStatus::Skipped);
    let successors = queue.successors.get(dir).cloned().unwrap_or_default();
    for succ in successors {
        skip_descendants(queue, &succ);
    }
}

/// Compose the per-stack run environment: process environment overlaid by
/// `terramate.config.run.env` entries along the scope chain, deeper
/// scopes overriding shallower ones (config always wins, applied last).
pub fn compose_env(process_env: &[(String, String)], config_env_layers: &[Vec<(String, String)>]) -> Vec<(String, String)> {
    let mut map: Vec<(String, String)> = process_env.to_vec();
    for layer in config_env_layers {
        for (k, v) in layer {
            if let Some(slot) = map.iter_mut().find(|(existing, _)| existing == k) {
                slot.1 = v.clone();
            } else {
                map.push((k.clone(), v.clone()));
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exec::FakeExecutor;
    use crate::core::rundag::build;
    use crate::core::stack::{Stack, StackRef};

    #[test]
    fn failure_skips_descendants_but_not_unrelated_branches() {
        let mut a = Stack::new(ProjectPath::new("/a"));
        let mut b = Stack::new(ProjectPath::new("/b"));
        b.after.push(StackRef::Path("/a".to_string()));
        let c = Stack::new(ProjectPath::new("/c"));
        a.tags.clear();
        let stacks = vec![a, b, c];
        let candidates: Vec<ProjectPath> = stacks.iter().map(|s| s.dir.clone()).collect();
        let dag = build(&stacks, &candidates).unwrap();

        let executor = FakeExecutor::new();
        executor.set_exit_code(std::path::Path::new("/tmp/a"), 1);

        let result = run(
            &dag,
            "true",
            &[],
            &executor,
            std::path::Path::new("/tmp"),
            &CancellationToken::new(),
            RunOptions { workers: 2, continue_on_error: false, env: Vec::new() },
        );

        assert_eq!(result.status[&ProjectPath::new("/a")], StackStatus::Failed);
        assert_eq!(result.status[&ProjectPath::new("/b")], StackStatus::Skipped);
        assert_eq!(result.status[&ProjectPath::new("/c")], StackStatus::Ok);
    }

    #[test]
    fn cancellation_escalation_interrupts_a_running_child() {
        let a = Stack::new(ProjectPath::new("/a"));
        let stacks = vec![a];
        let candidates: Vec<ProjectPath> = stacks.iter().map(|s| s.dir.clone()).collect();
        let dag = build(&stacks, &candidates).unwrap();

        let executor = FakeExecutor::new();
        executor.set_running_polls(std::path::Path::new("/tmp/a"), 1_000_000);
        let cancellation = CancellationToken::new();
        let escalate_cancellation = cancellation.clone();

        let handle = thread::spawn(move || {
            run(
                &dag,
                "sleep",
                &[],
                &executor,
                std::path::Path::new("/tmp"),
                &cancellation,
                RunOptions { workers: 1, continue_on_error: false, env: Vec::new() },
            )
        });

        thread::sleep(Duration::from_millis(10));
        escalate_cancellation.escalate();
        escalate_cancellation.escalate();
        escalate_cancellation.escalate();

        let result = handle.join().unwrap();
        assert_eq!(result.status[&ProjectPath::new("/a")], StackStatus::Failed);
    }

    #[test]
    fn config_env_overrides_process_env() {
        let process = vec![("FOO".to_string(), "1".to_string())];
        let layers = vec![vec![("FOO".to_string(), "2".to_string())]];
        let composed = compose_env(&process, &layers);
        assert_eq!(composed.iter().find(|(k, _)| k == "FOO").unwrap().1, "2");
    }
}
