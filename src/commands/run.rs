//! `terramate run`: execute a command across the DAG of selected stacks
//! via the hand-rolled worker-pool scheduler.

use clap::Args;

use crate::core::changes;
use crate::core::error::{Result, TmError};
use crate::core::eval::EvalContext;
use crate::core::loader;
use crate::core::rundag;
use crate::core::runtime::RuntimeConfig;
use crate::core::scheduler::{self, RunOptions, StackStatus};
use crate::core::value::Value;

#[derive(Args, Debug)]
pub struct RunCli {
    /// Number of concurrent workers (default: `RuntimeConfig::parallelism`).
    #[clap(long)]
    pub parallel: Option<usize>,
    /// Reverse the run order: the DAG is built normally, and the finished
    /// topological order is reversed afterwards (edges are never inverted).
    #[clap(long)]
    pub reverse: bool,
    /// Keep running unrelated branches after a failure instead of skipping
    /// their descendants.
    #[clap(long)]
    pub continue_on_error: bool,
    /// Only run stacks in the changed set.
    #[clap(long)]
    pub changed: bool,
    /// Evaluate `${...}` interpolations in the command against the
    /// project-root `global.*`/`terramate.*` scope before dispatch.
    #[clap(long)]
    pub eval: bool,
    /// The command to run, e.g. `-- terraform apply`.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub cmd: Vec<String>,
}

pub fn run_run(cfg: &RuntimeConfig, args: &RunCli) -> Result<i32> {
    if args.cmd.is_empty() {
        return Err(TmError::Other("run requires a command after `--`".to_string()));
    }

    let result = loader::load(&cfg.root);
    let stacks = crate::core::stack::build_stacks(&result.tree);

    let candidates: Vec<_> = if args.changed {
        let current = cfg.vcs.current_ref()?;
        let changed = changes::detect(&result.tree, &cfg.root, cfg.vcs.as_ref(), &current, &current, true, true)?;
        let changed_dirs: std::collections::HashSet<_> = changed.into_iter().map(|c| c.dir).collect();
        stacks.iter().map(|s| s.dir.clone()).filter(|d| changed_dirs.contains(d)).collect()
    } else {
        stacks.iter().map(|s| s.dir.clone()).collect()
    };

    let dag = rundag::build(&stacks, &candidates)?;
    let run_dag = if args.reverse {
        let order = rundag::topological_order(&dag, true);
        rundag::chain(&order)
    } else {
        dag
    };

    let cmd_tokens: Vec<String> = if args.eval {
        let global = crate::core::globals::evaluate(&result.tree, &crate::core::path::ProjectPath::root()).unwrap_or(Value::Unknown);
        let ctx = EvalContext::new().with("global", global);
        args.cmd.iter().map(|t| eval_template_token(t, &ctx)).collect::<Result<Vec<_>>>()?
    } else {
        args.cmd.clone()
    };
    let cmd = &cmd_tokens[0];
    let cmd_args = &cmd_tokens[1..];

    let opts = RunOptions {
        workers: args.parallel.unwrap_or(cfg.parallelism).max(1),
        continue_on_error: args.continue_on_error,
        env: std::env::vars().collect(),
    };

    let result = scheduler::run(&run_dag, cmd, cmd_args, cfg.exec.as_ref(), &cfg.root, &cfg.cancellation, opts);

    let mut exit = 0;
    for (dir, status) in &result.status {
        println!("{dir} {status:?}");
        if matches!(status, StackStatus::Failed | StackStatus::Canceled) {
            exit = 1;
        }
    }
    Ok(exit)
}

/// Evaluate `${...}` interpolations in `token` against `ctx` by wrapping
/// it as a quoted-string attribute and parsing that through the same
/// `hcl::from_str` path the loader uses; tokens with no `${` are returned
/// unchanged.
fn eval_template_token(token: &str, ctx: &EvalContext) -> Result<String> {
    if !token.contains("${") {
        return Ok(token.to_string());
    }
    let escaped = token.replace('\\', "\\\\").replace('"', "\\\"");
    let source = format!("_v = \"{escaped}\"\n");
    let body: hcl::Body = hcl::from_str(&source).map_err(|e| TmError::EvalError {
        message: format!("invalid template in command argument {token:?}: {e}"),
        range: None,
    })?;
    let expr = body
        .iter()
        .find_map(|s| match s {
            hcl::Structure::Attribute(a) if a.key.as_str() == "_v" => Some(a.expr.clone()),
            _ => None,
        })
        .expect("wrapper attribute always present");
    let value = crate::core::eval::eval(&expr, ctx, std::path::Path::new("<cmd>"))?;
    Ok(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()))
}
