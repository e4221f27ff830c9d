//! `terramate script run|list|tree|info`: a `script {}` block is a named,
//! nested group of jobs, visible wherever its scope covers; `run`
//! dispatches every job's command across the selected stacks through the
//! same scheduler `run` drives.

use clap::{Args, Subcommand};

use crate::core::error::{Result, TmError};
use crate::core::loader;
use crate::core::rundag;
use crate::core::runtime::RuntimeConfig;
use crate::core::scheduler::{self, RunOptions, StackStatus};
use crate::core::stack;

#[derive(Args, Debug)]
pub struct ScriptCli {
    #[clap(subcommand)]
    pub command: ScriptCommand,
}

#[derive(Subcommand, Debug)]
pub enum ScriptCommand {
    /// Run a script's jobs across every stack in its scope.
    Run {
        name: String,
        #[clap(long)]
        parallel: Option<usize>,
    },
    /// List every declared script and its description.
    List,
    /// Print the declared scripts as a label-path tree.
    Tree,
    /// Print one script's description and job commands.
    Info { name: String },
}

/// A `script {}` block: labels joined with `:` as its full name, an
/// optional `description`, and an ordered list of `job` command vectors.
#[derive(Debug, Clone)]
struct Script {
    name: String,
    description: String,
    jobs: Vec<Vec<String>>,
}

fn build_scripts(tree: &crate::core::tree::ConfigTree) -> Vec<Script> {
    let mut scripts = Vec::new();
    for node in tree.nodes.values() {
        for block in &node.script_blocks {
            let name = block.block.labels.iter().map(|l| l.as_str()).collect::<Vec<_>>().join(":");
            let description = body_string(&block.block.body, "description").unwrap_or_default();
            let jobs = block
                .block
                .body
                .iter()
                .filter_map(|s| match s {
                    hcl::Structure::Block(b) if b.identifier.as_str() == "job" => Some(b),
                    _ => None,
                })
                .filter_map(|job| body_string_list(&job.body, "command"))
                .collect();
            scripts.push(Script { name, description, jobs });
        }
    }
    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    scripts
}

fn body_string(body: &hcl::Body, key: &str) -> Option<String> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => match &a.expr {
            hcl::Expression::String(s) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    })
}

fn body_string_list(body: &hcl::Body, key: &str) -> Option<Vec<String>> {
    body.iter().find_map(|s| match s {
        hcl::Structure::Attribute(a) if a.key.as_str() == key => match &a.expr {
            hcl::Expression::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|i| match i {
                        hcl::Expression::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        },
        _ => None,
    })
}

pub fn run_script(cfg: &RuntimeConfig, args: &ScriptCli) -> Result<i32> {
    let result = loader::load(&cfg.root);
    let scripts = build_scripts(&result.tree);

    match &args.command {
        ScriptCommand::List => {
            for s in &scripts {
                println!("{}: {}", s.name, s.description);
            }
            Ok(0)
        }
        ScriptCommand::Tree => {
            for s in &scripts {
                let depth = s.name.matches(':').count();
                println!("{}{}", "  ".repeat(depth), s.name);
            }
            Ok(0)
        }
        ScriptCommand::Info { name } => {
            let Some(s) = scripts.iter().find(|s| &s.name == name) else {
                return Err(TmError::Other(format!("no such script: {name}")));
            };
            println!("{}: {}", s.name, s.description);
            for job in &s.jobs {
                println!("  job: {}", job.join(" "));
            }
            Ok(0)
        }
        ScriptCommand::Run { name, parallel } => {
            let Some(s) = scripts.iter().find(|s| &s.name == name).cloned() else {
                return Err(TmError::Other(format!("no such script: {name}")));
            };
            let stacks = stack::build_stacks(&result.tree);
            let candidates: Vec<_> = stacks.iter().map(|st| st.dir.clone()).collect();
            let dag = rundag::build(&stacks, &candidates)?;

            let opts_workers = parallel.unwrap_or(cfg.parallelism).max(1);
            let mut failed = false;
            for job in &s.jobs {
                if job.is_empty() {
                    continue;
                }
                let opts = RunOptions {
                    workers: opts_workers,
                    continue_on_error: false,
                    env: std::env::vars().collect(),
                };
                let outcome = scheduler::run(&dag, &job[0], &job[1..], cfg.exec.as_ref(), &cfg.root, &cfg.cancellation, opts);
                if outcome.status.values().any(|s| matches!(s, StackStatus::Failed | StackStatus::Canceled)) {
                    failed = true;
                    break;
                }
            }
            Ok(if failed { 1 } else { 0 })
        }
    }
}
