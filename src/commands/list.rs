//! `terramate list`: print stack paths, optionally filtered by tags or
//! changed-set membership, optionally in run order.

use clap::Args;

use crate::core::changes;
use crate::core::error::Result;
use crate::core::loader;
use crate::core::rundag;
use crate::core::runtime::RuntimeConfig;
use crate::core::stack::{self, Stack};

#[derive(Args, Debug)]
pub struct ListCli {
    /// Only stacks with an uncommitted/diffed change in themselves or a
    /// referenced module.
    #[clap(long)]
    pub changed: bool,
    /// Print in dependency (run) order instead of lexical path order.
    #[clap(long)]
    pub run_order: bool,
    /// Filter by cloud-reported status (`ok`, `drifted`, `failed`, `unknown`).
    #[clap(long)]
    pub status: Option<String>,
    /// Only stacks carrying every one of these tags.
    #[clap(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Exclude stacks carrying any of these tags.
    #[clap(long = "no-tags", value_delimiter = ',')]
    pub no_tags: Vec<String>,
}

pub fn run_list(cfg: &RuntimeConfig, args: &ListCli) -> Result<i32> {
    let result = loader::load(&cfg.root);
    let stacks = stack::build_stacks(&result.tree);

    let mut selected: Vec<Stack> = stacks
        .into_iter()
        .filter(|s| args.tags.iter().all(|t| s.tags.contains(t)))
        .filter(|s| !args.no_tags.iter().any(|t| s.tags.contains(t)))
        .collect();

    if args.changed {
        let current = cfg.vcs.current_ref()?;
        let changed = changes::detect(&result.tree, &cfg.root, cfg.vcs.as_ref(), &current, &current, true, true)?;
        let changed_dirs: std::collections::HashSet<_> = changed.into_iter().map(|c| c.dir).collect();
        selected.retain(|s| changed_dirs.contains(&s.dir));
    }

    if let Some(status) = &args.status {
        let cloud = crate::core::cloud::NoopCloudSync;
        use crate::core::cloud::CloudSync;
        let wanted = status.to_lowercase();
        selected.retain(|s| format!("{:?}", cloud.stack_status(s.dir.as_str())).to_lowercase() == wanted);
    }

    let dirs: Vec<String> = if args.run_order {
        let paths: Vec<_> = selected.iter().map(|s| s.dir.clone()).collect();
        let dag = rundag::build(&selected, &paths)?;
        rundag::topological_order(&dag, false).into_iter().map(|p| p.as_str().to_string()).collect()
    } else {
        let mut paths: Vec<_> = selected.iter().map(|s| s.dir.as_str().to_string()).collect();
        paths.sort();
        paths
    };

    for dir in dirs {
        println!("{dir}");
    }
    Ok(0)
}
