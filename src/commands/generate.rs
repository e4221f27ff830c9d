//! `terramate generate`: converge every stack's generated files with its
//! `generate_hcl`/`generate_file` declarations.

use clap::Args;

use crate::core::error::Result;
use crate::core::generate::{self, HeaderStyle};
use crate::core::loader;
use crate::core::report::{Entry, Report};
use crate::core::runtime::RuntimeConfig;

#[derive(Args, Debug)]
pub struct GenerateCli {
    /// Number of worker threads for the per-stack fan-out (default: all cores).
    #[clap(long)]
    pub parallel: Option<usize>,
    /// Exit 2 (instead of 0) when generation produced any change.
    #[clap(long)]
    pub detailed_exit_code: bool,
}

pub fn run_generate(cfg: &RuntimeConfig, args: &GenerateCli) -> Result<i32> {
    let result = loader::load(&cfg.root);
    let root = cfg.root.clone();
    let report = match args.parallel {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build().map_err(|e| {
                crate::core::error::TmError::Other(format!("failed to build thread pool: {e}"))
            })?;
            pool.install(|| generate::generate_all(&result.tree, &root, HeaderStyle::Hash))
        }
        None => generate::generate_all(&result.tree, &root, HeaderStyle::Hash),
    };

    for outcome in &report.outcomes {
        let path = match outcome {
            generate::FileOutcome::Created(p) => format!("created {}", p.display()),
            generate::FileOutcome::Changed(p) => format!("changed {}", p.display()),
            generate::FileOutcome::Deleted(p) => format!("deleted {}", p.display()),
            generate::FileOutcome::Unchanged(p) => format!("unchanged {}", p.display()),
        };
        println!("{path}");
    }

    let has_errors = !report.errors.is_empty();
    let has_changes = report.has_changes();
    if has_errors {
        let render = Report::new();
        for (dir, err) in report.errors {
            render.record(&dir, Entry::Error(err));
        }
        eprint!("{}", render.render_full());
        return Ok(1);
    }
    if has_changes && args.detailed_exit_code {
        return Ok(2);
    }
    Ok(0)
}
