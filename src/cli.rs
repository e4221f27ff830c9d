//! CLI struct definitions. All clap-derived types live here; dispatch
//! (wiring a parsed `Command` to its `run_*` function) lives in `main.rs`.

use clap::{Parser, Subcommand};

use crate::commands::{create, experimental, fmt, generate, list, run, script};

#[derive(Parser, Debug)]
#[clap(
    name = "terramate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Terramate orchestrates trees of Terraform/OpenTofu stacks: hierarchical configuration, code generation, change detection, and run scheduling.",
    disable_version_flag = true
)]
pub struct Cli {
    /// Project root (defaults to the current directory or its nearest
    /// VCS root).
    #[clap(long, global = true)]
    pub chdir: Option<std::path::PathBuf>,
    /// Increase log verbosity (`-v` info, `-vv` debug).
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Suppress all but error-level logging.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List stacks, optionally filtered or in run order.
    List(list::ListCli),
    /// Converge generated files with `generate_hcl`/`generate_file` declarations.
    Generate(generate::GenerateCli),
    /// Canonicalize the formatting of `.tm`/`.tm.hcl` files.
    Fmt(fmt::FmtCli),
    /// Run a command across the DAG of selected stacks.
    Run(run::RunCli),
    /// Inspect and run named `script {}` blocks.
    Script(script::ScriptCli),
    /// Scaffold a new stack directory.
    Create(create::CreateCli),
    /// Commands without a stability guarantee yet.
    Experimental(experimental::ExperimentalCli),
}
