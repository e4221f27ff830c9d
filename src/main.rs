use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use terramate::cli::{Cli, Command};
use terramate::commands::{create, experimental, fmt, generate, list, run, script};
use terramate::core::exec::ProcessExecutor;
use terramate::core::runtime::{LogLevel, RuntimeConfig};
use terramate::core::vcs::GitVcs;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = LogLevel::resolve(cli.verbose, cli.quiet, std::env::var("TM_LOG").ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level.as_tracing_filter()))
        .with_target(false)
        .init();

    let root = match resolve_root(cli.chdir.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("terramate: {e}");
            return ExitCode::FAILURE;
        }
    };

    let vcs = Arc::new(GitVcs::new(root.clone()));
    let exec = Arc::new(ProcessExecutor);
    let mut cfg = RuntimeConfig::new(root, vcs, exec);
    cfg.log_level = log_level;
    if let Err(e) = cfg.cancellation.install_signal_handler() {
        tracing::warn!("failed to install signal handler: {e}");
    }

    let outcome = match &cli.command {
        Command::List(args) => list::run_list(&cfg, args),
        Command::Generate(args) => generate::run_generate(&cfg, args),
        Command::Fmt(args) => fmt::run_fmt(&cfg, args),
        Command::Run(args) => run::run_run(&cfg, args),
        Command::Script(args) => script::run_script(&cfg, args),
        Command::Create(args) => create::run_create(&cfg, args),
        Command::Experimental(args) => experimental::run_experimental(&cfg, args),
    };

    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(2) => ExitCode::from(2),
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("terramate: {} {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

/// Resolve the project root: `--chdir` if given, otherwise the current
/// directory's nearest VCS root, falling back to the current directory
/// itself when none is found.
fn resolve_root(chdir: Option<&std::path::Path>) -> std::io::Result<std::path::PathBuf> {
    let start = match chdir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let mut dir = start.as_path();
    loop {
        if dir.join(".git").exists() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Ok(start),
        }
    }
}
