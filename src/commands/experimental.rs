//! `terramate experimental clone|trigger`: commands not yet under the
//! stability guarantee of the rest of the surface.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::core::error::{Result, TmError};
use crate::core::generate::{generate_all, HeaderStyle};
use crate::core::loader;
use crate::core::runtime::RuntimeConfig;

#[derive(Args, Debug)]
pub struct ExperimentalCli {
    #[clap(subcommand)]
    pub command: ExperimentalCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExperimentalCommand {
    /// Copy a stack directory to a new path, generating a fresh id.
    Clone {
        src: PathBuf,
        dst: PathBuf,
        #[clap(long = "no-generate")]
        no_generate: bool,
    },
    /// Mark stacks as changed for the next `run`/`list --changed`, without
    /// an actual source change.
    Trigger {
        path: String,
        #[clap(long)]
        status: Option<String>,
        #[clap(long)]
        ignore_change: bool,
        #[clap(long)]
        recursive: bool,
    },
}

pub fn run_experimental(cfg: &RuntimeConfig, args: &ExperimentalCli) -> Result<i32> {
    match &args.command {
        ExperimentalCommand::Clone { src, dst, no_generate } => {
            let src_abs = cfg.root.join(src);
            let dst_abs = cfg.root.join(dst);
            copy_dir(&src_abs, &dst_abs)?;

            let stack_file = dst_abs.join("stack.tm.hcl");
            if stack_file.exists() {
                let content = std::fs::read_to_string(&stack_file).map_err(TmError::IOError)?;
                let fresh_id = crate::core::stack::StackId::generate();
                let rewritten = replace_id_attr(&content, fresh_id.as_str());
                std::fs::write(&stack_file, rewritten).map_err(TmError::IOError)?;
            }

            if !no_generate {
                let result = loader::load(&cfg.root);
                generate_all(&result.tree, &cfg.root, HeaderStyle::Hash);
            }
            println!("cloned {} to {}", src.display(), dst.display());
            Ok(0)
        }
        ExperimentalCommand::Trigger { path, status, ignore_change, recursive } => {
            let marker_dir = cfg.root.join(".terramate/trigger");
            std::fs::create_dir_all(&marker_dir).map_err(TmError::IOError)?;
            let safe_name = path.trim_start_matches('/').replace('/', "_");
            let marker = marker_dir.join(format!("{safe_name}.trigger"));
            let body = format!(
                "path = {path:?}\nstatus = {:?}\nignore_change = {ignore_change}\nrecursive = {recursive}\n",
                status.clone().unwrap_or_default()
            );
            std::fs::write(&marker, body).map_err(TmError::IOError)?;
            println!("triggered {path}");
            Ok(0)
        }
    }
}

fn copy_dir(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(TmError::IOError)?;
    for entry in std::fs::read_dir(src).map_err(TmError::IOError)? {
        let entry = entry.map_err(TmError::IOError)?;
        let target = dst.join(entry.file_name());
        if entry.file_type().map_err(TmError::IOError)?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(TmError::IOError)?;
        }
    }
    Ok(())
}

fn replace_id_attr(content: &str, fresh_id: &str) -> String {
    let re = regex::Regex::new(r#"(?m)^(\s*id\s*=\s*)"[^"]*"$"#).unwrap();
    if re.is_match(content) {
        re.replace(content, |caps: &regex::Captures| format!("{}\"{fresh_id}\"", &caps[1])).into_owned()
    } else {
        format!("{content}\n  id = \"{fresh_id}\"\n")
    }
}
