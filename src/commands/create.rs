//! `terramate create`: scaffold a new stack directory with a `stack {}`
//! block.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;

use crate::core::error::{Result, TmError};
use crate::core::runtime::RuntimeConfig;
use crate::core::stack::StackId;

#[derive(Args, Debug)]
pub struct CreateCli {
    /// Directory to create the stack in, relative to the project root.
    pub path: PathBuf,
    /// Pre-populate `main.tf`/`variables.tf`/`outputs.tf` for a Terraform stack.
    #[clap(long = "all-terraform")]
    pub all_terraform: bool,
    /// Pre-populate `terragrunt.hcl` for a Terragrunt stack.
    #[clap(long = "all-terragrunt")]
    pub all_terragrunt: bool,
    /// Tags to set on the new stack.
    #[clap(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Generate a fresh id even if one would otherwise be left unset.
    #[clap(long)]
    pub ensure_stack_ids: bool,
    /// Paths to add to the stack's `watch` list.
    #[clap(long, value_delimiter = ',')]
    pub watch: Vec<String>,
}

pub fn run_create(cfg: &RuntimeConfig, args: &CreateCli) -> Result<i32> {
    let target = cfg.root.join(&args.path);
    std::fs::create_dir_all(&target).map_err(TmError::IOError)?;

    let stack_file = target.join("stack.tm.hcl");
    if stack_file.exists() {
        return Err(TmError::ConflictingConfig {
            message: format!("{} already declares a stack", stack_file.display()),
            range: None,
        });
    }

    let id = StackId::generate();
    let name = args.path.file_name().and_then(|n| n.to_str()).unwrap_or("stack").to_string();

    let mut body = String::new();
    writeln!(body, "stack {{").unwrap();
    writeln!(body, "  id   = \"{id}\"").unwrap();
    writeln!(body, "  name = \"{name}\"").unwrap();
    if !args.tags.is_empty() {
        writeln!(body, "  tags = [{}]", args.tags.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(", ")).unwrap();
    }
    if !args.watch.is_empty() {
        writeln!(body, "  watch = [{}]", args.watch.iter().map(|w| format!("\"{w}\"")).collect::<Vec<_>>().join(", ")).unwrap();
    }
    writeln!(body, "}}").unwrap();

    std::fs::write(&stack_file, body).map_err(TmError::IOError)?;

    if args.all_terraform {
        for file in ["main.tf", "variables.tf", "outputs.tf"] {
            let path = target.join(file);
            if !path.exists() {
                std::fs::write(&path, "").map_err(TmError::IOError)?;
            }
        }
    }
    if args.all_terragrunt {
        let path = target.join("terragrunt.hcl");
        if !path.exists() {
            std::fs::write(&path, "").map_err(TmError::IOError)?;
        }
    }

    println!("created stack {}", stack_file.display());
    Ok(0)
}
