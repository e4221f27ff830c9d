//! `terramate fmt`: canonicalize `.tm`/`.tm.hcl` formatting.
//!
//! Delegates the actual re-serialization to the `hcl` crate's formatter
//! (parse then re-emit), same as the loader's own `hcl::from_str` call —
//! this command just decides which files to touch and whether to write.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;

use crate::core::error::{Result, TmError};
use crate::core::hcl::is_terramate_file;
use crate::core::runtime::RuntimeConfig;

#[derive(Args, Debug)]
pub struct FmtCli {
    /// Exit 2 (instead of 0) when any file's formatting changed.
    #[clap(long)]
    pub detailed_exit_code: bool,
    /// Files to format. Empty means every `.tm`/`.tm.hcl` file under the
    /// project root; `-` reads a single file from stdin and writes the
    /// formatted result to stdout.
    pub files: Vec<String>,
}

pub fn run_fmt(cfg: &RuntimeConfig, args: &FmtCli) -> Result<i32> {
    if args.files == ["-".to_string()] {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input).map_err(TmError::IOError)?;
        let formatted = format_source(&input)?;
        print!("{formatted}");
        return Ok(0);
    }

    let targets: Vec<PathBuf> = if args.files.is_empty() {
        discover_all(&cfg.root)
    } else {
        args.files.iter().map(PathBuf::from).collect()
    };

    let mut changed = false;
    for path in targets {
        let original = std::fs::read_to_string(&path).map_err(TmError::IOError)?;
        let formatted = format_source(&original)?;
        if formatted != original {
            changed = true;
            std::fs::write(&path, &formatted).map_err(TmError::IOError)?;
            println!("{}", path.display());
        }
    }

    if changed && args.detailed_exit_code {
        return Ok(2);
    }
    Ok(0)
}

fn format_source(src: &str) -> Result<String> {
    let body: hcl::Body = hcl::from_str(src).map_err(|e| TmError::ParseError {
        file: PathBuf::from("<input>"),
        message: e.to_string(),
        range: None,
    })?;
    hcl::to_string(&body).map_err(|e| TmError::Other(format!("failed to render formatted HCL: {e}")))
}

fn discover_all(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_str().map(is_terramate_file).unwrap_or(false) {
            out.push(entry.path().to_path_buf());
        }
    }
    out.sort();
    out
}
