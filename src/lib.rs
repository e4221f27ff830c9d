//! Terramate: an orchestrator for trees of Terraform/OpenTofu stacks.
//!
//! A project is a directory tree of `.tm`/`.tm.hcl` files. Each directory
//! can declare `terramate {}`, `globals {}`, `stack {}`, `generate_hcl {}`,
//! `generate_file {}`, and `script {}` blocks; configuration merges down
//! the tree from root to leaf.
//!
//! # Crate structure
//!
//! - [`core`]: the engine — HCL parsing, the config loader, the globals
//!   and expression evaluators, the stack model, code generation, change
//!   detection, the run DAG and scheduler, and the VCS/exec collaborators.
//! - [`cli`]: the `clap`-derived command surface.
//! - [`commands`]: one module per subcommand, each owning its `clap::Args`
//!   and a `run_*` function over an explicit [`core::runtime::RuntimeConfig`].

pub mod cli;
pub mod commands;
pub mod core;
