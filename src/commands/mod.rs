//! CLI subcommand implementations.
//!
//! One module per subsystem, each owning its own `clap::Args`/`Subcommand`
//! struct plus a `run_*` function that takes an explicit `&RuntimeConfig`
//! rather than reaching for global state.

pub mod create;
pub mod experimental;
pub mod fmt;
pub mod generate;
pub mod list;
pub mod run;
pub mod script;
