//! HCL parsing.
//!
//! Parsing itself is delegated to the `hcl` crate (`hcl::parse`), which
//! turns `.tm`/`.tm.hcl` source text into a structurally faithful
//! [`hcl::Body`] of [`hcl::Block`]s and [`hcl::Attribute`]s over
//! [`hcl::Expression`]. What this module adds on top:
//!
//! - file discovery (`.tm`/`.tm.hcl` suffix matching, `.tmskip` markers)
//! - a best-effort source range recovered by locating each block/attribute
//!   in the original text, threaded through to the evaluator and report
//!   layers for diagnostics
//! - [`RawBlock`]/[`RawAttribute`], thin wrappers pairing the parsed AST
//!   node with that range and with the owning file path

mod ast;
mod discover;

pub use ast::{RawAttribute, RawBlock, RawFile, SourceRange};
pub use discover::{discover_config_files, is_terramate_file, parse_file, ParsedFile};

pub use hcl::{Body, Expression, ObjectKey, Structure};
