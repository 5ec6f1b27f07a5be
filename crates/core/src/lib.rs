#![allow(clippy::result_large_err)]
//! choreo-core: action expressions, tag matching and activity graph compilation.
//!
//! The pipeline is leaf-first:
//!
//! - [`lexer`] + [`parser`] turn one action expression into an [`ActionDescriptor`]
//! - [`Unit`] groups the tag-conditioned variants of every action of an activity
//! - [`TagMatcher`] picks the most specific variant for one tag vector
//! - [`compile()`] walks a unit from its start action and emits a [`CompiledTable`]
//!
//! Discovery of actions is abstracted by [`SourceScanner`]. Nothing here does
//! I/O; persistence and execution live in `choreo-storage` and `choreo-runtime`.

pub mod action;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod source;
pub mod tags;
pub mod unit;

// ── Convenience re-exports: key types ────────────────────────────────

pub use action::{ActionDescriptor, ActionFlags, NextExpression};
pub use compiler::{CompiledTable, JoinId, NoMatch, Target, Transition};
pub use error::{ParseError, ScanError};
pub use matcher::{BestMatch, TagMatcher, Taggable};
pub use source::{SourceScanner, StaticScanner};
pub use tags::{TagValue, TagVector, Tags};
pub use unit::{Unit, VariantId, START_KEY};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use compiler::compile;
pub use parser::parse_action;
