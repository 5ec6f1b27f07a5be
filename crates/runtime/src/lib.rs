//! choreo-runtime: compiled-graph cache and journal-driven execution.
//!
//! [`GraphCache`] precompiles every tag vector of a unit and answers lookups
//! with wildcard fallback. [`Activity`] steps one compiled table over a
//! persisted journal; the caller runs each yielded [`Step`] and reports back.

pub mod activity;
pub mod cache;
pub mod error;
pub mod invoker;

pub use activity::{Activity, ActivityStatus, BranchStatus, Decision, RunState, Step, MAIN_BRANCH};
pub use cache::{vector_digest, GraphCache, RebuildSummary, UnitIndex};
pub use error::{CacheError, RuntimeError};
pub use invoker::{ActionInvoker, ActionRegistry, InvokeError};
