//! Conformance test suite for `JournalStore` and `CacheStore` implementations.
//!
//! Backend-agnostic checks any store pair can run:
//!
//! - **Journal**: create/load round-trip, save replaces, not-found errors,
//!   full record shape preserved
//! - **Cache**: staged writes invisible before commit, atomic commit, abort
//!   discards, deletes, prefix listing
//!
//! # Usage
//!
//! ```ignore
//! use choreo_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn my_backend_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         (MyJournalStore::connect().await, MyCacheStore::connect().await)
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cache;
mod journal;

use std::fmt;
use std::future::Future;

use crate::{CacheStore, JournalStore};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category ("journal" or "cache").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite.
///
/// The `factory` is called once per test and must return a fresh, empty
/// journal store and cache store.
pub async fn run_conformance_suite<J, C, F, Fut>(factory: F) -> ConformanceReport
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let mut results = Vec::new();

    results.extend(journal::run_journal_tests(&factory).await);
    results.extend(cache::run_cache_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

/// `Err(msg)` unless `cond`.
fn check(cond: bool, msg: impl FnOnce() -> String) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(msg())
    }
}
