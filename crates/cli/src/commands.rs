//! Subcommand implementations.

mod compile;
mod show;
mod step;

use std::collections::BTreeMap;
use std::path::PathBuf;

use choreo_core::{SourceScanner, Unit};
use choreo_runtime::GraphCache;
use choreo_storage::{FsCacheStore, FsJournalStore};
use serde::Serialize;

use crate::error::CliError;
use crate::manifest::ManifestScanner;
use crate::OutputFormat;

pub(crate) use compile::cmd_compile;
pub(crate) use show::cmd_show;
pub(crate) use step::{cmd_advance, cmd_hold, cmd_start, cmd_status, Control};

pub(crate) struct Context {
    pub output: OutputFormat,
    pub quiet: bool,
    pub state_dir: PathBuf,
}

impl Context {
    fn cache(&self) -> GraphCache<FsCacheStore> {
        GraphCache::new(FsCacheStore::new(&self.state_dir))
    }

    fn journals(&self) -> FsJournalStore {
        FsJournalStore::new(&self.state_dir)
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let pretty = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e));
        println!("{}", pretty);
    }
}

/// The single unit defined by `manifest`.
fn scan_one(manifest: PathBuf) -> Result<Unit, CliError> {
    let display = manifest.display().to_string();
    ManifestScanner::new(vec![manifest])
        .scan()?
        .into_iter()
        .next()
        .ok_or_else(|| CliError::Usage(format!("manifest '{}' defines no unit", display)))
}

fn describe_tags(tags: &BTreeMap<String, String>) -> String {
    let parts: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}
