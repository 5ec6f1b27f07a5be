use std::path::PathBuf;

use choreo_core::SourceScanner;

use super::Context;
use crate::error::CliError;
use crate::manifest::ManifestScanner;
use crate::OutputFormat;

pub(crate) async fn cmd_compile(ctx: &Context, manifests: Vec<PathBuf>) -> Result<(), CliError> {
    let units = ManifestScanner::new(manifests).scan()?;
    let cache = ctx.cache();

    let mut summaries = Vec::with_capacity(units.len());
    for unit in &units {
        summaries.push(cache.rebuild(unit).await?);
    }

    match ctx.output {
        OutputFormat::Json => ctx.print_json(&summaries),
        OutputFormat::Text => {
            if !ctx.quiet {
                for s in &summaries {
                    println!(
                        "{}: {} tag vectors, {} tables, {} pruned",
                        s.unit, s.vectors, s.tables, s.pruned
                    );
                }
            }
        }
    }
    Ok(())
}
