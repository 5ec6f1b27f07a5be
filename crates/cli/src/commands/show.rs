use std::collections::BTreeMap;
use std::path::PathBuf;

use choreo_core::CompiledTable;
use choreo_runtime::GraphCache;
use choreo_storage::MemoryCacheStore;

use super::{describe_tags, scan_one, Context};
use crate::error::CliError;
use crate::OutputFormat;

/// Compiles in memory; the state directory is not touched.
pub(crate) async fn cmd_show(
    ctx: &Context,
    manifest: PathBuf,
    tags: BTreeMap<String, String>,
) -> Result<(), CliError> {
    let unit = scan_one(manifest)?;
    let cache = GraphCache::new(MemoryCacheStore::new());
    cache.rebuild(&unit).await?;

    let table = cache.lookup(unit.name(), &tags).await?.ok_or_else(|| {
        CliError::Usage(format!(
            "no compiled activity for unit '{}' and tags {}",
            unit.name(),
            describe_tags(&tags)
        ))
    })?;

    match ctx.output {
        OutputFormat::Json => ctx.print_json(&table),
        OutputFormat::Text => print!("{}", render(&table)),
    }
    Ok(())
}

fn render(table: &CompiledTable) -> String {
    let mut out = format!("unit {} {}\n", table.unit, table.tags);
    if table.readonly {
        out.push_str("readonly\n");
    }
    let width = table.actions.keys().map(String::len).max().unwrap_or(0);
    for (key, transition) in &table.actions {
        let detach = if table.is_detached(key) { " [detach]" } else { "" };
        out.push_str(&format!("  {:<width$}  {}{}\n", key, transition, detach, width = width));
    }
    for (id, target) in &table.joins {
        out.push_str(&format!("join #{} = {}\n", id, target));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::{compile, TagMatcher, TagVector, Unit, START_KEY};

    #[test]
    fn renders_actions_and_joins() {
        let mut unit = Unit::new("shop");
        for (key, expr) in [
            ("a", "start readonly > b | c"),
            ("b", "readonly > j"),
            ("c", "readonly detach > j"),
            ("j", "readonly >| end"),
        ] {
            unit.register_expression(key, expr).unwrap();
        }
        let matcher = TagMatcher::new(TagVector::from_order(unit.tag_order(), &Default::default()));
        let table = compile(&unit, START_KEY, &matcher).unwrap();

        let text = render(&table);
        assert!(text.starts_with("unit shop {}\nreadonly\n"));
        assert!(text.contains("  a      > b | c\n"));
        assert!(text.contains("  c      > #1 [detach]\n"));
        assert!(text.contains("join #1 = j\n"));
    }
}
