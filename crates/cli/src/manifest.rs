//! Declarative unit manifests.
//!
//! ```toml
//! [unit]
//! name = "checkout"
//!
//! [[action]]
//! key = "Cart::receive"
//! expr = "start > validate"
//! ```
//!
//! Several `[[action]]` tables may share a key; each is one tag-conditioned
//! variant of that action.

use std::path::{Path, PathBuf};

use choreo_core::{ScanError, SourceScanner, Unit};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UnitManifest {
    pub unit: UnitSection,
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UnitSection {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ActionEntry {
    pub key: String,
    pub expr: String,
}

impl UnitManifest {
    pub fn parse(contents: &str) -> Result<Self, String> {
        let manifest: UnitManifest = toml::from_str(contents).map_err(|e| e.to_string())?;
        if manifest.unit.name.trim().is_empty() {
            return Err("unit name must not be empty".to_string());
        }
        Ok(manifest)
    }
}

/// Scans manifest files. Manifests naming the same unit are merged in order.
pub(crate) struct ManifestScanner {
    paths: Vec<PathBuf>,
}

impl ManifestScanner {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        ManifestScanner { paths }
    }

    fn read(path: &Path) -> Result<UnitManifest, ScanError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Source(format!("error reading '{}': {}", path.display(), e)))?;
        UnitManifest::parse(&contents)
            .map_err(|e| ScanError::Source(format!("invalid manifest '{}': {}", path.display(), e)))
    }
}

impl SourceScanner for ManifestScanner {
    fn scan(&self) -> Result<Vec<Unit>, ScanError> {
        let mut units: Vec<Unit> = Vec::new();
        for path in &self.paths {
            let manifest = Self::read(path)?;
            let pos = match units.iter().position(|u| u.name() == manifest.unit.name) {
                Some(pos) => pos,
                None => {
                    units.push(Unit::new(manifest.unit.name.clone()));
                    units.len() - 1
                }
            };
            for action in &manifest.actions {
                units[pos].register_expression(&action.key, &action.expr)?;
            }
            tracing::debug!(
                path = %path.display(),
                unit = %manifest.unit.name,
                actions = manifest.actions.len(),
                "scanned manifest"
            );
        }
        Ok(units)
    }
}

/// Parse a `--tag name=value` argument.
pub(crate) fn parse_tag(arg: &str) -> Result<(String, String), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    if name.is_empty() {
        return Err(format!("missing tag name in '{}'", arg));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = r#"
[unit]
name = "checkout"

[[action]]
key = "Cart::receive"
expr = "start #channel > validate"

[[action]]
key = "Cart::receive"
expr = "start #channel=kiosk > validate"

[[action]]
key = "Cart::validate"
expr = "end"
"#;

    #[test]
    fn parses_variants() {
        let manifest = UnitManifest::parse(CHECKOUT).unwrap();
        assert_eq!(manifest.unit.name, "checkout");
        assert_eq!(manifest.actions.len(), 3);
        assert_eq!(manifest.actions[1].expr, "start #channel=kiosk > validate");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = UnitManifest::parse("[unit]\nname = \"x\"\nowner = \"y\"\n").unwrap_err();
        assert!(err.contains("owner"));
    }

    #[test]
    fn rejects_empty_unit_name() {
        assert!(UnitManifest::parse("[unit]\nname = \"\"\n").is_err());
    }

    #[test]
    fn scanner_registers_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkout.toml");
        std::fs::write(&path, CHECKOUT).unwrap();

        let units = ManifestScanner::new(vec![path]).scan().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].variants("Cart::receive").len(), 2);
        assert_eq!(units[0].variants("start").len(), 2);
    }

    #[test]
    fn scanner_reports_the_failing_file() {
        let err = ManifestScanner::new(vec![PathBuf::from("/nonexistent/unit.toml")])
            .scan()
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/unit.toml"));
    }

    #[test]
    fn tag_arguments() {
        assert_eq!(
            parse_tag("lang=en").unwrap(),
            ("lang".to_string(), "en".to_string())
        );
        assert_eq!(parse_tag("draft=").unwrap().1, "");
        assert!(parse_tag("lang").is_err());
        assert!(parse_tag("=en").is_err());
    }
}
