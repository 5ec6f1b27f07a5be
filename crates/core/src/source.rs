//! Source scanner abstraction.
//!
//! The [`SourceScanner`] trait hides how actions are discovered. The core only
//! needs a deterministic list of units; [`StaticScanner`] registers actions
//! explicitly and is what tests and embedders use.

use crate::error::ScanError;
use crate::unit::Unit;

/// Produces every unit known to a source, actions grouped by key.
pub trait SourceScanner {
    fn scan(&self) -> Result<Vec<Unit>, ScanError>;
}

/// In-memory scanner fed with `(unit, key, expression)` triples.
#[derive(Debug, Clone, Default)]
pub struct StaticScanner {
    entries: Vec<(String, String, String)>,
}

impl StaticScanner {
    pub fn new() -> Self {
        StaticScanner::default()
    }

    pub fn action(mut self, unit: &str, key: &str, expr: &str) -> Self {
        self.entries
            .push((unit.to_string(), key.to_string(), expr.to_string()));
        self
    }
}

impl SourceScanner for StaticScanner {
    fn scan(&self) -> Result<Vec<Unit>, ScanError> {
        let mut units: Vec<Unit> = Vec::new();
        for (unit, key, expr) in &self.entries {
            let pos = match units.iter().position(|u| u.name() == unit) {
                Some(pos) => pos,
                None => {
                    units.push(Unit::new(unit.clone()));
                    units.len() - 1
                }
            };
            units[pos].register_expression(key, expr)?;
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_actions_by_unit_in_first_seen_order() {
        let units = StaticScanner::new()
            .action("b", "go", "start > done")
            .action("a", "x", "end")
            .action("b", "done", "end")
            .scan()
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name(), "b");
        assert_eq!(units[0].variants("done").len(), 1);
        assert_eq!(units[0].variants("start").len(), 1);
        assert_eq!(units[1].name(), "a");
    }

    #[test]
    fn first_parse_error_aborts_the_scan() {
        let err = StaticScanner::new()
            .action("u", "go", "start")
            .scan()
            .unwrap_err();
        assert!(err.to_string().contains("invalid expression for action 'go'"));
    }
}
