//! A unit groups every action variant of one activity.
//!
//! Variants live in an arena and are addressed by [`VariantId`]; the unit keeps
//! the per-key variant lists in registration order (the matcher breaks ties by
//! that order) and the unit-wide tag order used for every tag vector.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::action::{ActionDescriptor, ActionFlags, NextExpression};
use crate::error::ScanError;
use crate::tags::TagValue;

/// Reserved key of the synthetic entry action.
pub const START_KEY: &str = "start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(pub usize);

#[derive(Debug, Clone, Default)]
pub struct Unit {
    name: String,
    arena: Vec<ActionDescriptor>,
    variants: BTreeMap<String, Vec<VariantId>>,
    tag_order: Vec<String>,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Unit {
            name: name.into(),
            ..Unit::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag names in first-declaration order.
    pub fn tag_order(&self) -> &[String] {
        &self.tag_order
    }

    /// Add one variant. A `start` variant also registers a synthetic variant
    /// under [`START_KEY`] with the same tags that leads to it.
    pub fn register(&mut self, desc: ActionDescriptor) -> Result<VariantId, ScanError> {
        let key = desc.key();
        if key == START_KEY {
            return Err(ScanError::InvalidKey { key });
        }
        if desc.flags.start {
            let entry = ActionDescriptor {
                owner: String::new(),
                name: START_KEY.to_string(),
                flags: ActionFlags {
                    readonly: true,
                    ..ActionFlags::default()
                },
                next: NextExpression::Single(key.clone()),
                tags: desc.tags.clone(),
            };
            self.insert(START_KEY.to_string(), entry)?;
        }
        self.insert(key, desc)
    }

    /// Parse `expr` as the expression of `key` and register it.
    pub fn register_expression(&mut self, key: &str, expr: &str) -> Result<VariantId, ScanError> {
        if key.is_empty() || key.starts_with("::") || key.ends_with("::") {
            return Err(ScanError::InvalidKey {
                key: key.to_string(),
            });
        }
        let desc = ActionDescriptor::parse(key, expr).map_err(|error| ScanError::Parse {
            unit: self.name.clone(),
            key: key.to_string(),
            error,
        })?;
        self.register(desc)
    }

    fn insert(&mut self, key: String, desc: ActionDescriptor) -> Result<VariantId, ScanError> {
        let ids = self.variants.entry(key.clone()).or_default();
        if ids.iter().any(|id| self.arena[id.0].tags == desc.tags) {
            return Err(ScanError::DuplicateVariant {
                unit: self.name.clone(),
                key,
            });
        }
        for tag in desc.tags.keys() {
            if !self.tag_order.contains(tag) {
                self.tag_order.push(tag.clone());
            }
        }
        let id = VariantId(self.arena.len());
        self.arena.push(desc);
        ids.push(id);
        Ok(id)
    }

    pub fn get(&self, id: VariantId) -> &ActionDescriptor {
        &self.arena[id.0]
    }

    /// Variants registered under `key`, in registration order.
    pub fn variants(&self, key: &str) -> &[VariantId] {
        self.variants.get(key).map_or(&[], Vec::as_slice)
    }

    /// Distinct non-wildcard values declared for `tag` across all variants.
    pub fn declared_values(&self, tag: &str) -> BTreeSet<TagValue> {
        self.arena
            .iter()
            .filter_map(|d| d.tags.get(tag))
            .filter(|v| !v.is_wildcard())
            .cloned()
            .collect()
    }

    /// Tags some variant declares as a wildcard, in tag order.
    pub fn wildcard_tags(&self) -> Vec<String> {
        self.tag_order
            .iter()
            .filter(|tag| {
                self.arena
                    .iter()
                    .any(|d| d.tags.get(*tag).is_some_and(TagValue::is_wildcard))
            })
            .cloned()
            .collect()
    }
}
