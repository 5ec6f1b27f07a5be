//! Tag values and ordered tag vectors.
//!
//! A tag declared on an action variant is one of three things: present with
//! any value (`#tag`), present with an explicit empty value (`#tag=`), or
//! present with an exact value (`#tag=value`). A [`TagVector`] is the fixed,
//! ordered view of one tag combination for a unit, where every tag of the unit
//! appears exactly once and `None` marks an absent tag.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value carried by a tag declaration or by one entry of a tag vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValue {
    /// `#tag` -- present, matches any concrete value.
    Wildcard,
    /// `#tag=` -- present with an explicit empty value.
    Empty,
    /// `#tag=value` -- present with an exact, non-empty value.
    Exact(String),
}

impl TagValue {
    /// Build a concrete value; the empty string maps to [`TagValue::Empty`].
    pub fn exact(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            TagValue::Empty
        } else {
            TagValue::Exact(value)
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TagValue::Wildcard)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Wildcard => f.write_str("*"),
            TagValue::Empty => Ok(()),
            TagValue::Exact(v) => f.write_str(v),
        }
    }
}

/// Tags declared on one action variant, keyed by tag name.
pub type Tags = BTreeMap<String, TagValue>;

/// One tag combination in a unit's fixed tag order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagVector {
    entries: Vec<(String, Option<TagValue>)>,
}

impl TagVector {
    pub fn new(entries: Vec<(String, Option<TagValue>)>) -> Self {
        TagVector { entries }
    }

    /// Reorder `values` into `order`; tags missing from `values` become `None`
    /// and tags outside `order` are dropped.
    pub fn from_order(order: &[String], values: &Tags) -> Self {
        TagVector {
            entries: order
                .iter()
                .map(|name| (name.clone(), values.get(name).cloned()))
                .collect(),
        }
    }

    /// Same as [`TagVector::from_order`] for caller-supplied concrete strings.
    pub fn concrete(order: &[String], values: &BTreeMap<String, String>) -> Self {
        TagVector {
            entries: order
                .iter()
                .map(|name| (name.clone(), values.get(name).map(TagValue::exact)))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(String, Option<TagValue>)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// The present entries as a tag map.
    pub fn present(&self) -> Tags {
        self.entries
            .iter()
            .filter_map(|(n, v)| v.clone().map(|v| (n.clone(), v)))
            .collect()
    }

    /// Copy of this vector with `name` set to `value`. Unknown names are ignored.
    pub fn with(&self, name: &str, value: Option<TagValue>) -> Self {
        let mut out = self.clone();
        if let Some(entry) = out.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        }
        out
    }
}

impl fmt::Display for TagVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let mut first = true;
        for (name, value) in &self.entries {
            let Some(value) = value else { continue };
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match value {
                TagValue::Wildcard => write!(f, "{}", name)?,
                other => write!(f, "{}={}", name, other)?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Vec<String> {
        vec!["lang".to_string(), "channel".to_string()]
    }

    #[test]
    fn exact_maps_empty_string_to_empty() {
        assert_eq!(TagValue::exact(""), TagValue::Empty);
        assert_eq!(TagValue::exact("en"), TagValue::Exact("en".to_string()));
    }

    #[test]
    fn concrete_vector_follows_unit_order_and_drops_unknown_tags() {
        let mut values = BTreeMap::new();
        values.insert("channel".to_string(), "web".to_string());
        values.insert("unknown".to_string(), "x".to_string());
        let v = TagVector::concrete(&order(), &values);
        assert_eq!(
            v.entries(),
            &[
                ("lang".to_string(), None),
                ("channel".to_string(), Some(TagValue::Exact("web".to_string()))),
            ]
        );
        assert_eq!(v.to_string(), "{channel=web}");
    }

    #[test]
    fn with_replaces_only_known_entries() {
        let v = TagVector::from_order(&order(), &Tags::new());
        let w = v.with("lang", Some(TagValue::Wildcard)).with("nope", None);
        assert_eq!(w.get("lang"), Some(&TagValue::Wildcard));
        assert_eq!(w.entries().len(), 2);
        assert_eq!(w.to_string(), "{lang}");
    }

    #[test]
    fn vector_json_round_trip() {
        let v = TagVector::new(vec![
            ("a".to_string(), Some(TagValue::Wildcard)),
            ("b".to_string(), Some(TagValue::Empty)),
            ("c".to_string(), Some(TagValue::Exact("x".to_string()))),
            ("d".to_string(), None),
        ]);
        let json = serde_json::to_string(&v).unwrap();
        let back: TagVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
