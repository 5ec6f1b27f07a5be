//! Parsed action variants.
//!
//! One [`ActionDescriptor`] is produced per annotated action occurrence. Several
//! descriptors may share a key; they are tag-conditioned variants of the same
//! action and are told apart by the tag matcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tags::{TagValue, Tags};

/// Discriminant of the `+>` arm.
pub const IF_TRUE: &str = "+";
/// Discriminant of the `->` arm.
pub const IF_FALSE: &str = "-";

/// What follows an action once it has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextExpression {
    End,
    Single(String),
    /// Unconditional fan-out into unnamed concurrent branches.
    Fork(Vec<String>),
    /// Fan-out waiting for an external choice of one named branch.
    Split(Vec<(String, String)>),
    /// Arms keyed by `+`/`-`, integers or names; selected by the action's result.
    Decision(Vec<(String, NextExpression)>),
}

impl NextExpression {
    /// Every action key this expression can lead to, in declaration order.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            NextExpression::End => {}
            NextExpression::Single(k) => out.push(k),
            NextExpression::Fork(ks) => out.extend(ks.iter().map(String::as_str)),
            NextExpression::Split(arms) => out.extend(arms.iter().map(|(_, k)| k.as_str())),
            NextExpression::Decision(arms) => {
                for (_, arm) in arms {
                    arm.collect_targets(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFlags {
    pub start: bool,
    pub join: bool,
    pub detach: bool,
    pub readonly: bool,
}

/// One parsed action variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Addressable implementing unit; empty for unqualified actions.
    pub owner: String,
    pub name: String,
    pub flags: ActionFlags,
    pub next: NextExpression,
    pub tags: Tags,
}

impl ActionDescriptor {
    /// `Owner::name`, or the bare name when there is no owner.
    pub fn key(&self) -> String {
        qualify(&self.owner, &self.name)
    }

    /// Parse `text` as the expression of the action identified by `key`.
    pub fn parse(key: &str, text: &str) -> Result<Self, crate::ParseError> {
        let (owner, name) = split_key(key);
        crate::parser::parse_action(text, owner, name)
    }

    fn short<'a>(&self, key: &'a str) -> &'a str {
        if self.owner.is_empty() {
            return key;
        }
        key.strip_prefix(self.owner.as_str())
            .and_then(|rest| rest.strip_prefix("::"))
            .filter(|rest| !rest.contains("::"))
            .unwrap_or(key)
    }

    fn write_clause(&self, f: &mut fmt::Formatter<'_>, next: &NextExpression) -> fmt::Result {
        match next {
            NextExpression::End => f.write_str("end"),
            NextExpression::Single(k) => f.write_str(self.short(k)),
            NextExpression::Fork(ks) => {
                for (i, k) in ks.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    f.write_str(self.short(k))?;
                }
                Ok(())
            }
            NextExpression::Split(arms) => {
                for (i, (branch, k)) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}:{}", branch, self.short(k))?;
                }
                Ok(())
            }
            NextExpression::Decision(arms) => self.write_arms(f, arms),
        }
    }

    fn write_arms(&self, f: &mut fmt::Formatter<'_>, arms: &[(String, NextExpression)]) -> fmt::Result {
        for (i, (key, arm)) in arms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match key.as_str() {
                IF_TRUE => f.write_str("+> ")?,
                IF_FALSE => f.write_str("-> ")?,
                other => write!(f, "{}> ", other)?,
            }
            self.write_clause(f, arm)?;
        }
        Ok(())
    }
}

/// Canonical expression text: flags, join marker, tags, then the transition.
/// Targets owned by the same owner are written unqualified.
impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.flags.start {
            parts.push("start".into());
        }
        if self.flags.readonly {
            parts.push("readonly".into());
        }
        if self.flags.detach {
            parts.push("detach".into());
        }
        if self.flags.join {
            parts.push(">|".into());
        }
        for (name, value) in &self.tags {
            parts.push(match value {
                TagValue::Wildcard => format!("#{}", name),
                TagValue::Empty => format!("#{}=", name),
                TagValue::Exact(v) => format!("#{}={}", name, v),
            });
        }
        for part in &parts {
            write!(f, "{} ", part)?;
        }
        match &self.next {
            NextExpression::End => f.write_str("end"),
            NextExpression::Decision(arms) => self.write_arms(f, arms),
            other => {
                f.write_str("> ")?;
                self.write_clause(f, other)
            }
        }
    }
}

/// Join an owner and a name into an action key.
pub fn qualify(owner: &str, name: &str) -> String {
    if owner.is_empty() || name.contains("::") {
        name.to_string()
    } else {
        format!("{}::{}", owner, name)
    }
}

/// Split an action key into `(owner, name)`; unqualified keys have no owner.
pub fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once("::").unwrap_or(("", key))
}
