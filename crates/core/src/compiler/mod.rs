//! Graph compiler: resolves one tag vector of a unit into a flat transition table.
//!
//! The walk starts at a key (normally [`START_KEY`](crate::unit::START_KEY)),
//! selects the best variant of every reachable key with the [`TagMatcher`],
//! and lowers each selected variant's next expression into a [`Transition`].
//! References to join actions are replaced by a numeric join id so the runtime
//! can tell "arrive at a join" apart from "move to an action".

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::NextExpression;
use crate::matcher::TagMatcher;
use crate::tags::TagVector;
use crate::unit::{Unit, VariantId};

pub type JoinId = u32;

/// A resolved successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Action(String),
    /// Indirection to a join action; see [`CompiledTable::join_target`].
    Join(JoinId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Action(key) => f.write_str(key),
            Target::Join(id) => write!(f, "#{}", id),
        }
    }
}

/// Lowered form of a [`NextExpression`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    End,
    Goto(Target),
    Fork(Vec<Target>),
    Split(Vec<(String, Target)>),
    Decision(Vec<(String, Transition)>),
}

impl Transition {
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Transition::End => Vec::new(),
            Transition::Goto(t) => vec![t],
            Transition::Fork(ts) => ts.iter().collect(),
            Transition::Split(arms) => arms.iter().map(|(_, t)| t).collect(),
            Transition::Decision(arms) => arms.iter().flat_map(|(_, a)| a.targets()).collect(),
        }
    }

    /// Discriminants accepted by a decision; empty for every other shape.
    pub fn discriminants(&self) -> Vec<&str> {
        match self {
            Transition::Decision(arms) => arms.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(" | ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
        match self {
            Transition::End => f.write_str("end"),
            Transition::Goto(t) => write!(f, "> {}", t),
            Transition::Fork(ts) => {
                f.write_str("> ")?;
                list(f, ts)
            }
            Transition::Split(arms) => {
                let arms: Vec<String> = arms.iter().map(|(b, t)| format!("{}:{}", b, t)).collect();
                f.write_str("> ")?;
                list(f, &arms)
            }
            Transition::Decision(arms) => {
                for (i, (key, arm)) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    let prefix = match key.as_str() {
                        "+" => "+>".to_string(),
                        "-" => "->".to_string(),
                        other => format!("{}>", other),
                    };
                    // Arms are clauses: drop the goto marker of the inner rendering.
                    let inner = arm.to_string();
                    write!(f, "{} {}", prefix, inner.strip_prefix("> ").unwrap_or(&inner))?;
                }
                Ok(())
            }
        }
    }
}

/// The compiled activity for one unit and one tag vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTable {
    pub unit: String,
    pub tags: TagVector,
    /// True iff every action reached during compilation is readonly.
    pub readonly: bool,
    pub actions: BTreeMap<String, Transition>,
    pub joins: BTreeMap<JoinId, String>,
    pub detached: BTreeSet<String>,
}

impl CompiledTable {
    pub fn transition(&self, key: &str) -> Option<&Transition> {
        self.actions.get(key)
    }

    pub fn join_target(&self, id: JoinId) -> Option<&str> {
        self.joins.get(&id).map(String::as_str)
    }

    pub fn is_detached(&self, key: &str) -> bool {
        self.detached.contains(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.actions.contains_key(key)
    }

    /// Action keys reachable in one step from `key`, joins resolved.
    pub fn successors(&self, key: &str) -> Vec<&str> {
        let Some(transition) = self.actions.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = Vec::new();
        for target in transition.targets() {
            let resolved = match target {
                Target::Action(k) => Some(k.as_str()),
                Target::Join(id) => self.join_target(*id),
            };
            if let Some(k) = resolved {
                if !out.contains(&k) {
                    out.push(k);
                }
            }
        }
        out
    }
}

/// No variant of `key` is eligible for the tag vector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no variant of '{key}' matches tags {tags}")]
pub struct NoMatch {
    pub key: String,
    pub tags: TagVector,
}

struct Walk<'a> {
    unit: &'a Unit,
    matcher: &'a TagMatcher,
    visited: BTreeSet<VariantId>,
    joins: BTreeMap<String, JoinId>,
    table: CompiledTable,
}

impl<'a> Walk<'a> {
    fn select(&self, key: &str) -> Result<VariantId, NoMatch> {
        let ids = self.unit.variants(key);
        let candidates: Vec<_> = ids.iter().map(|id| self.unit.get(*id)).collect();
        let best = self
            .matcher
            .find_best_match(candidates.iter().copied())
            .ok_or_else(|| NoMatch {
                key: key.to_string(),
                tags: self.matcher.vector().clone(),
            })?;
        Ok(ids[best.position])
    }

    /// Visit `key` depth-first and return how a predecessor refers to it.
    /// A join gets its id on first visit, before its successors are walked.
    fn visit(&mut self, key: &str) -> Result<Target, NoMatch> {
        let unit = self.unit;
        let id = self.select(key)?;
        let variant = unit.get(id);
        let target = if variant.flags.join {
            let next_id = self.joins.len() as JoinId + 1;
            let join = *self.joins.entry(key.to_string()).or_insert(next_id);
            self.table.joins.insert(join, key.to_string());
            Target::Join(join)
        } else {
            Target::Action(key.to_string())
        };
        if self.visited.insert(id) {
            self.table.readonly &= variant.flags.readonly;
            if variant.flags.detach {
                self.table.detached.insert(key.to_string());
            }
            let transition = self.lower(&variant.next)?;
            self.table.actions.insert(key.to_string(), transition);
        }
        Ok(target)
    }

    fn lower(&mut self, next: &NextExpression) -> Result<Transition, NoMatch> {
        Ok(match next {
            NextExpression::End => Transition::End,
            NextExpression::Single(k) => Transition::Goto(self.visit(k)?),
            NextExpression::Fork(ks) => Transition::Fork(
                ks.iter()
                    .map(|k| self.visit(k))
                    .collect::<Result<_, _>>()?,
            ),
            NextExpression::Split(arms) => Transition::Split(
                arms.iter()
                    .map(|(b, k)| Ok((b.clone(), self.visit(k)?)))
                    .collect::<Result<_, NoMatch>>()?,
            ),
            NextExpression::Decision(arms) => Transition::Decision(
                arms.iter()
                    .map(|(d, arm)| Ok((d.clone(), self.lower(arm)?)))
                    .collect::<Result<_, NoMatch>>()?,
            ),
        })
    }
}

/// Compile `unit` for the tag vector of `matcher`, starting at `start`.
///
/// The walk is depth-first, so join ids count up from 1 in the order joins
/// are first reached along that walk. Fails with [`NoMatch`] when any
/// reachable key has no eligible variant; the tag vector then has no activity.
pub fn compile(unit: &Unit, start: &str, matcher: &TagMatcher) -> Result<CompiledTable, NoMatch> {
    let mut walk = Walk {
        unit,
        matcher,
        visited: BTreeSet::new(),
        joins: BTreeMap::new(),
        table: CompiledTable {
            unit: unit.name().to_string(),
            tags: matcher.vector().clone(),
            readonly: true,
            actions: BTreeMap::new(),
            joins: BTreeMap::new(),
            detached: BTreeSet::new(),
        },
    };
    let result = walk.visit(start).map(|_| walk.table);
    match &result {
        Ok(table) => tracing::debug!(
            unit = unit.name(),
            tags = %table.tags,
            actions = table.actions.len(),
            joins = table.joins.len(),
            readonly = table.readonly,
            "compiled activity"
        ),
        Err(miss) => tracing::debug!(unit = unit.name(), error = %miss, "no activity for tags"),
    }
    result
}
