use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved values of a branch's `current_action`.
pub mod sentinel {
    /// Fresh activity; the entry transition has not been taken yet.
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    /// Main branch paused on a split, waiting for a branch choice.
    pub const SPLIT: &str = "split";
    pub const EXCEPTION: &str = "exception";
    /// Concurrent branch that reached its group's join.
    pub const JOIN: &str = "join";
    /// Main branch waiting for its concurrent branches.
    pub const FORK: &str = "fork";
}

/// Position and status of one branch of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// 0 for the main branch; concurrent branches count up from 1.
    pub id: u32,
    pub current_action: String,
    pub running: bool,
    pub error_message: Option<String>,
    /// Decision token reported for the current action, not yet consumed.
    pub decision: Option<String>,
    /// Opaque state handed to the action invoker.
    #[serde(default)]
    pub state: serde_json::Value,
}

impl BranchRecord {
    pub fn new(id: u32, current_action: impl Into<String>, state: serde_json::Value) -> Self {
        BranchRecord {
            id,
            current_action: current_action.into(),
            running: true,
            error_message: None,
            decision: None,
            state,
        }
    }
}

/// Named branches offered by a split, and the choice once made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub branches: Vec<(String, String)>,
    pub chosen: Option<String>,
}

/// A step handed out to the caller but not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStep {
    pub branch: u32,
    pub action: String,
}

/// Persisted execution state of one activity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalState {
    pub id: String,
    pub unit: String,
    /// Concrete tag values the activity was started with.
    pub tags: BTreeMap<String, String>,
    pub main: BranchRecord,
    /// Active concurrent branches, in creation order.
    pub branches: Vec<BranchRecord>,
    /// Concurrent branches that reached end, exception or a join.
    pub retired: Vec<BranchRecord>,
    pub split: Option<SplitRecord>,
    pub pending: Option<PendingStep>,
    pub next_branch_id: u32,
    /// Concurrent branch that ran last, for round-robin scheduling.
    pub last_branch: Option<u32>,
}

impl JournalState {
    pub fn new(unit: &str, tags: &BTreeMap<String, String>) -> Self {
        JournalState {
            id: generate_id(),
            unit: unit.to_string(),
            tags: tags.clone(),
            main: BranchRecord::new(0, sentinel::START, serde_json::Value::Null),
            branches: Vec::new(),
            retired: Vec::new(),
            split: None,
            pending: None,
            next_branch_id: 1,
            last_branch: None,
        }
    }

    pub fn branch(&self, id: u32) -> Option<&BranchRecord> {
        if id == self.main.id {
            return Some(&self.main);
        }
        self.branches
            .iter()
            .chain(self.retired.iter())
            .find(|b| b.id == id)
    }

    /// Mutable access to the main branch or an active concurrent branch.
    pub fn branch_mut(&mut self, id: u32) -> Option<&mut BranchRecord> {
        if id == self.main.id {
            return Some(&mut self.main);
        }
        self.branches.iter_mut().find(|b| b.id == id)
    }

    /// Move an active concurrent branch to the retired list.
    pub fn retire(&mut self, id: u32) {
        if let Some(pos) = self.branches.iter().position(|b| b.id == id) {
            let mut branch = self.branches.remove(pos);
            branch.running = false;
            self.retired.push(branch);
        }
    }

    /// Main branch stopped or failed.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.main.current_action.as_str(),
            sentinel::STOP | sentinel::EXCEPTION
        )
    }
}

/// Journal ids are 16 lowercase hex digits.
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Staged cache writes: `Some` puts, `None` deletes. Applied in order on commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<(String, Option<String>)>,
}

impl WriteBatch {
    pub fn put(&mut self, key: &str, value: String) {
        self.ops.push((key.to_string(), Some(value)));
    }

    pub fn delete(&mut self, key: &str) {
        self.ops.push((key.to_string(), None));
    }

    pub fn into_ops(self) -> Vec<(String, Option<String>)> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_journal_sits_at_start() {
        let j = JournalState::new("checkout", &BTreeMap::new());
        assert_eq!(j.main.current_action, sentinel::START);
        assert!(j.main.running);
        assert_eq!(j.id.len(), 16);
        assert!(is_valid_id(&j.id));
        assert!(!j.is_finished());
    }

    #[test]
    fn retire_moves_branch_out_of_the_active_set() {
        let mut j = JournalState::new("u", &BTreeMap::new());
        j.branches.push(BranchRecord::new(1, "a", serde_json::Value::Null));
        j.branches.push(BranchRecord::new(2, "b", serde_json::Value::Null));
        j.retire(1);
        assert_eq!(j.branches.len(), 1);
        assert_eq!(j.retired[0].id, 1);
        assert!(!j.retired[0].running);
        assert!(j.branch_mut(1).is_none());
        assert_eq!(j.branch(1).map(|b| b.id), Some(1));
    }

    #[test]
    fn ids_reject_path_characters() {
        assert!(!is_valid_id("../etc"));
        assert!(!is_valid_id(""));
        assert!(is_valid_id("00ff-ab_1"));
    }
}
