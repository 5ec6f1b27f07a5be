//! Journal-driven activity runtime.
//!
//! An [`Activity`] walks one [`CompiledTable`] over a persisted
//! [`JournalState`]. The caller pulls steps with [`Activity::next_step`], runs
//! each action, optionally reports a decision or a failure, and pulls again;
//! pulling settles the previous step and persists the journal exactly once.
//!
//! Concurrency is cooperative: a fork spawns concurrent branches which are
//! stepped round-robin, one action at a time, until every branch has reached
//! an end, an exception or the join. The main branch then resumes at the join
//! target, or stops if no branch joined.

use std::collections::BTreeMap;
use std::fmt;

use choreo_core::{CompiledTable, Target, Transition, START_KEY};
use choreo_storage::{
    sentinel, BranchRecord, CacheStore, JournalState, JournalStore, PendingStep, SplitRecord,
};
use serde::Serialize;

use crate::cache::GraphCache;
use crate::error::RuntimeError;
use crate::invoker::{ActionInvoker, InvokeError};

/// Branch id of the main branch.
pub const MAIN_BRANCH: u32 = 0;

/// One action handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub branch: u32,
    pub action: String,
    /// The action is marked `detach`; it may run without blocking its branch.
    pub detach: bool,
}

/// Result of an action that selects a decision arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Bool(bool),
    Int(i64),
    Name(String),
}

impl Decision {
    /// Arm key this decision selects: `+`/`-` for booleans, the value otherwise.
    pub fn discriminant(&self) -> String {
        match self {
            Decision::Bool(true) => "+".to_string(),
            Decision::Bool(false) => "-".to_string(),
            Decision::Int(n) => n.to_string(),
            Decision::Name(s) => s.clone(),
        }
    }

    /// Read a decision typed on a command line.
    pub fn parse_token(token: &str) -> Self {
        match token {
            "true" | "+" => Decision::Bool(true),
            "false" | "-" => Decision::Bool(false),
            other => match other.parse::<i64>() {
                Ok(n) => Decision::Int(n),
                Err(_) => Decision::Name(other.to_string()),
            },
        }
    }
}

impl From<bool> for Decision {
    fn from(b: bool) -> Self {
        Decision::Bool(b)
    }
}

impl From<i64> for Decision {
    fn from(n: i64) -> Self {
        Decision::Int(n)
    }
}

impl From<&str> for Decision {
    fn from(s: &str) -> Self {
        Decision::Name(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    Running,
    /// Main branch waiting for concurrent branches.
    Forked,
    /// Waiting for a split branch choice.
    Split,
    Paused,
    Stopped,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Start => "start",
            RunState::Running => "running",
            RunState::Forked => "forked",
            RunState::Split => "split",
            RunState::Paused => "paused",
            RunState::Stopped => "stopped",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchStatus {
    pub id: u32,
    pub action: String,
    pub running: bool,
    pub error: Option<String>,
}

impl From<&BranchRecord> for BranchStatus {
    fn from(b: &BranchRecord) -> Self {
        BranchStatus {
            id: b.id,
            action: b.current_action.clone(),
            running: b.running,
            error: b.error_message.clone(),
        }
    }
}

/// Read-only summary of an activity.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityStatus {
    pub journal: String,
    pub unit: String,
    pub state: RunState,
    pub current: String,
    pub pending: Option<PendingStep>,
    pub error: Option<String>,
    pub readonly: bool,
    /// Names offered by a pending split.
    pub split: Vec<String>,
    pub branches: Vec<BranchStatus>,
    pub retired: Vec<BranchStatus>,
}

/// A structural error attributed to the branch it happened on.
struct Fault {
    branch: u32,
    error: RuntimeError,
}

fn describe_tags(tags: &BTreeMap<String, String>) -> String {
    let parts: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}

pub struct Activity<S> {
    store: S,
    table: CompiledTable,
    journal: JournalState,
}

impl<S: JournalStore> Activity<S> {
    /// Start a new activity on `table`.
    pub async fn create(
        store: S,
        table: CompiledTable,
        tags: &BTreeMap<String, String>,
    ) -> Result<Self, RuntimeError> {
        let journal = store.create(&table.unit, tags).await?;
        tracing::info!(
            journal = %journal.id,
            unit = %table.unit,
            tags = %table.tags,
            "created activity"
        );
        Ok(Activity {
            store,
            table,
            journal,
        })
    }

    /// Resume the journal `id` on `table`.
    pub async fn load(store: S, table: CompiledTable, id: &str) -> Result<Self, RuntimeError> {
        let journal = store.load(id).await?;
        if journal.unit != table.unit {
            return Err(RuntimeError::UnitMismatch {
                journal: journal.unit,
                table: table.unit,
            });
        }
        Ok(Activity {
            store,
            table,
            journal,
        })
    }

    /// Look up the compiled activity for `unit` and `tags`, then start it.
    pub async fn open<C: CacheStore>(
        cache: &GraphCache<C>,
        store: S,
        unit: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Self, RuntimeError> {
        let table = cache
            .lookup(unit, tags)
            .await?
            .ok_or_else(|| RuntimeError::NoActivity {
                unit: unit.to_string(),
                tags: describe_tags(tags),
            })?;
        Self::create(store, table, tags).await
    }

    /// Load journal `id` together with the compiled activity it was started on.
    pub async fn reopen<C: CacheStore>(
        cache: &GraphCache<C>,
        store: S,
        id: &str,
    ) -> Result<Self, RuntimeError> {
        let journal = store.load(id).await?;
        let table = cache
            .lookup(&journal.unit, &journal.tags)
            .await?
            .ok_or_else(|| RuntimeError::NoActivity {
                unit: journal.unit.clone(),
                tags: describe_tags(&journal.tags),
            })?;
        Ok(Activity {
            store,
            table,
            journal,
        })
    }

    pub fn id(&self) -> &str {
        &self.journal.id
    }

    pub fn journal(&self) -> &JournalState {
        &self.journal
    }

    pub fn table(&self) -> &CompiledTable {
        &self.table
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Stepping ─────────────────────────────────────────────────────────────

    /// Settle the pending step, if any, and yield the next one.
    ///
    /// `Ok(None)` means nothing can run right now: the activity stopped,
    /// failed, is paused or waits for a split choice. The journal is saved
    /// once per call whatever the outcome; a structural error is recorded on
    /// the branch it happened on before it is returned.
    pub async fn next_step(&mut self) -> Result<Option<Step>, RuntimeError> {
        match self.settle_and_select() {
            Ok(step) => {
                self.journal.pending = step.as_ref().map(|s| PendingStep {
                    branch: s.branch,
                    action: s.action.clone(),
                });
                self.store.save(&self.journal).await?;
                Ok(step)
            }
            Err(Fault { branch, error }) => {
                tracing::error!(journal = %self.journal.id, branch, %error, "structural error");
                self.record_failure(branch, &error.to_string());
                self.store.save(&self.journal).await?;
                Err(error)
            }
        }
    }

    /// Report the decision of the pending step.
    pub fn decide(&mut self, decision: impl Into<Decision>) -> Result<(), RuntimeError> {
        let branch = self
            .journal
            .pending
            .as_ref()
            .map(|p| p.branch)
            .ok_or(RuntimeError::NoPendingStep)?;
        let record = self
            .journal
            .branch_mut(branch)
            .ok_or(RuntimeError::MissingBranch { branch })?;
        record.decision = Some(decision.into().discriminant());
        Ok(())
    }

    /// Report that the pending step's action raised `message`. The branch
    /// moves to the exception sentinel; the following [`Activity::next_step`]
    /// saves it together with the rest of the step.
    pub fn fail(&mut self, message: &str) -> Result<(), RuntimeError> {
        let pending = self
            .journal
            .pending
            .clone()
            .ok_or(RuntimeError::NoPendingStep)?;
        tracing::warn!(
            journal = %self.journal.id,
            branch = pending.branch,
            action = %pending.action,
            error = message,
            "action failed"
        );
        self.record_failure(pending.branch, message);
        Ok(())
    }

    /// Record `error` against the pending step and save; returns the error to
    /// propagate.
    pub async fn abort_step(&mut self, error: RuntimeError) -> RuntimeError {
        let Some(pending) = self.journal.pending.clone() else {
            return error;
        };
        tracing::error!(journal = %self.journal.id, branch = pending.branch, %error, "step aborted");
        self.record_failure(pending.branch, &error.to_string());
        match self.store.save(&self.journal).await {
            Ok(()) => error,
            Err(e) => e.into(),
        }
    }

    /// Run every step with `invoker` until the activity stops or blocks.
    /// Returns the steps that were run, in order.
    pub async fn drive<I>(&mut self, invoker: &mut I) -> Result<Vec<Step>, RuntimeError>
    where
        I: ActionInvoker + ?Sized,
    {
        let mut steps = Vec::new();
        while let Some(step) = self.next_step().await? {
            let state = match self.journal.branch_mut(step.branch) {
                Some(b) => &mut b.state,
                None => return Err(RuntimeError::MissingBranch { branch: step.branch }),
            };
            match invoker.invoke(&step, state).await {
                Ok(Some(decision)) => self.decide(decision)?,
                Ok(None) => {}
                Err(InvokeError::Failed(message)) => self.fail(&message)?,
                Err(InvokeError::Unresolved(action)) => {
                    return Err(self
                        .abort_step(RuntimeError::UnresolvedAction { action })
                        .await);
                }
            }
            steps.push(step);
        }
        Ok(steps)
    }

    // ── Controls ─────────────────────────────────────────────────────────────

    /// Stop handing out steps until [`Activity::resume`]. Not saved until the
    /// next [`Activity::checkpoint`] or step.
    pub fn pause(&mut self) {
        if !self.journal.is_finished() {
            self.journal.main.running = false;
        }
        for b in &mut self.journal.branches {
            b.running = false;
        }
    }

    pub fn resume(&mut self) {
        let main = &mut self.journal.main;
        if !matches!(
            main.current_action.as_str(),
            sentinel::STOP | sentinel::EXCEPTION | sentinel::SPLIT
        ) {
            main.running = true;
        }
        for b in &mut self.journal.branches {
            b.running = true;
        }
    }

    /// Choose the branch of the pending split; the next step starts it.
    pub fn follow_branch(&mut self, name: &str) -> Result<(), RuntimeError> {
        if self.journal.main.current_action != sentinel::SPLIT {
            return Err(RuntimeError::NoPendingSplit);
        }
        let split = self
            .journal
            .split
            .as_mut()
            .ok_or(RuntimeError::NoPendingSplit)?;
        if !split.branches.iter().any(|(b, _)| b == name) {
            return Err(RuntimeError::UnknownBranch {
                branch: name.to_string(),
            });
        }
        split.chosen = Some(name.to_string());
        Ok(())
    }

    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.store.save(&self.journal).await?;
        Ok(())
    }

    pub fn status(&self) -> ActivityStatus {
        let j = &self.journal;
        let state = match j.main.current_action.as_str() {
            sentinel::STOP => RunState::Stopped,
            sentinel::EXCEPTION => RunState::Failed,
            sentinel::SPLIT => RunState::Split,
            _ if !j.main.running => RunState::Paused,
            _ if !j.branches.is_empty() => RunState::Forked,
            sentinel::START => RunState::Start,
            _ => RunState::Running,
        };
        ActivityStatus {
            journal: j.id.clone(),
            unit: j.unit.clone(),
            state,
            current: j.main.current_action.clone(),
            pending: j.pending.clone(),
            error: j.main.error_message.clone(),
            readonly: self.table.readonly,
            split: j
                .split
                .as_ref()
                .map(|s| s.branches.iter().map(|(b, _)| b.clone()).collect())
                .unwrap_or_default(),
            branches: j.branches.iter().map(BranchStatus::from).collect(),
            retired: j.retired.iter().map(BranchStatus::from).collect(),
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn settle_and_select(&mut self) -> Result<Option<Step>, Fault> {
        if let Some(pending) = self.journal.pending.take() {
            self.advance(pending.branch, &pending.action)
                .map_err(|error| Fault {
                    branch: pending.branch,
                    error,
                })?;
        }
        self.select()
    }

    /// Take the transition of `action` on `branch`, consuming its decision.
    fn advance(&mut self, branch: u32, action: &str) -> Result<(), RuntimeError> {
        let transition = self
            .table
            .transition(action)
            .cloned()
            .ok_or_else(|| RuntimeError::MissingAction {
                action: action.to_string(),
            })?;
        let decision = self
            .journal
            .branch_mut(branch)
            .ok_or(RuntimeError::MissingBranch { branch })?
            .decision
            .take();
        self.apply(branch, action, transition, decision)
    }

    fn apply(
        &mut self,
        branch: u32,
        action: &str,
        transition: Transition,
        decision: Option<String>,
    ) -> Result<(), RuntimeError> {
        if decision.is_some() && !matches!(transition, Transition::Decision(_)) {
            return Err(RuntimeError::UnexpectedDecision {
                action: action.to_string(),
            });
        }

        match transition {
            Transition::Decision(arms) => {
                let Some(token) = decision else {
                    return Err(RuntimeError::DecisionExpected {
                        action: action.to_string(),
                    });
                };
                let expected: Vec<String> = arms.iter().map(|(k, _)| k.clone()).collect();
                let Some((_, arm)) = arms.into_iter().find(|(k, _)| *k == token) else {
                    return Err(RuntimeError::UnknownDiscriminant {
                        action: action.to_string(),
                        value: token,
                        expected,
                    });
                };
                tracing::debug!(branch, action, decision = %token, "decision taken");
                return self.apply(branch, action, arm, None);
            }
            Transition::End => self.finish(branch),
            Transition::Goto(Target::Action(next)) => {
                tracing::debug!(branch, from = action, to = %next, "goto");
                if let Some(record) = self.journal.branch_mut(branch) {
                    record.current_action = next;
                }
            }
            Transition::Goto(Target::Join(id)) => {
                let target = self.resolve(&Target::Join(id))?;
                tracing::debug!(branch, from = action, join = id, to = %target, "join");
                self.journal.main.current_action = target;
                if branch != MAIN_BRANCH {
                    if let Some(record) = self.journal.branch_mut(branch) {
                        record.current_action = sentinel::JOIN.to_string();
                    }
                    self.journal.retire(branch);
                }
            }
            Transition::Fork(targets) => {
                if branch != MAIN_BRANCH {
                    return Err(RuntimeError::ForkInFork {
                        branch,
                        action: action.to_string(),
                    });
                }
                let keys = targets
                    .iter()
                    .map(|t| self.resolve(t))
                    .collect::<Result<Vec<_>, _>>()?;
                tracing::debug!(from = action, branches = ?keys, "fork");
                self.journal.main.current_action = sentinel::FORK.to_string();
                for key in keys {
                    let id = self.journal.next_branch_id;
                    self.journal.next_branch_id += 1;
                    let state = self.journal.main.state.clone();
                    self.journal.branches.push(BranchRecord::new(id, key, state));
                }
                self.journal.last_branch = None;
            }
            Transition::Split(arms) => {
                if branch != MAIN_BRANCH {
                    return Err(RuntimeError::SplitInFork {
                        branch,
                        action: action.to_string(),
                    });
                }
                let branches = arms
                    .iter()
                    .map(|(name, t)| Ok((name.clone(), self.resolve(t)?)))
                    .collect::<Result<Vec<_>, RuntimeError>>()?;
                tracing::debug!(from = action, "split; waiting for a branch choice");
                self.journal.split = Some(SplitRecord {
                    branches,
                    chosen: None,
                });
                self.journal.main.current_action = sentinel::SPLIT.to_string();
                self.journal.main.running = false;
            }
        }
        Ok(())
    }

    fn resolve(&self, target: &Target) -> Result<String, RuntimeError> {
        match target {
            Target::Action(key) => Ok(key.clone()),
            Target::Join(id) => self
                .table
                .join_target(*id)
                .map(str::to_string)
                .ok_or(RuntimeError::MissingJoin { id: *id }),
        }
    }

    fn finish(&mut self, branch: u32) {
        if branch == MAIN_BRANCH {
            self.journal.main.current_action = sentinel::STOP.to_string();
            self.journal.main.running = false;
            tracing::info!(journal = %self.journal.id, unit = %self.journal.unit, "activity completed");
        } else {
            if let Some(record) = self.journal.branch_mut(branch) {
                record.current_action = sentinel::STOP.to_string();
            }
            self.journal.retire(branch);
            tracing::debug!(branch, "branch ended");
        }
    }

    fn record_failure(&mut self, branch: u32, message: &str) {
        if let Some(record) = self.journal.branch_mut(branch) {
            record.current_action = sentinel::EXCEPTION.to_string();
            record.running = false;
            record.error_message = Some(message.to_string());
            record.decision = None;
        }
        if branch != MAIN_BRANCH {
            self.journal.retire(branch);
        }
        self.journal.pending = None;
    }

    fn select(&mut self) -> Result<Option<Step>, Fault> {
        loop {
            if !self.journal.branches.is_empty() {
                return self.select_concurrent();
            }
            let current = self.journal.main.current_action.clone();
            match current.as_str() {
                sentinel::STOP | sentinel::EXCEPTION => return Ok(None),
                sentinel::SPLIT => {
                    let chosen = self.journal.split.as_ref().and_then(|s| {
                        let name = s.chosen.as_ref()?;
                        s.branches
                            .iter()
                            .find(|(b, _)| b == name)
                            .map(|(_, key)| key.clone())
                    });
                    let Some(target) = chosen else {
                        return Ok(None);
                    };
                    tracing::debug!(to = %target, "split resumed");
                    self.journal.split = None;
                    self.journal.main.current_action = target;
                    self.journal.main.running = true;
                }
                _ if !self.journal.main.running => return Ok(None),
                sentinel::FORK => {
                    // Every branch ended without reaching a join.
                    self.finish(MAIN_BRANCH);
                    return Ok(None);
                }
                sentinel::START => {
                    let transition = self
                        .table
                        .transition(START_KEY)
                        .cloned()
                        .ok_or_else(|| Fault {
                            branch: MAIN_BRANCH,
                            error: RuntimeError::MissingAction {
                                action: START_KEY.to_string(),
                            },
                        })?;
                    self.apply(MAIN_BRANCH, START_KEY, transition, None)
                        .map_err(|error| Fault {
                            branch: MAIN_BRANCH,
                            error,
                        })?;
                }
                action => return self.yield_step(MAIN_BRANCH, action).map(Some),
            }
        }
    }

    fn select_concurrent(&mut self) -> Result<Option<Step>, Fault> {
        let running: Vec<u32> = self
            .journal
            .branches
            .iter()
            .filter(|b| b.running)
            .map(|b| b.id)
            .collect();
        let next = match self.journal.last_branch {
            Some(last) => running.iter().find(|id| **id > last).or(running.first()),
            None => running.first(),
        };
        let Some(&id) = next else {
            return Ok(None);
        };
        let action = self
            .journal
            .branch(id)
            .map(|b| b.current_action.clone())
            .unwrap_or_default();
        self.journal.last_branch = Some(id);
        self.yield_step(id, &action).map(Some)
    }

    fn yield_step(&self, branch: u32, action: &str) -> Result<Step, Fault> {
        if !self.table.contains(action) {
            return Err(Fault {
                branch,
                error: RuntimeError::MissingAction {
                    action: action.to_string(),
                },
            });
        }
        tracing::debug!(journal = %self.journal.id, branch, action, "step");
        Ok(Step {
            branch,
            action: action.to_string(),
            detach: self.table.is_detached(action),
        })
    }
}
