//! The seam between the runtime and action implementations.
//!
//! The runtime never calls actions itself: it yields a [`Step`] and waits for
//! the caller to report the outcome. [`ActionInvoker`] packages that caller
//! side for [`Activity::drive`](crate::Activity::drive).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::activity::{Decision, Step};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    /// No implementation is bound to the action key.
    #[error("no invocable for action '{0}'")]
    Unresolved(String),

    /// The action ran and raised a business error.
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait ActionInvoker: Send {
    /// Run the action of `step` against its branch state. A returned decision
    /// selects the arm of a decision transition.
    async fn invoke(
        &mut self,
        step: &Step,
        state: &mut Value,
    ) -> Result<Option<Decision>, InvokeError>;
}

type Handler = Box<dyn FnMut(&mut Value) -> Result<Option<Decision>, String> + Send>;

/// Invoker backed by closures registered per action key.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Handler>,
    calls: Vec<Step>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, key: &str, handler: F) -> Self
    where
        F: FnMut(&mut Value) -> Result<Option<Decision>, String> + Send + 'static,
    {
        self.handlers.insert(key.to_string(), Box::new(handler));
        self
    }

    /// Every step invoked so far, in order.
    pub fn calls(&self) -> &[Step] {
        &self.calls
    }
}

#[async_trait]
impl ActionInvoker for ActionRegistry {
    async fn invoke(
        &mut self,
        step: &Step,
        state: &mut Value,
    ) -> Result<Option<Decision>, InvokeError> {
        let handler = self
            .handlers
            .get_mut(&step.action)
            .ok_or_else(|| InvokeError::Unresolved(step.action.clone()))?;
        let outcome = handler(state).map_err(InvokeError::Failed);
        self.calls.push(step.clone());
        outcome
    }
}
