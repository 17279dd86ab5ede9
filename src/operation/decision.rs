//! What a round decides

use crate::config::OperationConfig;
use crate::input::InputAction;

use super::{Operation, OperationLogic};

/// Outcome of one round's decision step
#[derive(Debug)]
pub enum Decision {
    /// Nothing to do this round; keep running
    Continue,
    /// Issue exactly one input action, then keep running
    Act(InputAction),
    Succeed,
    Fail(String),
    /// Hand control to a child operation until it reaches a terminal state
    Delegate(ChildOperation),
}

impl Decision {
    pub fn fail(message: impl Into<String>) -> Self {
        Decision::Fail(message.into())
    }

    pub fn delegate(child: ChildOperation) -> Self {
        Decision::Delegate(child)
    }
}

/// A child step and the parent's policy towards it
#[derive(Debug)]
pub struct ChildOperation {
    pub operation: Operation,
    /// A failed optional child does not fail the parent
    pub optional: bool,
    /// Child rounds count against the parent's budget
    pub share_budget: bool,
}

impl ChildOperation {
    pub fn new(logic: Box<dyn OperationLogic>, config: OperationConfig) -> Self {
        Self {
            operation: Operation::new(logic, config),
            optional: false,
            share_budget: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn sharing_budget(mut self) -> Self {
        self.share_budget = true;
        self
    }

    pub fn id(&self) -> &str {
        self.operation.id()
    }
}
