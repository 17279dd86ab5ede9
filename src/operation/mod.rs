//! Round-based operations
//!
//! An operation is a resumable state machine: each round captures a frame,
//! probes regions, decides, and issues at most one input action. Task logic
//! implements [`OperationLogic`]; the shared [`OperationDriver`] owns the
//! round loop, the budget, retries and cancellation.
//!
//! ```text
//! PENDING -> RUNNING -> { SUCCESS, FAIL, TIMEOUT, CANCELLED }
//! ```

mod compose;
mod context;
mod decision;
mod driver;
mod primitives;
#[cfg(feature = "rhai-scripting")]
mod script;
mod state;

pub use compose::Sequence;
pub use context::{CancelToken, RoundContext};
pub use decision::{ChildOperation, Decision};
pub use driver::OperationDriver;
pub use primitives::{ClickRegion, Dismiss, DismissIfPresent, WaitRegion};
#[cfg(feature = "rhai-scripting")]
pub use script::ScriptedOperation;
pub use state::{FailureReason, OperationReport, OperationState};

use crate::config::OperationConfig;
use crate::input::{InputAction, InputError};
use crate::Result;

/// Task-specific round logic plugged into the driver
pub trait OperationLogic: Send {
    /// Stable identifier, used in reports and logs
    fn id(&self) -> &str;

    /// Regions this logic probes; checked against the catalog before the first round
    fn regions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Decide from this round's frame and internal state only
    fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision>;

    /// A delegated child finished in a state the parent accepts
    fn on_child_finished(&mut self, _report: &OperationReport) {}

    /// The action issued this round was rejected by the input collaborator
    fn on_action_failed(&mut self, _action: &InputAction, _error: &InputError) {}
}

/// One node of an operation tree: its logic, tuning and lifecycle state
pub struct Operation {
    logic: Box<dyn OperationLogic>,
    config: OperationConfig,
    state: OperationState,
}

impl Operation {
    pub fn new(logic: Box<dyn OperationLogic>, config: OperationConfig) -> Self {
        Self {
            logic,
            config,
            state: OperationState::Pending,
        }
    }

    pub fn id(&self) -> &str {
        self.logic.id()
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    pub fn regions(&self) -> Vec<String> {
        self.logic.regions()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("state", &self.state)
            .field("max_rounds", &self.config.max_rounds)
            .finish()
    }
}
