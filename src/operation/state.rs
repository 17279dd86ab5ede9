//! Operation lifecycle and terminal reports

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::vision::FrameSummary;

/// Lifecycle of one operation node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Running,
    Success,
    Fail,
    /// Budget exhausted under a tolerant exhaustion policy
    Timeout,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending | OperationState::Running)
    }

    /// Success, or a tolerated timeout at the top of the tree
    pub fn is_completion(&self) -> bool {
        matches!(self, OperationState::Success | OperationState::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "PENDING",
            OperationState::Running => "RUNNING",
            OperationState::Success => "SUCCESS",
            OperationState::Fail => "FAIL",
            OperationState::Timeout => "TIMEOUT",
            OperationState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an operation ended in FAIL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Round budget exhausted without success
    BudgetExceeded { rounds: u32 },
    /// Consecutive collaborator failures reached the ceiling
    TargetUnavailable { failures: u32, last_error: String },
    /// Malformed declaration detected before the first round
    Configuration { message: String },
    /// The round logic declared failure
    Logic { message: String },
    /// A required child ended in FAIL
    ChildFailed {
        child: String,
        cause: Box<FailureReason>,
    },
}

impl FailureReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureReason::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            FailureReason::TargetUnavailable { .. } => ErrorKind::TargetUnavailable,
            FailureReason::Configuration { .. } => ErrorKind::ConfigurationError,
            FailureReason::Logic { .. } => ErrorKind::OperationLogic,
            FailureReason::ChildFailed { cause, .. } => cause.kind(),
        }
    }

    /// The innermost reason, following child failures down the tree
    pub fn root(&self) -> &FailureReason {
        match self {
            FailureReason::ChildFailed { cause, .. } => cause.root(),
            other => other,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::BudgetExceeded { rounds } => {
                write!(f, "exceeded max rounds ({})", rounds)
            }
            FailureReason::TargetUnavailable {
                failures,
                last_error,
            } => write!(
                f,
                "target unavailable after {} consecutive failures: {}",
                failures, last_error
            ),
            FailureReason::Configuration { message } => write!(f, "configuration: {}", message),
            FailureReason::Logic { message } => f.write_str(message),
            FailureReason::ChildFailed { child, cause } => {
                write!(f, "step '{}' failed: {}", child, cause)
            }
        }
    }
}

/// Terminal result of one operation node and its delegated children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub id: String,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Rounds counted against this node's budget
    pub rounds: u32,
    /// Collaborator failures absorbed along the way
    pub absorbed_failures: u32,
    /// Last frame this node captured, kept for diagnosis
    #[serde(skip)]
    pub last_frame: Option<FrameSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OperationReport>,
}

impl OperationReport {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OperationState::Pending,
            reason: None,
            rounds: 0,
            absorbed_failures: 0,
            last_frame: None,
            children: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == OperationState::Success
    }

    /// Last frame seen anywhere in the tree, preferring the deepest failure
    pub fn diagnostic_frame(&self) -> Option<FrameSummary> {
        self.children
            .iter()
            .rev()
            .find(|c| c.state == OperationState::Fail)
            .and_then(|c| c.diagnostic_frame())
            .or(self.last_frame)
    }
}
