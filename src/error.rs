//! Crate error types and the failure taxonomy

use thiserror::Error;

use crate::input::InputError;
use crate::record::StoreError;
use crate::vision::CaptureError;

/// Result type for automation operations
pub type Result<T> = std::result::Result<T, AutomationError>;

/// Top-level error for the automation engine
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("input failed: {0}")]
    Input(#[from] InputError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("unknown application: {0}")]
    UnknownApplication(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error("already running")]
    AlreadyRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutomationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        AutomationError::Configuration(message.into())
    }

    /// Where this error sits in the failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::Capture(_) | AutomationError::Input(_) => ErrorKind::TargetUnavailable,
            AutomationError::Script(_) => ErrorKind::OperationLogic,
            _ => ErrorKind::ConfigurationError,
        }
    }
}

/// Failure taxonomy shared by operations and applications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Uncertain match; retried next round, never surfaced
    TransientRecognitionNoise,
    /// Capture or input collaborator cannot reach the target
    TargetUnavailable,
    /// Round budget exhausted
    BudgetExceeded,
    /// Cooperative cancellation; a terminal outcome, not an error
    Cancelled,
    /// Malformed region, threshold or operation declaration
    ConfigurationError,
    /// Failure declared by the operation's own round logic
    OperationLogic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TransientRecognitionNoise => "transient recognition noise",
            ErrorKind::TargetUnavailable => "target unavailable",
            ErrorKind::BudgetExceeded => "budget exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::OperationLogic => "operation logic",
        };
        f.write_str(name)
    }
}
