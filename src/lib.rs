//! NYA Core Automation
//!
//! A screen-driven automation engine for games and other visual targets.
//! Screens are described as data (named regions at a reference resolution),
//! tasks are written as resumable round-based operations, and every task is
//! guarded by a run record so it executes once per reset window.
//!
//! The crate is organised as:
//! - [`regions`]: region catalog declared against a reference resolution
//! - [`vision`]: capture sources, similarity scoring and the screen matcher
//! - [`operation`]: the round loop, composition and building-block operations
//! - [`record`]: run records, reset windows and the record book
//! - [`app`]: applications and their registry
//! - [`engine`], [`scheduler`], [`runtime`]: the context that ties it together
//!
//! Capture, input and text recognition are collaborators behind traits; the
//! crate ships a frame-replay capture and a dry-run input for offline use.

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod operation;
pub mod record;
pub mod regions;
pub mod runtime;
pub mod scheduler;
pub mod vision;

// Re-export commonly used types
pub use app::{AppOutcome, AppRegistry, Application, ApplicationFactory};
pub use config::{EngineConfig, ExhaustionPolicy, OperationConfig};
pub use engine::{EngineBuilder, EngineContext};
pub use error::{AutomationError, ErrorKind, Result};
pub use input::{DryRunInput, InputAction, InputController, InputError, Point};
pub use operation::{
    Decision, FailureReason, Operation, OperationLogic, OperationReport, OperationState,
    RoundContext,
};
pub use record::{RecordBook, RecordKey, ResetPeriod, ResetPolicy, RunRecord, RunStatus};
pub use regions::{Rect, Region, RegionCatalog};
pub use runtime::Runtime;
pub use scheduler::Scheduler;
pub use vision::{CaptureSource, Frame, MatchOutcome, ScreenMatcher};
