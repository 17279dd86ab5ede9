//! Simulated input boundary

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Failure to deliver input to the target
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("target '{0}' is not accepting input")]
    NotAccepting(String),
    #[error("input backend error: {0}")]
    Backend(String),
}

/// A point in live-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for Point {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

/// One simulated input; a round issues at most one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Click(Point),
    Key { code: String, hold_ms: u64 },
    Drag { from: Point, to: Point },
}

impl InputAction {
    pub fn key(code: impl Into<String>) -> Self {
        InputAction::Key {
            code: code.into(),
            hold_ms: 0,
        }
    }
}

impl std::fmt::Display for InputAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputAction::Click(p) => write!(f, "click({}, {})", p.x, p.y),
            InputAction::Key { code, hold_ms } => write!(f, "key({}, {}ms)", code, hold_ms),
            InputAction::Drag { from, to } => {
                write!(f, "drag({}, {} -> {}, {})", from.x, from.y, to.x, to.y)
            }
        }
    }
}

/// Click/key/drag primitives of the input-injection wrapper
pub trait InputController: Send {
    fn click(&mut self, point: Point) -> Result<(), InputError>;

    fn key(&mut self, code: &str, hold_ms: u64) -> Result<(), InputError>;

    fn drag(&mut self, from: Point, to: Point) -> Result<(), InputError>;

    /// Dispatch an action to the matching primitive
    fn perform(&mut self, action: &InputAction) -> Result<(), InputError> {
        match action {
            InputAction::Click(point) => self.click(*point),
            InputAction::Key { code, hold_ms } => self.key(code, *hold_ms),
            InputAction::Drag { from, to } => self.drag(*from, *to),
        }
    }
}

/// Records actions instead of injecting them
///
/// Clones share one action log, so a caller can keep a handle while the
/// engine owns the controller.
#[derive(Debug, Clone, Default)]
pub struct DryRunInput {
    actions: Arc<Mutex<Vec<InputAction>>>,
}

impl DryRunInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<InputAction> {
        self.actions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    fn record(&self, action: InputAction) {
        log::info!("[dry-run] {}", action);
        self.actions.lock().push(action);
    }
}

impl InputController for DryRunInput {
    fn click(&mut self, point: Point) -> Result<(), InputError> {
        self.record(InputAction::Click(point));
        Ok(())
    }

    fn key(&mut self, code: &str, hold_ms: u64) -> Result<(), InputError> {
        self.record(InputAction::Key {
            code: code.to_string(),
            hold_ms,
        });
        Ok(())
    }

    fn drag(&mut self, from: Point, to: Point) -> Result<(), InputError> {
        self.record(InputAction::Drag { from, to });
        Ok(())
    }
}
