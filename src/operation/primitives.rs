//! Generic building-block operations
//!
//! None of these know anything about a particular game screen; they are
//! parameterized by region names from the catalog.

use super::context::RoundContext;
use super::decision::{ChildOperation, Decision};
use super::OperationLogic;
use crate::config::OperationConfig;
use crate::input::{InputAction, InputError};
use crate::vision::MatchOutcome;
use crate::Result;

/// Succeeds once a region is present, or once it is gone
pub struct WaitRegion {
    id: String,
    region: String,
    until_gone: bool,
}

impl WaitRegion {
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            id: format!("wait:{}", region),
            region,
            until_gone: false,
        }
    }

    /// Wait for the region to disappear instead
    pub fn until_gone(mut self) -> Self {
        self.until_gone = true;
        self.id = format!("wait_gone:{}", self.region);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl OperationLogic for WaitRegion {
    fn id(&self) -> &str {
        &self.id
    }

    fn regions(&self) -> Vec<String> {
        vec![self.region.clone()]
    }

    fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision> {
        let done = match ctx.outcome(&self.region)? {
            MatchOutcome::Present => !self.until_gone,
            MatchOutcome::Absent => self.until_gone,
            MatchOutcome::Uncertain => false,
        };
        Ok(if done {
            Decision::Succeed
        } else {
            Decision::Continue
        })
    }
}

/// Clicks a region until it disappears
///
/// Waits for the region to show up first; an uncertain match is never
/// clicked.
pub struct ClickRegion {
    id: String,
    region: String,
    clicks: u32,
}

impl ClickRegion {
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            id: format!("click:{}", region),
            region,
            clicks: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn clicks(&self) -> u32 {
        self.clicks
    }
}

impl OperationLogic for ClickRegion {
    fn id(&self) -> &str {
        &self.id
    }

    fn regions(&self) -> Vec<String> {
        vec![self.region.clone()]
    }

    fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision> {
        match ctx.outcome(&self.region)? {
            MatchOutcome::Present => {
                self.clicks += 1;
                ctx.click(&self.region)
            }
            MatchOutcome::Absent if self.clicks > 0 => Ok(Decision::Succeed),
            _ => Ok(Decision::Continue),
        }
    }

    fn on_action_failed(&mut self, _action: &InputAction, _error: &InputError) {
        self.clicks = self.clicks.saturating_sub(1);
    }
}

/// How a dialog is dismissed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dismiss {
    /// Click the center of the dialog's own region
    ClickRegion,
    /// Click the center of another region, e.g. a close button
    ClickOther(String),
    Key { code: String, hold_ms: u64 },
}

/// Dismisses a dialog when it shows; succeeds at once when it doesn't
pub struct DismissIfPresent {
    id: String,
    region: String,
    dismiss: Dismiss,
}

impl DismissIfPresent {
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            id: format!("dismiss:{}", region),
            region,
            dismiss: Dismiss::ClickRegion,
        }
    }

    pub fn with_dismiss(mut self, dismiss: Dismiss) -> Self {
        self.dismiss = dismiss;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Wrap as an optional child step
    pub fn into_child(self, config: OperationConfig) -> ChildOperation {
        ChildOperation::new(Box::new(self), config).optional()
    }
}

impl OperationLogic for DismissIfPresent {
    fn id(&self) -> &str {
        &self.id
    }

    fn regions(&self) -> Vec<String> {
        let mut regions = vec![self.region.clone()];
        if let Dismiss::ClickOther(other) = &self.dismiss {
            regions.push(other.clone());
        }
        regions
    }

    fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision> {
        match ctx.outcome(&self.region)? {
            MatchOutcome::Absent => Ok(Decision::Succeed),
            MatchOutcome::Uncertain => Ok(Decision::Continue),
            MatchOutcome::Present => match &self.dismiss {
                Dismiss::ClickRegion => ctx.click(&self.region),
                Dismiss::ClickOther(other) => ctx.click(other),
                Dismiss::Key { code, hold_ms } => Ok(Decision::Act(InputAction::Key {
                    code: code.clone(),
                    hold_ms: *hold_ms,
                })),
            },
        }
    }
}
