//! Region declarations

use serde::{Deserialize, Serialize};

use crate::config::check_unit;
use crate::{AutomationError, Result};

/// Rectangle in reference-resolution pixels, `x1`/`y1` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Map from one resolution to another with per-axis linear scaling
    pub fn scale(&self, from: (u32, u32), to: (u32, u32)) -> Rect {
        if from == to {
            return *self;
        }
        let sx = to.0 as f64 / from.0 as f64;
        let sy = to.1 as f64 / from.1 as f64;
        let x0 = (self.x0 as f64 * sx).floor() as u32;
        let y0 = (self.y0 as f64 * sy).floor() as u32;
        let x1 = ((self.x1 as f64 * sx).ceil() as u32).min(to.0);
        let y1 = ((self.y1 as f64 * sy).ceil() as u32).min(to.1);
        Rect::new(x0, y0, x1.max(x0), y1.max(y0))
    }

    /// Center point, rounded down
    pub fn center(&self) -> (u32, u32) {
        (self.x0 + self.width() / 2, self.y0 + self.height() / 2)
    }
}

impl From<[u32; 4]> for Rect {
    fn from(v: [u32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [u32; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

/// Pixel-level state check that needs no OCR or template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusCheck {
    /// Share of pixels brighter than `floor` on any channel
    NonBlack {
        #[serde(default = "default_black_floor")]
        floor: u8,
        min_ratio: f32,
    },
    /// Share of pixels within `tolerance` of `target` on every channel
    Color {
        target: [u8; 3],
        tolerance: u8,
        min_ratio: f32,
    },
}

fn default_black_floor() -> u8 {
    16
}

impl StatusCheck {
    pub fn min_ratio(&self) -> f32 {
        match self {
            StatusCheck::NonBlack { min_ratio, .. } | StatusCheck::Color { min_ratio, .. } => {
                *min_ratio
            }
        }
    }
}

/// How a region is recognized
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recognition<'a> {
    Text(&'a str),
    Template(&'a str),
    Status(&'a StatusCheck),
    /// Coordinates only, e.g. a click target
    None,
}

/// A named area of the reference screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub rect: Rect,
    /// Text expected inside the region
    #[serde(default)]
    pub text: Option<String>,
    /// Overrides the locale or template default
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Identifier of a pre-loaded template image
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub check: Option<StatusCheck>,
    /// Status-variant label, e.g. which screen state this region belongs to
    #[serde(default)]
    pub status: Option<String>,
}

impl Region {
    pub fn new(name: impl Into<String>, rect: impl Into<Rect>) -> Self {
        Self {
            name: name.into(),
            rect: rect.into(),
            text: None,
            threshold: None,
            template: None,
            check: None,
            status: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_check(mut self, check: StatusCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn recognition(&self) -> Recognition<'_> {
        if let Some(text) = &self.text {
            Recognition::Text(text)
        } else if let Some(template) = &self.template {
            Recognition::Template(template)
        } else if let Some(check) = &self.check {
            Recognition::Status(check)
        } else {
            Recognition::None
        }
    }

    /// Validate against the catalog's reference resolution
    pub fn validate(&self, reference: (u32, u32)) -> Result<()> {
        let fail = |msg: String| AutomationError::configuration(format!("region '{}': {}", self.name, msg));

        if self.name.trim().is_empty() {
            return Err(AutomationError::configuration("region with empty name"));
        }
        if self.rect.is_empty() {
            return Err(fail(format!("empty rectangle {:?}", self.rect)));
        }
        if self.rect.x1 > reference.0 || self.rect.y1 > reference.1 {
            return Err(fail(format!(
                "rectangle {:?} exceeds reference {}x{}",
                self.rect, reference.0, reference.1
            )));
        }
        let declared = [self.text.is_some(), self.template.is_some(), self.check.is_some()]
            .iter()
            .filter(|d| **d)
            .count();
        if declared > 1 {
            return Err(fail("declares more than one of text, template, check".to_string()));
        }
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(fail("expected text is empty".to_string()));
            }
        }
        if let Some(threshold) = self.threshold {
            check_unit(&format!("region '{}' threshold", self.name), threshold)?;
        }
        if let Some(check) = &self.check {
            check_unit(&format!("region '{}' min_ratio", self.name), check.min_ratio())?;
        }
        Ok(())
    }
}
