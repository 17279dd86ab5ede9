//! Screen recognition
//!
//! Frames come from a [`CaptureSource`]; the [`ScreenMatcher`] maps catalog
//! regions onto the live frame and classifies each one as present, absent or
//! uncertain using fuzzy text similarity, template similarity or a pixel
//! status check.
//!
//! # Example
//!
//! ```ignore
//! use nyacore_automation::vision::{MatchOutcome, ScreenMatcher};
//!
//! let matcher = ScreenMatcher::new(catalog, &config).with_recognizer(ocr);
//! matcher.validate()?;
//! let probe = matcher.probe(&frame, "back_button", "zh")?;
//! if probe.outcome == MatchOutcome::Present {
//!     // ...
//! }
//! ```

pub mod capture;
pub mod matcher;
pub mod recognizer;
pub mod similarity;
pub mod status;
#[cfg(feature = "vision")]
pub mod template;

pub use capture::{CaptureError, CaptureSource, Frame, FrameSequenceCapture, FrameSummary};
pub use matcher::{MatchOutcome, Probe, ScreenMatcher};
pub use recognizer::{TemplateMatcher, TextRecognizer};
pub use similarity::text_similarity;
#[cfg(feature = "vision")]
pub use template::ImageTemplateMatcher;
