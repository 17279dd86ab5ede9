//! Region catalog
//!
//! Named rectangles declared against a fixed reference resolution, each
//! optionally annotated with expected text, a template identifier or a pixel
//! status check. Operations refer to regions by name; nothing in the round
//! logic carries raw coordinates.

mod catalog;
mod region;

pub use catalog::{RegionCatalog, RegionId};
pub use region::{Recognition, Rect, Region, StatusCheck};
