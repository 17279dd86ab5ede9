//! Recognition collaborators
//!
//! Both traits take the already-cropped sub-image of a region. Implementations
//! must be deterministic for the matcher to be.

use super::capture::Frame;

/// OCR over a sub-image
pub trait TextRecognizer: Send + Sync {
    /// Recognized text; empty when nothing is legible. Never fails on garbage input.
    fn recognize(&self, image: &Frame, locale: &str) -> String;
}

/// Template similarity over a sub-image
pub trait TemplateMatcher: Send + Sync {
    /// Best similarity in `[0, 1]` of the template anywhere inside `image`
    fn similarity(&self, image: &Frame, template_id: &str) -> f32;

    /// Whether a template with this id was loaded
    fn has_template(&self, template_id: &str) -> bool;
}

impl<F> TextRecognizer for F
where
    F: Fn(&Frame, &str) -> String + Send + Sync,
{
    fn recognize(&self, image: &Frame, locale: &str) -> String {
        self(image, locale)
    }
}
