//! Image template matching
//!
//! Normalized cross-correlation of a grayscale template over the region's
//! sub-image. Templates are declared at reference resolution; when a live
//! sub-image is smaller than a template, the template is shrunk to fit.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use std::collections::HashMap;
use std::path::Path;

use super::capture::Frame;
use super::recognizer::TemplateMatcher;
use crate::{AutomationError, Result};

/// Template store backed by `imageproc`
#[derive(Default)]
pub struct ImageTemplateMatcher {
    templates: HashMap<String, GrayImage>,
}

impl ImageTemplateMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory template
    pub fn insert(&mut self, id: impl Into<String>, template: GrayImage) {
        self.templates.insert(id.into(), template);
    }

    /// Load a template image from disk under `id`
    pub fn load(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| {
            AutomationError::configuration(format!(
                "cannot read template {}: {}",
                path.display(),
                e
            ))
        })?;
        let id = id.into();
        log::debug!("Loaded template '{}' from {}", id, path.display());
        self.templates.insert(id, img.to_luma8());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn to_gray(frame: &Frame) -> Option<GrayImage> {
    frame
        .to_rgba_image()
        .map(|rgba| DynamicImage::ImageRgba8(rgba).to_luma8())
}

impl TemplateMatcher for ImageTemplateMatcher {
    fn similarity(&self, image: &Frame, template_id: &str) -> f32 {
        let Some(template) = self.templates.get(template_id) else {
            return 0.0;
        };
        let Some(haystack) = to_gray(image) else {
            return 0.0;
        };
        if haystack.width() == 0 || haystack.height() == 0 {
            return 0.0;
        }

        let (tw, th) = template.dimensions();
        let fitted;
        let needle = if tw > haystack.width() || th > haystack.height() {
            let scale = (haystack.width() as f32 / tw as f32).min(haystack.height() as f32 / th as f32);
            let w = ((tw as f32 * scale).floor() as u32).max(1);
            let h = ((th as f32 * scale).floor() as u32).max(1);
            fitted = imageops::resize(template, w, h, FilterType::Triangle);
            &fitted
        } else {
            template
        };

        let scores = match_template(&haystack, needle, MatchTemplateMethod::CrossCorrelationNormalized);
        let best = find_extremes(&scores).max_value;
        if best.is_nan() {
            0.0
        } else {
            best.clamp(0.0, 1.0)
        }
    }

    fn has_template(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }
}
