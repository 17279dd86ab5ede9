//! Screen matcher: classifies a region of a frame as present, absent or uncertain

use std::collections::HashMap;
use std::sync::Arc;

use super::capture::Frame;
use super::recognizer::{TemplateMatcher, TextRecognizer};
use super::similarity::text_similarity;
use super::status::matching_ratio;
use crate::config::{EngineConfig, LocaleThreshold};
use crate::regions::{Recognition, Rect, Region, RegionCatalog};
use crate::{AutomationError, Result};

/// Classification of one region in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOutcome {
    /// Score reached the region's threshold
    Present,
    /// Score at or below the noise floor
    Absent,
    /// Match attempted, score between the noise floor and the threshold
    Uncertain,
}

impl MatchOutcome {
    pub fn is_present(&self) -> bool {
        matches!(self, MatchOutcome::Present)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Present => "present",
            MatchOutcome::Absent => "absent",
            MatchOutcome::Uncertain => "uncertain",
        }
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing a region
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub region: String,
    pub outcome: MatchOutcome,
    /// Similarity or pixel ratio that produced the outcome
    pub score: f32,
    /// Threshold the score was compared against
    pub threshold: f32,
    /// Region rectangle in live-frame pixels
    pub live_rect: Rect,
}

/// Stateless region classifier
///
/// Identical (frame, region, locale) input always yields the identical
/// classification, provided the recognition collaborators are deterministic.
#[derive(Clone)]
pub struct ScreenMatcher {
    catalog: Arc<RegionCatalog>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    templates: Option<Arc<dyn TemplateMatcher>>,
    thresholds: HashMap<String, LocaleThreshold>,
    default_locale: String,
    noise_floor: f32,
    template_threshold: f32,
}

impl ScreenMatcher {
    pub fn new(catalog: Arc<RegionCatalog>, config: &EngineConfig) -> Self {
        Self {
            catalog,
            recognizer: None,
            templates: None,
            thresholds: config.thresholds.clone(),
            default_locale: config.locale.clone(),
            noise_floor: config.noise_floor,
            template_threshold: config.template_threshold,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateMatcher>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Check that every region can actually be recognized; run once at startup
    pub fn validate(&self) -> Result<()> {
        for region in self.catalog.iter() {
            match region.recognition() {
                Recognition::Text(_) if self.recognizer.is_none() => {
                    return Err(AutomationError::configuration(format!(
                        "region '{}' expects text but no text recognizer is configured",
                        region.name
                    )));
                }
                Recognition::Template(id) => match &self.templates {
                    None => {
                        return Err(AutomationError::configuration(format!(
                            "region '{}' uses a template but no template matcher is configured",
                            region.name
                        )));
                    }
                    Some(templates) if !templates.has_template(id) => {
                        return Err(AutomationError::configuration(format!(
                            "region '{}' refers to unknown template '{}'",
                            region.name, id
                        )));
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }
        Ok(())
    }

    /// Map a region to live-frame coordinates
    pub fn live_rect(&self, frame: &Frame, region: &Region) -> Rect {
        region
            .rect
            .scale(self.catalog.reference_size(), frame.size())
    }

    /// Locale thresholds; `zh-CN` falls back to `zh`, then to the default locale
    pub fn locale_threshold(&self, locale: &str) -> Option<LocaleThreshold> {
        self.thresholds
            .get(locale)
            .or_else(|| {
                locale
                    .split(['-', '_'])
                    .next()
                    .and_then(|primary| self.thresholds.get(primary))
            })
            .or_else(|| self.thresholds.get(&self.default_locale))
            .copied()
    }

    /// Threshold a region's score is compared against
    pub fn threshold_for(&self, region: &Region, locale: &str) -> f32 {
        if let Some(threshold) = region.threshold {
            return threshold;
        }
        match region.recognition() {
            Recognition::Text(text) => self
                .locale_threshold(locale)
                .map(|t| t.for_len(text.chars().count()))
                .unwrap_or(0.6),
            Recognition::Template(_) => self.template_threshold,
            Recognition::Status(check) => check.min_ratio(),
            Recognition::None => 1.0,
        }
    }

    /// Probe a region by name
    pub fn probe(&self, frame: &Frame, name: &str, locale: &str) -> Result<Probe> {
        let region = self.catalog.require(name)?;
        self.classify(frame, region, locale)
    }

    /// Probe several regions; each probe is independent, so they run in parallel
    pub fn probe_many(&self, frame: &Frame, names: &[&str], locale: &str) -> Result<Vec<Probe>> {
        if names.len() < 2 {
            return names.iter().map(|n| self.probe(frame, n, locale)).collect();
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = names
                .iter()
                .map(|name| scope.spawn(move || self.probe(frame, name, locale)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| AutomationError::configuration("probe thread panicked"))?
                })
                .collect()
        })
    }

    /// Classify one region of a frame
    pub fn classify(&self, frame: &Frame, region: &Region, locale: &str) -> Result<Probe> {
        let live_rect = self.live_rect(frame, region);
        let sub = frame.crop(live_rect);
        let threshold = self.threshold_for(region, locale);

        let (score, graded) = match region.recognition() {
            Recognition::Text(expected) => {
                let recognizer = self.recognizer.as_ref().ok_or_else(|| {
                    AutomationError::configuration(format!(
                        "region '{}' expects text but no text recognizer is configured",
                        region.name
                    ))
                })?;
                let recognized = recognizer.recognize(&sub, locale);
                let score = text_similarity(&recognized, expected);
                log::debug!(
                    "Region '{}': recognized '{}' vs '{}' = {:.3}",
                    region.name,
                    recognized,
                    expected,
                    score
                );
                (score, true)
            }
            Recognition::Template(id) => {
                let templates = self.templates.as_ref().ok_or_else(|| {
                    AutomationError::configuration(format!(
                        "region '{}' uses a template but no template matcher is configured",
                        region.name
                    ))
                })?;
                (templates.similarity(&sub, id), true)
            }
            Recognition::Status(check) => (matching_ratio(&sub, check), false),
            Recognition::None => {
                return Err(AutomationError::configuration(format!(
                    "region '{}' declares nothing to match",
                    region.name
                )));
            }
        };

        let outcome = if score >= threshold {
            MatchOutcome::Present
        } else if graded && score > self.noise_floor {
            MatchOutcome::Uncertain
        } else {
            MatchOutcome::Absent
        };

        Ok(Probe {
            region: region.name.clone(),
            outcome,
            score,
            threshold,
            live_rect,
        })
    }
}
