//! Configuration types for the automation engine
//!
//! These types define the structure of engine configurations loaded from TOML files.
//! Every field has a default so a partial file (or an empty one) is valid.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::record::ResetPeriod;
use crate::{AutomationError, Result};

/// What happens when an operation runs out of rounds without succeeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Terminal FAIL with reason "exceeded max rounds"
    #[default]
    Fail,
    /// Terminal TIMEOUT, treated as completion by parents and applications
    Tolerate,
}

/// Round loop tuning for a single operation node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Rounds before forced termination
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Longest a frame acquisition may take before it is discarded
    #[serde(default = "default_round_timeout")]
    pub round_timeout_ms: u64,
    /// Consecutive collaborator failures tolerated before FAIL
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,
    /// Pause after an absorbed collaborator failure
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    /// Pause between regular rounds
    #[serde(default = "default_round_interval")]
    pub round_interval_ms: u64,
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

fn default_max_rounds() -> u32 {
    60
}

fn default_round_timeout() -> u64 {
    5_000
}

fn default_failure_ceiling() -> u32 {
    3
}

fn default_backoff() -> u64 {
    500
}

fn default_round_interval() -> u64 {
    300
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_ms: default_round_timeout(),
            failure_ceiling: default_failure_ceiling(),
            backoff_ms: default_backoff(),
            round_interval_ms: default_round_interval(),
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

impl OperationConfig {
    /// Set the round budget
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Set the consecutive-failure ceiling
    pub fn with_failure_ceiling(mut self, ceiling: u32) -> Self {
        self.failure_ceiling = ceiling;
        self
    }

    /// Set the exhaustion policy
    pub fn with_exhaustion(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// Remove every pause; used for replay and tests
    pub fn without_pauses(mut self) -> Self {
        self.backoff_ms = 0;
        self.round_interval_ms = 0;
        self
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(AutomationError::configuration("max_rounds must be at least 1"));
        }
        if self.failure_ceiling == 0 {
            return Err(AutomationError::configuration(
                "failure_ceiling must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Run-record policy knobs shared by all applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Failed runs are retried while attempts in the current window stay below this
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// An in-progress record older than this is considered abandoned by a crash
    #[serde(default = "default_in_progress_ttl")]
    pub in_progress_ttl_minutes: i64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_in_progress_ttl() -> i64 {
    120
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            in_progress_ttl_minutes: default_in_progress_ttl(),
        }
    }
}

/// Text-match thresholds for one locale
///
/// Short strings get their own threshold: one corrupted character in a
/// two-character ideographic label is a far weaker signal than in a long
/// alphabetic one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocaleThreshold {
    pub threshold: f32,
    pub short_text_threshold: f32,
    /// Expected texts with at most this many characters count as short
    pub short_text_len: usize,
}

impl LocaleThreshold {
    /// Threshold for an expected text of `len` characters
    pub fn for_len(&self, len: usize) -> f32 {
        if len <= self.short_text_len {
            self.short_text_threshold
        } else {
            self.threshold
        }
    }
}

fn default_thresholds() -> HashMap<String, LocaleThreshold> {
    let mut table = HashMap::new();
    table.insert(
        "zh".to_string(),
        LocaleThreshold {
            threshold: 0.6,
            short_text_threshold: 0.5,
            short_text_len: 3,
        },
    );
    table.insert(
        "en".to_string(),
        LocaleThreshold {
            threshold: 0.7,
            short_text_threshold: 0.85,
            short_text_len: 5,
        },
    );
    table
}

/// Per-application overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub period: Option<ResetPeriod>,
    #[serde(default)]
    pub hour_offset: Option<u32>,
    #[serde(default)]
    pub weekly_anchor: Option<Weekday>,
}

fn default_true() -> bool {
    true
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Language tag used to pick text thresholds
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Resolution the region catalog is declared against
    #[serde(default = "default_reference_width")]
    pub reference_width: u32,
    #[serde(default = "default_reference_height")]
    pub reference_height: u32,
    /// Scores below this are absent rather than uncertain
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f32,
    /// Default threshold for template regions
    #[serde(default = "default_template_threshold")]
    pub template_threshold: f32,
    #[serde(default)]
    pub operation: OperationConfig,
    #[serde(default)]
    pub records: RecordConfig,
    #[serde(default = "default_thresholds")]
    pub thresholds: HashMap<String, LocaleThreshold>,
    #[serde(default)]
    pub applications: Vec<ApplicationSettings>,
}

fn default_locale() -> String {
    "zh".to_string()
}

fn default_reference_width() -> u32 {
    1920
}

fn default_reference_height() -> u32 {
    1080
}

fn default_noise_floor() -> f32 {
    0.2
}

fn default_template_threshold() -> f32 {
    0.8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            reference_width: default_reference_width(),
            reference_height: default_reference_height(),
            noise_floor: default_noise_floor(),
            template_threshold: default_template_threshold(),
            operation: OperationConfig::default(),
            records: RecordConfig::default(),
            thresholds: default_thresholds(),
            applications: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges; run once at startup
    pub fn validate(&self) -> Result<()> {
        if self.reference_width == 0 || self.reference_height == 0 {
            return Err(AutomationError::configuration(
                "reference resolution must be non-zero",
            ));
        }
        check_unit("noise_floor", self.noise_floor)?;
        check_unit("template_threshold", self.template_threshold)?;
        for (locale, entry) in &self.thresholds {
            check_unit(&format!("thresholds.{}.threshold", locale), entry.threshold)?;
            check_unit(
                &format!("thresholds.{}.short_text_threshold", locale),
                entry.short_text_threshold,
            )?;
        }
        if !self.thresholds.contains_key(&self.locale) {
            return Err(AutomationError::configuration(format!(
                "no threshold table for locale '{}'",
                self.locale
            )));
        }
        self.operation.validate()?;
        for app in &self.applications {
            if let Some(offset) = app.hour_offset {
                if offset > 23 {
                    return Err(AutomationError::configuration(format!(
                        "application '{}': hour_offset {} is not an hour of the day",
                        app.id, offset
                    )));
                }
            }
        }
        Ok(())
    }

    /// Thresholds for the configured locale
    pub fn locale_threshold(&self) -> LocaleThreshold {
        self.thresholds
            .get(&self.locale)
            .copied()
            .unwrap_or(LocaleThreshold {
                threshold: 0.6,
                short_text_threshold: 0.6,
                short_text_len: 0,
            })
    }

    /// Overrides for an application, if any
    pub fn application(&self, id: &str) -> Option<&ApplicationSettings> {
        self.applications.iter().find(|a| a.id == id)
    }
}

pub(crate) fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(AutomationError::configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.locale, "zh");
        assert_eq!(config.reference_width, 1920);
        assert_eq!(config.reference_height, 1080);
        assert_eq!(config.operation.max_rounds, 60);
        assert_eq!(config.operation.failure_ceiling, 3);
        assert_eq!(config.operation.on_exhausted, ExhaustionPolicy::Fail);
        assert_eq!(config.records.max_attempts, 3);
        assert!(config.thresholds.contains_key("en"));
    }

    #[test]
    fn test_operation_section() {
        let config = EngineConfig::from_toml_str(
            r#"
            [operation]
            max_rounds = 5
            failure_ceiling = 2
            backoff_ms = 0
            on_exhausted = "tolerate"
        "#,
        )
        .unwrap();

        assert_eq!(config.operation.max_rounds, 5);
        assert_eq!(config.operation.failure_ceiling, 2);
        assert_eq!(config.operation.backoff(), Duration::ZERO);
        assert_eq!(config.operation.round_timeout_ms, 5_000);
        assert_eq!(config.operation.on_exhausted, ExhaustionPolicy::Tolerate);
    }

    #[test]
    fn test_threshold_table_is_data() {
        let config = EngineConfig::from_toml_str(
            r#"
            locale = "ja"
            [thresholds.ja]
            threshold = 0.65
            short_text_threshold = 0.5
            short_text_len = 2
        "#,
        )
        .unwrap();

        let entry = config.locale_threshold();
        assert_eq!(entry.for_len(2), 0.5);
        assert_eq!(entry.for_len(3), 0.65);
    }

    #[test]
    fn test_unknown_locale_rejected() {
        let err = EngineConfig::from_toml_str(r#"locale = "fr""#).unwrap_err();
        assert!(matches!(err, AutomationError::Configuration(_)));
    }

    #[test]
    fn test_threshold_range_rejected() {
        let err = EngineConfig::from_toml_str("noise_floor = 1.5").unwrap_err();
        assert!(err.to_string().contains("noise_floor"));
    }

    #[test]
    fn test_application_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            [[applications]]
            id = "weekly_boss"
            period = "weekly"
            hour_offset = 4
            weekly_anchor = "Mon"

            [[applications]]
            id = "mail"
            enabled = false
        "#,
        )
        .unwrap();

        let boss = config.application("weekly_boss").unwrap();
        assert_eq!(boss.period, Some(ResetPeriod::Weekly));
        assert_eq!(boss.hour_offset, Some(4));
        assert_eq!(boss.weekly_anchor, Some(Weekday::Mon));
        assert!(boss.enabled);
        assert!(!config.application("mail").unwrap().enabled);
        assert!(config.application("missing").is_none());
    }

    #[test]
    fn test_bad_hour_offset_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [[applications]]
            id = "daily"
            hour_offset = 24
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("hour_offset"));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = OperationConfig::default().with_max_rounds(0);
        assert!(config.validate().is_err());
    }
}
