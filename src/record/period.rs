//! Reset periods and boundary computation

use chrono::{Datelike, Duration, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::{AutomationError, Result};

/// How often a run record reverts to not-started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    Never,
    #[default]
    Daily,
    Weekly,
}

/// Reset and retry rules for one application's records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetPolicy {
    #[serde(default)]
    pub period: ResetPeriod,
    /// The game day starts at `00:00 + hour_offset`
    #[serde(default)]
    pub hour_offset: u32,
    /// Weekday a weekly period starts on
    #[serde(default = "default_anchor")]
    pub weekly_anchor: Weekday,
    /// Failed runs are retried while attempts in the current window stay below this
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// In-progress records older than this were abandoned by a crash
    #[serde(default = "default_ttl")]
    pub in_progress_ttl_minutes: i64,
}

fn default_anchor() -> Weekday {
    Weekday::Mon
}

fn default_max_attempts() -> u32 {
    3
}

fn default_ttl() -> i64 {
    120
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            period: ResetPeriod::Daily,
            hour_offset: 0,
            weekly_anchor: default_anchor(),
            max_attempts: default_max_attempts(),
            in_progress_ttl_minutes: default_ttl(),
        }
    }
}

impl ResetPolicy {
    pub fn daily(hour_offset: u32) -> Self {
        Self {
            period: ResetPeriod::Daily,
            hour_offset,
            ..Self::default()
        }
    }

    pub fn weekly(hour_offset: u32) -> Self {
        Self {
            period: ResetPeriod::Weekly,
            hour_offset,
            ..Self::default()
        }
    }

    pub fn never() -> Self {
        Self {
            period: ResetPeriod::Never,
            ..Self::default()
        }
    }

    pub fn with_anchor(mut self, anchor: Weekday) -> Self {
        self.weekly_anchor = anchor;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_in_progress_ttl(mut self, minutes: i64) -> Self {
        self.in_progress_ttl_minutes = minutes;
        self
    }

    pub fn in_progress_ttl(&self) -> Duration {
        Duration::minutes(self.in_progress_ttl_minutes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hour_offset > 23 {
            return Err(AutomationError::configuration(format!(
                "hour_offset {} is not an hour of the day",
                self.hour_offset
            )));
        }
        if self.max_attempts == 0 {
            return Err(AutomationError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        if self.in_progress_ttl_minutes <= 0 {
            return Err(AutomationError::configuration(
                "in_progress_ttl_minutes must be positive",
            ));
        }
        Ok(())
    }

    /// First instant after `last` at which a record written at `last` resets
    ///
    /// `None` for records that never reset.
    pub fn next_boundary(&self, last: NaiveDateTime) -> Option<NaiveDateTime> {
        let offset = Duration::hours(self.hour_offset as i64);
        // Calendar date of the game day containing `last`
        let game_day = (last - offset).date();

        let next_day = match self.period {
            ResetPeriod::Never => return None,
            ResetPeriod::Daily => game_day.succ_opt()?,
            ResetPeriod::Weekly => {
                let since_anchor = (game_day.weekday().num_days_from_monday() + 7
                    - self.weekly_anchor.num_days_from_monday())
                    % 7;
                game_day - Duration::days(since_anchor as i64) + Duration::days(7)
            }
        };

        Some(next_day.and_hms_opt(0, 0, 0)? + offset)
    }

    /// Whether `now` has crossed the reset boundary of a record written at `last`
    pub fn has_reset(&self, last: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.next_boundary(last).is_some_and(|boundary| now >= boundary)
    }
}
