//! Sending windows and volume ceilings per sender identity.
//!
//! Counters are keyed by `(identity, date)` and `(identity, date, hour)`, so
//! they reset by moving to a new key rather than by being cleared. Stale keys
//! are dropped whenever a send is recorded on a new date.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WindowError;

/// Configuration for sending windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Whether any pause rule applies at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Sending is paused before this hour
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    /// Sending is paused after this hour (the hour itself is allowed)
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,

    /// Sending pauses once an identity's sends today exceed this
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// Hourly ceiling once warm-up is over
    #[serde(default = "default_hourly_limit")]
    pub hourly_limit: u64,

    /// Hourly ceiling while warming up
    #[serde(default = "default_warmup_hourly_limit")]
    pub warmup_hourly_limit: u64,

    /// Warm-up ends once an identity's total sends exceed this
    #[serde(default = "default_warmup_threshold")]
    pub warmup_threshold: u64,

    /// Fixed UTC offset in minutes for the window clock; the operator's local
    /// time when unset
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Longest single sleep while paused before re-checking
    #[serde(default = "default_max_pause")]
    pub max_pause_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            daily_limit: default_daily_limit(),
            hourly_limit: default_hourly_limit(),
            warmup_hourly_limit: default_warmup_hourly_limit(),
            warmup_threshold: default_warmup_threshold(),
            utc_offset_minutes: None,
            max_pause_secs: default_max_pause(),
        }
    }
}

impl WindowConfig {
    /// Checks that the hour window can open on some day.
    ///
    /// # Errors
    ///
    /// When an hour is past 23 or the window starts after it ends.
    pub const fn validate(&self) -> Result<(), WindowError> {
        if self.start_hour > 23 {
            return Err(WindowError::HourOutOfRange {
                field: "start_hour",
                hour: self.start_hour,
            });
        }

        if self.end_hour > 23 {
            return Err(WindowError::HourOutOfRange {
                field: "end_hour",
                hour: self.end_hour,
            });
        }

        if self.start_hour > self.end_hour {
            return Err(WindowError::Inverted {
                start_hour: self.start_hour,
                end_hour: self.end_hour,
            });
        }

        Ok(())
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_start_hour() -> u32 {
    6
}

const fn default_end_hour() -> u32 {
    22
}

const fn default_daily_limit() -> u64 {
    500
}

const fn default_hourly_limit() -> u64 {
    50
}

const fn default_warmup_hourly_limit() -> u64 {
    25
}

const fn default_warmup_threshold() -> u64 {
    100
}

const fn default_max_pause() -> u64 {
    900 // 15 minutes
}

/// Wall-clock time as the sending window sees it.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> NaiveDateTime;
}

/// The system clock, in local time or at a fixed UTC offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    utc_offset_minutes: Option<i32>,
}

impl SystemClock {
    /// `None` uses the process's local time zone.
    pub const fn new(utc_offset_minutes: Option<i32>) -> Self {
        Self { utc_offset_minutes }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .map_or_else(
                || Local::now().naive_local(),
                |offset| Utc::now().with_timezone(&offset).naive_local(),
            )
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub const fn new(now: NaiveDateTime) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(later) = TimeDelta::from_std(by)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
        {
            *now = later;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    OutsideHours,
    DailyLimit,
    HourlyLimit,
}

/// Why sending should wait, and for roughly how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseDecision {
    pub reason: PauseReason,
    pub message: String,
    /// Time until the blocking rule stops applying.
    pub resume_after: Duration,
}

/// Hour-of-day window plus daily and hourly ceilings, per sender identity
#[derive(Debug)]
pub struct SendingWindow {
    config: WindowConfig,
    clock: Arc<dyn Clock>,
    daily: DashMap<(String, NaiveDate), u64>,
    hourly: DashMap<(String, NaiveDate, u32), u64>,
    totals: DashMap<String, u64>,
    last_date: parking_lot::Mutex<Option<NaiveDate>>,
}

impl SendingWindow {
    /// A window on the system clock chosen by `config.utc_offset_minutes`.
    pub fn new(config: WindowConfig) -> Self {
        let clock = Arc::new(SystemClock::new(config.utc_offset_minutes));
        Self::with_clock(config, clock)
    }

    pub fn with_clock(config: WindowConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            daily: DashMap::new(),
            hourly: DashMap::new(),
            totals: DashMap::new(),
            last_date: parking_lot::Mutex::new(None),
        }
    }

    pub const fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Whether `identity` should wait before sending, and why.
    ///
    /// Rules are checked in order: hour of day, daily ceiling, hourly ceiling.
    pub fn should_pause(&self, identity: &str) -> Option<PauseDecision> {
        if !self.config.enabled {
            return None;
        }

        let now = self.clock.now();
        let hour = now.hour();

        if hour < self.config.start_hour || hour > self.config.end_hour {
            let opens = if hour < self.config.start_hour {
                now.date().and_hms_opt(self.config.start_hour, 0, 0)
            } else {
                now.date()
                    .succ_opt()
                    .and_then(|tomorrow| tomorrow.and_hms_opt(self.config.start_hour, 0, 0))
            };

            return Some(PauseDecision {
                reason: PauseReason::OutsideHours,
                message: format!(
                    "Outside sending hours ({:02}:00-{:02}:59)",
                    self.config.start_hour, self.config.end_hour
                ),
                resume_after: until(now, opens),
            });
        }

        let daily = self.count_daily(identity, now);
        if daily > self.config.daily_limit {
            let midnight = now
                .date()
                .succ_opt()
                .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0));

            return Some(PauseDecision {
                reason: PauseReason::DailyLimit,
                message: format!("Daily limit reached: {daily}/{}", self.config.daily_limit),
                resume_after: until(now, midnight),
            });
        }

        let ceiling = self.hourly_ceiling(identity);
        let hourly = self.count_hourly(identity, now);
        if hourly >= ceiling {
            let next_hour = now
                .date()
                .and_hms_opt(hour, 0, 0)
                .and_then(|start| start.checked_add_signed(TimeDelta::hours(1)));

            return Some(PauseDecision {
                reason: PauseReason::HourlyLimit,
                message: format!("Hourly limit reached: {hourly}/{ceiling}"),
                resume_after: until(now, next_hour),
            });
        }

        None
    }

    /// Count one send for `identity` now.
    pub fn record_send(&self, identity: &str) {
        let now = self.clock.now();
        let date = now.date();

        {
            let mut last_date = self.last_date.lock();
            if last_date.is_some_and(|last| last != date) {
                self.prune_before(date);
            }
            *last_date = Some(date);
        }

        *self.daily.entry((identity.to_string(), date)).or_insert(0) += 1;
        *self
            .hourly
            .entry((identity.to_string(), date, now.hour()))
            .or_insert(0) += 1;
        *self.totals.entry(identity.to_string()).or_insert(0) += 1;
    }

    /// Drop daily and hourly counters from before `date`.
    pub fn prune_before(&self, date: NaiveDate) {
        self.daily.retain(|(_, day), _| *day >= date);
        self.hourly.retain(|(_, day, _), _| *day >= date);
        debug!(%date, "Pruned sending window counters");
    }

    pub fn daily_count(&self, identity: &str) -> u64 {
        self.count_daily(identity, self.clock.now())
    }

    pub fn hourly_count(&self, identity: &str) -> u64 {
        self.count_hourly(identity, self.clock.now())
    }

    pub fn total_count(&self, identity: &str) -> u64 {
        self.totals.get(identity).map_or(0, |total| *total)
    }

    pub fn is_warming_up(&self, identity: &str) -> bool {
        self.total_count(identity) <= self.config.warmup_threshold
    }

    /// How long to sleep for `decision` before checking again.
    pub fn pause_length(&self, decision: &PauseDecision) -> Duration {
        decision
            .resume_after
            .min(Duration::from_secs(self.config.max_pause_secs.max(1)))
    }

    fn hourly_ceiling(&self, identity: &str) -> u64 {
        if self.is_warming_up(identity) {
            self.config.warmup_hourly_limit
        } else {
            self.config.hourly_limit
        }
    }

    fn count_daily(&self, identity: &str, now: NaiveDateTime) -> u64 {
        self.daily
            .get(&(identity.to_string(), now.date()))
            .map_or(0, |count| *count)
    }

    fn count_hourly(&self, identity: &str, now: NaiveDateTime) -> u64 {
        self.hourly
            .get(&(identity.to_string(), now.date(), now.hour()))
            .map_or(0, |count| *count)
    }
}

/// Time from `now` to `target`, never less than a second.
fn until(now: NaiveDateTime, target: Option<NaiveDateTime>) -> Duration {
    target
        .and_then(|target| (target - now).to_std().ok())
        .unwrap_or_default()
        .max(Duration::from_secs(1))
}
