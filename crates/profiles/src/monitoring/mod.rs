//! Webhook outcome metrics and profile analytics
//!
//! Per-event outcomes go to an [`EventMetricStore`] which keeps daily
//! counters, processing-time samples, and short-lived raw events. The
//! [`MonitoringAggregator`] answers windowed stats from that store and derives
//! coverage and quality reports from the profile store aggregate.

mod memory;
pub mod quality;
mod redis_store;
pub mod window;

pub use memory::InMemoryEventStore;
pub use quality::{
    Alert, AlertKind, AlertThresholds, IssueSeverity, ProfileCoverage, ProfileDataIssue,
    ProfileQualityMetrics, ProfileQualityReport, SourceQuality,
};
pub use redis_store::RedisEventStore;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ProfileError, ProfileResult};
use crate::store::ProfileStore;

/// Raw per-event records are kept this long
pub const RAW_EVENT_RETENTION: StdDuration = StdDuration::from_secs(7 * 24 * 60 * 60);
/// Daily counters and samples are kept this long
pub const DAILY_RETENTION: StdDuration = StdDuration::from_secs(30 * 24 * 60 * 60);

/// Outcome of processing one webhook event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetric {
    pub event_type: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(rename = "processing_time")]
    pub processing_time_ms: i64,
    pub profile_found: bool,
    pub profile_stored: bool,
}

impl EventMetric {
    /// Unsuccessful outcome with nothing found; callers fill in the rest
    pub fn new(event_type: impl Into<String>, user_id: impl Into<String>, processed_at: OffsetDateTime) -> Self {
        Self {
            event_type: event_type.into(),
            user_id: user_id.into(),
            processed_at,
            success: false,
            error_message: String::new(),
            processing_time_ms: 0,
            profile_found: false,
            profile_stored: false,
        }
    }
}

/// Half-open interval `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
}

impl TimePeriod {
    pub fn new(from: OffsetDateTime, to: OffsetDateTime) -> Self {
        Self { from, to }
    }

    pub fn ending_at(to: OffsetDateTime, length: Duration) -> Self {
        Self { from: to - length, to }
    }

    pub fn last_hour(now: OffsetDateTime) -> Self {
        Self::ending_at(now, Duration::hours(1))
    }

    pub fn last_day(now: OffsetDateTime) -> Self {
        Self::ending_at(now, Duration::days(1))
    }

    pub fn last_week(now: OffsetDateTime) -> Self {
        Self::ending_at(now, Duration::days(7))
    }

    pub fn last_month(now: OffsetDateTime) -> Self {
        Self::ending_at(now, Duration::days(30))
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.from <= at && at < self.to
    }
}

/// Named stats windows accepted by the monitoring API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodPreset {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl PeriodPreset {
    pub fn period(&self, now: OffsetDateTime) -> TimePeriod {
        match self {
            PeriodPreset::Hour => TimePeriod::last_hour(now),
            PeriodPreset::Day => TimePeriod::last_day(now),
            PeriodPreset::Week => TimePeriod::last_week(now),
            PeriodPreset::Month => TimePeriod::last_month(now),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodPreset::Hour => "hour",
            PeriodPreset::Day => "day",
            PeriodPreset::Week => "week",
            PeriodPreset::Month => "month",
        }
    }
}

impl fmt::Display for PeriodPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodPreset {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(PeriodPreset::Hour),
            "day" => Ok(PeriodPreset::Day),
            "week" => Ok(PeriodPreset::Week),
            "month" => Ok(PeriodPreset::Month),
            other => Err(ProfileError::Validation(format!(
                "invalid period '{}', expected hour, day, week or month",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookStats {
    pub period: TimePeriod,
    pub total_events: i64,
    pub successful_events: i64,
    pub failed_events: i64,
    pub events_by_type: HashMap<String, i64>,
    pub profiles_extracted: i64,
    pub profiles_stored: i64,
    pub average_processing_time_ms: f64,
    pub errors_by_type: HashMap<String, i64>,
}

impl WebhookStats {
    pub fn empty(period: TimePeriod) -> Self {
        Self {
            period,
            total_events: 0,
            successful_events: 0,
            failed_events: 0,
            events_by_type: HashMap::new(),
            profiles_extracted: 0,
            profiles_stored: 0,
            average_processing_time_ms: 0.0,
            errors_by_type: HashMap::new(),
        }
    }
}

/// Storage for per-event outcomes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventMetricStore: Send + Sync {
    async fn record(&self, metric: &EventMetric) -> ProfileResult<()>;

    /// Aggregate over events with `processed_at` in `[period.from, period.to)`
    async fn stats(&self, period: &TimePeriod) -> ProfileResult<WebhookStats>;
}

#[derive(Clone)]
pub struct MonitoringAggregator {
    events: Arc<dyn EventMetricStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl MonitoringAggregator {
    pub fn new(events: Arc<dyn EventMetricStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { events, profiles }
    }

    pub async fn record_event(&self, metric: &EventMetric) -> ProfileResult<()> {
        self.events.record(metric).await
    }

    pub async fn webhook_stats(&self, period: TimePeriod) -> ProfileResult<WebhookStats> {
        self.events.stats(&period).await
    }

    pub async fn coverage(&self) -> ProfileResult<ProfileCoverage> {
        let stats = self.profiles.stats().await?;
        Ok(quality::coverage(&stats, OffsetDateTime::now_utc()))
    }

    pub async fn quality_report(&self) -> ProfileResult<ProfileQualityReport> {
        let stats = self.profiles.stats().await?;
        Ok(quality::quality_report(&stats, OffsetDateTime::now_utc()))
    }

    /// Current quality report and last-hour webhook stats checked against
    /// `thresholds`
    pub async fn check_alerts(&self, thresholds: &AlertThresholds) -> ProfileResult<Vec<Alert>> {
        let report = self.quality_report().await?;
        let stats = self
            .webhook_stats(TimePeriod::last_hour(OffsetDateTime::now_utc()))
            .await?;
        Ok(quality::evaluate_alerts(&report, &stats, thresholds))
    }
}
