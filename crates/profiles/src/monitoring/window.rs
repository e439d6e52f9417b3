//! Daily counters and the day-by-day plan for answering a time window

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use super::{EventMetric, TimePeriod, WebhookStats};

/// Processing-time samples kept per day
pub const MAX_DAILY_SAMPLES: usize = 1000;

/// Raw events kept per day for partial-day windows; the oldest go first
pub const MAX_DAILY_RAW_EVENTS: usize = 10_000;

pub fn utc_date(at: OffsetDateTime) -> Date {
    at.to_offset(UtcOffset::UTC).date()
}

/// Sort score for raw events
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// `YYYY-MM-DD`, used in storage keys
pub fn day_label(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn day_start(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

/// Event counters for one UTC day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounters {
    pub total_events: i64,
    pub successful_events: i64,
    pub failed_events: i64,
    pub profiles_extracted: i64,
    pub profiles_stored: i64,
    pub events_by_type: HashMap<String, i64>,
    pub errors_by_type: HashMap<String, i64>,
}

impl DailyCounters {
    pub fn record(&mut self, metric: &EventMetric) {
        self.total_events += 1;
        *self
            .events_by_type
            .entry(metric.event_type.clone())
            .or_insert(0) += 1;
        if metric.success {
            self.successful_events += 1;
        } else {
            self.failed_events += 1;
            if !metric.error_message.is_empty() {
                *self
                    .errors_by_type
                    .entry(metric.error_message.clone())
                    .or_insert(0) += 1;
            }
        }
        if metric.profile_found {
            self.profiles_extracted += 1;
        }
        if metric.profile_stored {
            self.profiles_stored += 1;
        }
    }

    pub fn merge(&mut self, other: &DailyCounters) {
        self.total_events += other.total_events;
        self.successful_events += other.successful_events;
        self.failed_events += other.failed_events;
        self.profiles_extracted += other.profiles_extracted;
        self.profiles_stored += other.profiles_stored;
        for (kind, count) in &other.events_by_type {
            *self.events_by_type.entry(kind.clone()).or_insert(0) += count;
        }
        for (kind, count) in &other.errors_by_type {
            *self.errors_by_type.entry(kind.clone()).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_events == 0
    }
}

/// One day touched by a query window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySlice {
    pub date: Date,
    /// The whole day lies inside the window, so its counters apply as-is
    pub whole: bool,
}

/// Days overlapping `[from, to)`, oldest first
pub fn days_in(period: &TimePeriod) -> Vec<DaySlice> {
    let mut slices = Vec::new();
    if period.to <= period.from {
        return slices;
    }

    let last = utc_date(period.to - Duration::nanoseconds(1));
    let mut date = utc_date(period.from);
    loop {
        let start = day_start(date);
        let whole = period.from <= start && start + Duration::days(1) <= period.to;
        slices.push(DaySlice { date, whole });
        if date >= last {
            break;
        }
        match date.next_day() {
            Some(next) => date = next,
            None => break,
        }
    }
    slices
}

/// Sums days and individual events into one [`WebhookStats`]
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    counters: DailyCounters,
    time_sum: i64,
    time_count: i64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_day(&mut self, counters: &DailyCounters, samples: &[i64]) {
        self.counters.merge(counters);
        self.time_sum += samples.iter().sum::<i64>();
        self.time_count += samples.len() as i64;
    }

    pub fn add_event(&mut self, metric: &EventMetric) {
        self.counters.record(metric);
        self.time_sum += metric.processing_time_ms;
        self.time_count += 1;
    }

    pub fn finish(self, period: TimePeriod) -> WebhookStats {
        let average_processing_time_ms = if self.time_count > 0 {
            self.time_sum as f64 / self.time_count as f64
        } else {
            0.0
        };
        WebhookStats {
            period,
            total_events: self.counters.total_events,
            successful_events: self.counters.successful_events,
            failed_events: self.counters.failed_events,
            events_by_type: self.counters.events_by_type,
            profiles_extracted: self.counters.profiles_extracted,
            profiles_stored: self.counters.profiles_stored,
            average_processing_time_ms,
            errors_by_type: self.counters.errors_by_type,
        }
    }
}
