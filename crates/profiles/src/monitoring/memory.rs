use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Date, Duration, OffsetDateTime};
use tokio::sync::RwLock;

use super::window::{
    days_in, utc_date, DailyCounters, StatsAccumulator, MAX_DAILY_RAW_EVENTS, MAX_DAILY_SAMPLES,
};
use super::{EventMetric, EventMetricStore, TimePeriod, WebhookStats, DAILY_RETENTION, RAW_EVENT_RETENTION};
use crate::error::ProfileResult;

#[derive(Default)]
struct DayBucket {
    counters: DailyCounters,
    /// Newest last
    samples: Vec<i64>,
    /// Ordered by `processed_at`
    events: Vec<EventMetric>,
}

impl DayBucket {
    fn push_event(&mut self, metric: &EventMetric) {
        let at = self.events.partition_point(|e| e.processed_at <= metric.processed_at);
        self.events.insert(at, metric.clone());
        if self.events.len() > MAX_DAILY_RAW_EVENTS {
            let excess = self.events.len() - MAX_DAILY_RAW_EVENTS;
            self.events.drain(..excess);
        }
    }

    fn events_in<'a>(&'a self, period: &TimePeriod) -> &'a [EventMetric] {
        let start = self.events.partition_point(|e| e.processed_at < period.from);
        let end = self.events.partition_point(|e| e.processed_at < period.to);
        &self.events[start..end.max(start)]
    }
}

/// Process-local event store with the same retention rules as the Redis one
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    days: Arc<RwLock<BTreeMap<Date, DayBucket>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(days: &mut BTreeMap<Date, DayBucket>, today: Date) {
        let counters_cutoff = today - Duration::seconds(DAILY_RETENTION.as_secs() as i64);
        let events_cutoff = today - Duration::seconds(RAW_EVENT_RETENTION.as_secs() as i64);

        days.retain(|date, _| *date >= counters_cutoff);
        for (_, bucket) in days.range_mut(..events_cutoff) {
            bucket.events.clear();
        }
    }
}

#[async_trait]
impl EventMetricStore for InMemoryEventStore {
    async fn record(&self, metric: &EventMetric) -> ProfileResult<()> {
        let mut days = self.days.write().await;
        let bucket = days.entry(utc_date(metric.processed_at)).or_default();

        bucket.counters.record(metric);
        bucket.samples.push(metric.processing_time_ms);
        if bucket.samples.len() > MAX_DAILY_SAMPLES {
            let excess = bucket.samples.len() - MAX_DAILY_SAMPLES;
            bucket.samples.drain(..excess);
        }
        bucket.push_event(metric);

        Self::prune(&mut days, utc_date(OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn stats(&self, period: &TimePeriod) -> ProfileResult<WebhookStats> {
        let days = self.days.read().await;
        let mut acc = StatsAccumulator::new();

        for slice in days_in(period) {
            let Some(bucket) = days.get(&slice.date) else { continue };
            if slice.whole || bucket.events.is_empty() {
                acc.add_day(&bucket.counters, &bucket.samples);
            } else {
                for event in bucket.events_in(period) {
                    acc.add_event(event);
                }
            }
        }

        Ok(acc.finish(*period))
    }
}
