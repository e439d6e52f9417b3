use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use time::Date;

use super::window::{
    day_label, days_in, unix_millis, utc_date, DailyCounters, StatsAccumulator, MAX_DAILY_RAW_EVENTS,
    MAX_DAILY_SAMPLES,
};
use super::{EventMetric, EventMetricStore, TimePeriod, WebhookStats, DAILY_RETENTION, RAW_EVENT_RETENTION};
use crate::error::{ProfileError, ProfileResult};

const RECORD_TIMEOUT: Duration = Duration::from_secs(3);
const STATS_TIMEOUT: Duration = Duration::from_secs(10);

const EVENTS_FIELD_PREFIX: &str = "events_";
const ERRORS_FIELD_PREFIX: &str = "errors_";

const EVENT_SEQ_KEY: &str = "webhook:events:seq";

fn daily_key(date: Date) -> String {
    format!("webhook:stats:daily:{}", day_label(date))
}

fn samples_key(date: Date) -> String {
    format!("webhook:processing_times:{}", day_label(date))
}

fn events_key(date: Date) -> String {
    format!("webhook:events:{}", day_label(date))
}

/// Sorted-set members are `{seq}|{json}` so identical events stay distinct
fn event_member(seq: u64, payload: &str) -> String {
    format!("{}|{}", seq, payload)
}

fn event_payload(member: &str) -> &str {
    member.split_once('|').map_or(member, |(_, payload)| payload)
}

fn counters_from_hash(fields: HashMap<String, i64>) -> DailyCounters {
    let mut counters = DailyCounters::default();
    for (field, value) in fields {
        match field.as_str() {
            "total_events" => counters.total_events += value,
            "successful_events" => counters.successful_events += value,
            "failed_events" => counters.failed_events += value,
            "profiles_extracted" => counters.profiles_extracted += value,
            "profiles_stored" => counters.profiles_stored += value,
            other => {
                if let Some(kind) = other.strip_prefix(EVENTS_FIELD_PREFIX) {
                    *counters.events_by_type.entry(kind.to_string()).or_insert(0) += value;
                } else if let Some(message) = other.strip_prefix(ERRORS_FIELD_PREFIX) {
                    *counters.errors_by_type.entry(message.to_string()).or_insert(0) += value;
                }
            }
        }
    }
    counters
}

/// Redis layout per UTC day:
/// - `webhook:stats:daily:{day}` hash of counters (30 days)
/// - `webhook:processing_times:{day}` list of the newest 1000 samples (30 days)
/// - `webhook:events:{day}` sorted set of raw JSON events scored by
///   `processed_at` in unix millis, newest 10000 kept (7 days)
#[derive(Clone)]
pub struct RedisEventStore {
    conn: ConnectionManager,
}

impl RedisEventStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn write(&self, metric: &EventMetric) -> ProfileResult<()> {
        let payload =
            serde_json::to_string(metric).map_err(|e| ProfileError::Monitoring(e.to_string()))?;
        let date = utc_date(metric.processed_at);
        let daily = daily_key(date);
        let samples = samples_key(date);
        let events = events_key(date);

        let mut conn = self.conn.clone();
        let seq: u64 = redis::cmd("INCR").arg(EVENT_SEQ_KEY).query_async(&mut conn).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HINCRBY").arg(&daily).arg("total_events").arg(1).ignore();
        pipe.cmd("HINCRBY")
            .arg(&daily)
            .arg(format!("{}{}", EVENTS_FIELD_PREFIX, metric.event_type))
            .arg(1)
            .ignore();
        if metric.success {
            pipe.cmd("HINCRBY").arg(&daily).arg("successful_events").arg(1).ignore();
        } else {
            pipe.cmd("HINCRBY").arg(&daily).arg("failed_events").arg(1).ignore();
            if !metric.error_message.is_empty() {
                pipe.cmd("HINCRBY")
                    .arg(&daily)
                    .arg(format!("{}{}", ERRORS_FIELD_PREFIX, metric.error_message))
                    .arg(1)
                    .ignore();
            }
        }
        if metric.profile_found {
            pipe.cmd("HINCRBY").arg(&daily).arg("profiles_extracted").arg(1).ignore();
        }
        if metric.profile_stored {
            pipe.cmd("HINCRBY").arg(&daily).arg("profiles_stored").arg(1).ignore();
        }

        pipe.cmd("LPUSH").arg(&samples).arg(metric.processing_time_ms).ignore();
        pipe.cmd("LTRIM").arg(&samples).arg(0).arg(MAX_DAILY_SAMPLES - 1).ignore();
        pipe.cmd("ZADD")
            .arg(&events)
            .arg(unix_millis(metric.processed_at))
            .arg(event_member(seq, &payload))
            .ignore();
        pipe.cmd("ZREMRANGEBYRANK")
            .arg(&events)
            .arg(0)
            .arg(-(MAX_DAILY_RAW_EVENTS as i64) - 1)
            .ignore();

        pipe.cmd("EXPIRE").arg(&daily).arg(DAILY_RETENTION.as_secs()).ignore();
        pipe.cmd("EXPIRE").arg(&samples).arg(DAILY_RETENTION.as_secs()).ignore();
        pipe.cmd("EXPIRE").arg(&events).arg(RAW_EVENT_RETENTION.as_secs()).ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn whole_day(&self, date: Date, acc: &mut StatsAccumulator) -> ProfileResult<()> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, i64> =
            redis::cmd("HGETALL").arg(daily_key(date)).query_async(&mut conn).await?;
        if fields.is_empty() {
            return Ok(());
        }
        let samples: Vec<i64> = redis::cmd("LRANGE")
            .arg(samples_key(date))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        acc.add_day(&counters_from_hash(fields), &samples);
        Ok(())
    }

    async fn collect(&self, period: &TimePeriod) -> ProfileResult<WebhookStats> {
        let mut acc = StatsAccumulator::new();

        for slice in days_in(period) {
            if slice.whole {
                self.whole_day(slice.date, &mut acc).await?;
                continue;
            }

            let key = events_key(slice.date);
            let mut conn = self.conn.clone();
            let retained: u64 = redis::cmd("ZCARD").arg(&key).query_async(&mut conn).await?;
            if retained == 0 {
                // raw events expired or never written
                self.whole_day(slice.date, &mut acc).await?;
                continue;
            }

            // scores are truncated millis; the exact [from, to) check is below
            let raw: Vec<String> = redis::cmd("ZRANGEBYSCORE")
                .arg(&key)
                .arg(unix_millis(period.from))
                .arg(unix_millis(period.to))
                .query_async(&mut conn)
                .await?;

            for item in raw {
                match serde_json::from_str::<EventMetric>(event_payload(&item)) {
                    Ok(event) if period.contains(event.processed_at) => acc.add_event(&event),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(day = %day_label(slice.date), error = %e, "Skipping undecodable webhook event"),
                }
            }
        }

        Ok(acc.finish(*period))
    }
}

#[async_trait]
impl EventMetricStore for RedisEventStore {
    async fn record(&self, metric: &EventMetric) -> ProfileResult<()> {
        tokio::time::timeout(RECORD_TIMEOUT, self.write(metric))
            .await
            .map_err(|_| ProfileError::Timeout {
                operation: "metric record",
            })?
    }

    async fn stats(&self, period: &TimePeriod) -> ProfileResult<WebhookStats> {
        tokio::time::timeout(STATS_TIMEOUT, self.collect(period))
            .await
            .map_err(|_| ProfileError::Timeout {
                operation: "webhook stats",
            })?
    }
}
