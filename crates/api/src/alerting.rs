//! Periodic quality and error-rate alerting
//!
//! Alerts are only logged; there is no outbound notification channel.

use std::time::Duration;

use maxbot_profiles::{Alert, AlertKind, AlertThresholds, MonitoringAggregator};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

fn log_alert(alert: &Alert) {
    match alert.kind {
        AlertKind::LowProfileQuality => tracing::warn!(
            alert = "low_profile_quality",
            observed = alert.observed,
            threshold = alert.threshold,
            "Profile quality below threshold"
        ),
        AlertKind::HighWebhookErrorRate => tracing::warn!(
            alert = "high_webhook_error_rate",
            observed = alert.observed,
            threshold = alert.threshold,
            "Webhook error rate above threshold"
        ),
    }
}

/// Run one check and log every breach. Returns the alerts raised.
pub async fn check_once(monitoring: &MonitoringAggregator, thresholds: &AlertThresholds) -> Vec<Alert> {
    match monitoring.check_alerts(thresholds).await {
        Ok(alerts) => {
            for alert in &alerts {
                log_alert(alert);
            }
            if alerts.is_empty() {
                tracing::debug!("Alert check passed");
            }
            alerts
        }
        Err(e) => {
            tracing::error!(error = %e, "Alert check failed");
            Vec::new()
        }
    }
}

const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Background task; stops when `shutdown` is cancelled. Intervals below one
/// second are raised to one second.
pub async fn alert_checker_task(
    monitoring: MonitoringAggregator,
    thresholds: AlertThresholds,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(every.max(MIN_CHECK_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately; skip it so startup is not an alert check
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Alert checker stopped");
                return;
            }
            _ = ticker.tick() => {
                check_once(&monitoring, &thresholds).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use maxbot_profiles::{
        EventMetric, EventMetricStore, InMemoryEventStore, InMemoryProfileStore,
    };
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_check_once_reports_error_rate() {
        let events = Arc::new(InMemoryEventStore::new());
        let at = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        for i in 0..4 {
            let mut metric = EventMetric::new("message_new", format!("u{}", i), at);
            metric.success = i > 0;
            events.record(&metric).await.unwrap();
        }
        let monitoring = MonitoringAggregator::new(events, Arc::new(InMemoryProfileStore::new()));

        let alerts = check_once(&monitoring, &AlertThresholds::default()).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighWebhookErrorRate);
        assert!((alerts[0].observed - 0.25).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_on_shutdown() {
        let monitoring = MonitoringAggregator::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryProfileStore::new()),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(alert_checker_task(
            monitoring,
            AlertThresholds::default(),
            Duration::from_secs(300),
            shutdown.clone(),
        ));

        tokio::time::advance(Duration::from_secs(601)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let monitoring = MonitoringAggregator::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryProfileStore::new()),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(alert_checker_task(
            monitoring,
            AlertThresholds::default(),
            Duration::ZERO,
            shutdown.clone(),
        ));

        tokio::time::advance(Duration::from_secs(3)).await;
        shutdown.cancel();
        let result = handle.await;
        assert!(result.is_ok(), "alert checker panicked");
    }
}
