//! Coverage and quality scoring derived from the profile aggregate

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::WebhookStats;
use crate::profile::{ProfileSource, ProfileStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCoverage {
    pub total_users: i64,
    pub users_with_profiles: i64,
    pub users_with_full_names: i64,
    pub coverage_percentage: f64,
    pub full_name_percentage: f64,
    pub profiles_by_source: HashMap<ProfileSource, i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileQualityMetrics {
    pub complete_profiles: i64,
    pub partial_profiles: i64,
    pub empty_profiles: i64,
    pub stale_profiles: i64,
    pub quality_score: f64,
    pub completeness_score: f64,
    pub freshness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub count: i64,
    pub complete_profiles: i64,
    pub average_age_days: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDataIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub count: i64,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileQualityReport {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub total_profiles: i64,
    pub quality_metrics: ProfileQualityMetrics,
    pub source_breakdown: HashMap<ProfileSource, SourceQuality>,
    pub recommended_actions: Vec<String>,
    pub data_issues: Vec<ProfileDataIssue>,
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

/// Every stored profile counts as a known user, so coverage is 100% whenever
/// any profile exists.
pub fn coverage(stats: &ProfileStats, now: OffsetDateTime) -> ProfileCoverage {
    let total_users = stats.total_profiles;
    ProfileCoverage {
        total_users,
        users_with_profiles: stats.total_profiles,
        users_with_full_names: stats.profiles_with_full_name,
        coverage_percentage: percent(stats.total_profiles, total_users),
        full_name_percentage: percent(stats.profiles_with_full_name, total_users),
        profiles_by_source: stats.profiles_by_source.clone(),
        last_updated: now,
    }
}

/// Fixed (quality score, assumed average age in days) per source
fn source_heuristics(source: ProfileSource) -> (f64, f64) {
    match source {
        ProfileSource::Webhook => (85.0, 7.0),
        ProfileSource::UserInput => (95.0, 3.0),
        ProfileSource::Default => (30.0, 30.0),
    }
}

pub fn quality_metrics(stats: &ProfileStats) -> ProfileQualityMetrics {
    let total = stats.total_profiles;
    if total <= 0 {
        return ProfileQualityMetrics::default();
    }

    let complete = stats.profiles_with_full_name;
    let empty = stats.empty_profiles;
    let fresh = stats.by_source(ProfileSource::Webhook) + stats.by_source(ProfileSource::UserInput);

    let completeness_score = percent(complete, total);
    let freshness_score = percent(fresh, total);

    ProfileQualityMetrics {
        complete_profiles: complete,
        partial_profiles: (total - complete - empty).max(0),
        empty_profiles: empty,
        stale_profiles: stats.stale_profiles,
        quality_score: ((completeness_score + freshness_score) / 2.0).clamp(0.0, 100.0),
        completeness_score,
        freshness_score,
    }
}

pub fn source_breakdown(stats: &ProfileStats) -> HashMap<ProfileSource, SourceQuality> {
    stats
        .profiles_by_source
        .iter()
        .map(|(&source, &count)| {
            let (quality_score, average_age_days) = source_heuristics(source);
            let quality = SourceQuality {
                count,
                complete_profiles: stats.full_names_by_source.get(&source).copied().unwrap_or(0),
                average_age_days,
                quality_score,
            };
            (source, quality)
        })
        .collect()
}

pub fn recommendations(metrics: &ProfileQualityMetrics, stats: &ProfileStats) -> Vec<String> {
    let total = stats.total_profiles;
    let mut actions = Vec::new();

    if metrics.completeness_score < 70.0 {
        actions.push("Increase full-name coverage through webhook events".to_string());
    }
    if stats.by_source(ProfileSource::Default) > total / 2 {
        actions.push(
            "Too many profiles hold default data, collect more names from webhook events".to_string(),
        );
    }
    if stats.by_source(ProfileSource::UserInput) < total / 10 {
        actions.push("Give users more opportunities to provide their own names".to_string());
    }
    if metrics.quality_score < 60.0 {
        actions.push("Overall data quality needs attention, review the webhook setup".to_string());
    }
    actions
}

pub fn data_issues(stats: &ProfileStats) -> Vec<ProfileDataIssue> {
    let total = stats.total_profiles;
    let mut issues = Vec::new();

    let incomplete = total - stats.profiles_with_full_name;
    if incomplete > total / 2 {
        issues.push(ProfileDataIssue {
            kind: "incomplete_profiles".to_string(),
            description: "More than 50% of profiles lack a full name".to_string(),
            count: incomplete,
            severity: IssueSeverity::High,
        });
    }

    if total > 0 && stats.by_source(ProfileSource::Webhook) == 0 {
        issues.push(ProfileDataIssue {
            kind: "no_webhook_data".to_string(),
            description: "No profile data has arrived from webhook events".to_string(),
            count: total,
            severity: IssueSeverity::High,
        });
    }

    let defaults = stats.by_source(ProfileSource::Default);
    if defaults > total * 3 / 4 {
        issues.push(ProfileDataIssue {
            kind: "too_many_defaults".to_string(),
            description: "More than 75% of profiles use default data".to_string(),
            count: defaults,
            severity: IssueSeverity::Medium,
        });
    }

    issues
}

pub fn quality_report(stats: &ProfileStats, now: OffsetDateTime) -> ProfileQualityReport {
    let quality_metrics = quality_metrics(stats);
    ProfileQualityReport {
        generated_at: now,
        total_profiles: stats.total_profiles,
        recommended_actions: recommendations(&quality_metrics, stats),
        data_issues: data_issues(stats),
        source_breakdown: source_breakdown(stats),
        quality_metrics,
    }
}

/// Breach thresholds checked by the periodic alert task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Alert when quality score / 100 drops below this
    pub profile_quality: f64,
    /// Alert when failed / total webhook events exceeds this
    pub webhook_error_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            profile_quality: 0.8,
            webhook_error_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowProfileQuality,
    HighWebhookErrorRate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub observed: f64,
    pub threshold: f64,
}

pub fn evaluate_alerts(
    report: &ProfileQualityReport,
    stats: &WebhookStats,
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if report.total_profiles > 0 {
        let quality = report.quality_metrics.quality_score / 100.0;
        if quality < thresholds.profile_quality {
            alerts.push(Alert {
                kind: AlertKind::LowProfileQuality,
                observed: quality,
                threshold: thresholds.profile_quality,
            });
        }
    }

    if stats.total_events > 0 {
        let error_rate = stats.failed_events as f64 / stats.total_events as f64;
        if error_rate > thresholds.webhook_error_rate {
            alerts.push(Alert {
                kind: AlertKind::HighWebhookErrorRate,
                observed: error_rate,
                threshold: thresholds.webhook_error_rate,
            });
        }
    }

    alerts
}
