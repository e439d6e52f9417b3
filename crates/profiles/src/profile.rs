//! Cached per-user profile records and their aggregate statistics

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::ProfileError;

/// Profiles whose last update is older than this are reported as stale
pub const STALE_AFTER: Duration = Duration::days(30);

/// Provenance of the name data held by a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    Webhook,
    UserInput,
    Default,
}

impl ProfileSource {
    pub const ALL: [ProfileSource; 3] = [
        ProfileSource::Webhook,
        ProfileSource::UserInput,
        ProfileSource::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Webhook => "webhook",
            ProfileSource::UserInput => "user_input",
            ProfileSource::Default => "default",
        }
    }
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileSource {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(ProfileSource::Webhook),
            "user_input" => Ok(ProfileSource::UserInput),
            "default" => Ok(ProfileSource::Default),
            other => Err(ProfileError::Validation(format!(
                "unknown profile source: {}",
                other
            ))),
        }
    }
}

/// One cached profile per platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    #[serde(default)]
    pub platform_first_name: String,
    #[serde(default)]
    pub platform_last_name: String,
    #[serde(default)]
    pub user_provided_name: String,
    pub source: ProfileSource,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl Profile {
    /// Empty profile for a user nothing is known about yet
    pub fn new(user_id: impl Into<String>, source: ProfileSource) -> Self {
        Self {
            user_id: user_id.into(),
            platform_first_name: String::new(),
            platform_last_name: String::new(),
            user_provided_name: String::new(),
            source,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    /// Best available name.
    ///
    /// Priority: user-provided name, then "first last" when both platform
    /// names are known, then the platform first name alone.
    pub fn display_name(&self) -> String {
        if !self.user_provided_name.is_empty() {
            return self.user_provided_name.clone();
        }
        match (
            self.platform_first_name.is_empty(),
            self.platform_last_name.is_empty(),
        ) {
            (false, false) => format!("{} {}", self.platform_first_name, self.platform_last_name),
            (false, true) => self.platform_first_name.clone(),
            _ => String::new(),
        }
    }

    pub fn has_full_name(&self) -> bool {
        !self.user_provided_name.is_empty()
            || (!self.platform_first_name.is_empty() && !self.platform_last_name.is_empty())
    }

    pub fn is_stale(&self, now: OffsetDateTime) -> bool {
        now - self.last_updated > STALE_AFTER
    }
}

/// Partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_provided_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ProfileSource>,
}

impl ProfileUpdates {
    pub fn user_name(name: impl Into<String>) -> Self {
        Self {
            user_provided_name: Some(name.into()),
            source: Some(ProfileSource::UserInput),
            ..Default::default()
        }
    }

    /// Apply onto an existing record, or onto a fresh one when absent.
    ///
    /// A fresh record starts with source `default` unless the update sets one.
    pub fn apply(&self, user_id: &str, existing: Option<Profile>) -> Profile {
        let mut profile = existing.unwrap_or_else(|| Profile::new(user_id, ProfileSource::Default));
        if let Some(first) = &self.platform_first_name {
            profile.platform_first_name = first.clone();
        }
        if let Some(last) = &self.platform_last_name {
            profile.platform_last_name = last.clone();
        }
        if let Some(name) = &self.user_provided_name {
            profile.user_provided_name = name.clone();
        }
        if let Some(source) = self.source {
            profile.source = source;
        }
        profile
    }
}

/// Aggregate counts over every stored profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_profiles: i64,
    pub profiles_with_full_name: i64,
    pub empty_profiles: i64,
    pub stale_profiles: i64,
    pub profiles_by_source: HashMap<ProfileSource, i64>,
    pub full_names_by_source: HashMap<ProfileSource, i64>,
}

impl ProfileStats {
    pub fn collect<'a>(profiles: impl IntoIterator<Item = &'a Profile>, now: OffsetDateTime) -> Self {
        let mut stats = ProfileStats::default();
        for profile in profiles {
            stats.add(profile, now);
        }
        stats
    }

    pub fn add(&mut self, profile: &Profile, now: OffsetDateTime) {
        self.total_profiles += 1;
        *self.profiles_by_source.entry(profile.source).or_insert(0) += 1;

        if profile.has_full_name() {
            self.profiles_with_full_name += 1;
            *self.full_names_by_source.entry(profile.source).or_insert(0) += 1;
        }
        if profile.display_name().is_empty() {
            self.empty_profiles += 1;
        }
        if profile.is_stale(now) {
            self.stale_profiles += 1;
        }
    }

    pub fn by_source(&self, source: ProfileSource) -> i64 {
        self.profiles_by_source.get(&source).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(first: &str, last: &str, provided: &str) -> Profile {
        Profile {
            user_id: "u1".to_string(),
            platform_first_name: first.to_string(),
            platform_last_name: last.to_string(),
            user_provided_name: provided.to_string(),
            source: ProfileSource::Webhook,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_display_name_priority_all_combinations() {
        // (first, last, provided) -> (display, has_full_name)
        let cases = [
            ("", "", "", "", false),
            ("Иван", "", "", "Иван", false),
            ("", "Петров", "", "", false),
            ("Иван", "Петров", "", "Иван Петров", true),
            ("", "", "Сидоров", "Сидоров", true),
            ("Иван", "", "Сидоров", "Сидоров", true),
            ("", "Петров", "Сидоров", "Сидоров", true),
            ("Иван", "Петров", "Сидоров", "Сидоров", true),
        ];
        for (first, last, provided, display, full) in cases {
            let p = profile(first, last, provided);
            assert_eq!(p.display_name(), display, "display for {:?}", (first, last, provided));
            assert_eq!(p.has_full_name(), full, "full for {:?}", (first, last, provided));
        }
    }

    #[test]
    fn test_source_round_trips_through_str() {
        for source in ProfileSource::ALL {
            assert_eq!(source.as_str().parse::<ProfileSource>().unwrap(), source);
        }
        assert!("robot".parse::<ProfileSource>().is_err());
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&ProfileSource::UserInput).unwrap();
        assert_eq!(json, "\"user_input\"");
    }

    #[test]
    fn test_updates_on_missing_profile_start_from_default() {
        let updated = ProfileUpdates {
            platform_first_name: Some("Анна".into()),
            ..Default::default()
        }
        .apply("u9", None);

        assert_eq!(updated.user_id, "u9");
        assert_eq!(updated.platform_first_name, "Анна");
        assert_eq!(updated.source, ProfileSource::Default);
    }

    #[test]
    fn test_user_name_update_sets_user_input_source() {
        let existing = profile("Иван", "Петров", "");
        let updated = ProfileUpdates::user_name("Иван Сидоров").apply("u1", Some(existing));

        assert_eq!(updated.user_provided_name, "Иван Сидоров");
        assert_eq!(updated.platform_last_name, "Петров");
        assert_eq!(updated.source, ProfileSource::UserInput);
    }

    #[test]
    fn test_stats_collect_counts_sources_and_staleness() {
        let now = OffsetDateTime::now_utc();
        let mut old = profile("", "", "");
        old.source = ProfileSource::Default;
        old.last_updated = now - Duration::days(45);
        let mut typed = profile("", "", "Ольга");
        typed.source = ProfileSource::UserInput;
        let profiles = vec![profile("Иван", "Петров", ""), profile("Иван", "", ""), old, typed];

        let stats = ProfileStats::collect(&profiles, now);

        assert_eq!(stats.total_profiles, 4);
        assert_eq!(stats.profiles_with_full_name, 2);
        assert_eq!(stats.empty_profiles, 1);
        assert_eq!(stats.stale_profiles, 1);
        assert_eq!(stats.by_source(ProfileSource::Webhook), 2);
        assert_eq!(stats.by_source(ProfileSource::UserInput), 1);
        assert_eq!(stats.by_source(ProfileSource::Default), 1);
        assert_eq!(stats.full_names_by_source.get(&ProfileSource::UserInput), Some(&1));
    }

    #[test]
    fn test_profile_json_uses_rfc3339_timestamp() {
        let mut p = profile("Иван", "", "");
        p.last_updated = time::macros::datetime!(2024-01-15 10:30:00 UTC);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["last_updated"], "2024-01-15T10:30:00Z");
        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
