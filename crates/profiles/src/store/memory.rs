use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{require_user_id, ProfileStore, DEFAULT_PROFILE_TTL};
use crate::error::ProfileResult;
use crate::profile::{Profile, ProfileStats, ProfileUpdates};

/// Writes between sweeps of expired entries
const SWEEP_EVERY_WRITES: u64 = 1024;

struct Entry {
    profile: Profile,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local store backed by a HashMap, with per-record TTL
#[derive(Clone)]
pub struct InMemoryProfileStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
    ttl: Duration,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_PROFILE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    /// Number of live records
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Swept expired profiles");
        }
    }

    /// Sweep on every [`SWEEP_EVERY_WRITES`]th write
    fn sweep_due(&self) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_WRITES == SWEEP_EVERY_WRITES - 1
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn store(&self, user_id: &str, profile: &Profile) -> ProfileResult<()> {
        require_user_id(user_id)?;
        let now = Instant::now();
        let entry = Entry {
            profile: profile.clone(),
            expires_at: now + self.ttl,
        };
        let mut entries = self.entries.write().await;
        if self.sweep_due() {
            Self::sweep(&mut entries, now);
        }
        entries.insert(user_id.to_string(), entry);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> ProfileResult<Option<Profile>> {
        require_user_id(user_id)?;
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(user_id) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.profile.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired, drop it
        let mut entries = self.entries.write().await;
        if entries.get(user_id).is_some_and(|e| !e.is_live(now)) {
            entries.remove(user_id);
        }
        Ok(None)
    }

    async fn update(&self, user_id: &str, updates: &ProfileUpdates) -> ProfileResult<()> {
        require_user_id(user_id)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if self.sweep_due() {
            Self::sweep(&mut entries, now);
        }

        let existing = entries
            .remove(user_id)
            .filter(|e| e.is_live(now))
            .map(|e| e.profile);
        let mut profile = updates.apply(user_id, existing);
        profile.last_updated = OffsetDateTime::now_utc();

        entries.insert(
            user_id.to_string(),
            Entry {
                profile,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    async fn stats(&self) -> ProfileResult<ProfileStats> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::sweep(&mut entries, now);
        Ok(ProfileStats::collect(
            entries.values().map(|e| &e.profile),
            OffsetDateTime::now_utc(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use crate::profile::ProfileSource;

    fn webhook_profile(user_id: &str, first: &str, last: &str) -> Profile {
        let mut profile = Profile::new(user_id, ProfileSource::Webhook);
        profile.platform_first_name = first.to_string();
        profile.platform_last_name = last.to_string();
        profile
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryProfileStore::new();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_get() {
        let store = InMemoryProfileStore::new();
        let profile = webhook_profile("u1", "Иван", "Петров");
        store.store("u1", &profile).await.unwrap();

        assert_eq!(store.get("u1").await.unwrap(), Some(profile));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let store = InMemoryProfileStore::new();
        let result = store.store("", &webhook_profile("", "A", "B")).await;
        assert!(matches!(result, Err(ProfileError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_creates_missing_record() {
        let store = InMemoryProfileStore::new();
        store
            .update("u2", &ProfileUpdates::user_name("Ольга"))
            .await
            .unwrap();

        let profile = store.get("u2").await.unwrap().unwrap();
        assert_eq!(profile.user_provided_name, "Ольга");
        assert_eq!(profile.source, ProfileSource::UserInput);
    }

    #[tokio::test]
    async fn test_update_keeps_untouched_fields() {
        let store = InMemoryProfileStore::new();
        store
            .store("u1", &webhook_profile("u1", "Иван", "Петров"))
            .await
            .unwrap();
        store
            .update("u1", &ProfileUpdates::user_name("Ваня"))
            .await
            .unwrap();

        let profile = store.get("u1").await.unwrap().unwrap();
        assert_eq!(profile.platform_first_name, "Иван");
        assert_eq!(profile.platform_last_name, "Петров");
        assert_eq!(profile.display_name(), "Ваня");
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire_after_ttl() {
        let store = InMemoryProfileStore::with_ttl(Duration::from_secs(60));
        store
            .store("u1", &webhook_profile("u1", "Иван", ""))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("u1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("u1").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().total_profiles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_records_are_swept() {
        let store = InMemoryProfileStore::with_ttl(Duration::from_secs(60));
        for i in 0..10 {
            let id = format!("gone{}", i);
            store.store(&id, &webhook_profile(&id, "Иван", "")).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        store.stats().await.unwrap();
        assert!(store.entries.read().await.is_empty());

        // writes alone also sweep, without anyone reading the stale keys
        for i in 0..10 {
            let id = format!("old{}", i);
            store.store(&id, &webhook_profile(&id, "Анна", "")).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        for i in 0..SWEEP_EVERY_WRITES {
            let id = format!("new{}", i);
            store.store(&id, &webhook_profile(&id, "Пётр", "")).await.unwrap();
        }

        let entries = store.entries.read().await;
        assert!(entries.keys().all(|k| k.starts_with("new")));
        assert_eq!(entries.len(), SWEEP_EVERY_WRITES as usize);
    }

    #[tokio::test]
    async fn test_stats_by_source() {
        let store = InMemoryProfileStore::new();
        store
            .store("u1", &webhook_profile("u1", "Иван", "Петров"))
            .await
            .unwrap();
        store
            .store("u2", &webhook_profile("u2", "Анна", ""))
            .await
            .unwrap();
        store
            .update("u3", &ProfileUpdates::user_name("Пётр"))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_profiles, 3);
        assert_eq!(stats.profiles_with_full_name, 2);
        assert_eq!(stats.by_source(ProfileSource::Webhook), 2);
        assert_eq!(stats.by_source(ProfileSource::UserInput), 1);
    }
}
