use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use time::OffsetDateTime;

use super::{require_user_id, ProfileStore};
use crate::error::{ProfileError, ProfileResult};
use crate::profile::{Profile, ProfileStats, ProfileUpdates};

pub const PROFILE_KEY_PREFIX: &str = "profile:user:";

const GET_TIMEOUT: Duration = Duration::from_secs(2);
const SET_TIMEOUT: Duration = Duration::from_secs(3);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);
const STATS_TIMEOUT: Duration = Duration::from_secs(20);

/// Keys fetched per SCAN/MGET round while aggregating
const SCAN_BATCH: usize = 200;

pub fn profile_key(user_id: &str) -> String {
    format!("{}{}", PROFILE_KEY_PREFIX, user_id)
}

fn decode_profile(key: &str, raw: &str) -> ProfileResult<Profile> {
    serde_json::from_str(raw).map_err(|e| ProfileError::CorruptedData {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn encode_profile(profile: &Profile) -> ProfileResult<String> {
    serde_json::to_string(profile).map_err(|e| ProfileError::Store(e.to_string()))
}

async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> ProfileResult<T>
where
    F: Future<Output = ProfileResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProfileError::Timeout { operation })?
}

/// Redis-backed store. Each profile is a JSON string under
/// `profile:user:{user_id}` with an expiry of the configured TTL.
#[derive(Clone)]
pub struct RedisProfileStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisProfileStore {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    pub async fn connect(url: &str, ttl: Duration) -> ProfileResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(ttl_secs = ttl.as_secs(), "Connected profile store to Redis");
        Ok(Self::new(conn, ttl))
    }

    async fn write(&self, key: &str, profile: &Profile) -> ProfileResult<()> {
        let payload = encode_profile(profile)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> ProfileResult<Option<Profile>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        raw.map(|raw| decode_profile(key, &raw)).transpose()
    }

    async fn aggregate(&self) -> ProfileResult<ProfileStats> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", PROFILE_KEY_PREFIX);
        let now = OffsetDateTime::now_utc();
        let mut stats = ProfileStats::default();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let values: Vec<Option<String>> =
                    redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
                for (key, raw) in keys.iter().zip(values) {
                    // expired between SCAN and MGET
                    let Some(raw) = raw else { continue };
                    match decode_profile(key, &raw) {
                        Ok(profile) => stats.add(&profile, now),
                        Err(e) => tracing::warn!(key = %key, error = %e, "Skipping corrupted profile in stats"),
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(stats)
    }
}

#[async_trait]
impl ProfileStore for RedisProfileStore {
    async fn store(&self, user_id: &str, profile: &Profile) -> ProfileResult<()> {
        require_user_id(user_id)?;
        let key = profile_key(user_id);
        bounded("profile store", SET_TIMEOUT, self.write(&key, profile)).await
    }

    async fn get(&self, user_id: &str) -> ProfileResult<Option<Profile>> {
        require_user_id(user_id)?;
        let key = profile_key(user_id);
        bounded("profile get", GET_TIMEOUT, self.read(&key)).await
    }

    async fn update(&self, user_id: &str, updates: &ProfileUpdates) -> ProfileResult<()> {
        require_user_id(user_id)?;
        let key = profile_key(user_id);
        bounded("profile update", UPDATE_TIMEOUT, async {
            let existing = self.read(&key).await?;
            let mut profile = updates.apply(user_id, existing);
            profile.last_updated = OffsetDateTime::now_utc();
            self.write(&key, &profile).await
        })
        .await
    }

    async fn stats(&self) -> ProfileResult<ProfileStats> {
        bounded("profile stats", STATS_TIMEOUT, self.aggregate()).await
    }
}
