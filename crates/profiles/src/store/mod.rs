//! Profile persistence
//!
//! [`ProfileStore`] is the single capability every backend satisfies. The
//! circuit-breaker wrapper in [`crate::breaker`] composes over any of them.

mod memory;
mod redis_store;

pub use memory::InMemoryProfileStore;
pub use redis_store::{profile_key, RedisProfileStore, PROFILE_KEY_PREFIX};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ProfileError, ProfileResult};
use crate::profile::{Profile, ProfileStats, ProfileUpdates};

/// Profile records live this long after their last write unless configured otherwise
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persist a full record, replacing any previous one for `user_id`
    async fn store(&self, user_id: &str, profile: &Profile) -> ProfileResult<()>;

    /// Fetch a record. A missing key is `Ok(None)`; an undecodable one is
    /// [`ProfileError::CorruptedData`].
    async fn get(&self, user_id: &str) -> ProfileResult<Option<Profile>>;

    /// Read-modify-write of the given fields, creating the record if absent
    async fn update(&self, user_id: &str, updates: &ProfileUpdates) -> ProfileResult<()>;

    async fn stats(&self) -> ProfileResult<ProfileStats>;
}

pub(crate) fn require_user_id(user_id: &str) -> ProfileResult<()> {
    if user_id.is_empty() {
        return Err(ProfileError::Validation("user_id is required".to_string()));
    }
    Ok(())
}
