//! Merging platform and user-supplied names into one profile record

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::{ProfileError, ProfileResult};
use crate::platform::PlatformUser;
use crate::profile::{Profile, ProfileSource, ProfileUpdates};
use crate::store::ProfileStore;

/// Maximum length, in characters, of any single name field
pub const MAX_NAME_CHARS: usize = 100;

fn is_name_char(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё' | ' ' | '-')
}

/// Validate a human name typed by the user, returning it trimmed.
///
/// Accepts Latin and Cyrillic letters, spaces and hyphens, 1 to 100 characters.
pub fn validate_user_name(name: &str) -> ProfileResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProfileError::Validation("name cannot be empty".to_string()));
    }
    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(ProfileError::Validation(format!(
            "name too long: {} characters (max {})",
            len, MAX_NAME_CHARS
        )));
    }
    if !name.chars().all(is_name_char) {
        return Err(ProfileError::Validation(
            "name contains invalid characters".to_string(),
        ));
    }
    Ok(name)
}

/// Fold a platform identity into the previous record.
///
/// Platform fields are overwritten only by non-empty values, the
/// user-provided name is carried over untouched, and the result is tagged
/// as webhook-sourced.
pub fn merge_platform_names(
    existing: Option<&Profile>,
    identity: &PlatformUser,
    now: OffsetDateTime,
) -> Profile {
    let pick = |incoming: &str, previous: Option<&str>| -> String {
        if incoming.is_empty() {
            previous.unwrap_or_default().to_string()
        } else {
            incoming.to_string()
        }
    };

    Profile {
        user_id: identity.user_id.clone(),
        platform_first_name: pick(
            &identity.first_name,
            existing.map(|p| p.platform_first_name.as_str()),
        ),
        platform_last_name: pick(
            &identity.last_name,
            existing.map(|p| p.platform_last_name.as_str()),
        ),
        user_provided_name: existing
            .map(|p| p.user_provided_name.clone())
            .unwrap_or_default(),
        source: ProfileSource::Webhook,
        last_updated: now,
    }
}

/// Reads and writes merged profiles through whatever store it is given
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Merge a platform identity into the stored profile and write it back.
    ///
    /// A failed read of the previous record is logged and the merge proceeds
    /// as if no record existed. The write error, if any, is returned.
    pub async fn merge_platform_identity(&self, identity: &PlatformUser) -> ProfileResult<Profile> {
        let existing = match self.store.get(&identity.user_id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(
                    user_id = %identity.user_id,
                    error = %e,
                    "Could not read existing profile, merging onto empty record"
                );
                None
            }
        };

        let merged = merge_platform_names(existing.as_ref(), identity, OffsetDateTime::now_utc());
        self.store.store(&identity.user_id, &merged).await?;

        tracing::debug!(
            user_id = %identity.user_id,
            has_first_name = !merged.platform_first_name.is_empty(),
            has_last_name = !merged.platform_last_name.is_empty(),
            "Profile merged from platform identity"
        );
        Ok(merged)
    }

    /// Record a user-supplied name, tagging the profile as user input
    pub async fn apply_user_name(&self, user_id: &str, name: &str) -> ProfileResult<()> {
        let name = validate_user_name(name)?;
        self.store
            .update(user_id, &ProfileUpdates::user_name(name))
            .await?;
        tracing::info!(user_id = %user_id, "User-provided name recorded");
        Ok(())
    }

    pub async fn lookup(&self, user_id: &str) -> ProfileResult<Option<Profile>> {
        self.store.get(user_id).await
    }
}
