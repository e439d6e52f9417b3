//! Profile management operations behind the HTTP API

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{ProfileError, ProfileResult};
use crate::platform::Messenger;
use crate::profile::{Profile, ProfileSource, ProfileStats, ProfileUpdates};
use crate::resolver::{validate_user_name, MAX_NAME_CHARS};
use crate::store::{require_user_id, ProfileStore};

/// Result of asking a user for their name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NameRequestOutcome {
    Sent { message_id: String },
    AlreadyComplete,
}

#[derive(Clone)]
pub struct ProfileManager {
    store: Arc<dyn ProfileStore>,
    messenger: Arc<dyn Messenger>,
}

fn validate_platform_name(field: &str, value: &str) -> ProfileResult<()> {
    let len = value.trim().chars().count();
    if len > MAX_NAME_CHARS {
        return Err(ProfileError::Validation(format!(
            "{} too long: {} characters (max {})",
            field, len, MAX_NAME_CHARS
        )));
    }
    Ok(())
}

/// Validate and trim an update. A bare user-name update with no source is
/// recorded as `user_input`.
fn normalize_updates(updates: &ProfileUpdates) -> ProfileResult<ProfileUpdates> {
    let mut normalized = updates.clone();
    if let Some(first) = &mut normalized.platform_first_name {
        validate_platform_name("platform_first_name", first)?;
        *first = first.trim().to_string();
    }
    if let Some(last) = &mut normalized.platform_last_name {
        validate_platform_name("platform_last_name", last)?;
        *last = last.trim().to_string();
    }
    if let Some(name) = &mut normalized.user_provided_name {
        *name = validate_user_name(name)?.to_string();
    }

    let only_user_name = normalized.user_provided_name.is_some()
        && normalized.platform_first_name.is_none()
        && normalized.platform_last_name.is_none();
    if only_user_name && normalized.source.is_none() {
        normalized.source = Some(ProfileSource::UserInput);
    }
    Ok(normalized)
}

/// Prompt text for a profile that lacks a full name
pub fn name_request_message(profile: Option<&Profile>) -> String {
    match profile {
        Some(p) if !p.platform_first_name.is_empty() && p.platform_last_name.is_empty() => format!(
            "Привет, {first}! Для полного профиля, пожалуйста, укажите вашу фамилию.\n\
             Напишите: \"Меня зовут {first} [Ваша фамилия]\"",
            first = p.platform_first_name
        ),
        Some(p) if !p.platform_first_name.is_empty() || !p.platform_last_name.is_empty() => {
            "Ваш профиль уже заполнен. Если хотите изменить имя, напишите: \"Меня зовут [Новое имя]\""
                .to_string()
        }
        _ => "Привет! Для лучшего взаимодействия, пожалуйста, укажите ваше имя и фамилию.\n\
              Напишите: \"Меня зовут [Ваше имя и фамилия]\""
            .to_string(),
    }
}

impl ProfileManager {
    pub fn new(store: Arc<dyn ProfileStore>, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, messenger }
    }

    /// Stored profile, or an empty `default`-sourced one when none exists
    pub async fn get_profile(&self, user_id: &str) -> ProfileResult<Profile> {
        require_user_id(user_id)?;
        let profile = self.store.get(user_id).await?;
        Ok(profile.unwrap_or_else(|| Profile::new(user_id, ProfileSource::Default)))
    }

    pub async fn update_profile(&self, user_id: &str, updates: &ProfileUpdates) -> ProfileResult<Profile> {
        require_user_id(user_id)?;
        let updates = normalize_updates(updates)?;

        self.store.update(user_id, &updates).await?;
        tracing::info!(user_id = %user_id, "Profile updated");

        // a degraded read still reflects what was just written
        let reread = self.store.get(user_id).await?;
        Ok(reread.unwrap_or_else(|| {
            let mut profile = updates.apply(user_id, None);
            profile.last_updated = OffsetDateTime::now_utc();
            profile
        }))
    }

    pub async fn set_user_provided_name(&self, user_id: &str, name: &str) -> ProfileResult<Profile> {
        require_user_id(user_id)?;
        let name = validate_user_name(name)?;
        self.update_profile(user_id, &ProfileUpdates::user_name(name))
            .await
    }

    pub async fn stats(&self) -> ProfileResult<ProfileStats> {
        self.store.stats().await
    }

    /// Ask the user, via a chat message, to supply the missing parts of
    /// their name. Does nothing when the profile already has a full name.
    pub async fn request_name(&self, user_id: &str, chat_id: i64) -> ProfileResult<NameRequestOutcome> {
        require_user_id(user_id)?;
        if chat_id == 0 {
            return Err(ProfileError::Validation("chat_id is required".to_string()));
        }

        let profile = match self.store.get(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Could not read profile before name request");
                None
            }
        };

        if profile.as_ref().is_some_and(Profile::has_full_name) {
            tracing::debug!(user_id = %user_id, "Profile already complete, no name request sent");
            return Ok(NameRequestOutcome::AlreadyComplete);
        }

        let text = name_request_message(profile.as_ref());
        let message_id = self
            .messenger
            .send_message(chat_id, &text)
            .await
            .map_err(|e| ProfileError::Messenger(e.to_string()))?;

        tracing::info!(user_id = %user_id, chat_id, "Name request sent");
        Ok(NameRequestOutcome::Sent { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LogMessenger, MockMessenger};
    use crate::store::InMemoryProfileStore;

    fn manager(store: Arc<InMemoryProfileStore>) -> ProfileManager {
        ProfileManager::new(store, Arc::new(LogMessenger::new()))
    }

    #[tokio::test]
    async fn test_update_trims_user_name_and_marks_user_input() {
        let store = Arc::new(InMemoryProfileStore::new());
        let manager = manager(store.clone());
        let updates = ProfileUpdates {
            user_provided_name: Some("  Мария  ".to_string()),
            ..Default::default()
        };

        let updated = manager.update_profile("u-put", &updates).await.unwrap();
        let via_set = manager.set_user_provided_name("u-set", "  Мария  ").await.unwrap();

        assert_eq!(updated.user_provided_name, "Мария");
        assert_eq!(updated.user_provided_name, via_set.user_provided_name);
        assert_eq!(updated.source, ProfileSource::UserInput);

        let stored = store.get("u-put").await.unwrap().unwrap();
        assert_eq!(stored.user_provided_name, "Мария");
    }

    #[tokio::test]
    async fn test_update_keeps_explicit_source_and_trims_platform_names() {
        let manager = manager(Arc::new(InMemoryProfileStore::new()));
        let updates = ProfileUpdates {
            platform_first_name: Some(" Иван ".to_string()),
            user_provided_name: Some("Иван Петров".to_string()),
            source: Some(ProfileSource::Webhook),
            ..Default::default()
        };

        let profile = manager.update_profile("u1", &updates).await.unwrap();
        assert_eq!(profile.platform_first_name, "Иван");
        assert_eq!(profile.source, ProfileSource::Webhook);
    }

    #[tokio::test]
    async fn test_missing_profile_is_default() {
        let mgr = manager(Arc::new(InMemoryProfileStore::new()));
        let profile = mgr.get_profile("ghost").await.unwrap();
        assert_eq!(profile.user_id, "ghost");
        assert_eq!(profile.source, ProfileSource::Default);
        assert_eq!(profile.display_name(), "");
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let mgr = manager(Arc::new(InMemoryProfileStore::new()));
        assert!(mgr.get_profile("").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_update_validates_fields() {
        let mgr = manager(Arc::new(InMemoryProfileStore::new()));
        let too_long = ProfileUpdates {
            platform_first_name: Some("x".repeat(101)),
            ..Default::default()
        };
        assert!(mgr.update_profile("u1", &too_long).await.is_err());

        let bad_name = ProfileUpdates {
            user_provided_name: Some("<script>".into()),
            ..Default::default()
        };
        assert!(mgr.update_profile("u1", &bad_name).await.is_err());
    }

    #[tokio::test]
    async fn test_update_returns_reread_profile() {
        let mgr = manager(Arc::new(InMemoryProfileStore::new()));
        let updates = ProfileUpdates {
            platform_first_name: Some("Иван".into()),
            platform_last_name: Some("Петров".into()),
            source: Some(ProfileSource::Webhook),
            ..Default::default()
        };

        let profile = mgr.update_profile("u1", &updates).await.unwrap();
        assert!(profile.has_full_name());
        assert_eq!(profile.source, ProfileSource::Webhook);
    }

    #[tokio::test]
    async fn test_set_user_provided_name() {
        let mgr = manager(Arc::new(InMemoryProfileStore::new()));
        let profile = mgr
            .set_user_provided_name("u1", "  Мария Ивановна ")
            .await
            .unwrap();
        assert_eq!(profile.user_provided_name, "Мария Ивановна");
        assert_eq!(profile.source, ProfileSource::UserInput);

        assert!(mgr.set_user_provided_name("u1", "").await.is_err());
    }

    #[test]
    fn test_name_request_messages() {
        let none = name_request_message(None);
        assert!(none.contains("укажите ваше имя и фамилию"));

        let mut partial = Profile::new("u1", ProfileSource::Webhook);
        partial.platform_first_name = "Иван".into();
        let msg = name_request_message(Some(&partial));
        assert!(msg.starts_with("Привет, Иван!"));
        assert!(msg.contains("Меня зовут Иван [Ваша фамилия]"));
    }

    #[tokio::test]
    async fn test_request_name_skips_complete_profiles() {
        let store = Arc::new(InMemoryProfileStore::new());
        store
            .update("u1", &ProfileUpdates::user_name("Иван Петров"))
            .await
            .unwrap();
        let mut messenger = MockMessenger::new();
        messenger.expect_send_message().times(0);
        let mgr = ProfileManager::new(store, Arc::new(messenger));

        assert_eq!(
            mgr.request_name("u1", 100).await.unwrap(),
            NameRequestOutcome::AlreadyComplete
        );
    }

    #[tokio::test]
    async fn test_request_name_sends_prompt() {
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_message()
            .withf(|chat_id, text| *chat_id == 100 && text.contains("имя и фамилию"))
            .times(1)
            .returning(|_, _| Ok("m-1".to_string()));
        let mgr = ProfileManager::new(Arc::new(InMemoryProfileStore::new()), Arc::new(messenger));

        assert_eq!(
            mgr.request_name("u1", 100).await.unwrap(),
            NameRequestOutcome::Sent {
                message_id: "m-1".into()
            }
        );
        assert!(mgr.request_name("u1", 0).await.is_err());
    }
}
