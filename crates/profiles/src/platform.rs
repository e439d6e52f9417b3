//! Capabilities consumed from the messenger platform
//!
//! The network client that talks to the platform lives outside this crate.
//! Everything here depends only on these traits; the built-in
//! implementations serve mock mode and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};
use crate::phone::{mask_phone, normalize_phone};

/// Identity attributes the platform exposes for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Phone → platform identity resolution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformDirectory: Send + Sync {
    /// Resolve one normalized phone to a platform user id
    async fn resolve_phone(&self, phone: &str) -> ProfileResult<String>;

    /// Full platform profile for a normalized phone, if the user exists
    async fn profile_by_phone(&self, phone: &str) -> ProfileResult<Option<PlatformUser>>;
}

/// Outbound messages to platform chats
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to a chat, returning the platform message id
    async fn send_message(&self, chat_id: i64, text: &str) -> ProfileResult<String>;
}

/// Mock-mode directory.
///
/// Phones listed in the table resolve to their mapped id; any other valid
/// phone resolves to its own normalized form, unless the directory is strict.
#[derive(Debug, Clone, Default)]
pub struct EchoDirectory {
    known: HashMap<String, PlatformUser>,
    strict: bool,
}

impl EchoDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only phones registered with [`EchoDirectory::with_user`] resolve
    pub fn strict() -> Self {
        Self {
            known: HashMap::new(),
            strict: true,
        }
    }

    pub fn with_user(mut self, phone: &str, user: PlatformUser) -> Self {
        let key = normalize_phone(phone)
            .map(|p| p.into_inner())
            .unwrap_or_else(|_| phone.to_string());
        self.known.insert(key, user);
        self
    }
}

#[async_trait]
impl PlatformDirectory for EchoDirectory {
    async fn resolve_phone(&self, phone: &str) -> ProfileResult<String> {
        let normalized = normalize_phone(phone)?;
        if let Some(user) = self.known.get(normalized.as_str()) {
            return Ok(user.user_id.clone());
        }
        if self.strict {
            tracing::debug!(phone = %mask_phone(phone), "Phone not registered in directory");
            return Err(ProfileError::PhoneNotFound);
        }
        Ok(normalized.into_inner())
    }

    async fn profile_by_phone(&self, phone: &str) -> ProfileResult<Option<PlatformUser>> {
        let normalized = normalize_phone(phone)?;
        Ok(self.known.get(normalized.as_str()).cloned())
    }
}

/// Mock-mode messenger that only logs what it would send
#[derive(Debug, Default)]
pub struct LogMessenger {
    sent: AtomicU64,
}

impl LogMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_message(&self, chat_id: i64, text: &str) -> ProfileResult<String> {
        if text.is_empty() {
            return Err(ProfileError::Validation("message text is required".into()));
        }
        if chat_id == 0 {
            return Err(ProfileError::Validation("chat_id is required".into()));
        }
        let seq = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(chat_id, text_len = text.len(), "Mock message sent");
        Ok(format!("mock_msg_{}", seq))
    }
}
