//! Inbound platform webhook events
//!
//! [`WebhookIngestor::handle`] never fails: every outcome, including
//! rejected events, is acknowledged and reported as an [`EventMetric`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::monitoring::{EventMetric, MonitoringAggregator};
use crate::platform::PlatformUser;
use crate::resolver::{validate_user_name, ProfileResolver, MAX_NAME_CHARS};
use crate::retry::{Deadline, RetryError, RetryPolicy};

/// Phrases that introduce a user-supplied name, matched case-insensitively
/// at the start of a message
pub const NAME_COMMANDS: [&str; 5] = ["/setname", "/имя", "меня зовут", "мое имя", "моё имя"];

/// Longest accepted platform user id, in characters
pub const MAX_USER_ID_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    #[serde(default)]
    pub chat_id: i64,
    #[serde(default, rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub from: PlatformUser,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chat: ChatRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(default)]
    pub user: PlatformUser,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub chat: ChatRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    MessageNew,
    CallbackQuery,
}

impl WebhookEventKind {
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "message_new" => Some(WebhookEventKind::MessageNew),
            "callback_query" => Some(WebhookEventKind::CallbackQuery),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::MessageNew => "message_new",
            WebhookEventKind::CallbackQuery => "callback_query",
        }
    }
}

impl fmt::Display for WebhookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event was acknowledged without being processed.
///
/// The messages double as the `errors_by_type` keys in webhook stats, so
/// they must stay fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookRejection {
    #[error("unknown event type")]
    UnknownEventType(String),

    #[error("no user info")]
    MissingIdentity,

    #[error("user_id too long")]
    UserIdTooLong(usize),

    #[error("first_name too long")]
    FirstNameTooLong(usize),

    #[error("last_name too long")]
    LastNameTooLong(usize),
}

/// Stable failure labels for processed events
const MERGE_FAILED: &str = "profile store failed";
const DEADLINE_EXCEEDED: &str = "deadline exceeded";
const NAME_UPDATE_FAILED: &str = "name update failed";

/// The user identity and optional free text carried by a supported event
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedEvent<'a> {
    pub kind: WebhookEventKind,
    pub user: &'a PlatformUser,
    pub text: Option<&'a str>,
}

impl ClassifiedEvent<'_> {
    /// Whether the event carried any platform name
    pub fn profile_found(&self) -> bool {
        !self.user.first_name.is_empty() || !self.user.last_name.is_empty()
    }
}

pub fn classify(event: &WebhookEvent) -> Result<ClassifiedEvent<'_>, WebhookRejection> {
    let kind = WebhookEventKind::parse(&event.event_type)
        .ok_or_else(|| WebhookRejection::UnknownEventType(event.event_type.clone()))?;

    let (user, text) = match kind {
        WebhookEventKind::MessageNew => {
            let message = event.message.as_ref().ok_or(WebhookRejection::MissingIdentity)?;
            let text = Some(message.text.as_str()).filter(|t| !t.is_empty());
            (&message.from, text)
        }
        WebhookEventKind::CallbackQuery => {
            let callback = event
                .callback_query
                .as_ref()
                .ok_or(WebhookRejection::MissingIdentity)?;
            (&callback.user, None)
        }
    };

    if user.user_id.is_empty() {
        return Err(WebhookRejection::MissingIdentity);
    }

    Ok(ClassifiedEvent { kind, user, text })
}

/// Length limits on the identity fields, counted in characters
pub fn validate_identity(user: &PlatformUser) -> Result<(), WebhookRejection> {
    let id_len = user.user_id.chars().count();
    if id_len > MAX_USER_ID_CHARS {
        return Err(WebhookRejection::UserIdTooLong(id_len));
    }
    let first_len = user.first_name.chars().count();
    if first_len > MAX_NAME_CHARS {
        return Err(WebhookRejection::FirstNameTooLong(first_len));
    }
    let last_len = user.last_name.chars().count();
    if last_len > MAX_NAME_CHARS {
        return Err(WebhookRejection::LastNameTooLong(last_len));
    }
    Ok(())
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text.chars();
    for expected in prefix.chars() {
        let actual = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(rest.as_str())
}

/// If `text` starts with a name command, the trimmed remainder (possibly empty)
pub fn parse_name_command(text: &str) -> Option<&str> {
    let text = text.trim();
    NAME_COMMANDS
        .iter()
        .find_map(|command| strip_prefix_ci(text, command))
        .map(str::trim)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Overall budget for one event, retries included
    pub deadline: Duration,
    pub retry: RetryPolicy,
    /// Independent budget for recording the event's metric
    pub metric_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            metric_timeout: Duration::from_secs(2),
        }
    }
}

/// Validates inbound events, merges identities, applies name commands, and
/// reports one metric per event.
#[derive(Clone)]
pub struct WebhookIngestor {
    resolver: ProfileResolver,
    monitoring: Option<MonitoringAggregator>,
    config: WebhookConfig,
    shutdown: CancellationToken,
}

impl WebhookIngestor {
    pub fn new(
        resolver: ProfileResolver,
        monitoring: Option<MonitoringAggregator>,
        config: WebhookConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            monitoring,
            config,
            shutdown,
        }
    }

    /// Process one event to completion and return the metric describing it
    pub async fn handle(&self, event: &WebhookEvent) -> EventMetric {
        let started = Instant::now();
        let received_at = OffsetDateTime::now_utc();
        let mut metric = EventMetric::new(event.event_type.clone(), String::new(), received_at);

        match classify(event) {
            Err(rejection) => {
                tracing::warn!(
                    event_type = %event.event_type,
                    reason = %rejection,
                    "Webhook event rejected"
                );
                metric.error_message = rejection.to_string();
            }
            Ok(classified) => {
                metric.user_id = classified.user.user_id.clone();
                metric.profile_found = classified.profile_found();
                self.process(&classified, &mut metric).await;
            }
        }

        metric.processing_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.report(&metric).await;
        metric
    }

    async fn process(&self, event: &ClassifiedEvent<'_>, metric: &mut EventMetric) {
        let user_id = event.user.user_id.as_str();

        if let Err(rejection) = validate_identity(event.user) {
            tracing::warn!(user_id = %user_id, reason = %rejection, "Invalid identity in webhook event");
            metric.error_message = rejection.to_string();
            return;
        }

        let deadline = Deadline::after(self.config.deadline, &self.shutdown);
        let mut failure: Option<&'static str> = None;

        let merged = self
            .config
            .retry
            .run(&deadline, || self.resolver.merge_platform_identity(event.user))
            .await;
        match merged {
            Ok(_) => metric.profile_stored = metric.profile_found,
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!(user_id = %user_id, attempts, error = %last, "Profile merge failed");
                failure = Some(MERGE_FAILED);
            }
            Err(RetryError::Cancelled { attempts }) => {
                tracing::error!(user_id = %user_id, attempts, "Profile merge abandoned at deadline");
                failure = Some(DEADLINE_EXCEEDED);
            }
        }

        // after the merge, so the user's own name takes display priority
        if event.kind == WebhookEventKind::MessageNew {
            if let Some(text) = event.text {
                let name_failure = self.apply_name_command(user_id, text, &deadline).await;
                failure = failure.or(name_failure);
            }
        }

        match failure {
            Some(reason) => metric.error_message = reason.to_string(),
            None => metric.success = true,
        }
    }

    /// Returns a failure label only when a valid name could not be written
    async fn apply_name_command(&self, user_id: &str, text: &str, deadline: &Deadline) -> Option<&'static str> {
        let name = parse_name_command(text)?;
        if name.is_empty() {
            tracing::debug!(user_id = %user_id, "Name command without a name");
            return None;
        }
        if let Err(e) = validate_user_name(name) {
            tracing::info!(user_id = %user_id, error = %e, "Ignoring invalid user-provided name");
            return None;
        }

        match deadline.within(self.resolver.apply_user_name(user_id, name)).await {
            Some(Ok(())) => None,
            Some(Err(e)) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to record user-provided name");
                Some(NAME_UPDATE_FAILED)
            }
            None => {
                tracing::error!(user_id = %user_id, "Name update abandoned at deadline");
                Some(DEADLINE_EXCEEDED)
            }
        }
    }

    async fn report(&self, metric: &EventMetric) {
        let Some(monitoring) = &self.monitoring else {
            return;
        };
        match tokio::time::timeout(self.config.metric_timeout, monitoring.record_event(metric)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to record webhook metric"),
            Err(_) => tracing::warn!("Recording webhook metric timed out"),
        }
    }
}
