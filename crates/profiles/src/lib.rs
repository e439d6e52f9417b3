// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! MaxBot Profile Resolution
//!
//! Keeps a cached name profile for every messenger user and keeps it usable
//! while the cache backend is degraded.
//!
//! ## Features
//!
//! - **Profile Store**: Redis and in-memory backends behind one trait, with TTL
//! - **Fault Isolation**: Circuit breaker that turns backend outages into cache misses
//! - **Webhook Ingestion**: Bounded, retried identity merges and `/setname`-style commands
//! - **Phone Lookup**: Phone validation, single and concurrent batch phone-to-user resolution
//! - **Monitoring**: Windowed webhook stats, coverage, quality reports and alerts
//! - **Management**: Read, edit and prompt-for-name operations for the HTTP API

pub mod batch;
pub mod breaker;
pub mod error;
pub mod management;
pub mod monitoring;
pub mod phone;
pub mod platform;
pub mod profile;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod webhook;


// Batch
pub use batch::{BatchLookup, PhoneMapping, PhoneProfile, MAX_BATCH_SIZE};

// Breaker
pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, FaultIsolatedStore,
};

// Error
pub use error::{ProfileError, ProfileResult};

// Management
pub use management::{name_request_message, NameRequestOutcome, ProfileManager};

// Monitoring
pub use monitoring::{
    Alert, AlertKind, AlertThresholds, EventMetric, EventMetricStore, InMemoryEventStore,
    MonitoringAggregator, PeriodPreset, ProfileCoverage, ProfileQualityReport, RedisEventStore,
    TimePeriod, WebhookStats,
};

// Phone
pub use phone::{mask_phone, normalize_phone, validate_phone, NormalizedPhone, PhoneValidation};

// Platform
pub use platform::{EchoDirectory, LogMessenger, Messenger, PlatformDirectory, PlatformUser};

// Profile
pub use profile::{Profile, ProfileSource, ProfileStats, ProfileUpdates, STALE_AFTER};

// Resolver
pub use resolver::{merge_platform_names, validate_user_name, ProfileResolver, MAX_NAME_CHARS};

// Retry
pub use retry::{Deadline, RetryError, RetryPolicy};

// Store
pub use store::{
    InMemoryProfileStore, ProfileStore, RedisProfileStore, DEFAULT_PROFILE_TTL,
};

// Webhook
pub use webhook::{
    parse_name_command, WebhookConfig, WebhookEvent, WebhookEventKind, WebhookIngestor,
    WebhookRejection,
};
