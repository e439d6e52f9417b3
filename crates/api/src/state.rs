//! Application state

use std::sync::Arc;

use maxbot_profiles::{
    BatchLookup, CircuitBreaker, EchoDirectory, EventMetricStore, FaultIsolatedStore,
    InMemoryEventStore, InMemoryProfileStore, LogMessenger, MonitoringAggregator,
    PlatformDirectory, ProfileManager, ProfileResolver, ProfileStore, RedisEventStore,
    RedisProfileStore, WebhookConfig, WebhookIngestor,
};
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

use crate::config::{CacheBackend, Config};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Circuit-breaker-wrapped profile store
    pub profiles: Arc<dyn ProfileStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub ingestor: WebhookIngestor,
    pub manager: ProfileManager,
    pub batch: BatchLookup,
    /// `None` when MONITORING_ENABLED=false
    pub monitoring: Option<MonitoringAggregator>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state for the configured cache backend, connecting to Redis if needed
    pub async fn connect(config: Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        match config.cache_backend {
            CacheBackend::Memory => {
                tracing::info!("Using in-memory profile cache");
                Ok(Self::in_memory(config, shutdown))
            }
            CacheBackend::Redis => {
                tracing::info!("Connecting to Redis...");
                let client = redis::Client::open(config.redis_url.as_str())?;
                let conn = ConnectionManager::new(client).await?;
                tracing::info!("Redis connection established");

                let breaker = Arc::new(CircuitBreaker::new(config.breaker));
                let profiles: Arc<dyn ProfileStore> = Arc::new(FaultIsolatedStore::new(
                    RedisProfileStore::new(conn.clone(), config.profile_ttl),
                    breaker.clone(),
                ));
                let events: Arc<dyn EventMetricStore> = Arc::new(RedisEventStore::new(conn));
                Ok(Self::assemble(config, breaker, profiles, events, shutdown))
            }
        }
    }

    /// Process-local state; used for CACHE_BACKEND=memory and in tests
    pub fn in_memory(config: Config, shutdown: CancellationToken) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));
        let profiles: Arc<dyn ProfileStore> = Arc::new(FaultIsolatedStore::new(
            InMemoryProfileStore::with_ttl(config.profile_ttl),
            breaker.clone(),
        ));
        let events: Arc<dyn EventMetricStore> = Arc::new(InMemoryEventStore::new());
        Self::assemble(config, breaker, profiles, events, shutdown)
    }

    fn assemble(
        config: Config,
        breaker: Arc<CircuitBreaker>,
        profiles: Arc<dyn ProfileStore>,
        events: Arc<dyn EventMetricStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let directory: Arc<dyn PlatformDirectory> = if config.mock_mode {
            tracing::info!("Mock mode: phones resolve to their normalized form");
            Arc::new(EchoDirectory::new())
        } else {
            tracing::warn!("No platform directory client available, phone lookups will not resolve");
            Arc::new(EchoDirectory::strict())
        };

        let monitoring = if config.monitoring_enabled {
            Some(MonitoringAggregator::new(events, profiles.clone()))
        } else {
            tracing::info!("Monitoring disabled via config (MONITORING_ENABLED=false)");
            None
        };

        if !config.webhook_secret.is_empty() {
            tracing::warn!("WEBHOOK_SECRET is set but inbound webhooks are not signature-checked");
        }

        let webhook_config = WebhookConfig {
            deadline: config.webhook_deadline,
            ..WebhookConfig::default()
        };
        let ingestor = WebhookIngestor::new(
            ProfileResolver::new(profiles.clone()),
            monitoring.clone(),
            webhook_config,
            shutdown.clone(),
        );

        Self {
            manager: ProfileManager::new(profiles.clone(), Arc::new(LogMessenger::new())),
            batch: BatchLookup::new(directory),
            ingestor,
            monitoring,
            profiles,
            breaker,
            config,
            shutdown,
        }
    }
}
