use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::config::TrackerConfig;
use crate::engagement::UserSessionManager;
use crate::error::TrackerError;
use crate::onboarding::OnboardingSessionManager;
use crate::sink::{SharedSink, TracingSink};
use crate::store::{MemoryStore, SharedStore};

/// Collaborators injected into both managers.
#[derive(Clone)]
pub struct Services {
    pub clock: SharedClock,
    pub store: SharedStore,
    pub sink: SharedSink,
}

impl Services {
    pub fn new(clock: SharedClock, store: SharedStore, sink: SharedSink) -> Self {
        Self { clock, store, sink }
    }

    /// System clock, in-memory store, tracing sink.
    pub fn in_memory() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(TracingSink),
        }
    }
}

/// Builds [`Services`] from configuration. Implemented outside the core so
/// concrete stores and sinks stay pluggable.
#[async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &TrackerConfig) -> Result<Services, TrackerError>;
}

/// Everything needed to build the trackers once at app start.
#[derive(Clone)]
pub struct TrackerContext {
    cfg: TrackerConfig,
    services: Services,
}

impl TrackerContext {
    pub fn new(cfg: TrackerConfig, services: Services) -> Self {
        Self { cfg, services }
    }

    pub async fn from_factory(
        cfg: TrackerConfig,
        factory: &dyn ServicesFactory,
    ) -> Result<Self, TrackerError> {
        let services = factory.build_services(&cfg).await?;
        Ok(Self { cfg, services })
    }

    pub fn cfg(&self) -> &TrackerConfig {
        &self.cfg
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn with_config(&self, cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            services: self.services.clone(),
        }
    }

    /// Builds both managers, each rehydrated from the store.
    pub async fn build_trackers(&self) -> Trackers {
        let engagement =
            UserSessionManager::new(self.cfg.engagement.clone(), &self.services).await;
        let onboarding =
            OnboardingSessionManager::new(self.cfg.onboarding.clone(), &self.services).await;
        Trackers {
            engagement,
            onboarding,
        }
    }
}

#[derive(Clone)]
pub struct Trackers {
    pub engagement: UserSessionManager,
    pub onboarding: OnboardingSessionManager,
}

impl Trackers {
    pub async fn shutdown(&self) {
        self.engagement.shutdown().await;
        self.onboarding.shutdown().await;
    }
}
