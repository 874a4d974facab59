//! Builds tracker services (clock, store, sink) from configuration for the CLI
//! and embedding hosts.
use async_trait::async_trait;
use std::sync::Arc;

use tether_core::api::{
    Services, ServicesFactory, SharedClock, SystemClock, TrackerConfig, TrackerError,
};

use crate::factory;

pub struct PluginServicesFactory {
    clock: SharedClock,
}

impl PluginServicesFactory {
    pub fn with_clock(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Default for PluginServicesFactory {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }
}

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &TrackerConfig) -> Result<Services, TrackerError> {
        let store = factory::build_store(cfg)
            .await
            .map_err(TrackerError::Plugin)?;
        let (sink, _events_out) = factory::build_sink(cfg)
            .await
            .map_err(TrackerError::Plugin)?;
        Ok(Services::new(self.clock.clone(), store, sink))
    }
}
