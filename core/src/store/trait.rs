use async_trait::async_trait;
use std::sync::Arc;

/// Durable string key/value storage.
///
/// Each call is atomic on its own; nothing is transactional across keys.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub type SharedStore = Arc<dyn PersistentStore>;
