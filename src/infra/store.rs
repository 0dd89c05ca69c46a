//! Store construction from deployment settings.

use std::sync::Arc;

use tracing::info;

use crate::{
    cache::{CacheStore, MemoryStore, RedisStore},
    config::{StoreBackend, StoreSettings},
};

use super::error::InfraError;

/// Build the configured backend, connecting eagerly to shared stores.
pub async fn build_store(settings: &StoreSettings) -> Result<Arc<dyn CacheStore>, InfraError> {
    match &settings.backend {
        StoreBackend::Memory => {
            info!(
                target = "ssr_cache::infra::store",
                backend = "memory",
                capacity = settings.memory_capacity.get(),
                "response store ready"
            );
            Ok(Arc::new(MemoryStore::new(settings.memory_capacity)))
        }
        StoreBackend::Redis { url } => {
            let store = RedisStore::connect(url, settings.op_timeout)
                .await?
                .with_namespace(settings.namespace.clone());
            info!(
                target = "ssr_cache::infra::store",
                backend = "redis",
                namespace = %settings.namespace,
                "response store ready"
            );
            Ok(Arc::new(store))
        }
    }
}
