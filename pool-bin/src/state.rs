use pool_common::PoolConfig;
use pool_core::SpawnPool;
use std::sync::Arc;

/// Shared state handed to every public-router handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PoolConfig>,
    pub pool: Arc<SpawnPool>,
}

impl AppState {
    pub fn new(config: PoolConfig, pool: Arc<SpawnPool>) -> Self {
        Self {
            config: Arc::new(config),
            pool,
        }
    }
}
