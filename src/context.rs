use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::Readiness;

/// Seconds between process start and the synthetic genesis time.
const GENESIS_DELAY_SECS: i64 = 10;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub readiness: Readiness,
    /// Unix timestamp reported by `eth_getBlockByHash`.
    pub genesis_time: u64,
}

impl AppContext {
    pub fn new(config: AppConfig, readiness: Readiness) -> Self {
        let genesis = chrono::Utc::now() + chrono::Duration::seconds(GENESIS_DELAY_SECS);
        Self {
            config: Arc::new(config),
            readiness,
            genesis_time: genesis.timestamp().max(0) as u64,
        }
    }

    pub fn with_genesis_time(mut self, genesis_time: u64) -> Self {
        self.genesis_time = genesis_time;
        self
    }
}
