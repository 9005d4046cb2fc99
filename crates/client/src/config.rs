use std::time::Duration;

use netrush::{DEFAULT_GRID_SIDE, INIT_RETRY, KEEPALIVE_INTERVAL, MAX_RETRIES, RDT_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub grid_side: u16,
    pub rdt_timeout: Duration,
    pub max_retries: u32,
    pub init_retry: Duration,
    pub keepalive: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            grid_side: DEFAULT_GRID_SIDE,
            rdt_timeout: RDT_TIMEOUT,
            max_retries: MAX_RETRIES,
            init_retry: INIT_RETRY,
            keepalive: KEEPALIVE_INTERVAL,
        }
    }
}
