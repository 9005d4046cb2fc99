use std::time::Duration;

use netrush::{
    CLIENT_TIMEOUT, DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_FULL_EVERY, DEFAULT_GRID_SIDE,
    DEFAULT_MAX_CLIENTS, DEFAULT_REDUNDANCY, DEFAULT_UPDATE_RATE,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grid_side: u16,
    pub update_rate: u32,
    pub full_every: u32,
    pub redundancy: usize,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub compression_threshold: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grid_side: DEFAULT_GRID_SIDE,
            update_rate: DEFAULT_UPDATE_RATE,
            full_every: DEFAULT_FULL_EVERY,
            redundancy: DEFAULT_REDUNDANCY,
            max_clients: DEFAULT_MAX_CLIENTS,
            client_timeout: CLIENT_TIMEOUT,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }
}
