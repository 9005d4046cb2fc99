pub mod arbiter;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod payload;
pub mod protocol;
pub mod reliability;
pub mod replica;
pub mod snapshot;
pub mod stats;
