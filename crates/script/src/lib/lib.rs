pub mod consts;
pub mod env;
pub mod eth_client;
pub mod prometheus_metrics;
pub mod recovery;
pub mod registry;
pub mod scripts;
pub mod settlement;
pub mod tracing;
pub mod utils;
pub mod workflow;
