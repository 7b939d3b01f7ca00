pub mod cluster_status;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod probe;
pub mod status;
pub mod telemetry;

pub use errors::*;
