pub mod directory;
pub mod engine;
pub mod error;
pub mod fs_ops;
pub mod history;
pub mod pair_data;
pub mod params;
pub mod restraint;
pub mod run_config;
pub mod run_data;
pub mod telemetry;

pub use error::*;
pub use telemetry::init_tracing;
