pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod kpi_engine;
pub mod loader;
pub mod model;
pub mod report;
pub mod stats;
pub mod store;
pub mod types;
pub mod validator;
