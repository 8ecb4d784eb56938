pub mod cli;
pub mod client;
pub mod codec;
pub mod compress;
pub mod config;
pub mod frame;
pub mod runner;
pub mod stats;
pub mod telemetry;
