use crate::codec::Codec;
use crate::compress::Compression;
use crate::runner::Scenario;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "container-loadgen", version, about = "Maritime container telemetry load generator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test against the slave / Mobius endpoints.
    Run(RunArgs),
    /// Encode one sample record and print field outcomes and payload sizes.
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Slave base URL, e.g. http://172.25.1.78:3001
    #[arg(long)]
    pub slave: Option<String>,
    /// Mobius base URL, e.g. http://172.25.1.78:7579
    #[arg(long)]
    pub mobius: Option<String>,
    /// Mobius container path (the oneM2M content-instance target).
    #[arg(long)]
    pub mobius_path: Option<String>,
    /// Number of simulated devices.
    #[arg(long)]
    pub users: Option<usize>,
    /// Run duration, e.g. 30s, 5m, 1h.
    #[arg(long)]
    pub duration: Option<String>,
    #[arg(long, value_enum)]
    pub scenario: Option<Scenario>,
    #[arg(long, value_enum)]
    pub codec: Option<Codec>,
    #[arg(long, value_enum)]
    pub compression: Option<Compression>,
    /// Containers per batch, lower bound.
    #[arg(long)]
    pub batch_min: Option<usize>,
    /// Containers per batch, upper bound.
    #[arg(long)]
    pub batch_max: Option<usize>,
    /// Think time between requests, lower bound in milliseconds.
    #[arg(long)]
    pub think_min_ms: Option<u64>,
    /// Think time between requests, upper bound in milliseconds.
    #[arg(long)]
    pub think_max_ms: Option<u64>,
    /// Write a JSON summary of the run to this path.
    #[arg(long)]
    pub summary_out: Option<PathBuf>,
    /// Source-node tag stamped into batch envelope metadata.
    #[arg(long)]
    pub source_node: Option<String>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(long, value_enum, default_value_t = Codec::Cbor)]
    pub codec: Codec,
    #[arg(long, value_enum, default_value_t = Compression::Brotli)]
    pub compression: Compression,
    /// Containers in the previewed batch envelope.
    #[arg(long, default_value_t = 5)]
    pub batch_size: usize,
}
