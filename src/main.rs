use anyhow::{Context, Result};
use clap::Parser;
use container_loadgen::cli::{Cli, Commands, PreviewArgs};
use container_loadgen::codec;
use container_loadgen::compress;
use container_loadgen::config::RunConfig;
use container_loadgen::frame::{self, FieldOutcome};
use container_loadgen::runner;
use container_loadgen::stats::RunStats;
use container_loadgen::telemetry::DeviceSimulator;
use std::sync::Arc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,container_loadgen=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = RunConfig::from_args(&args)?;
            let stats = Arc::new(RunStats::new());
            runner::run(config.clone(), stats.clone()).await?;

            let snapshot = stats.snapshot();
            snapshot.print_summary();
            if let Some(error) = stats.last_error() {
                tracing::warn!(error = %error, "last recorded error");
            }
            if let Some(path) = &config.summary_out {
                let json = serde_json::to_vec_pretty(&snapshot)?;
                std::fs::write(path, json)
                    .with_context(|| format!("failed to write summary to {}", path.display()))?;
                tracing::info!(path = %path.display(), "summary written");
            }
        }
        Commands::Preview(args) => preview(&args)?,
    }

    Ok(())
}

/// Encodes one sample record and prints what each field became, plus payload
/// sizes for the chosen codec and compression. Useful as a setup check before
/// pointing a real run at a live endpoint.
fn preview(args: &PreviewArgs) -> Result<()> {
    let mut sim = DeviceSimulator::new(1);
    let mut rng = rand::thread_rng();
    let record = sim.next_record(&mut rng);

    println!("device {}", sim.device_id());
    let report = frame::encode_record(&record, args.codec.id());
    for (name, outcome) in &report.outcomes {
        match outcome {
            FieldOutcome::Converted(value) => {
                println!("  {name:<12} {:<24} -> {value:?}", record.field(name).unwrap_or(""));
            }
            FieldOutcome::FallenBack { original, reason } => {
                println!("  {name:<12} {original:<24} -> fallback ({reason})");
            }
        }
    }

    let raw_json = serde_json::to_vec(&record)?;
    let frame_bytes = codec::serialize_frame(&report.frame, args.codec)?;
    println!(
        "frame: {} bytes as {} (raw JSON {} bytes, {} field fallbacks)",
        frame_bytes.len(),
        args.codec.label(),
        raw_json.len(),
        report.fallback_count
    );

    let batch: Vec<_> = (0..args.batch_size).map(|_| sim.next_record(&mut rng)).collect();
    let (envelope, sizes) = compress::build_envelope(&batch, args.compression, "loadgen-preview")?;
    let envelope_bytes = serde_json::to_vec(&envelope)?;
    println!(
        "batch of {}: {} bytes -> {} bytes {} ({:.2}:1), envelope {} bytes",
        args.batch_size,
        sizes.original,
        sizes.compressed,
        args.compression.label(),
        sizes.ratio,
        envelope_bytes.len()
    );

    Ok(())
}
