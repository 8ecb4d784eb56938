use crate::client::LoadClient;
use crate::codec;
use crate::compress;
use crate::config::RunConfig;
use crate::frame;
use crate::stats::RunStats;
use crate::telemetry::{DeviceSimulator, TelemetryRecord};
use anyhow::Result;
use clap::ValueEnum;
use futures::future;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Compact binary frames straight to the slave, one record per request.
    SlaveFrames,
    /// Compressed JSON batch envelopes to the slave, master-node style.
    SlaveBatch,
    /// oneM2M content instances straight to the Mobius platform.
    Mobius,
    /// Weighted mix of batches, frames and health checks.
    Mixed,
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Frame,
    Batch,
    Mobius,
    Health,
}

/// Weighted like the original task mix: batches dominate, frames next,
/// health checks occasional.
fn pick_task<R: Rng>(scenario: Scenario, mobius_available: bool, rng: &mut R) -> Task {
    match scenario {
        Scenario::SlaveFrames => Task::Frame,
        Scenario::SlaveBatch => Task::Batch,
        Scenario::Mobius => Task::Mobius,
        Scenario::Mixed => {
            let mobius_weight = if mobius_available { 2 } else { 0 };
            let total = 10 + 3 + 2 + mobius_weight;
            match rng.gen_range(0..total) {
                n if n < 10 => Task::Batch,
                n if n < 13 => Task::Frame,
                n if n < 15 => Task::Health,
                _ => Task::Mobius,
            }
        }
    }
}

pub async fn run(config: RunConfig, stats: Arc<RunStats>) -> Result<()> {
    let client = Arc::new(LoadClient::new(&config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let deadline = Instant::now() + config.duration;

    tracing::info!(
        users = config.users,
        duration_secs = config.duration.as_secs(),
        scenario = ?config.scenario,
        codec = config.codec.label(),
        compression = config.compression.label(),
        slave = %config.slave_ingest,
        "starting load run"
    );

    let mut workers = Vec::with_capacity(config.users);
    for seed in 0..config.users {
        workers.push(tokio::spawn(device_loop(
            seed as u32,
            config.clone(),
            client.clone(),
            stats.clone(),
            shutdown_rx.clone(),
            deadline,
        )));
    }

    let reporter = tokio::spawn(progress_reporter(
        stats.clone(),
        config.report_interval,
        shutdown_rx.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = tokio::time::sleep_until(deadline) => {}
    }
    let _ = shutdown_tx.send(true);

    for result in future::join_all(workers).await {
        if let Err(err) = result {
            tracing::warn!(error = %err, "device worker task failed");
        }
    }
    reporter.abort();
    Ok(())
}

async fn device_loop(
    seed: u32,
    config: RunConfig,
    client: Arc<LoadClient>,
    stats: Arc<RunStats>,
    mut shutdown: watch::Receiver<bool>,
    deadline: Instant,
) {
    let mut sim = DeviceSimulator::new(seed);
    tracing::debug!(device = sim.device_id(), "device worker started");

    loop {
        if *shutdown.borrow() || Instant::now() >= deadline {
            break;
        }

        let task = {
            let mut rng = rand::thread_rng();
            pick_task(config.scenario, config.mobius_ingest.is_some(), &mut rng)
        };
        match task {
            Task::Frame => frame_task(&mut sim, &config, &client, &stats).await,
            Task::Batch => batch_task(&mut sim, &config, &client, &stats).await,
            Task::Mobius => mobius_task(&mut sim, &client, &stats).await,
            Task::Health => health_task(&client, &stats).await,
        }

        let think = {
            let mut rng = rand::thread_rng();
            let min = config.think_min.as_millis() as u64;
            let max = config.think_max.as_millis() as u64;
            Duration::from_millis(rng.gen_range(min..=max))
        };
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(think) => {}
        }
    }
    tracing::debug!(device = sim.device_id(), records = sim.record_index(), "device worker stopped");
}

async fn frame_task(
    sim: &mut DeviceSimulator,
    config: &RunConfig,
    client: &LoadClient,
    stats: &RunStats,
) {
    let record = next_record(sim);
    let report = frame::encode_record(&record, config.codec.id());
    if report.fallback_count > 0 {
        tracing::debug!(
            device = sim.device_id(),
            fallbacks = report.fallback_count,
            "some fields kept their string form"
        );
    }
    stats.record_fallback_fields(report.fallback_count);

    let bytes = match codec::serialize_frame(&report.frame, config.codec) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "skipping record, frame serialization failed");
            stats.record_encode_failure(&err.to_string());
            return;
        }
    };
    // Frame vs raw JSON is the compression figure of interest here.
    if let Ok(raw) = serde_json::to_vec(&record) {
        stats.record_compression(raw.len(), bytes.len());
    }

    match client.post_frame(sim.device_id(), bytes, config.codec).await {
        Ok(result) => stats.record_post(result.outcome, result.latency, result.bytes_sent),
        Err(err) => {
            tracing::warn!(device = sim.device_id(), error = %err, "frame post failed");
            stats.record_transport_error(&err);
        }
    }
}

async fn batch_task(
    sim: &mut DeviceSimulator,
    config: &RunConfig,
    client: &LoadClient,
    stats: &RunStats,
) {
    let batch: Vec<TelemetryRecord> = {
        let mut rng = rand::thread_rng();
        let size = rng.gen_range(config.batch_min..=config.batch_max);
        (0..size).map(|_| sim.next_record(&mut rng)).collect()
    };

    let (envelope, sizes) = match compress::build_envelope(&batch, config.compression, &config.source_node)
    {
        Ok(built) => built,
        Err(err) => {
            tracing::warn!(error = %err, "skipping batch, envelope build failed");
            stats.record_encode_failure(&err.to_string());
            return;
        }
    };
    stats.record_compression(sizes.original, sizes.compressed);

    match client.post_envelope(&envelope, batch.len()).await {
        Ok(result) => {
            tracing::debug!(
                containers = batch.len(),
                original = sizes.original,
                compressed = sizes.compressed,
                ratio = format!("{:.1}", sizes.ratio),
                latency_ms = result.latency.as_millis() as u64,
                "batch delivered"
            );
            stats.record_post(result.outcome, result.latency, result.bytes_sent);
        }
        Err(err) => {
            tracing::warn!(device = sim.device_id(), error = %err, "batch post failed");
            stats.record_transport_error(&err);
        }
    }
}

async fn mobius_task(sim: &mut DeviceSimulator, client: &LoadClient, stats: &RunStats) {
    let record = next_record(sim);
    match client.post_mobius(sim.device_id(), &record).await {
        Ok(result) => stats.record_post(result.outcome, result.latency, result.bytes_sent),
        Err(err) => {
            tracing::warn!(device = sim.device_id(), error = %err, "mobius post failed");
            stats.record_transport_error(&err);
        }
    }
}

async fn health_task(client: &LoadClient, stats: &RunStats) {
    match client.health_check().await {
        Ok(healthy) => stats.record_health_check(healthy),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            stats.record_health_check(false);
        }
    }
}

fn next_record(sim: &mut DeviceSimulator) -> TelemetryRecord {
    let mut rng = rand::thread_rng();
    sim.next_record(&mut rng)
}

async fn progress_reporter(
    stats: Arc<RunStats>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let snapshot = stats.snapshot();
                tracing::info!(
                    requests = snapshot.requests,
                    rps = format!("{:.2}", snapshot.requests_per_sec),
                    ok = snapshot.successes,
                    conflict = snapshot.conflicts,
                    rejected = snapshot.transport_failures,
                    avg_latency_ms = format!("{:.1}", snapshot.avg_latency_ms),
                    compression = format!("{:.2}", snapshot.avg_compression_ratio),
                    "progress"
                );
            }
        }
    }
}
