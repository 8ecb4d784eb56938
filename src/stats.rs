use crate::client::RequestOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Latency bucket upper bounds in milliseconds; the last bucket is open.
const BUCKET_BOUNDS_MS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

/// Shared per-run counters. Workers update with relaxed atomics; nothing here
/// blocks the request path.
#[derive(Debug)]
pub struct RunStats {
    run_id: Uuid,
    started: Instant,
    requests: AtomicU64,
    successes: AtomicU64,
    conflicts: AtomicU64,
    transport_failures: AtomicU64,
    encode_failures: AtomicU64,
    fallback_fields: AtomicU64,
    health_checks: AtomicU64,
    health_failures: AtomicU64,
    bytes_raw: AtomicU64,
    bytes_sent: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_max_micros: AtomicU64,
    latency_buckets: [AtomicU64; BUCKET_BOUNDS_MS.len() + 1],
    compression_ratio_centis: AtomicU64,
    compression_samples: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            fallback_fields: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
            bytes_raw: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_max_micros: AtomicU64::new(0),
            latency_buckets: Default::default(),
            compression_ratio_centis: AtomicU64::new(0),
            compression_samples: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_post(&self, outcome: RequestOutcome, latency: Duration, bytes_sent: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RequestOutcome::Success => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Conflict => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Rejected(status) => {
                self.transport_failures.fetch_add(1, Ordering::Relaxed);
                self.set_last_error(format!("remote rejected request with HTTP {status}"));
            }
        }
        self.bytes_sent.fetch_add(bytes_sent as u64, Ordering::Relaxed);

        let micros = latency.as_micros().min(u128::from(u64::MAX)) as u64;
        self.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_max_micros.fetch_max(micros, Ordering::Relaxed);
        let ms = micros / 1_000;
        let bucket = BUCKET_BOUNDS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self, error: &anyhow::Error) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(format!("{error:#}"));
    }

    /// The transform could not produce a frame; nothing reached the wire.
    pub fn record_encode_failure(&self, error: &str) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(format!("encode failure: {error}"));
    }

    pub fn record_fallback_fields(&self, count: usize) {
        if count > 0 {
            self.fallback_fields.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_compression(&self, original: usize, compressed: usize) {
        self.bytes_raw.fetch_add(original as u64, Ordering::Relaxed);
        if compressed > 0 {
            let ratio_centis = (original as f64 / compressed as f64 * 100.0).round() as u64;
            self.compression_ratio_centis.fetch_add(ratio_centis, Ordering::Relaxed);
            self.compression_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_health_check(&self, healthy: bool) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        if !healthy {
            self.health_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn set_last_error(&self, message: String) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message);
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.started.elapsed();
        let requests = self.requests.load(Ordering::Relaxed);
        let latency_count: u64 = self.latency_buckets.iter().map(|b| b.load(Ordering::Relaxed)).sum();
        let latency_sum = self.latency_sum_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if latency_count > 0 {
            latency_sum as f64 / latency_count as f64 / 1_000.0
        } else {
            0.0
        };
        let compression_samples = self.compression_samples.load(Ordering::Relaxed);
        let avg_compression_ratio = if compression_samples > 0 {
            self.compression_ratio_centis.load(Ordering::Relaxed) as f64
                / compression_samples as f64
                / 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            run_id: self.run_id,
            elapsed_secs: elapsed.as_secs_f64(),
            requests,
            requests_per_sec: if elapsed.as_secs_f64() > 0.0 {
                requests as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
            successes: self.successes.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            fallback_fields: self.fallback_fields.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            health_failures: self.health_failures.load(Ordering::Relaxed),
            bytes_raw: self.bytes_raw.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            avg_latency_ms,
            max_latency_ms: self.latency_max_micros.load(Ordering::Relaxed) as f64 / 1_000.0,
            p50_latency_ms: self.percentile_ms(0.50, latency_count),
            p95_latency_ms: self.percentile_ms(0.95, latency_count),
            avg_compression_ratio,
        }
    }

    /// Bucket-based percentile estimate: the upper bound of the bucket that
    /// contains the target rank.
    fn percentile_ms(&self, quantile: f64, total: u64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let rank = (quantile * total as f64).ceil() as u64;
        let mut seen = 0;
        for (i, bucket) in self.latency_buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= rank {
                return BUCKET_BOUNDS_MS
                    .get(i)
                    .copied()
                    .map(|b| b as f64)
                    .unwrap_or_else(|| self.latency_max_micros.load(Ordering::Relaxed) as f64 / 1_000.0);
            }
        }
        self.latency_max_micros.load(Ordering::Relaxed) as f64 / 1_000.0
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub elapsed_secs: f64,
    pub requests: u64,
    pub requests_per_sec: f64,
    pub successes: u64,
    pub conflicts: u64,
    pub transport_failures: u64,
    pub encode_failures: u64,
    pub fallback_fields: u64,
    pub health_checks: u64,
    pub health_failures: u64,
    pub bytes_raw: u64,
    pub bytes_sent: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub avg_compression_ratio: f64,
}

impl StatsSnapshot {
    pub fn print_summary(&self) {
        println!("run {} finished in {:.1}s", self.run_id, self.elapsed_secs);
        println!(
            "  requests:     {} ({:.2}/s), {} ok, {} conflict, {} rejected",
            self.requests, self.requests_per_sec, self.successes, self.conflicts,
            self.transport_failures
        );
        println!(
            "  encoder:      {} frames skipped, {} field fallbacks",
            self.encode_failures, self.fallback_fields
        );
        println!(
            "  latency:      avg {:.1}ms, p50 {:.0}ms, p95 {:.0}ms, max {:.1}ms",
            self.avg_latency_ms, self.p50_latency_ms, self.p95_latency_ms, self.max_latency_ms
        );
        println!(
            "  bytes:        {} raw -> {} sent, avg compression {:.2}:1",
            self.bytes_raw, self.bytes_sent, self.avg_compression_ratio
        );
        if self.health_checks > 0 {
            println!(
                "  health:       {} checks, {} failed",
                self.health_checks, self.health_failures
            );
        }
    }
}
