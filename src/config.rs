use crate::cli::RunArgs;
use crate::codec::Codec;
use crate::compress::Compression;
use crate::runner::Scenario;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_SLAVE_URL: &str = "http://172.25.1.78:3001";
const DEFAULT_MOBIUS_PATH: &str = "/Mobius/Natesh/NateshContainer?ty=4";

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub slave_ingest: Url,
    pub slave_health: Url,
    pub mobius_ingest: Option<Url>,
    pub users: usize,
    pub duration: Duration,
    pub think_min: Duration,
    pub think_max: Duration,
    pub scenario: Scenario,
    pub codec: Codec,
    pub compression: Compression,
    pub batch_min: usize,
    pub batch_max: usize,
    pub source_node: String,
    pub summary_out: Option<PathBuf>,
    pub report_interval: Duration,
}

impl RunConfig {
    /// CLI flags win, then `LOADGEN_*` environment variables, then defaults.
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let slave_base = args
            .slave
            .clone()
            .or_else(|| env_optional("LOADGEN_SLAVE_URL"))
            .unwrap_or_else(|| DEFAULT_SLAVE_URL.to_string());
        let slave_base = Url::parse(&slave_base).context("invalid slave URL")?;
        let slave_ingest = slave_base
            .join("/api/receive-compressed")
            .context("invalid slave ingest path")?;
        let slave_health = slave_base
            .join("/api/health")
            .context("invalid slave health path")?;

        let mobius_base = args.mobius.clone().or_else(|| env_optional("LOADGEN_MOBIUS_URL"));
        let mobius_path = args
            .mobius_path
            .clone()
            .or_else(|| env_optional("LOADGEN_MOBIUS_PATH"))
            .unwrap_or_else(|| DEFAULT_MOBIUS_PATH.to_string());
        let mobius_ingest = match mobius_base {
            Some(base) => {
                let base = Url::parse(&base).context("invalid Mobius URL")?;
                Some(base.join(&mobius_path).context("invalid Mobius path")?)
            }
            None => None,
        };

        let users = match args.users {
            Some(users) => users,
            None => env_usize("LOADGEN_USERS", 10)?,
        };
        if users == 0 {
            return Err(anyhow!("users must be at least 1"));
        }

        let duration = match &args.duration {
            Some(raw) => parse_duration(raw)?,
            None => parse_duration(&env_string("LOADGEN_DURATION", "5m"))?,
        };

        let think_min = Duration::from_millis(match args.think_min_ms {
            Some(ms) => ms,
            None => env_u64("LOADGEN_THINK_MIN_MS", 2_000)?,
        });
        let think_max = Duration::from_millis(match args.think_max_ms {
            Some(ms) => ms,
            None => env_u64("LOADGEN_THINK_MAX_MS", 5_000)?,
        });
        if think_max < think_min {
            return Err(anyhow!("think-time upper bound is below the lower bound"));
        }

        let batch_min = args.batch_min.map_or_else(|| env_usize("LOADGEN_BATCH_MIN", 3), Ok)?;
        let batch_max = args.batch_max.map_or_else(|| env_usize("LOADGEN_BATCH_MAX", 8), Ok)?;
        if batch_min == 0 || batch_max < batch_min {
            return Err(anyhow!("invalid batch size bounds {batch_min}..{batch_max}"));
        }

        let scenario = args.scenario.unwrap_or(Scenario::Mixed);
        if matches!(scenario, Scenario::Mobius) && mobius_ingest.is_none() {
            return Err(anyhow!("mobius scenario requires --mobius"));
        }

        Ok(Self {
            slave_ingest,
            slave_health,
            mobius_ingest,
            users,
            duration,
            think_min,
            think_max,
            scenario,
            codec: args.codec.unwrap_or(Codec::Cbor),
            compression: args.compression.unwrap_or(Compression::Brotli),
            batch_min,
            batch_max,
            source_node: args
                .source_node
                .clone()
                .or_else(|| env_optional("LOADGEN_SOURCE_NODE"))
                .unwrap_or_else(|| "loadgen-master".to_string()),
            summary_out: args.summary_out.clone(),
            report_interval: Duration::from_secs(env_u64("LOADGEN_REPORT_INTERVAL_SECONDS", 10)?),
        })
    }
}

/// Parses `30s` / `5m` / `1h` style durations; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("duration cannot be empty"));
    }
    let (value, unit) = match raw.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&raw[..raw.len() - 1], Some(c)),
        _ => (raw, None),
    };
    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid duration value in {raw:?}"))?;
    let secs = match unit {
        None | Some('s') => value,
        Some('m') => value * 60,
        Some('h') => value * 3_600,
        Some(other) => return Err(anyhow!("unknown duration unit {other:?}, use s/m/h")),
    };
    Ok(Duration::from_secs(secs))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    Ok(env_u64(key, default as u64)? as usize)
}
