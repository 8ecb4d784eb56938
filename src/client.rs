use crate::codec::Codec;
use crate::compress::CompressedEnvelope;
use crate::config::RunConfig;
use crate::telemetry::TelemetryRecord;
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::json;
use std::time::{Duration, Instant};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How the remote service answered, from the measurement point of view.
/// 409 means the content instance already exists; the pipeline treats that as
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Conflict,
    Rejected(u16),
}

pub fn classify_status(status: u16) -> RequestOutcome {
    match status {
        200 | 201 => RequestOutcome::Success,
        409 => RequestOutcome::Conflict,
        other => RequestOutcome::Rejected(other),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostResult {
    pub outcome: RequestOutcome,
    pub latency: Duration,
    pub bytes_sent: usize,
}

pub struct LoadClient {
    http: reqwest::Client,
    slave_ingest: Url,
    slave_health: Url,
    mobius_ingest: Option<Url>,
}

impl LoadClient {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            slave_ingest: config.slave_ingest.clone(),
            slave_health: config.slave_health.clone(),
            mobius_ingest: config.mobius_ingest.clone(),
        })
    }

    /// POST one compact binary frame to the slave, ESP32-style.
    pub async fn post_frame(
        &self,
        device_id: &str,
        frame_bytes: Vec<u8>,
        codec: Codec,
    ) -> Result<PostResult> {
        let bytes_sent = frame_bytes.len();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        headers.insert("Device-ID", HeaderValue::from_str(device_id)?);
        headers.insert("Network-Type", HeaderValue::from_static("astrocast"));
        headers.insert("Compression-Type", HeaderValue::from_static(codec_header(codec)));

        let started = Instant::now();
        let response = self
            .http
            .post(self.slave_ingest.clone())
            .headers(headers)
            .body(frame_bytes)
            .send()
            .await
            .context("slave frame request failed")?;
        Ok(PostResult {
            outcome: classify_status(response.status().as_u16()),
            latency: started.elapsed(),
            bytes_sent,
        })
    }

    /// POST a compressed batch envelope to the slave, master-node-style.
    pub async fn post_envelope(
        &self,
        envelope: &CompressedEnvelope,
        batch_size: usize,
    ) -> Result<PostResult> {
        let body = serde_json::to_vec(envelope).context("envelope serialization failed")?;
        let bytes_sent = body.len();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("container-loadgen/0.1"));
        headers.insert("X-Source", HeaderValue::from_str(&envelope.metadata.source_node)?);
        headers.insert("X-Batch-Size", HeaderValue::from_str(&batch_size.to_string())?);

        let started = Instant::now();
        let response = self
            .http
            .post(self.slave_ingest.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("slave batch request failed")?;
        Ok(PostResult {
            outcome: classify_status(response.status().as_u16()),
            latency: started.elapsed(),
            bytes_sent,
        })
    }

    /// POST one record to the Mobius platform as a oneM2M content instance.
    pub async fn post_mobius(&self, device_id: &str, record: &TelemetryRecord) -> Result<PostResult> {
        let url = self
            .mobius_ingest
            .clone()
            .context("mobius endpoint not configured")?;
        let payload = json!({ "m2m:cin": { "con": record } });
        let body = serde_json::to_vec(&payload).context("mobius payload serialization failed")?;
        let bytes_sent = body.len();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json;ty=4"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-M2M-RI",
            HeaderValue::from_str(&format!("req-{}", Utc::now().timestamp_millis()))?,
        );
        headers.insert("X-M2M-Origin", HeaderValue::from_str(device_id)?);

        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("mobius request failed")?;
        Ok(PostResult {
            outcome: classify_status(response.status().as_u16()),
            latency: started.elapsed(),
            bytes_sent,
        })
    }

    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .http
            .get(self.slave_health.clone())
            .send()
            .await
            .context("health check request failed")?;
        Ok(response.status().is_success())
    }
}

fn codec_header(codec: Codec) -> &'static str {
    match codec {
        Codec::Cbor => "astrocast-cbor",
        Codec::Msgpack => "astrocast-msgpack",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success_conflict_and_rejection() {
        assert_eq!(classify_status(200), RequestOutcome::Success);
        assert_eq!(classify_status(201), RequestOutcome::Success);
        assert_eq!(classify_status(409), RequestOutcome::Conflict);
        assert_eq!(classify_status(500), RequestOutcome::Rejected(500));
        assert_eq!(classify_status(404), RequestOutcome::Rejected(404));
    }
}
