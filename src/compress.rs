use crate::telemetry::TelemetryRecord;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;

/// Brotli settings used by the production master node: quality 6, text mode,
/// 22-bit window.
const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: i32 = 6;
const BROTLI_LGWIN: i32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    Brotli,
    Lz4,
    None,
}

impl Compression {
    pub fn label(&self) -> &'static str {
        match self {
            Compression::Brotli => "brotli",
            Compression::Lz4 => "lz4",
            Compression::None => "none",
        }
    }
}

pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::Brotli => {
            let params = brotli::enc::BrotliEncoderParams {
                quality: BROTLI_QUALITY,
                lgwin: BROTLI_LGWIN,
                mode: brotli::enc::backward_references::BrotliEncoderMode::BROTLI_MODE_TEXT,
                ..Default::default()
            };
            let mut out = Vec::new();
            {
                let mut writer = brotli::CompressorWriter::with_params(&mut out, BROTLI_BUFFER, &params);
                writer.write_all(data).context("brotli compression failed")?;
            }
            Ok(out)
        }
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        Compression::None => Ok(data.to_vec()),
    }
}

/// One container inside a batch, in the shape the slave's decompressor
/// expects.
#[derive(Debug, Serialize)]
pub struct BatchItem<'a> {
    #[serde(rename = "containerId")]
    pub container_id: &'a str,
    pub data: &'a TelemetryRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub timestamp: String,
    pub source_node: String,
    pub compression_type: String,
    pub original_size: usize,
    pub compression_ratio: f64,
    pub container_count: usize,
    pub batch_id: String,
}

/// The wrapped payload posted to `/api/receive-compressed`: base64 of the
/// compressed batch plus descriptive metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedEnvelope {
    pub compressed_data: String,
    pub metadata: EnvelopeMetadata,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSizes {
    pub original: usize,
    pub compressed: usize,
    pub ratio: f64,
}

pub fn build_envelope(
    records: &[TelemetryRecord],
    compression: Compression,
    source_node: &str,
) -> Result<(CompressedEnvelope, BatchSizes)> {
    let items: Vec<BatchItem> = records
        .iter()
        .map(|record| BatchItem { container_id: &record.iso6346, data: record })
        .collect();
    // Compact separators, same as the master node.
    let json = serde_json::to_vec(&items).context("batch serialization failed")?;
    let original = json.len();

    let compressed = compress(&json, compression)?;
    let compressed_size = compressed.len();
    let ratio = if compressed_size > 0 {
        original as f64 / compressed_size as f64
    } else {
        1.0
    };

    let envelope = CompressedEnvelope {
        compressed_data: BASE64.encode(&compressed),
        metadata: EnvelopeMetadata {
            timestamp: Utc::now().to_rfc3339(),
            source_node: source_node.to_string(),
            compression_type: compression.label().to_string(),
            original_size: original,
            compression_ratio: (ratio * 100.0).round() / 100.0,
            container_count: records.len(),
            batch_id: format!("BATCH_{}", Utc::now().timestamp_millis()),
        },
    };

    Ok((
        envelope,
        BatchSizes { original, compressed: compressed_size, ratio },
    ))
}
