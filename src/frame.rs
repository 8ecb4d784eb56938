use crate::telemetry::TelemetryRecord;
use chrono::{Datelike, NaiveDateTime};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Reserved key carrying the frame format version.
pub const KEY_VERSION: u64 = 0xFF;
/// Reserved key carrying the codec identifier.
pub const KEY_CODEC: u64 = 0xFE;
pub const FORMAT_VERSION: i64 = 1;

/// Per-field wire transform. Quantization scales are part of the frame format
/// contract; a decoder must know them to recover the original value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Pass the raw string through unchanged.
    Copy,
    /// `round(value * scale)` as an integer.
    Quantize(i64),
    /// Keep only the last two digits of the subscriber number.
    MsisdnTail,
    /// `"YYMMDD HHMMSS.f"` -> integer `YYYYMMDD`. Time of day is discarded;
    /// the decoder under test expects exactly this.
    DateCompact,
    /// 4-part cell global identity, split on `-`, reduced modulo
    /// 1000/100/100/10000 into a fixed-length integer array.
    CellIdParts,
    /// Whitespace-separated 3-vector, each component quantized.
    Vector3(i64),
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub key: u64,
    pub transform: Transform,
}

/// Fixed name -> key assignment, stable across encoder instances. Keys match
/// the firmware encoder so frames stay decodable by the deployed pipeline.
pub static FIELD_TABLE: &[FieldSpec] = &[
    FieldSpec { name: "msisdn", key: 0, transform: Transform::MsisdnTail },
    FieldSpec { name: "iso6346", key: 1, transform: Transform::Copy },
    FieldSpec { name: "time", key: 2, transform: Transform::DateCompact },
    FieldSpec { name: "rssi", key: 3, transform: Transform::Copy },
    FieldSpec { name: "cgi", key: 4, transform: Transform::CellIdParts },
    FieldSpec { name: "bat-soc", key: 5, transform: Transform::Copy },
    FieldSpec { name: "acc", key: 6, transform: Transform::Vector3(10) },
    FieldSpec { name: "temperature", key: 7, transform: Transform::Quantize(10) },
    FieldSpec { name: "humidity", key: 8, transform: Transform::Quantize(10) },
    FieldSpec { name: "pressure", key: 9, transform: Transform::Quantize(100) },
    FieldSpec { name: "door", key: 10, transform: Transform::Copy },
    FieldSpec { name: "latitude", key: 11, transform: Transform::Quantize(100) },
    FieldSpec { name: "longitude", key: 12, transform: Transform::Quantize(100) },
    FieldSpec { name: "altitude", key: 13, transform: Transform::Quantize(1) },
    FieldSpec { name: "speed", key: 14, transform: Transform::Quantize(1) },
    FieldSpec { name: "heading", key: 15, transform: Transform::Quantize(1) },
    FieldSpec { name: "ble-m", key: 16, transform: Transform::Copy },
    FieldSpec { name: "gnss", key: 17, transform: Transform::Copy },
    FieldSpec { name: "nsat", key: 18, transform: Transform::Copy },
    FieldSpec { name: "hdop", key: 19, transform: Transform::Quantize(1) },
];

pub fn field_names() -> impl Iterator<Item = &'static str> {
    FIELD_TABLE.iter().map(|spec| spec.name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameValue {
    Int(i64),
    Text(String),
    IntArray(Vec<i64>),
}

impl Serialize for FrameValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrameValue::Int(v) => serializer.serialize_i64(*v),
            FrameValue::Text(s) => serializer.serialize_str(s),
            FrameValue::IntArray(items) => items.serialize(serializer),
        }
    }
}

/// Compact key -> value map, insertion-ordered so the reserved keys are
/// always emitted first.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    entries: Vec<(u64, FrameValue)>,
}

impl EncodedFrame {
    fn with_reserved(codec_id: i64) -> Self {
        Self {
            entries: vec![
                (KEY_VERSION, FrameValue::Int(FORMAT_VERSION)),
                (KEY_CODEC, FrameValue::Int(codec_id)),
            ],
        }
    }

    fn push(&mut self, key: u64, value: FrameValue) {
        self.entries.push((key, value));
    }

    pub fn get(&self, key: u64) -> Option<&FrameValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(u64, FrameValue)] {
        &self.entries
    }
}

impl Serialize for EncodedFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Result of transforming one field. A failed conversion keeps the original
/// string in the frame and is counted, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Converted(FrameValue),
    FallenBack { original: String, reason: String },
}

#[derive(Debug)]
pub struct EncodeReport {
    pub frame: EncodedFrame,
    pub outcomes: Vec<(&'static str, FieldOutcome)>,
    pub fallback_count: usize,
}

/// One-shot stateless transform of a record into a compact frame. Never fails:
/// malformed individual fields degrade to string pass-through.
pub fn encode_record(record: &TelemetryRecord, codec_id: i64) -> EncodeReport {
    let mut frame = EncodedFrame::with_reserved(codec_id);
    let mut outcomes = Vec::with_capacity(FIELD_TABLE.len());
    let mut fallback_count = 0;

    for spec in FIELD_TABLE {
        let Some(raw) = record.field(spec.name) else {
            continue;
        };
        let outcome = apply_transform(spec.transform, raw);
        let value = match &outcome {
            FieldOutcome::Converted(value) => value.clone(),
            FieldOutcome::FallenBack { original, .. } => {
                fallback_count += 1;
                FrameValue::Text(original.clone())
            }
        };
        frame.push(spec.key, value);
        outcomes.push((spec.name, outcome));
    }

    EncodeReport { frame, outcomes, fallback_count }
}

fn apply_transform(transform: Transform, raw: &str) -> FieldOutcome {
    match transform {
        Transform::Copy => FieldOutcome::Converted(FrameValue::Text(raw.to_string())),
        Transform::Quantize(scale) => quantize_scalar(raw, scale),
        Transform::MsisdnTail => msisdn_tail(raw),
        Transform::DateCompact => compact_date(raw),
        Transform::CellIdParts => cell_id_parts(raw),
        Transform::Vector3(scale) => vector3(raw, scale),
    }
}

fn fallback(raw: &str, reason: impl Into<String>) -> FieldOutcome {
    FieldOutcome::FallenBack { original: raw.to_string(), reason: reason.into() }
}

fn quantize_scalar(raw: &str, scale: i64) -> FieldOutcome {
    match raw.trim().parse::<f64>() {
        Ok(value) => {
            let quantized = (value * scale as f64).round() as i64;
            FieldOutcome::Converted(FrameValue::Int(quantized))
        }
        Err(err) => fallback(raw, format!("not numeric: {err}")),
    }
}

fn msisdn_tail(raw: &str) -> FieldOutcome {
    let trimmed = raw.trim();
    // Last two characters, not bytes: the tail must not split a multibyte
    // character.
    let chars: Vec<char> = trimmed.chars().rev().take(2).collect();
    if chars.len() < 2 {
        return fallback(raw, "shorter than two digits");
    }
    let tail: String = chars.into_iter().rev().collect();
    match tail.parse::<i64>() {
        Ok(value) => FieldOutcome::Converted(FrameValue::Int(value)),
        Err(err) => fallback(raw, format!("tail not numeric: {err}")),
    }
}

fn compact_date(raw: &str) -> FieldOutcome {
    match NaiveDateTime::parse_from_str(raw.trim(), "%y%m%d %H%M%S%.f") {
        Ok(dt) => {
            let date = dt.date();
            let compact =
                i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day());
            FieldOutcome::Converted(FrameValue::Int(compact))
        }
        Err(err) => fallback(raw, format!("bad timestamp: {err}")),
    }
}

const CGI_MODULI: [i64; 4] = [1_000, 100, 100, 10_000];

fn cell_id_parts(raw: &str) -> FieldOutcome {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    if parts.len() < 4 {
        return fallback(raw, format!("expected 4 segments, got {}", parts.len()));
    }
    let mut values = Vec::with_capacity(4);
    for (part, modulus) in parts.iter().take(4).zip(CGI_MODULI) {
        match part.parse::<i64>() {
            Ok(value) => values.push(value % modulus),
            Err(err) => return fallback(raw, format!("segment {part:?} not numeric: {err}")),
        }
    }
    FieldOutcome::Converted(FrameValue::IntArray(values))
}

fn vector3(raw: &str, scale: i64) -> FieldOutcome {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 3 {
        return fallback(raw, format!("expected 3 components, got {}", parts.len()));
    }
    let mut values = Vec::with_capacity(3);
    for part in parts.iter().take(3) {
        match part.parse::<f64>() {
            Ok(value) => values.push((value * scale as f64).round() as i64),
            Err(err) => return fallback(raw, format!("component {part:?} not numeric: {err}")),
        }
    }
    FieldOutcome::Converted(FrameValue::IntArray(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DeviceSimulator;

    fn sample_record() -> TelemetryRecord {
        let mut sim = DeviceSimulator::new(1);
        sim.next_record(&mut rand::thread_rng())
    }

    #[test]
    fn reserved_keys_are_first_and_idempotent() {
        let record = sample_record();
        let first = encode_record(&record, 1);
        let second = encode_record(&record, 1);
        assert_eq!(first.frame.entries()[0], (KEY_VERSION, FrameValue::Int(1)));
        assert_eq!(first.frame.entries()[1], (KEY_CODEC, FrameValue::Int(1)));
        assert_eq!(first.frame.entries()[..2], second.frame.entries()[..2]);
    }

    #[test]
    fn quantizes_temperature_with_rounding() {
        match quantize_scalar("23.456", 10) {
            FieldOutcome::Converted(FrameValue::Int(v)) => assert_eq!(v, 235),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn quantization_error_stays_bounded() {
        let cases = [("23.456", 10), ("1013.2043", 100), ("31.8942", 100), ("2.7", 1)];
        for (raw, scale) in cases {
            let original: f64 = raw.parse().unwrap();
            let FieldOutcome::Converted(FrameValue::Int(q)) = quantize_scalar(raw, scale) else {
                panic!("conversion failed for {raw}");
            };
            let recovered = q as f64 / scale as f64;
            assert!(
                (recovered - original).abs() < 1.0 / scale as f64,
                "{raw} @ {scale}: recovered {recovered}"
            );
        }
    }

    #[test]
    fn quantizes_acceleration_vector() {
        match vector3("-12.3456 1.2000 9.8100", 10) {
            FieldOutcome::Converted(FrameValue::IntArray(v)) => {
                assert_eq!(v, vec![-123, 12, 98]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn compacts_timestamp_to_date_only() {
        match compact_date("240115 143022.0") {
            FieldOutcome::Converted(FrameValue::Int(v)) => assert_eq!(v, 20_240_115),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cell_id_decomposes_with_moduli() {
        match cell_id_parts("999-01-1-31441") {
            FieldOutcome::Converted(FrameValue::IntArray(v)) => {
                assert_eq!(v, vec![999, 1, 1, 1441]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cell_id_with_hex_segment_falls_back_to_string() {
        let outcome = cell_id_parts("999-01-1-31D41");
        assert!(matches!(outcome, FieldOutcome::FallenBack { .. }));

        let mut record = sample_record();
        record.cgi = "999-01-1-31D41".to_string();
        let report = encode_record(&record, 1);
        assert_eq!(
            report.frame.get(4),
            Some(&FrameValue::Text("999-01-1-31D41".to_string()))
        );
        assert_eq!(report.fallback_count, 1);
    }

    #[test]
    fn malformed_numeric_field_does_not_abort_encoding() {
        let mut record = sample_record();
        record.temperature = "N/A".to_string();
        let report = encode_record(&record, 1);
        // Reserved keys plus all 20 mapped fields survive.
        assert_eq!(report.frame.len(), 2 + FIELD_TABLE.len());
        assert_eq!(report.frame.get(7), Some(&FrameValue::Text("N/A".to_string())));
        let (_, outcome) = report
            .outcomes
            .iter()
            .find(|(name, _)| *name == "temperature")
            .unwrap();
        assert!(matches!(outcome, FieldOutcome::FallenBack { .. }));
        assert_eq!(report.fallback_count, 1);
    }

    #[test]
    fn msisdn_keeps_last_two_digits() {
        match msisdn_tail("393315537842") {
            FieldOutcome::Converted(FrameValue::Int(v)) => assert_eq!(v, 42),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn msisdn_with_multibyte_tail_falls_back() {
        let outcome = msisdn_tail("39331553€");
        assert!(matches!(outcome, FieldOutcome::FallenBack { .. }));

        let mut record = sample_record();
        record.msisdn = "39331553€".to_string();
        let report = encode_record(&record, 1);
        assert_eq!(
            report.frame.get(0),
            Some(&FrameValue::Text("39331553€".to_string()))
        );
        assert_eq!(report.fallback_count, 1);
    }

    #[test]
    fn well_formed_record_converts_every_quantized_field() {
        let record = sample_record();
        let report = encode_record(&record, 1);
        assert_eq!(report.fallback_count, 0, "outcomes: {:?}", report.outcomes);
        assert_eq!(report.frame.len(), 2 + FIELD_TABLE.len());
    }

    #[test]
    fn field_keys_are_unique() {
        for (i, a) in FIELD_TABLE.iter().enumerate() {
            for b in &FIELD_TABLE[i + 1..] {
                assert_ne!(a.key, b.key, "{} and {} share a key", a.name, b.name);
            }
        }
    }
}
