use crate::frame::EncodedFrame;
use clap::ValueEnum;
use thiserror::Error;

/// Binary serialization for an encoded frame. The codec id is carried in the
/// frame's reserved key so the decoder can pick the right parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Codec {
    Cbor,
    #[value(alias = "messagepack")]
    Msgpack,
}

impl Codec {
    pub fn id(&self) -> i64 {
        match self {
            Codec::Cbor => 1,
            Codec::Msgpack => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Codec::Cbor => "cbor",
            Codec::Msgpack => "msgpack",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cbor serialization failed: {0}")]
    Cbor(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("messagepack serialization failed: {0}")]
    Msgpack(#[from] rmp_serde::encode::Error),
}

pub fn serialize_frame(frame: &EncodedFrame, codec: Codec) -> Result<Vec<u8>, CodecError> {
    match codec {
        Codec::Cbor => {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(frame, &mut buf)?;
            Ok(buf)
        }
        Codec::Msgpack => Ok(rmp_serde::to_vec(frame)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_record, KEY_VERSION};
    use crate::telemetry::DeviceSimulator;

    fn sample_frame(codec: Codec) -> EncodedFrame {
        let mut sim = DeviceSimulator::new(5);
        let record = sim.next_record(&mut rand::thread_rng());
        encode_record(&record, codec.id()).frame
    }

    #[test]
    fn cbor_bytes_decode_to_a_map_with_reserved_version() {
        let frame = sample_frame(Codec::Cbor);
        let bytes = serialize_frame(&frame, Codec::Cbor).unwrap();
        let value: ciborium::Value = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        let map = value.as_map().expect("cbor map");
        assert_eq!(map.len(), frame.len());
        let (first_key, first_value) = &map[0];
        assert_eq!(first_key.as_integer(), Some(ciborium::value::Integer::from(KEY_VERSION)));
        assert_eq!(first_value.as_integer(), Some(ciborium::value::Integer::from(1u8)));
    }

    #[test]
    fn msgpack_bytes_decode_back_to_the_same_shape() {
        let frame = sample_frame(Codec::Msgpack);
        let bytes = serialize_frame(&frame, Codec::Msgpack).unwrap();
        let value: rmpv::Value = rmp_serde::from_slice(&bytes).unwrap();
        let map = value.as_map().expect("msgpack map");
        assert_eq!(map.len(), frame.len());
    }

    #[test]
    fn frame_is_smaller_than_raw_json() {
        let mut sim = DeviceSimulator::new(6);
        let record = sim.next_record(&mut rand::thread_rng());
        let raw = serde_json::to_vec(&record).unwrap();
        let report = encode_record(&record, Codec::Cbor.id());
        let bytes = serialize_frame(&report.frame, Codec::Cbor).unwrap();
        assert!(bytes.len() < raw.len(), "{} vs {}", bytes.len(), raw.len());
    }
}
