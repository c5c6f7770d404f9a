//! PackStream serialization format.
//!
//! PackStream is the binary format Bolt uses for every message body. A value
//! is a marker byte, optionally followed by a size and a payload.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**
//! - **Integer**: 64-bit signed, packed into 1, 2, 3, 5 or 9 bytes
//! - **Float**: 64-bit IEEE 754
//! - **String**: UTF-8; **Bytes**: raw
//! - **List**, **Map** (string keys)
//! - **Structure**: tag byte plus fields; used for messages and for graph,
//!   temporal and spatial values (see [`marker::tag`])

pub mod marker;
pub mod pack;
pub mod unpack;
pub mod value;

pub use pack::{pack, Packer};
pub use unpack::{unpack, Unpacker};
pub use value::{PackStreamStructure, PackStreamValue};

use thiserror::Error;

/// PackStream errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PackStreamError {
    #[error("unexpected end of PackStream data")]
    UnexpectedEof,
    #[error("unknown PackStream marker 0x{0:02X}")]
    UnknownMarker(u8),
    #[error("invalid UTF-8 in string: {0}")]
    InvalidUtf8(String),
    #[error("map keys must be strings")]
    InvalidMapKey,
    #[error("{0} too large: {1}")]
    ValueTooLarge(&'static str, usize),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
    #[error("{0} unexpected bytes after value")]
    TrailingBytes(usize),
    #[error("values nested deeper than {0} levels")]
    TooDeep(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round_trip(value: PackStreamValue) {
        let bytes = pack(&value).unwrap();
        assert_eq!(unpack(&bytes).unwrap(), value);
    }

    #[test]
    fn test_boundary_integers_round_trip() {
        for v in [
            -16i64, -17, 127, 128, -128, -129, 32_767, 32_768, -32_769,
            2_147_483_647, 2_147_483_648, i64::MAX, i64::MIN,
        ] {
            round_trip(PackStreamValue::Integer(v));
        }
    }

    #[test]
    fn test_collection_size_boundaries_round_trip() {
        for n in [15usize, 16, 255, 256, 65_536] {
            round_trip(PackStreamValue::List(vec![PackStreamValue::Null; n]));
        }
        let wide: HashMap<String, PackStreamValue> =
            (0..300).map(|i| (format!("k{}", i), PackStreamValue::Integer(i))).collect();
        round_trip(PackStreamValue::Map(wide));
    }

    #[test]
    fn test_wide_structure_round_trips() {
        let fields = vec![PackStreamValue::Boolean(true); 20];
        round_trip(PackStreamValue::Structure(PackStreamStructure::new(0x01, fields)));
    }
}
