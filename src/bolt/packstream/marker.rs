//! PackStream marker bytes and structure tags.
//!
//! Every packed value starts with a marker byte. Small collections and small
//! integers fold their size or value into the marker itself ("tiny" forms).

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const TINY_STRING: u8 = 0x80;
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const TINY_LIST: u8 = 0x90;
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const TINY_MAP: u8 = 0xA0;
pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const TINY_STRUCT: u8 = 0xB0;
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// Largest size that fits in the low nibble of a tiny marker.
pub const TINY_MAX: usize = 0x0F;

/// Inclusive range of integers packed into the marker byte itself.
pub const TINY_INT_RANGE: std::ops::RangeInclusive<i64> = -16..=127;

/// Structure tags for graph, temporal and spatial values.
pub mod tag {
    pub const NODE: u8 = 0x4E;
    pub const RELATIONSHIP: u8 = 0x52;
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
    pub const PATH: u8 = 0x50;

    pub const DATE: u8 = 0x44;
    pub const TIME: u8 = 0x54;
    pub const LOCAL_TIME: u8 = 0x74;
    pub const LOCAL_DATE_TIME: u8 = 0x64;
    pub const DURATION: u8 = 0x45;
    /// Offset date-time, seconds counted in local time (Bolt 4.x).
    pub const LEGACY_DATE_TIME: u8 = 0x46;
    /// Zoned date-time, seconds counted in local time (Bolt 4.x).
    pub const LEGACY_DATE_TIME_ZONE_ID: u8 = 0x66;
    /// Offset date-time, seconds counted in UTC (Bolt 5.x).
    pub const DATE_TIME: u8 = 0x49;
    /// Zoned date-time, seconds counted in UTC (Bolt 5.x).
    pub const DATE_TIME_ZONE_ID: u8 = 0x69;

    pub const POINT_2D: u8 = 0x58;
    pub const POINT_3D: u8 = 0x59;
}

/// Size carried by a tiny marker of the given family, if `marker` belongs to it.
#[inline]
pub fn tiny_size(marker: u8, family: u8) -> Option<usize> {
    if marker & 0xF0 == family {
        Some((marker & 0x0F) as usize)
    } else {
        None
    }
}

/// Whether `marker` is an integer packed inline (0x00..=0x7F or 0xF0..=0xFF).
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker < 0x80 || marker >= 0xF0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_families_do_not_overlap() {
        assert_eq!(tiny_size(0x85, TINY_STRING), Some(5));
        assert_eq!(tiny_size(0x85, TINY_LIST), None);
        assert_eq!(tiny_size(0x9F, TINY_LIST), Some(15));
        assert_eq!(tiny_size(0xA0, TINY_MAP), Some(0));
        assert_eq!(tiny_size(0xB3, TINY_STRUCT), Some(3));
        assert_eq!(tiny_size(NULL, TINY_STRUCT), None);
    }

    #[test]
    fn test_tiny_int_markers() {
        assert!(is_tiny_int(0x00));
        assert!(is_tiny_int(0x7F));
        assert!(is_tiny_int(0xF0));
        assert!(!is_tiny_int(NULL));
        assert!(!is_tiny_int(TINY_STRING));
        assert_eq!(0xF0u8 as i8, -16);
    }
}
