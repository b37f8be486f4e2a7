//! Two's-complement helpers for 16- and 32-bit register values.

pub fn decode_signed_16(raw: u16) -> i16 {
    raw as i16
}

pub fn encode_signed_16(value: i16) -> u16 {
    value as u16
}

/// The high register carries the most significant half.
pub fn decode_signed_32(high: u16, low: u16) -> i32 {
    (((high as u32) << 16) | low as u32) as i32
}

pub fn encode_signed_32(value: i32) -> (u16, u16) {
    let bits = value as u32;
    ((bits >> 16) as u16, (bits & 0xFFFF) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_16_boundaries() {
        assert_eq!(decode_signed_16(0x0000), 0);
        assert_eq!(decode_signed_16(0x7FFF), 32767);
        assert_eq!(decode_signed_16(0x8000), -32768);
        assert_eq!(decode_signed_16(0xFFFF), -1);
        assert_eq!(decode_signed_16(65136), -400);
    }

    #[test]
    fn test_signed_16_round_trip_full_range() {
        for v in i16::MIN..=i16::MAX {
            assert_eq!(decode_signed_16(encode_signed_16(v)), v);
        }
        for raw in u16::MIN..=u16::MAX {
            assert_eq!(encode_signed_16(decode_signed_16(raw)), raw);
        }
    }

    #[test]
    fn test_signed_32() {
        assert_eq!(decode_signed_32(0x0000, 0x0001), 1);
        assert_eq!(decode_signed_32(0xFFFF, 0xFFFF), -1);
        assert_eq!(decode_signed_32(0x8000, 0x0000), i32::MIN);
        assert_eq!(decode_signed_32(0x0001, 0x0000), 65536);
        assert_eq!(encode_signed_32(-2), (0xFFFF, 0xFFFE));
        for v in [i32::MIN, -70000, -1, 0, 1, 1234, 65535, 65536, i32::MAX] {
            let (hi, lo) = encode_signed_32(v);
            assert_eq!(decode_signed_32(hi, lo), v);
        }
    }
}
