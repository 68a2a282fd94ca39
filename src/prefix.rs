//! The length prefix codec.
//!
//! Everywhere the wire format needs a count, byte length, or stream offset,
//! it writes one width byte W followed by W big-endian bytes of the value,
//! with W the minimum number of bytes that can carry it. A value of zero is
//! a bare zero width byte with no payload, so small frames stay small: an
//! empty string is two bytes, a length under 256 is three.

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::marker::Marker;
use crate::MAX_LEN_WIDTH;

/// Append `marker`, the minimal width byte, and the big-endian bytes of
/// `value`. Returns the number of bytes appended.
pub(crate) fn write_header(buf: &mut Vec<u8>, marker: Marker, value: u64) -> usize {
    buf.push(marker.into());
    let width = byte_width(value);
    buf.push(width as u8);
    if width > 0 {
        let be = value.to_be_bytes();
        buf.extend_from_slice(&be[8 - width..]);
    }
    2 + width
}

/// Minimum number of big-endian bytes needed to carry `value`. Zero when the
/// value is zero.
pub(crate) const fn byte_width(value: u64) -> usize {
    (64 - value.leading_zeros() as usize + 7) / 8
}

/// Read one length prefix starting at `pos` (the width byte; the caller has
/// already consumed the marker). Returns the value and the cursor just past
/// the prefix.
pub(crate) fn read_value(data: &[u8], pos: usize) -> Result<(u64, usize)> {
    let width = *data.get(pos).ok_or(Error::Truncated {
        offset: pos,
        needed: 1,
        remaining: 0,
    })? as usize;
    if width > MAX_LEN_WIDTH {
        return Err(Error::WidthTooLarge { offset: pos, width });
    }
    let start = pos + 1;
    let remaining = data.len() - start;
    if width > remaining {
        return Err(Error::BadLength {
            offset: pos,
            width,
            remaining,
        });
    }
    if width == 0 {
        return Ok((0, start));
    }
    let mut bytes = &data[start..start + width];
    let value = bytes
        .read_uint::<BigEndian>(width)
        .map_err(|_| Error::BadLength {
            offset: pos,
            width,
            remaining,
        })?;
    Ok((value, start + width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values() {
        let cases: Vec<u64> = vec![
            0,
            1,
            2,
            127,
            128,
            255,
            256,
            u16::MAX as u64,
            u16::MAX as u64 + 1,
            (1 << 24) - 1,
            1 << 24,
            u32::MAX as u64,
            u32::MAX as u64 + 1,
            (1 << 40) - 1,
            1 << 40,
            (1 << 48) - 1,
            1 << 48,
            u64::MAX,
        ];
        for case in cases {
            let mut buf = Vec::new();
            let written = write_header(&mut buf, Marker::Str, case);
            assert_eq!(written, buf.len(), "reported size should match");
            assert_eq!(buf[0], b's');
            let (value, next) = read_value(&buf, 1).unwrap();
            assert_eq!(value, case, "value should round-trip");
            assert_eq!(next, buf.len(), "prefix should be fully consumed");
        }
    }

    #[test]
    fn zero_has_no_payload_bytes() {
        let mut buf = Vec::new();
        write_header(&mut buf, Marker::Str, 0);
        assert_eq!(buf, [b's', 0]);
    }

    #[test]
    fn widths_are_minimal() {
        for (value, width) in [
            (0u64, 0usize),
            (1, 1),
            (255, 1),
            (256, 2),
            (65535, 2),
            (65536, 3),
            ((1 << 48) - 1, 6),
            (1 << 48, 7),
            (u64::MAX, 8),
        ] {
            assert_eq!(byte_width(value), width, "width of {}", value);
        }
    }

    #[test]
    fn truncated_payload() {
        // Width byte declares two bytes but only one follows.
        let buf = [2u8, 0xff];
        let err = read_value(&buf, 0).unwrap_err();
        assert_eq!(
            err,
            Error::BadLength {
                offset: 0,
                width: 2,
                remaining: 1
            }
        );
    }

    #[test]
    fn width_beyond_support() {
        let buf = [9u8, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let err = read_value(&buf, 0).unwrap_err();
        assert_eq!(err, Error::WidthTooLarge { offset: 0, width: 9 });
    }

    #[test]
    fn missing_width_byte() {
        let err = read_value(&[], 0).unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 0, .. }));
    }
}
