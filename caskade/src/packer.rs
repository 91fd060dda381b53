//! Binary packer primitives: fixed-width integers, the "adjsize" variable
//! length prefix, and nanotime timestamps. Stands in for the "binary packer
//! library" collaborator named in spec.md §1/§6.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::NeedMoreBytes;

/// Nanoseconds since the Unix epoch, packed big-endian where noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NanoTime(pub u64);

impl NanoTime {
    pub fn now() -> NanoTime {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch");
        NanoTime(d.as_nanos() as u64)
    }
}

pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(u8, usize), NeedMoreBytes> {
    NeedMoreBytes::check(buf, offset + 1)?;
    Ok((buf[offset], offset + 1))
}

pub fn write_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<(u32, usize), NeedMoreBytes> {
    NeedMoreBytes::check(buf, offset + 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    Ok((u32::from_le_bytes(bytes), offset + 4))
}

pub fn write_u64_be(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn read_u64_be(buf: &[u8], offset: usize) -> Result<(u64, usize), NeedMoreBytes> {
    NeedMoreBytes::check(buf, offset + 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    Ok((u64::from_be_bytes(bytes), offset + 8))
}

pub fn write_nanotime(buf: &mut Vec<u8>, t: NanoTime) {
    write_u64_be(buf, t.0);
}

pub fn read_nanotime(buf: &[u8], offset: usize) -> Result<(NanoTime, usize), NeedMoreBytes> {
    let (v, new_offset) = read_u64_be(buf, offset)?;
    Ok((NanoTime(v), new_offset))
}

impl NeedMoreBytes {
    pub(crate) fn check(buf: &[u8], needed_len: usize) -> Result<(), NeedMoreBytes> {
        if buf.len() < needed_len {
            Err(NeedMoreBytes(needed_len - buf.len()))
        } else {
            Ok(())
        }
    }
}

const SIGNIFICANT_BITS: u32 = 7;
const SEVEN_BITS: u8 = 0x7f;
const END_BIT: u8 = 0x80;

/// Packs `sz` as a little-endian base-128 varint, at most `max_bytes` long,
/// with the terminating byte's high bit set.
pub fn pack_adjsize(sz: u64, max_bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_bytes);
    let mut shift = sz;
    for _ in 0..max_bytes {
        let numerical = (shift & SEVEN_BITS as u64) as u8;
        shift >>= SIGNIFICANT_BITS;
        if shift == 0 {
            out.push(numerical | END_BIT);
            return out;
        }
        out.push(numerical);
    }
    panic!("size too big for {} byte adjsize: {}", max_bytes, sz);
}

/// Decodes an adjsize varint of at most `max_bytes` bytes.
pub fn unpack_adjsize(
    buf: &[u8],
    offset: usize,
    max_bytes: usize,
) -> Result<(u64, usize), NeedMoreBytes> {
    let mut sz: u64 = 0;
    for i in 0..max_bytes {
        let pos = offset + i;
        NeedMoreBytes::check(buf, pos + 1)?;
        let v = buf[pos];
        sz += ((v & SEVEN_BITS) as u64) << (i as u32 * SIGNIFICANT_BITS);
        if v & END_BIT != 0 {
            return Ok((sz, pos + 1));
        }
    }
    Err(NeedMoreBytes(1))
}

/// 3-byte capacity adjsize, used for small lengths (strings, catalog items).
pub const ADJSIZE3_MAX: usize = 3;
/// 4-byte capacity adjsize, used for payload sizes.
pub const ADJSIZE4_MAX: usize = 4;

pub fn pack_adjsize3(sz: usize) -> Vec<u8> {
    pack_adjsize(sz as u64, ADJSIZE3_MAX)
}

pub fn unpack_adjsize3(buf: &[u8], offset: usize) -> Result<(usize, usize), NeedMoreBytes> {
    let (v, new_offset) = unpack_adjsize(buf, offset, ADJSIZE3_MAX)?;
    Ok((v as usize, new_offset))
}

pub fn pack_adjsize4(sz: usize) -> Vec<u8> {
    pack_adjsize(sz as u64, ADJSIZE4_MAX)
}

pub fn unpack_adjsize4(buf: &[u8], offset: usize) -> Result<(usize, usize), NeedMoreBytes> {
    let (v, new_offset) = unpack_adjsize(buf, offset, ADJSIZE4_MAX)?;
    Ok((v as usize, new_offset))
}

pub fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend(pack_adjsize3(s.len()));
    buf.extend_from_slice(s.as_bytes());
}

pub fn read_str(buf: &[u8], offset: usize) -> Result<(String, usize), NeedMoreBytes> {
    let (len, pos) = unpack_adjsize3(buf, offset)?;
    NeedMoreBytes::check(buf, pos + len)?;
    let s = String::from_utf8_lossy(&buf[pos..pos + len]).into_owned();
    Ok((s, pos + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjsize_matches_known_vectors() {
        assert_eq!(pack_adjsize(3, 3), vec![0x83]);
        assert_eq!(pack_adjsize(127, 3), vec![0xff]);
        assert_eq!(pack_adjsize(128, 3), vec![0x00, 0x81]);
        assert_eq!(pack_adjsize(255, 3), vec![0x7f, 0x81]);
        assert_eq!(pack_adjsize(2_000_000, 3), vec![0x00, 0x09, 0xfa]);
    }

    #[test]
    fn adjsize_round_trip() {
        for sz in [0u64, 1, 127, 128, 255, 16000, 17001, 2_000_000] {
            let packed = pack_adjsize(sz, 4);
            let (unpacked, consumed) = unpack_adjsize(&packed, 0, 4).unwrap();
            assert_eq!(unpacked, sz);
            assert_eq!(consumed, packed.len());
        }
    }

    #[test]
    fn adjsize_needs_more_bytes_at_eof() {
        let packed = pack_adjsize(2_000_000, 4);
        let err = unpack_adjsize(&packed[..packed.len() - 1], 0, 4).unwrap_err();
        assert_eq!(err.0, 1);
    }
}
