//! Identifiers: [`Rake`] (opaque anchor/caskade id), [`Cake`] (a tagged hash
//! used for inter-cask wire references) and [`CaskId`] (the pair that names
//! a cask file on disk).

use std::fmt;

use rand::RngCore;

use crate::basex::{B36, B62};
use crate::hashing::HashKey;

const SIZEOF_RAKE: usize = 16;
const OBJ_TYPE_BITS: u8 = 6;
const OBJ_TYPE_MASK: u8 = (1 << OBJ_TYPE_BITS) - 1;

/// A 16-byte opaque random identifier with a 6-bit type tag packed into the
/// low bits of the last byte. Used to name a caskade and to name mutable
/// link anchors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rake([u8; SIZEOF_RAKE]);

/// Caskade's own reserved object type for its root id, and the type used by
/// [`Rake::null`] to build the caskade-wide sentinel.
pub const RAKE_TYPE_CASKADE: u8 = 1;

impl Rake {
    pub fn build_new(obj_type: u8) -> Result<Rake, String> {
        if obj_type > OBJ_TYPE_MASK {
            return Err(format!("out of range 0-{}: {}", OBJ_TYPE_MASK, obj_type));
        }
        let mut bytes = [0u8; SIZEOF_RAKE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(Rake::tag(bytes, obj_type))
    }

    /// The all-zero id tagged with `obj_type`. `Rake::null(RAKE_TYPE_CASKADE)`
    /// is the reserved null-caskade sentinel named in spec.md §3.
    pub fn null(obj_type: u8) -> Rake {
        Rake::tag([0u8; SIZEOF_RAKE], obj_type)
    }

    fn tag(mut bytes: [u8; SIZEOF_RAKE], obj_type: u8) -> Rake {
        let last = bytes[SIZEOF_RAKE - 1];
        bytes[SIZEOF_RAKE - 1] = (last & !OBJ_TYPE_MASK) | (obj_type & OBJ_TYPE_MASK);
        Rake(bytes)
    }

    pub fn obj_type(&self) -> u8 {
        self.0[SIZEOF_RAKE - 1] & OBJ_TYPE_MASK
    }

    pub fn as_bytes(&self) -> &[u8; SIZEOF_RAKE] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; SIZEOF_RAKE]) -> Rake {
        Rake(bytes)
    }

    pub fn to_b36(&self) -> String {
        B36.encode(&self.0)
    }

    pub fn from_b36(s: &str) -> Option<Rake> {
        let bytes = B36.decode(s, SIZEOF_RAKE)?;
        let mut out = [0u8; SIZEOF_RAKE];
        out.copy_from_slice(&bytes);
        Some(Rake(out))
    }
}

impl fmt::Debug for Rake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rake({})", B62.encode(&self.0))
    }
}

impl fmt::Display for Rake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", B62.encode(&self.0))
    }
}

/// Tag distinguishing what a [`Cake`] points at on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CakeTag {
    /// Sentinel value: no cask / no link target.
    Null = 0,
    /// Points at a cask (`prev_cask_id`, `next_cask_id`, `catalog_id`).
    Cask = 1,
    /// Points at a `DATA` entry's hash (a `LINK`'s `to_id`).
    Data = 2,
}

impl CakeTag {
    fn from_u8(v: u8) -> Option<CakeTag> {
        match v {
            0 => Some(CakeTag::Null),
            1 => Some(CakeTag::Cask),
            2 => Some(CakeTag::Data),
            _ => None,
        }
    }
}

/// A [`HashKey`] tagged with a one-byte purpose: the 33-byte form used in
/// inter-cask links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cake {
    pub tag: CakeTag,
    pub hash: HashKey,
}

impl Cake {
    pub const LEN: usize = 33;

    /// The null sentinel: tag `Null` over the digest of zero bytes, used as
    /// `prev_cask_id` on the bootstrap cask and `next_cask_id` on close.
    pub const NULL: Cake = Cake {
        tag: CakeTag::Null,
        hash: HashKey::NULL,
    };

    pub fn cask(hash: HashKey) -> Cake {
        Cake {
            tag: CakeTag::Cask,
            hash,
        }
    }

    pub fn data(hash: HashKey) -> Cake {
        Cake {
            tag: CakeTag::Data,
            hash,
        }
    }

    pub fn is_null(&self) -> bool {
        self.tag == CakeTag::Null
    }

    pub fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag as u8);
        buf.extend_from_slice(self.hash.as_bytes());
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(Cake, usize), crate::error::NeedMoreBytes> {
        use crate::error::NeedMoreBytes;
        NeedMoreBytes::check(buf, offset + Cake::LEN)?;
        let tag = CakeTag::from_u8(buf[offset]).unwrap_or(CakeTag::Null);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&buf[offset + 1..offset + Cake::LEN]);
        Ok((
            Cake {
                tag,
                hash: HashKey::from_bytes(digest),
            },
            offset + Cake::LEN,
        ))
    }
}

/// Names a single file within a caskade: the caskade's own id plus a
/// monotonic segment index. `idx == 0` is the bootstrap cask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaskId {
    pub caskade_id: Rake,
    pub idx: u64,
}

impl CaskId {
    pub fn bootstrap(caskade_id: Rake) -> CaskId {
        CaskId {
            caskade_id,
            idx: 0,
        }
    }

    pub fn next(&self) -> CaskId {
        CaskId {
            caskade_id: self.caskade_id,
            idx: self.idx + 1,
        }
    }

    pub(crate) fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SIZEOF_RAKE + 10);
        buf.extend_from_slice(self.caskade_id.as_bytes());
        buf.extend(crate::packer::pack_adjsize4(self.idx as usize));
        buf
    }

    /// Filename stem: lowercase base-36 of `caskade_id ‖ idx`.
    pub fn file_stem(&self) -> String {
        B36.encode(&self.to_bytes())
    }

    pub fn from_file_stem(stem: &str) -> Option<CaskId> {
        let bytes = B36.decode_exact(stem)?;
        Self::from_packed(&bytes)
    }

    fn from_packed(bytes: &[u8]) -> Option<CaskId> {
        if bytes.len() < SIZEOF_RAKE {
            return None;
        }
        let mut caskade_bytes = [0u8; SIZEOF_RAKE];
        caskade_bytes.copy_from_slice(&bytes[..SIZEOF_RAKE]);
        let (idx, consumed) = crate::packer::unpack_adjsize4(bytes, SIZEOF_RAKE).ok()?;
        if consumed != bytes.len() {
            return None;
        }
        Some(CaskId {
            caskade_id: Rake(caskade_bytes),
            idx: idx as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rake_tag_survives_round_trip() {
        for t in 0..64u8 {
            let r = Rake::build_new(t).unwrap();
            assert_eq!(r.obj_type(), t);
            let s = r.to_b36();
            let back = Rake::from_b36(&s).unwrap();
            assert_eq!(back, r);
            assert_eq!(back.obj_type(), t);
        }
    }

    #[test]
    fn rake_out_of_range_rejected() {
        assert!(Rake::build_new(64).is_err());
    }

    #[test]
    fn rake_total_order_is_over_bytes() {
        let a = Rake([1u8; 16]);
        let b = Rake([2u8; 16]);
        assert!(a < b);
    }

    #[test]
    fn cask_id_file_stem_round_trips() {
        let caskade_id = Rake::build_new(RAKE_TYPE_CASKADE).unwrap();
        for idx in [0u64, 1, 255, 70000] {
            let id = CaskId { caskade_id, idx };
            let stem = id.file_stem();
            let back = CaskId::from_file_stem(&stem).unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn cake_null_round_trips() {
        let mut buf = Vec::new();
        Cake::NULL.pack(&mut buf);
        assert_eq!(buf.len(), Cake::LEN);
        let (parsed, consumed) = Cake::unpack(&buf, 0).unwrap();
        assert_eq!(consumed, Cake::LEN);
        assert!(parsed.is_null());
    }
}
