//! Stamp and type-specific record headers from spec.md §4.4's wire table.

use crate::error::NeedMoreBytes;
use crate::ids::Cake;
use crate::ids::Rake;
use crate::hashing::HashKey;
use crate::packer::{
    pack_adjsize4, read_nanotime, read_u32_le, read_u8, write_nanotime, write_u32_le, write_u8,
    NanoTime,
};

/// Frames a full on-disk record: `Stamp ‖ header ‖ [adjsize4(len) ‖ payload]`.
pub fn frame_entry(entry_code: u8, header: &[u8], payload: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(Stamp::LEN + header.len() + payload.map_or(0, |p| p.len() + 4));
    Stamp::now(entry_code).pack(&mut buf);
    buf.extend_from_slice(header);
    if let Some(p) = payload {
        buf.extend(pack_adjsize4(p.len()));
        buf.extend_from_slice(p);
    }
    buf
}

/// The universal 9-byte prefix on every entry: `entry_code ‖ nanotime`.
#[derive(Debug, Clone, Copy)]
pub struct Stamp {
    pub entry_code: u8,
    pub tstamp: NanoTime,
}

impl Stamp {
    pub const LEN: usize = 9;

    pub fn now(entry_code: u8) -> Stamp {
        Stamp {
            entry_code,
            tstamp: NanoTime::now(),
        }
    }

    pub fn pack(&self, buf: &mut Vec<u8>) {
        write_u8(buf, self.entry_code);
        write_nanotime(buf, self.tstamp);
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(Stamp, usize), NeedMoreBytes> {
        let (entry_code, offset) = read_u8(buf, offset)?;
        let (tstamp, offset) = read_nanotime(buf, offset)?;
        Ok((
            Stamp {
                entry_code,
                tstamp,
            },
            offset,
        ))
    }
}

/// `CASK_HEADER` header: the first entry in every cask.
#[derive(Debug, Clone, Copy)]
pub struct CaskHeaderEntry {
    pub caskade_id: Rake,
    pub prev_checkpoint_id: HashKey,
    pub prev_cask_id: Cake,
    pub catalog_id: Cake,
}

impl CaskHeaderEntry {
    pub fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.caskade_id.as_bytes());
        buf.extend_from_slice(self.prev_checkpoint_id.as_bytes());
        self.prev_cask_id.pack(buf);
        self.catalog_id.pack(buf);
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(CaskHeaderEntry, usize), NeedMoreBytes> {
        NeedMoreBytes::check(buf, offset + 16)?;
        let mut caskade_bytes = [0u8; 16];
        caskade_bytes.copy_from_slice(&buf[offset..offset + 16]);
        let offset = offset + 16;

        NeedMoreBytes::check(buf, offset + 32)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&buf[offset..offset + 32]);
        let prev_checkpoint_id = HashKey::from_bytes(digest);
        let offset = offset + 32;

        let (prev_cask_id, offset) = Cake::unpack(buf, offset)?;
        let (catalog_id, offset) = Cake::unpack(buf, offset)?;

        Ok((
            CaskHeaderEntry {
                caskade_id: Rake::from_bytes(caskade_bytes),
                prev_checkpoint_id,
                prev_cask_id,
                catalog_id,
            },
            offset,
        ))
    }
}

/// `LINK` header: `from_id ‖ purpose ‖ to_id`.
#[derive(Debug, Clone, Copy)]
pub struct LinkHeader {
    pub from_id: Rake,
    pub purpose: u8,
    pub to_id: Cake,
}

impl LinkHeader {
    pub fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.from_id.as_bytes());
        write_u8(buf, self.purpose);
        self.to_id.pack(buf);
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(LinkHeader, usize), NeedMoreBytes> {
        NeedMoreBytes::check(buf, offset + 16)?;
        let mut from_bytes = [0u8; 16];
        from_bytes.copy_from_slice(&buf[offset..offset + 16]);
        let offset = offset + 16;

        let (purpose, offset) = read_u8(buf, offset)?;
        let (to_id, offset) = Cake::unpack(buf, offset)?;

        Ok((
            LinkHeader {
                from_id: Rake::from_bytes(from_bytes),
                purpose,
                to_id,
            },
            offset,
        ))
    }
}

/// The reason a segment was sealed. `OnCaskHeader` is virtual: it never
/// appears on disk, only in `Caskade::check_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CheckPointType {
    Manual = 0,
    OnSize = 1,
    OnTime = 2,
    OnNextCask = 3,
    OnCaskadeClose = 4,
    OnCaskadePause = 5,
    OnCaskadeResume = 6,
    OnCaskadeRecover = 7,
    OnCaskHeader = 8,
}

impl CheckPointType {
    pub fn from_u8(v: u8) -> Option<CheckPointType> {
        use CheckPointType::*;
        match v {
            0 => Some(Manual),
            1 => Some(OnSize),
            2 => Some(OnTime),
            3 => Some(OnNextCask),
            4 => Some(OnCaskadeClose),
            5 => Some(OnCaskadePause),
            6 => Some(OnCaskadeResume),
            7 => Some(OnCaskadeRecover),
            8 => Some(OnCaskHeader),
            _ => None,
        }
    }
}

/// `CHECK_POINT` header: `checkpoint_id ‖ start ‖ end ‖ type`.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointHeader {
    pub checkpoint_id: HashKey,
    pub start: u32,
    pub end: u32,
    pub cp_type: CheckPointType,
}

impl CheckpointHeader {
    pub fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.checkpoint_id.as_bytes());
        write_u32_le(buf, self.start);
        write_u32_le(buf, self.end);
        write_u8(buf, self.cp_type as u8);
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(CheckpointHeader, usize), NeedMoreBytes> {
        NeedMoreBytes::check(buf, offset + 32)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&buf[offset..offset + 32]);
        let offset = offset + 32;

        let (start, offset) = read_u32_le(buf, offset)?;
        let (end, offset) = read_u32_le(buf, offset)?;
        let (cp_type_raw, offset) = read_u8(buf, offset)?;
        let cp_type = CheckPointType::from_u8(cp_type_raw).unwrap_or(CheckPointType::Manual);

        Ok((
            CheckpointHeader {
                checkpoint_id: HashKey::from_bytes(digest),
                start,
                end,
                cp_type,
            },
            offset,
        ))
    }
}

/// `NEXT_CASK` header: just the next cask's tagged id.
#[derive(Debug, Clone, Copy)]
pub struct NextCaskHeader {
    pub next_cask_id: Cake,
}

impl NextCaskHeader {
    pub fn pack(&self, buf: &mut Vec<u8>) {
        self.next_cask_id.pack(buf);
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Result<(NextCaskHeader, usize), NeedMoreBytes> {
        let (next_cask_id, offset) = Cake::unpack(buf, offset)?;
        Ok((NextCaskHeader { next_cask_id }, offset))
    }
}
