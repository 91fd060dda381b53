//! `CaskFile`: one append-only segment file. Owns its catalog, its
//! [`SegmentTracker`], and the sequencing of checkpoints and rollovers
//! described in spec §4.6.

use crate::buffer::FileBytes;
use crate::catalog::{Catalog, JotCode};
use crate::config::CaskadeConfig;
use crate::error::CaskadeError;
use crate::fs::FileSystem;
use crate::fs::Fd;
use crate::hashing::HashKey;
use crate::ids::{Cake, CaskId, Rake};
use crate::model::{CheckPoint, ReadOptions, ReplayState};
use crate::packer::{pack_adjsize4, unpack_adjsize4, NanoTime};
use crate::record::{
    frame_entry, CaskHeaderEntry, CheckPointType, CheckpointHeader, LinkHeader, NextCaskHeader,
    Stamp,
};
use crate::segment::SegmentTracker;

/// An open cask: its handle, its current on-disk name (with `.active` or
/// `.cask` suffix), its merged catalog, and the tracker for its unsealed
/// tail segment.
#[derive(Debug)]
pub struct CaskFile {
    pub cask_id: CaskId,
    pub name: String,
    fd: Fd,
    pub catalog: Catalog,
    tracker: SegmentTracker,
}

fn active_name(cask_id: &CaskId) -> String {
    format!("{}.active", cask_id.file_stem())
}

fn sealed_name(cask_id: &CaskId) -> String {
    format!("{}.cask", cask_id.file_stem())
}

impl CaskFile {
    fn append_raw<T: FileSystem>(&mut self, fs: &mut T, bytes: &[u8]) -> Result<(), CaskadeError> {
        let mut written = 0;
        while written < bytes.len() {
            written += fs.write_at(self.fd, &bytes[written..], self.tracker.current_offset + written as u64)?;
        }
        fs.flush(self.fd)?;
        self.tracker.update(bytes);
        Ok(())
    }

    /// Writes this cask's `CASK_HEADER` and returns the file plus the
    /// virtual `ON_CASK_HEADER` checkpoint (never persisted).
    fn bootstrap_header<T: FileSystem>(
        fs: &mut T,
        cask_id: CaskId,
        catalog: Catalog,
        prev_cask_id: Cake,
        prev_checkpoint_id: HashKey,
    ) -> Result<(CaskFile, CheckPoint), CaskadeError> {
        let name = active_name(&cask_id);
        let fd = fs.open_or_create(&name)?;

        let mut file = CaskFile {
            cask_id,
            name,
            fd,
            catalog: catalog.clone(),
            tracker: SegmentTracker::new(0),
        };

        let header = CaskHeaderEntry {
            caskade_id: cask_id.caskade_id,
            prev_checkpoint_id,
            prev_cask_id,
            catalog_id: Cake::cask(catalog.key),
        };
        let mut header_bytes = Vec::new();
        header.pack(&mut header_bytes);
        let record = frame_entry(JotCode::CaskHeader.code(), &header_bytes, Some(&catalog.binary));
        file.append_raw(fs, &record)?;
        // The unsealed tail segment starts after the header entry itself,
        // matching how `write_checkpoint` excludes its own sealing entry
        // from the segment it hands to the successor tracker.
        file.tracker = SegmentTracker::new(file.tracker.current_offset);

        let virtual_checkpoint = CheckPoint {
            cask_id,
            checkpoint_id: HashKey::NULL,
            start: file.tracker.current_offset as u32,
            end: file.tracker.current_offset as u32,
            cp_type: CheckPointType::OnCaskHeader,
        };

        Ok((file, virtual_checkpoint))
    }

    /// Creates the very first cask in a fresh caskade.
    pub fn create_bootstrap<T: FileSystem>(
        fs: &mut T,
        caskade_id: Rake,
    ) -> Result<(CaskFile, CheckPoint), CaskadeError> {
        Self::bootstrap_header(
            fs,
            CaskId::bootstrap(caskade_id),
            Catalog::base(),
            Cake::NULL,
            HashKey::NULL,
        )
    }

    /// Creates the next cask after `self` has been sealed by a rollover.
    pub fn create_successor<T: FileSystem>(
        fs: &mut T,
        prev: &CaskFile,
        prev_terminal: &CheckPoint,
    ) -> Result<(CaskFile, CheckPoint), CaskadeError> {
        let next_id = prev.cask_id.next();
        let prev_cask_id = Cake::cask(HashKey::of(&prev.cask_id.to_bytes()));
        Self::bootstrap_header(
            fs,
            next_id,
            prev.catalog.clone(),
            prev_cask_id,
            prev_terminal.checkpoint_id,
        )
    }

    /// Seals the current segment into an on-disk `CHECK_POINT`, resets the
    /// tracker, and returns the recorded checkpoint.
    pub fn write_checkpoint<T: FileSystem>(
        &mut self,
        fs: &mut T,
        config: &CaskadeConfig,
        cp_type: CheckPointType,
    ) -> Result<CheckPoint, CaskadeError> {
        let tracker = std::mem::replace(&mut self.tracker, SegmentTracker::new(0));
        let (start, end, digest) = tracker.seal();

        let header = CheckpointHeader {
            checkpoint_id: digest,
            start: start as u32,
            end: end as u32,
            cp_type,
        };
        let mut header_bytes = Vec::new();
        header.pack(&mut header_bytes);
        let signature = config.sign(&header_bytes);
        let record = frame_entry(JotCode::CheckPoint.code(), &header_bytes, Some(&signature));

        self.tracker = SegmentTracker::new(end);
        self.append_raw(fs, &record)?;
        // Successor segment excludes the checkpoint entry that just sealed
        // the previous one.
        self.tracker = SegmentTracker::new(self.tracker.current_offset);

        Ok(CheckPoint {
            cask_id: self.cask_id,
            checkpoint_id: digest,
            start: start as u32,
            end: end as u32,
            cp_type,
        })
    }

    fn append_data_like<T: FileSystem>(&mut self, fs: &mut T, record: &[u8]) -> Result<(), CaskadeError> {
        self.append_raw(fs, record)
    }

    pub fn will_it_spill(
        &self,
        config: &CaskadeConfig,
        now: NanoTime,
        next_entry_size: u64,
    ) -> Option<CheckPointType> {
        self.tracker.will_it_spill(config, now, next_entry_size)
    }

    /// Appends a `DATA` entry and returns where its payload landed.
    pub fn write_data<T: FileSystem>(
        &mut self,
        fs: &mut T,
        hash: HashKey,
        bytes: &[u8],
    ) -> Result<(u64, usize), CaskadeError> {
        let record = frame_entry(JotCode::Data.code(), hash.as_bytes(), Some(bytes));
        let payload_offset =
            self.tracker.current_offset + Stamp::LEN as u64 + HashKey::LEN as u64 + pack_adjsize4(bytes.len()).len() as u64;
        self.append_data_like(fs, &record)?;
        Ok((payload_offset, bytes.len()))
    }

    /// Appends a `LINK` entry.
    pub fn write_link<T: FileSystem>(
        &mut self,
        fs: &mut T,
        from_id: Rake,
        purpose: u8,
        to_id: Cake,
    ) -> Result<(), CaskadeError> {
        let header = LinkHeader {
            from_id,
            purpose,
            to_id,
        };
        let mut header_bytes = Vec::new();
        header.pack(&mut header_bytes);
        let record = frame_entry(JotCode::Link.code(), &header_bytes, None);
        self.append_data_like(fs, &record)
    }

    /// Appends the `NEXT_CASK` entry naming `next_cask_id`, the first half
    /// of the two-entry rollover/close sequence.
    pub fn write_next_cask<T: FileSystem>(
        &mut self,
        fs: &mut T,
        next_cask_id: Cake,
    ) -> Result<(), CaskadeError> {
        let header = NextCaskHeader { next_cask_id };
        let mut header_bytes = Vec::new();
        header.pack(&mut header_bytes);
        let record = frame_entry(JotCode::NextCask.code(), &header_bytes, None);
        self.append_data_like(fs, &record)
    }

    /// Renames this cask's file from `.active` to `.cask`, marking it
    /// sealed. Called after the terminal checkpoint of a rollover or close.
    pub fn seal<T: FileSystem>(&mut self, fs: &mut T) -> Result<(), CaskadeError> {
        let new_name = sealed_name(&self.cask_id);
        fs.rename(&self.name, &new_name)?;
        self.name = new_name;
        Ok(())
    }

    /// Reads `size` bytes at `offset` from this cask's file.
    pub fn fragment<T: FileSystem>(
        &self,
        fs: &T,
        offset: u64,
        size: usize,
    ) -> Result<Vec<u8>, CaskadeError> {
        let mut pager = FileBytes::new(fs, self.fd);
        Ok(pager.read(offset, size)?)
    }

    /// Sequentially decodes every record in `name`, folding the results
    /// into `state`, and returns the reconstructed file (positioned so
    /// further writes continue the unsealed tail segment).
    pub fn read_file<T: FileSystem>(
        fs: &mut T,
        name: &str,
        cask_id: CaskId,
        config: &CaskadeConfig,
        opts: ReadOptions,
        state: &mut ReplayState,
    ) -> Result<CaskFile, CaskadeError> {
        let fd = fs.open_existing(name)?;
        let size = fs.file_size(fd)?;

        let readonly_fs: &T = &*fs;
        let mut pager = FileBytes::new(readonly_fs, fd);
        let whole = pager.read(0, size as usize)?;

        let mut catalog = Catalog::base();
        let mut offset = 0usize;
        let mut segment_start = 0usize;

        while offset < whole.len() {
            let record_start = offset;
            let stamp_res = Stamp::unpack(&whole, offset);
            let (stamp, new_offset) = match stamp_res {
                Ok(v) => v,
                Err(_) => break,
            };
            offset = new_offset;

            let known = JotCode::from_code(stamp.entry_code);
            let item = catalog.find(stamp.entry_code).cloned();
            let header_len = item.as_ref().map(|i| i.header_size as usize).unwrap_or(0);
            let has_payload = item.as_ref().map(|i| i.has_payload).unwrap_or(false);

            if whole.len() < offset + header_len {
                offset = record_start;
                break;
            }
            let header_bytes = whole[offset..offset + header_len].to_vec();
            offset += header_len;

            let payload = if has_payload {
                match unpack_adjsize4(&whole, offset) {
                    Ok((len, after_len)) => {
                        if whole.len() < after_len + len {
                            offset = record_start;
                            break;
                        }
                        let p = whole[after_len..after_len + len].to_vec();
                        offset = after_len + len;
                        Some(p)
                    }
                    Err(_) => {
                        offset = record_start;
                        break;
                    }
                }
            } else {
                None
            };

            match known {
                Some(JotCode::CaskHeader) => {
                    let (_header, _) = CaskHeaderEntry::unpack(&header_bytes, 0)
                        .map_err(|e| CaskadeError::Format(e.to_string()))?;
                    if let Some(payload) = &payload {
                        catalog = Catalog::merge_from_disk(payload)?;
                    }
                    segment_start = offset;
                    state.check_points.push(CheckPoint {
                        cask_id,
                        checkpoint_id: HashKey::NULL,
                        start: offset as u32,
                        end: offset as u32,
                        cp_type: CheckPointType::OnCaskHeader,
                    });
                }
                Some(JotCode::Data) => {
                    if header_bytes.len() != HashKey::LEN {
                        return Err(CaskadeError::Format("DATA header truncated".to_owned()));
                    }
                    let mut digest = [0u8; 32];
                    digest.copy_from_slice(&header_bytes);
                    let hash = HashKey::from_bytes(digest);
                    let payload = payload.unwrap_or_default();
                    if opts.validate_data && HashKey::of(&payload) != hash {
                        return Err(CaskadeError::DataValidation(hash.to_string()));
                    }
                    let payload_offset = offset - payload.len();
                    state.data_locations.insert(
                        hash,
                        crate::model::DataLocation {
                            cask_id,
                            offset: payload_offset,
                            size: payload.len(),
                        },
                    );
                }
                Some(JotCode::Link) => {
                    let (link, _) = LinkHeader::unpack(&header_bytes, 0)
                        .map_err(|e| CaskadeError::Format(e.to_string()))?;
                    state
                        .datalinks
                        .entry(link.from_id)
                        .or_default()
                        .insert(link.purpose, link.to_id.hash);
                }
                Some(JotCode::CheckPoint) => {
                    let (cp_header, _) = CheckpointHeader::unpack(&header_bytes, 0)
                        .map_err(|e| CaskadeError::Format(e.to_string()))?;
                    let signature = payload.unwrap_or_default();
                    if opts.validate_signatures
                        && !signature.is_empty()
                        && !config.validate_signature(&header_bytes, &signature)
                    {
                        return Err(CaskadeError::Signature);
                    }
                    if opts.validate_checkpoints && cp_header.start < cp_header.end {
                        let segment = whole[cp_header.start as usize..cp_header.end as usize].to_vec();
                        if HashKey::of(&segment) != cp_header.checkpoint_id {
                            return Err(CaskadeError::DataValidation(
                                cp_header.checkpoint_id.to_string(),
                            ));
                        }
                    }
                    segment_start = offset;
                    state.check_points.push(CheckPoint {
                        cask_id,
                        checkpoint_id: cp_header.checkpoint_id,
                        start: cp_header.start,
                        end: cp_header.end,
                        cp_type: cp_header.cp_type,
                    });
                }
                Some(JotCode::NextCask) => {
                    let (_next, _) = NextCaskHeader::unpack(&header_bytes, 0)
                        .map_err(|e| CaskadeError::Format(e.to_string()))?;
                }
                None => {
                    // Surrogate type: already skipped via catalog-driven
                    // header_len/has_payload above.
                }
            }
        }

        let tail = &whole[segment_start..offset];
        let mut tracker = SegmentTracker::new(segment_start as u64);
        tracker.update(tail);

        Ok(CaskFile {
            cask_id,
            name: name.to_owned(),
            fd,
            catalog,
            tracker,
        })
    }
}
