//! Tracks a cask's unsealed segment: bytes written since the last checkpoint,
//! a running hash over them, and the policy deciding when a segment must
//! spill into a checkpoint (or a whole new cask).

use crate::config::CaskadeConfig;
use crate::hashing::{HashKey, Hasher};
use crate::packer::NanoTime;
use crate::record::CheckPointType;

/// Headroom kept below `max_cask_size` so a checkpoint + `NEXT_CASK` pair
/// always has room to land without itself tripping a second rollover.
const ROLLOVER_HEADROOM: u64 = 4096;

#[derive(Debug)]
pub struct SegmentTracker {
    hasher: Hasher,
    /// File offset where the current (unsealed) segment begins.
    pub start_offset: u64,
    /// File offset of the next byte to be written.
    pub current_offset: u64,
    first_activity_since_checkpoint: Option<NanoTime>,
}

impl SegmentTracker {
    pub fn new(start_offset: u64) -> SegmentTracker {
        SegmentTracker {
            hasher: Hasher::new(),
            start_offset,
            current_offset: start_offset,
            first_activity_since_checkpoint: None,
        }
    }

    /// Folds freshly written bytes into the running hash and offset.
    pub fn update(&mut self, buf: &[u8]) {
        if self.first_activity_since_checkpoint.is_none() {
            self.first_activity_since_checkpoint = Some(NanoTime::now());
        }
        self.hasher.update(buf);
        self.current_offset += buf.len() as u64;
    }

    pub fn bytes_since_checkpoint(&self) -> u64 {
        self.current_offset - self.start_offset
    }

    /// Decides whether the next write of `next_entry_size` bytes must be
    /// preceded by a checkpoint, and if so, whether that checkpoint must in
    /// turn end the cask (`OnNextCask`) rather than merely seal the segment.
    pub fn will_it_spill(
        &self,
        config: &CaskadeConfig,
        now: NanoTime,
        next_entry_size: u64,
    ) -> Option<CheckPointType> {
        let projected_file_size = self.current_offset + next_entry_size;
        if projected_file_size + ROLLOVER_HEADROOM > config.max_cask_size {
            return Some(CheckPointType::OnNextCask);
        }

        if let Some(ttl) = config.checkpoint_ttl {
            if let Some(first) = self.first_activity_since_checkpoint {
                let elapsed_ms = now.0.saturating_sub(first.0) / 1_000_000;
                if elapsed_ms >= ttl {
                    return Some(CheckPointType::OnTime);
                }
            }
        }

        let projected_segment_size = self.bytes_since_checkpoint() + next_entry_size;
        if projected_segment_size > config.checkpoint_size {
            return Some(CheckPointType::OnSize);
        }

        None
    }

    /// Digest over every byte written since the last checkpoint (or cask
    /// start). Consumes the tracker's hasher; callers re-create a fresh
    /// tracker for the next segment via [`SegmentTracker::new`].
    pub fn seal(self) -> (u64, u64, HashKey) {
        let end = self.current_offset;
        let start = self.start_offset;
        (start, end, self.hasher.digest())
    }
}
