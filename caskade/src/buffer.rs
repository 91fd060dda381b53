//! Paged, cached view over one open cask file, used by replay and by
//! `fragment` reads. Pages are 16 KiB; a small LRU keeps the hot set bounded
//! and sequential scans avoid re-seeking across a page boundary they already
//! hold.

use std::collections::VecDeque;

use crate::fs::{Fd, FileSystem};

pub const PAGE_SIZE: u64 = 16 * 1024;
const MAX_CACHED_PAGES: usize = 64;

struct Page {
    index: u64,
    bytes: Vec<u8>,
}

/// Caches fixed-size pages of `fd` read through `fs`. Reads spanning a page
/// boundary are served by reading each touched page once.
pub struct FileBytes<'a, T: FileSystem> {
    fs: &'a T,
    fd: Fd,
    pages: VecDeque<Page>,
}

impl<'a, T: FileSystem> FileBytes<'a, T> {
    pub fn new(fs: &'a T, fd: Fd) -> FileBytes<'a, T> {
        FileBytes {
            fs,
            fd,
            pages: VecDeque::new(),
        }
    }

    fn page_for(&mut self, index: u64) -> std::io::Result<&[u8]> {
        if let Some(pos) = self.pages.iter().position(|p| p.index == index) {
            let page = self.pages.remove(pos).unwrap();
            self.pages.push_back(page);
        } else {
            let size = self.fs.file_size(self.fd)?;
            let start = index * PAGE_SIZE;
            let len = PAGE_SIZE.min(size.saturating_sub(start)) as usize;
            let mut bytes = vec![0u8; len];
            if len > 0 {
                self.fs.read_exact_at(self.fd, &mut bytes, start)?;
            }
            if self.pages.len() >= MAX_CACHED_PAGES {
                self.pages.pop_front();
            }
            self.pages.push_back(Page { index, bytes });
        }
        Ok(&self.pages.back().unwrap().bytes)
    }

    /// Reads exactly `len` bytes starting at `offset`, stitching across
    /// page boundaries as needed.
    pub fn read(&mut self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        let end = offset + len as u64;
        while pos < end {
            let index = pos / PAGE_SIZE;
            let page_offset = (pos % PAGE_SIZE) as usize;
            let page = self.page_for(index)?;
            if page_offset >= page.len() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "read past end of file",
                ));
            }
            let take = ((end - pos) as usize).min(page.len() - page_offset);
            out.extend_from_slice(&page[page_offset..page_offset + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    pub fn file_size(&self) -> std::io::Result<u64> {
        self.fs.file_size(self.fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::test::TestFileSystem;

    #[test]
    fn reads_across_page_boundary() {
        let mut fs = TestFileSystem::new();
        let fd = fs.open_or_create("x").unwrap();
        let data: Vec<u8> = (0..(PAGE_SIZE as usize * 2 + 10))
            .map(|i| (i % 251) as u8)
            .collect();
        fs.write_at(fd, &data, 0).unwrap();

        let mut buf = FileBytes::new(&fs, fd);
        let chunk = buf.read(PAGE_SIZE - 5, 20).unwrap();
        assert_eq!(chunk, data[(PAGE_SIZE as usize - 5)..(PAGE_SIZE as usize + 15)]);
    }

    #[test]
    fn sequential_reads_reuse_cached_pages() {
        let mut fs = TestFileSystem::new();
        let fd = fs.open_or_create("x").unwrap();
        let data: Vec<u8> = (0..(PAGE_SIZE as usize)).map(|i| (i % 251) as u8).collect();
        fs.write_at(fd, &data, 0).unwrap();

        let mut buf = FileBytes::new(&fs, fd);
        for offset in (0..data.len() - 4).step_by(4) {
            let chunk = buf.read(offset as u64, 4).unwrap();
            assert_eq!(chunk, data[offset..offset + 4]);
        }
    }
}
