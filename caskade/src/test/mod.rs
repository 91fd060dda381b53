//! An in-memory [`FileSystem`] implementation, for running the full
//! caskade state machine against deterministic storage in tests.

use std::collections::HashMap;

use crate::fs::{Fd, FileSystem, FsError};

#[derive(Default)]
pub struct TestFileSystem {
    next_fd: usize,
    by_fd: HashMap<Fd, Vec<u8>>,
    by_name: HashMap<String, Fd>,
    meta: HashMap<String, Vec<u8>>,
}

impl TestFileSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for TestFileSystem {
    fn init(_path: impl Into<std::path::PathBuf>) -> Result<Self, FsError> {
        Ok(TestFileSystem::new())
    }

    fn list_names(&self) -> Result<Vec<String>, FsError> {
        Ok(self.by_name.keys().cloned().collect())
    }

    fn open_or_create(&mut self, name: &str) -> Result<Fd, FsError> {
        if let Some(&fd) = self.by_name.get(name) {
            return Ok(fd);
        }
        self.next_fd += 1;
        let fd = Fd(self.next_fd);
        self.by_fd.insert(fd, Vec::new());
        self.by_name.insert(name.to_owned(), fd);
        Ok(fd)
    }

    fn open_existing(&mut self, name: &str) -> Result<Fd, FsError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FsError::NotFound(name.to_owned()))
    }

    fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), FsError> {
        let fd = self
            .by_name
            .remove(old_name)
            .ok_or_else(|| FsError::NotFound(old_name.to_owned()))?;
        self.by_name.insert(new_name.to_owned(), fd);
        Ok(())
    }

    fn write_at(&mut self, file: Fd, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        let offset = offset as usize;
        let needed = offset + buf.len();
        let data = self
            .by_fd
            .get_mut(&file)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("{file}")))?;
        if data.len() < needed {
            data.resize(needed, 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn read_exact_at(&self, file: Fd, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let offset = offset as usize;
        let data = self
            .by_fd
            .get(&file)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("{file}")))?;
        if offset + buf.len() > data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of file",
            ));
        }
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(())
    }

    fn file_size(&self, file: Fd) -> std::io::Result<u64> {
        self.by_fd
            .get(&file)
            .map(|d| d.len() as u64)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("{file}")))
    }

    fn flush(&mut self, _file: Fd) -> std::io::Result<()> {
        Ok(())
    }

    fn read_meta(&self, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        Ok(self.meta.get(name).cloned())
    }

    fn write_meta(&mut self, name: &str, bytes: &[u8]) -> Result<(), FsError> {
        self.meta.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    #[cfg(any(test, feature = "test-util"))]
    fn truncate(&mut self, name: &str, len: u64) -> Result<(), FsError> {
        let fd = *self
            .by_name
            .get(name)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
        let data = self
            .by_fd
            .get_mut(&fd)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
        data.truncate(len as usize);
        Ok(())
    }
}

unsafe impl Send for TestFileSystem {}
unsafe impl Sync for TestFileSystem {}
