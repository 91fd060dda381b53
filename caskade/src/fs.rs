//! File system abstraction: a directory of named files, addressed by full
//! filename (stem + suffix) rather than a single active/immutable pair, so
//! a caskade's casks can be opened, discovered, and appended to
//! independently. See spec §6 for the directory layout this names.

use std::{
    backtrace::Backtrace,
    fmt, io,
    path::PathBuf,
};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
        backtrace: Backtrace,
    },
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

/// Opaque handle to an open file, scoped to one [`FileSystem`] instance.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fd(pub(crate) usize);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fd({})", self.0)
    }
}

/// Basic file system operations a caskade directory needs. Implementations
/// do not need to be threadsafe; a caskade serializes access to its own
/// files via `&mut Caskade`.
pub trait FileSystem: Send + Sync {
    /// Opens the directory this caskade lives in.
    fn init(path: impl Into<PathBuf>) -> Result<Self, FsError>
    where
        Self: Sized;

    /// Every file name currently present directly under the caskade
    /// directory (e.g. `"<b36>.active"`, `"<b36>.cask"`), for discovering
    /// casks on open. Excludes the `.hs_etc` metadata directory.
    fn list_names(&self) -> Result<Vec<String>, FsError>;

    /// Opens `name` for read/write, creating it if it does not exist yet.
    fn open_or_create(&mut self, name: &str) -> Result<Fd, FsError>;

    /// Opens `name` for read only; errors if it does not exist.
    fn open_existing(&mut self, name: &str) -> Result<Fd, FsError>;

    /// Renames an open file, e.g. sealing `<b36>.active` into `<b36>.cask`
    /// on rollover or close. The `Fd` is unaffected.
    fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), FsError>;

    /// Writes `buf` at `offset`. Takes `&mut self`: a caskade only ever
    /// writes through `&mut Caskade`, so this is never called concurrently
    /// with another write to the same store.
    fn write_at(&mut self, file: Fd, buf: &[u8], offset: u64) -> io::Result<usize>;
    fn read_exact_at(&self, file: Fd, buf: &mut [u8], offset: u64) -> io::Result<()>;
    fn file_size(&self, file: Fd) -> io::Result<u64>;
    fn flush(&mut self, file: Fd) -> io::Result<()>;

    /// Reads `<dir>/.hs_etc/<name>` in full, if present.
    fn read_meta(&self, name: &str) -> Result<Option<Vec<u8>>, FsError>;
    /// Writes `<dir>/.hs_etc/<name>` atomically, creating `.hs_etc` as needed.
    fn write_meta(&mut self, name: &str, bytes: &[u8]) -> Result<(), FsError>;

    /// Truncates `name`'s file to `len` bytes. Only used to simulate a
    /// crash mid-write in tests.
    #[cfg(any(test, feature = "test-util"))]
    fn truncate(&mut self, name: &str, len: u64) -> Result<(), FsError>;
}

mod concrete {
    use std::{
        collections::HashMap,
        fs::{self, File, OpenOptions},
        io,
        os::unix::fs::FileExt,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tracing::{instrument, trace};

    use super::{Fd, FsError};

    const META_DIR: &str = ".hs_etc";

    /// Implements [`FileSystem`](super::FileSystem) over a real directory.
    pub struct ConcreteSystem {
        fd_num: AtomicUsize,
        by_fd: HashMap<Fd, File>,
        by_name: HashMap<String, Fd>,
        dir: PathBuf,
    }

    impl ConcreteSystem {
        fn next_fd(&self) -> Fd {
            Fd(self.fd_num.fetch_add(1, Ordering::Relaxed))
        }

        fn path_for(&self, name: &str) -> PathBuf {
            self.dir.join(name)
        }
    }

    impl super::FileSystem for ConcreteSystem {
        fn init(path: impl Into<PathBuf>) -> Result<Self, FsError> {
            let dir = path.into();
            fs::create_dir_all(&dir)?;
            Ok(ConcreteSystem {
                fd_num: AtomicUsize::new(1),
                by_fd: HashMap::new(),
                by_name: HashMap::new(),
                dir,
            })
        }

        fn list_names(&self) -> Result<Vec<String>, FsError> {
            let mut names = Vec::new();
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    names.push(name.to_owned());
                }
            }
            Ok(names)
        }

        #[instrument(skip(self))]
        fn open_or_create(&mut self, name: &str) -> Result<Fd, FsError> {
            if let Some(&fd) = self.by_name.get(name) {
                return Ok(fd);
            }
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(self.path_for(name))?;
            let fd = self.next_fd();
            trace!(name, fd = ?fd, "opened cask file");
            self.by_fd.insert(fd, file);
            self.by_name.insert(name.to_owned(), fd);
            Ok(fd)
        }

        fn open_existing(&mut self, name: &str) -> Result<Fd, FsError> {
            if let Some(&fd) = self.by_name.get(name) {
                return Ok(fd);
            }
            let path = self.path_for(name);
            if !path.exists() {
                return Err(FsError::NotFound(name.to_owned()));
            }
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            let fd = self.next_fd();
            self.by_fd.insert(fd, file);
            self.by_name.insert(name.to_owned(), fd);
            Ok(fd)
        }

        fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), FsError> {
            fs::rename(self.path_for(old_name), self.path_for(new_name))?;
            if let Some(fd) = self.by_name.remove(old_name) {
                self.by_name.insert(new_name.to_owned(), fd);
            }
            Ok(())
        }

        fn write_at(&mut self, file: Fd, buf: &[u8], offset: u64) -> io::Result<usize> {
            let f = self
                .by_fd
                .get(&file)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{file}")))?;
            f.write_at(buf, offset)
        }

        fn read_exact_at(&self, file: Fd, buf: &mut [u8], offset: u64) -> io::Result<()> {
            let f = self
                .by_fd
                .get(&file)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{file}")))?;
            f.read_exact_at(buf, offset)
        }

        fn file_size(&self, file: Fd) -> io::Result<u64> {
            let f = self
                .by_fd
                .get(&file)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{file}")))?;
            Ok(f.metadata()?.len())
        }

        fn flush(&mut self, file: Fd) -> io::Result<()> {
            let f = self
                .by_fd
                .get_mut(&file)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{file}")))?;
            f.sync_all()
        }

        fn read_meta(&self, name: &str) -> Result<Option<Vec<u8>>, FsError> {
            let path = self.dir.join(META_DIR).join(name);
            if !path.exists() {
                return Ok(None);
            }
            Ok(Some(fs::read(path)?))
        }

        fn write_meta(&mut self, name: &str, bytes: &[u8]) -> Result<(), FsError> {
            let meta_dir = self.dir.join(META_DIR);
            fs::create_dir_all(&meta_dir)?;
            fs::write(meta_dir.join(name), bytes)?;
            Ok(())
        }

        #[cfg(any(test, feature = "test-util"))]
        fn truncate(&mut self, name: &str, len: u64) -> Result<(), FsError> {
            let fd = *self
                .by_name
                .get(name)
                .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
            let f = self.by_fd.get(&fd).ok_or_else(|| FsError::NotFound(name.to_owned()))?;
            f.set_len(len)?;
            Ok(())
        }
    }

    unsafe impl Send for ConcreteSystem {}
    unsafe impl Sync for ConcreteSystem {}
}

pub use concrete::ConcreteSystem;
