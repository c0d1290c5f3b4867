//! Backing store access.
//!
//! A [`BlockSource`] performs positional reads against the slow store. Every
//! read names its own offset, so concurrent fetches against one handle never
//! contend on a shared cursor.

use crate::block::{BlockNumber, BLOCK_SIZE};
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Positional reader over the backing store.
pub trait BlockSource: Send + Sync + fmt::Debug {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` means end-of-file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Backing file opened on first use.
///
/// The handle is opened at most once and shared by every fetch for the file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Mutex<Option<Arc<File>>>,
}

impl FileSource {
    /// Create a source for `path` without opening it
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), file: Mutex::new(None) }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the backing file has been opened yet
    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    fn handle(&self) -> io::Result<Arc<File>> {
        let mut slot = self.file.lock();
        if let Some(file) = slot.as_ref() {
            return Ok(Arc::clone(file));
        }

        log::debug!("Opening backing file {:?}", self.path);
        let file = Arc::new(File::open(&self.path)?);
        *slot = Some(Arc::clone(&file));
        Ok(file)
    }
}

impl BlockSource for FileSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let file = self.handle()?;
        positional_read(&file, buf, offset)
    }
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Read one whole block from `source`.
///
/// Returns `Ok(None)` when the block starts at or past end-of-file, and a
/// short buffer when end-of-file falls inside the block.
pub fn read_block(source: &dyn BlockSource, block: BlockNumber) -> Result<Option<Bytes>> {
    let offset = u64::try_from(block.offset())
        .map_err(|_| Error::invalid_argument(format!("negative block number {}", block)))?;

    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut filled = 0;

    // A positional read may return fewer bytes than asked without being at EOF
    while filled < BLOCK_SIZE {
        match source.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::BackingRead { block, source: e }),
        }
    }

    if filled == 0 {
        return Ok(None);
    }

    buf.truncate(filled);
    Ok(Some(Bytes::from(buf)))
}
