//! Mount-level lifecycle: one worker pool shared by every cached file.

use crate::cache::CachedFile;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A mounted SmoothFS instance.
///
/// Created when the front end mounts the filesystem and torn down on
/// unmount. Files opened through it share the worker pool but never share
/// blocks.
#[derive(Debug)]
pub struct SmoothFs {
    src_dir: PathBuf,
    cache_dir: PathBuf,
    options: Options,
    pool: WorkerPool,
}

impl SmoothFs {
    /// Mount a cache in front of `src_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - `src_dir` does not exist or is not a directory
    /// - The worker threads cannot be started
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use smoothfs::{Options, SmoothFs};
    ///
    /// # fn main() -> Result<(), smoothfs::Error> {
    /// let fs = SmoothFs::mount("/mnt/remote", "/var/cache/smoothfs", Options::default())?;
    /// let file = fs.open("movies/big.mkv")?;
    /// let header = file.read(0, 4096)?;
    /// # drop(header);
    /// fs.unmount()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn mount<P: AsRef<Path>, Q: AsRef<Path>>(src_dir: P, cache_dir: Q, options: Options) -> Result<Self> {
        options.validate()?;

        let src_dir = src_dir.as_ref();
        let src_dir = src_dir
            .canonicalize()
            .map_err(|e| Error::not_found(format!("source directory {:?}: {}", src_dir, e)))?;
        if !src_dir.is_dir() {
            return Err(Error::not_found(format!("source {:?} is not a directory", src_dir)));
        }

        let cache_dir = std::path::absolute(cache_dir.as_ref())?;
        let pool = WorkerPool::start(options.worker_count)?;

        log::info!(
            "Mounted {:?} (cache {:?}) with {} workers, eviction threshold {}",
            src_dir,
            cache_dir,
            options.worker_count,
            options.eviction_threshold
        );

        Ok(Self { src_dir, cache_dir, options, pool })
    }

    /// Open `rel_path` (relative to the source directory) for cached reading.
    ///
    /// Each call returns an independent [`CachedFile`] with an empty cache.
    pub fn open<P: AsRef<Path>>(&self, rel_path: P) -> Result<Arc<CachedFile>> {
        let rel_path = rel_path.as_ref();
        let confined = rel_path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined || rel_path.as_os_str().is_empty() {
            return Err(Error::invalid_argument(format!(
                "{:?} must be a relative path inside the mount",
                rel_path
            )));
        }

        let src_path = self.src_dir.join(rel_path);
        let metadata = std::fs::metadata(&src_path)
            .map_err(|e| Error::not_found(format!("{:?}: {}", src_path, e)))?;
        if !metadata.is_file() {
            return Err(Error::not_found(format!("{:?} is not a regular file", src_path)));
        }

        log::debug!("Opening cached file {:?}", src_path);
        let cache_path = self.cache_dir.join(rel_path);
        Ok(CachedFile::open(src_path, cache_path, self.pool.queue(), &self.options))
    }

    /// Close the work queue and wait for the workers to drain it.
    ///
    /// Files still held by the front end fail further reads with `ShutDown`.
    pub fn unmount(self) -> Result<()> {
        log::info!("Unmounting {:?}", self.src_dir);
        self.pool.shutdown()
    }

    /// Canonical source directory
    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    /// Absolute directory reserved for the on-disk cache
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Options this instance was mounted with
    pub fn options(&self) -> &Options {
        &self.options
    }
}
