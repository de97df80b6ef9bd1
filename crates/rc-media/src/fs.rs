//! Filesystem seam.
//!
//! Every filesystem call the trim engine makes goes through [`FileSystem`],
//! so tests can count calls or inject faults at any step.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// A readable, seekable source file.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A writable, seekable output file.
pub trait WriteSeek: Write + Seek + Send {
    /// Persist written data to durable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteSeek for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl WriteSeek for Cursor<Vec<u8>> {}

/// The filesystem operations the trim engine needs.
pub trait FileSystem: Send + Sync {
    /// Open an existing file for reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;

    /// Create a file for writing, truncating any existing content.
    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteSeek>>;

    /// Size of a file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Resolve `path` to an absolute path with symlinks followed.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteSeek>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}
