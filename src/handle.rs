//! Defines [`FileHandle`] --- a mode-parameterized binary stream over
//! a file node.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::fs::{OpenMode, ScratchFs};
use crate::node::FileNode;

/// Open file handle.
///
/// A handle keeps its filesystem alive and holds the file's read lock
/// (`rb`) or write lock (every other mode) for its whole lifetime; the
/// lock is released exactly once, on [`FileHandle::close`] or on drop.
/// Besides the inherent methods, [`std::io::Read`], [`std::io::Write`]
/// and [`std::io::Seek`] are implemented for use with generic stream
/// consumers.
pub struct FileHandle {
    fs: ScratchFs,
    node: Arc<FileNode>,
    path: String,
    mode: OpenMode,
    cursor: u64,
    closed: bool,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FileHandle {
    pub(crate) fn new(
        fs: ScratchFs,
        node: Arc<FileNode>,
        path: String,
        mode: OpenMode,
        cursor: u64,
    ) -> Self {
        Self { fs, node, path, mode, cursor, closed: false }
    }

    /// Path the handle was opened at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read up to `count` bytes from the cursor; `None` reads to
    /// end-of-file. At end-of-file the result is empty.
    pub fn read(&mut self, count: Option<usize>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if !self.mode.readable() {
            return Err(Error::unsupported("handle is not open for reading"));
        }
        let data = self.node.read_at(self.cursor, count);
        self.cursor += data.len() as u64;
        Ok(data)
    }

    /// Write `data` at the cursor.
    ///
    /// In append mode the cursor snaps back to end-of-file first, so
    /// an intervening seek never redirects the write.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if !self.mode.writable() {
            return Err(Error::unsupported("handle is not open for writing"));
        }
        if self.mode.is_append() {
            self.cursor = self.node.size();
        }
        let written = self.node.write_at(self.cursor, data, self.fs.quota())?;
        self.cursor += written as u64;
        Ok(written)
    }

    /// Move the cursor. Seeking past end-of-file is unsupported in
    /// either direction; callers needing zero-fill preallocate at
    /// open.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let size = self.node.size();
        let target = match position {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.cursor as i128 + delta as i128,
            SeekFrom::End(delta) => {
                if delta > 0 {
                    return Err(Error::invalid_argument("cannot seek past end-of-file"));
                }
                size as i128 + delta as i128
            }
        };
        if target < 0 {
            return Err(Error::invalid_argument("cannot seek before the start of the file"));
        }
        if target > size as i128 {
            return Err(Error::invalid_argument("cannot seek past end-of-file"));
        }
        self.cursor = target as u64;
        Ok(self.cursor)
    }

    /// Current cursor position.
    pub fn tell(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.cursor)
    }

    /// Resize the file; shrinking releases quota, growth zero-fills
    /// and is quota-checked.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.ensure_open()?;
        if !self.mode.writable() {
            return Err(Error::unsupported("handle is not open for writing"));
        }
        self.node.truncate(size, self.fs.quota())
    }

    /// Release the file lock. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.mode == OpenMode::Read {
            self.node.lock.release_read();
        } else {
            self.node.lock.release_write();
        }
    }

    /// Zero-fill up to `target` bytes right after open.
    pub(crate) fn preallocate(&mut self, target: u64) -> Result<()> {
        let size = self.node.size();
        if target > size {
            let fill = vec![0u8; (target - size) as usize];
            self.node.write_at(size, &fill, self.fs.quota())?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::HandleClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if !self.closed {
            warn!(path = %self.path, "file handle dropped without close");
            self.close();
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = FileHandle::read(self, Some(buf.len()))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Everything is already in memory; there is nothing to flush.
        self.ensure_open()?;
        Ok(())
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        Ok(FileHandle::seek(self, position)?)
    }
}
