//! Defines [`ScratchFs::open`] --- the five binary open modes and the
//! handle construction path.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::ScratchFs;
use crate::handle::FileHandle;
use crate::node::{FileNode, Node};
use crate::path;
use crate::storage::Storage;
use crate::sync::LockWait;

/// The five supported binary open modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    /// `rb` --- read an existing file.
    Read,
    /// `wb` --- create if missing, truncate to zero if present.
    Write,
    /// `ab` --- create if missing; every write lands at end-of-file.
    Append,
    /// `r+b` --- read and modify an existing file.
    ReadWrite,
    /// `xb` --- exclusive create; an existing target is an error.
    CreateNew,
}

impl OpenMode {
    /// Parse a mode string; anything outside the five binary modes
    /// (text modes included) is rejected.
    pub(crate) fn parse(mode: &str) -> Result<Self> {
        match mode {
            "rb" => Ok(OpenMode::Read),
            "wb" => Ok(OpenMode::Write),
            "ab" => Ok(OpenMode::Append),
            "r+b" | "rb+" => Ok(OpenMode::ReadWrite),
            "xb" => Ok(OpenMode::CreateNew),
            other => {
                Err(Error::invalid_argument(format!("unsupported open mode {other:?}")))
            }
        }
    }

    pub(crate) fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub(crate) fn writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    pub(crate) fn is_append(self) -> bool {
        matches!(self, OpenMode::Append)
    }

    fn creates_missing(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::Append | OpenMode::CreateNew)
    }
}

/// Knobs for [`ScratchFs::open_with`].
#[derive(Debug, Copy, Clone, Default)]
pub struct OpenOptions {
    /// Zero-fill the file up to this many bytes right after opening,
    /// reserving the quota (and exercising promotion) up front.
    pub preallocate: u64,
    /// How long to wait for the file lock. The structure lock is held
    /// across this wait, so latency-sensitive callers should bound it.
    pub lock_wait: LockWait,
}

impl ScratchFs {
    /// Open a file with default options (no preallocation, blocking
    /// lock wait).
    pub fn open(&self, raw: &str, mode: &str) -> Result<FileHandle> {
        self.open_with(raw, mode, OpenOptions::default())
    }

    /// Open a file in one of the five binary modes.
    ///
    /// The structure lock is held from path resolution through file
    /// lock acquisition, which rules out resolve-then-lock races at
    /// the price of stalling other structural operations while the
    /// file lock is contended.
    pub fn open_with(&self, raw: &str, mode: &str, options: OpenOptions) -> Result<FileHandle> {
        let mode = OpenMode::parse(mode)?;
        let normalized = path::normalize(raw)?;

        let node = {
            let mut tree = self.lock_tree();
            let node = match tree.resolve(&normalized) {
                Some(id) => match tree.node(id) {
                    Node::Directory(_) => return Err(Error::is_a_directory(&normalized)),
                    Node::File(file) => {
                        if mode == OpenMode::CreateNew {
                            return Err(Error::already_exists(&normalized));
                        }
                        Arc::clone(file)
                    }
                },
                None if mode.creates_missing() => {
                    let (parent_path, name) = path::split(&normalized)
                        .expect("a missing path cannot be the root");
                    let parent = tree
                        .resolve(parent_path)
                        .ok_or_else(|| Error::not_found(parent_path))?;
                    if !tree.is_dir(parent) {
                        return Err(Error::not_a_directory(parent_path));
                    }
                    let config = self.config();
                    let file = Arc::new(FileNode::new(Storage::empty(
                        config.default_storage,
                        config.chunk_overhead,
                        config.promotion_hard_limit,
                    )));
                    let id = tree.insert(Node::File(Arc::clone(&file)))?;
                    tree.attach(parent, name, id);
                    debug!(path = %normalized, "created file");
                    file
                }
                None => return Err(Error::not_found(&normalized)),
            };

            if mode == OpenMode::Read {
                node.lock.acquire_read(options.lock_wait)?;
            } else {
                node.lock.acquire_write(options.lock_wait)?;
            }

            // Truncation waits until the write lock is ours.
            if mode == OpenMode::Write {
                if let Err(err) = node.truncate(0, self.quota()) {
                    node.lock.release_write();
                    return Err(err);
                }
            }
            node
        };

        let cursor = if mode.is_append() { node.size() } else { 0 };
        let mut handle = FileHandle::new(self.clone(), node, normalized, mode, cursor);
        if options.preallocate > 0 {
            if let Err(err) = handle.preallocate(options.preallocate) {
                handle.close();
                return Err(err);
            }
        }
        Ok(handle)
    }
}
