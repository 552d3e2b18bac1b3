//! Defines [`ScratchFs`] --- the public filesystem surface over the
//! node table, quota ledger and storage backends.

mod exchange;
mod glob;
mod open;
mod traverse;
mod tree;

pub use exchange::ExportIter;
pub use open::{OpenMode, OpenOptions};
pub use traverse::{Walk, WalkEntry};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::node::{Node, NodeTable};
use crate::path;
use crate::quota::QuotaManager;
use crate::storage::{self, StorageKind};

/// Default byte budget of a filesystem built with [`FsOptions::default`].
pub const DEFAULT_QUOTA: u64 = 256 * 1024 * 1024;

/// Construction-time configuration.
#[derive(Debug, Clone)]
pub struct FsOptions {
    /// Upper bound of the quota ledger in bytes.
    pub max_quota: u64,
    /// Optional cap on the total node count, root included.
    pub max_nodes: Option<u64>,
    /// Backend for newly created files.
    pub default_storage: StorageKind,
    /// Byte ceiling above which a sequential file refuses non-tail
    /// writes; `None` uses the built-in 512 MiB.
    pub promotion_hard_limit: Option<u64>,
    /// Force a per-chunk overhead constant instead of the calibrated
    /// one.
    pub chunk_overhead_override: Option<u64>,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            max_quota: DEFAULT_QUOTA,
            max_nodes: None,
            default_storage: StorageKind::Auto,
            promotion_hard_limit: None,
            chunk_overhead_override: None,
        }
    }
}

/// Metadata snapshot returned by [`ScratchFs::stat`].
#[derive(Debug, Copy, Clone)]
pub struct Stat {
    pub size: u64,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub generation: u64,
    pub is_dir: bool,
}

/// Filesystem-wide counters returned by [`ScratchFs::stats`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FsStats {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub free_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    /// Sequential-backend chunks only; promoted files contribute zero.
    pub chunk_count: u64,
    pub overhead_per_chunk: u64,
}

pub(crate) struct FsInner {
    /// The structure lock: guards the node table, the id allocator and
    /// every directory's child map.
    tree: Mutex<NodeTable>,
    pub quota: QuotaManager,
    pub default_storage: StorageKind,
    pub chunk_overhead: u64,
    pub promotion_hard_limit: u64,
}

/// A quota-bounded in-memory filesystem.
///
/// Cloning is cheap and shares the namespace; instances built
/// separately are fully independent (no shared quota, no shared
/// namespace).
#[derive(Clone)]
pub struct ScratchFs {
    inner: Arc<FsInner>,
}

impl ScratchFs {
    /// Filesystem with the given byte budget and default options.
    pub fn new(max_quota: u64) -> Self {
        Self::with_options(FsOptions { max_quota, ..FsOptions::default() })
    }

    pub fn with_options(options: FsOptions) -> Self {
        let chunk_overhead =
            options.chunk_overhead_override.unwrap_or_else(storage::calibrate_chunk_overhead);
        Self {
            inner: Arc::new(FsInner {
                tree: Mutex::new(NodeTable::new(options.max_nodes)),
                quota: QuotaManager::new(options.max_quota),
                default_storage: options.default_storage,
                chunk_overhead,
                promotion_hard_limit: options
                    .promotion_hard_limit
                    .unwrap_or(storage::DEFAULT_PROMOTION_HARD_LIMIT),
            }),
        }
    }

    pub(crate) fn lock_tree(&self) -> MutexGuard<'_, NodeTable> {
        self.inner.tree.lock().expect("structure lock poisoned")
    }

    pub(crate) fn quota(&self) -> &QuotaManager {
        &self.inner.quota
    }

    pub(crate) fn config(&self) -> &FsInner {
        &self.inner
    }

    /// Whether the path resolves at all; traversal errors map to
    /// `false`.
    pub fn exists(&self, raw: &str) -> bool {
        let Ok(normalized) = path::normalize(raw) else { return false };
        self.lock_tree().resolve(&normalized).is_some()
    }

    pub fn is_dir(&self, raw: &str) -> bool {
        let Ok(normalized) = path::normalize(raw) else { return false };
        let tree = self.lock_tree();
        tree.resolve(&normalized).is_some_and(|id| tree.is_dir(id))
    }

    pub fn is_file(&self, raw: &str) -> bool {
        let Ok(normalized) = path::normalize(raw) else { return false };
        let tree = self.lock_tree();
        tree.resolve(&normalized).is_some_and(|id| !tree.is_dir(id))
    }

    /// Names of the direct children of a directory, in no promised
    /// order.
    pub fn listdir(&self, raw: &str) -> Result<Vec<String>> {
        let normalized = path::normalize(raw)?;
        let tree = self.lock_tree();
        let id = tree.resolve_dir(&normalized)?;
        Ok(tree.directory(id).children.keys().cloned().collect())
    }

    /// Size of a file in bytes.
    pub fn get_size(&self, raw: &str) -> Result<u64> {
        let normalized = path::normalize(raw)?;
        let tree = self.lock_tree();
        let (_, file) = tree.resolve_file(&normalized)?;
        Ok(file.size())
    }

    /// Metadata for a file or directory.
    ///
    /// Directories report zero size, epoch timestamps and generation
    /// zero rather than failing.
    pub fn stat(&self, raw: &str) -> Result<Stat> {
        let normalized = path::normalize(raw)?;
        let tree = self.lock_tree();
        let id = tree.resolve(&normalized).ok_or_else(|| crate::Error::not_found(&normalized))?;
        match tree.node(id) {
            Node::Directory(_) => Ok(Stat {
                size: 0,
                created_at: UNIX_EPOCH,
                modified_at: UNIX_EPOCH,
                generation: 0,
                is_dir: true,
            }),
            Node::File(file) => {
                let snapshot = file.snapshot();
                Ok(Stat {
                    size: snapshot.size,
                    created_at: snapshot.created_at,
                    modified_at: snapshot.modified_at,
                    generation: snapshot.generation,
                    is_dir: false,
                })
            }
        }
    }

    /// Filesystem-wide counter snapshot, taken under the structure
    /// lock.
    pub fn stats(&self) -> FsStats {
        let tree = self.lock_tree();
        let mut file_count = 0;
        let mut dir_count = 0;
        let mut chunk_count = 0;
        for (_, node) in tree.iter() {
            match node {
                Node::Directory(_) => dir_count += 1,
                Node::File(file) => {
                    file_count += 1;
                    chunk_count += file.chunk_count() as u64;
                }
            }
        }
        let quota = self.inner.quota.snapshot();
        FsStats {
            used_bytes: quota.used,
            quota_bytes: quota.maximum,
            free_bytes: quota.free,
            file_count,
            dir_count,
            chunk_count,
            overhead_per_chunk: self.inner.chunk_overhead,
        }
    }
}
