//! Defines [`Storage`] --- the per-file byte store with its two
//! backend variants and the overhead calibration shared by both.

mod random;
mod sequential;

pub(crate) use random::RandomStorage;
pub(crate) use sequential::SequentialStorage;

use crate::error::Result;
use crate::quota::QuotaManager;

/// Byte ceiling above which a sequential file refuses to promote.
pub(crate) const DEFAULT_PROMOTION_HARD_LIMIT: u64 = 512 * 1024 * 1024;

/// Backend selection for newly created files.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Start sequential, promote to random access on the first
    /// non-tail write.
    #[default]
    Auto,
    /// Sequential only; non-tail writes fail with an
    /// unsupported-operation error.
    Sequential,
    /// Contiguous buffer from the start.
    RandomAccess,
}

/// Per-chunk quota surcharge for the sequential backend.
///
/// One chunk occupies a fat-pointer slot in the chunk vector plus a
/// `u64` slot in the prefix-sum vector; the ×1.5 + 32 factor biases
/// the estimate toward over-counting.
pub(crate) fn calibrate_chunk_overhead() -> u64 {
    let slot = size_of::<Box<[u8]>>() + size_of::<u64>();
    (slot as u64 * 3) / 2 + 32
}

/// Result of a [`Storage::write_at`].
///
/// When the write triggered promotion, `replacement` carries the new
/// backend by value and `retired_footprint` the quota usage of the
/// storage it replaces; the owning file node swaps the backend in and
/// releases the retired footprint.
#[derive(Debug)]
pub(crate) struct WriteOutcome {
    pub written: usize,
    pub replacement: Option<Storage>,
    pub retired_footprint: u64,
}

impl WriteOutcome {
    pub(crate) fn plain(written: usize) -> Self {
        Self { written, replacement: None, retired_footprint: 0 }
    }
}

/// Storage backend owned by exactly one file node.
#[derive(Debug)]
pub(crate) enum Storage {
    Sequential(SequentialStorage),
    RandomAccess(RandomStorage),
}

impl Storage {
    /// Empty storage of the configured kind.
    pub fn empty(kind: StorageKind, chunk_overhead: u64, promotion_hard_limit: u64) -> Self {
        match kind {
            StorageKind::Auto => Storage::Sequential(SequentialStorage::new(
                chunk_overhead,
                Some(promotion_hard_limit),
            )),
            StorageKind::Sequential => {
                Storage::Sequential(SequentialStorage::new(chunk_overhead, None))
            }
            StorageKind::RandomAccess => Storage::RandomAccess(RandomStorage::new()),
        }
    }

    /// Storage of the configured kind pre-filled with `data`.
    ///
    /// The caller accounts the bytes; see [`Storage::bulk_usage`] for
    /// the exact figure.
    pub fn bulk_load(
        kind: StorageKind,
        data: Vec<u8>,
        chunk_overhead: u64,
        promotion_hard_limit: u64,
    ) -> Self {
        match kind {
            StorageKind::Auto => Storage::Sequential(SequentialStorage::preloaded(
                data,
                chunk_overhead,
                Some(promotion_hard_limit),
            )),
            StorageKind::Sequential => {
                Storage::Sequential(SequentialStorage::preloaded(data, chunk_overhead, None))
            }
            StorageKind::RandomAccess => Storage::RandomAccess(RandomStorage::preloaded(data)),
        }
    }

    /// Quota usage a [`Storage::bulk_load`] of `len` bytes will report.
    pub fn bulk_usage(kind: StorageKind, len: u64, chunk_overhead: u64) -> u64 {
        match kind {
            StorageKind::RandomAccess => len,
            StorageKind::Auto | StorageKind::Sequential => {
                if len == 0 {
                    0
                } else {
                    len + chunk_overhead
                }
            }
        }
    }

    /// Read up to `count` bytes starting at `offset`; `None` reads to
    /// the end of the data.
    pub fn read_at(&self, offset: u64, count: Option<usize>) -> Vec<u8> {
        match self {
            Storage::Sequential(storage) => storage.read_at(offset, count),
            Storage::RandomAccess(storage) => storage.read_at(offset, count),
        }
    }

    /// Write `data` at `offset`, reserving any growth from `quota`
    /// before mutating.
    pub fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
        quota: &QuotaManager,
    ) -> Result<WriteOutcome> {
        match self {
            Storage::Sequential(storage) => storage.write_at(offset, data, quota),
            Storage::RandomAccess(storage) => {
                storage.write_at(offset, data, quota).map(WriteOutcome::plain)
            }
        }
    }

    /// Resize to `size`, releasing shrink deltas to `quota` and
    /// reserving growth from it.
    pub fn truncate(&mut self, size: u64, quota: &QuotaManager) -> Result<()> {
        match self {
            Storage::Sequential(storage) => storage.truncate(size, quota),
            Storage::RandomAccess(storage) => storage.truncate(size, quota),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Storage::Sequential(storage) => storage.size(),
            Storage::RandomAccess(storage) => storage.size(),
        }
    }

    /// Bytes this backend holds against the quota, management cost
    /// included.
    pub fn quota_usage(&self) -> u64 {
        match self {
            Storage::Sequential(storage) => storage.quota_usage(),
            Storage::RandomAccess(storage) => storage.size(),
        }
    }

    /// Sequential chunk count; a promoted or random-access file
    /// contributes zero.
    pub fn chunk_count(&self) -> usize {
        match self {
            Storage::Sequential(storage) => storage.chunk_count(),
            Storage::RandomAccess(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_over_counts_the_container_slots() {
        let slot = (size_of::<Box<[u8]>>() + size_of::<u64>()) as u64;
        let estimate = calibrate_chunk_overhead();
        assert!(estimate > slot);
        assert_eq!(estimate, slot * 3 / 2 + 32);
    }

    #[test]
    fn bulk_usage_matches_what_bulk_load_reports() {
        for kind in [StorageKind::Auto, StorageKind::Sequential, StorageKind::RandomAccess] {
            for len in [0usize, 1, 4096] {
                let expected = Storage::bulk_usage(kind, len as u64, 48);
                let storage = Storage::bulk_load(kind, vec![0u8; len], 48, 1 << 20);
                assert_eq!(storage.quota_usage(), expected, "kind {kind:?} len {len}");
                assert_eq!(storage.size(), len as u64);
            }
        }
    }

    #[test]
    fn empty_storage_of_every_kind_starts_at_zero_usage() {
        for kind in [StorageKind::Auto, StorageKind::Sequential, StorageKind::RandomAccess] {
            let storage = Storage::empty(kind, 48, 1 << 20);
            assert_eq!(storage.size(), 0);
            assert_eq!(storage.quota_usage(), 0);
            assert_eq!(storage.chunk_count(), 0);
        }
    }

    #[test]
    fn only_the_auto_kind_promotes() {
        let quota = QuotaManager::new(1 << 20);

        let mut auto = Storage::bulk_load(StorageKind::Auto, vec![1u8; 64], 0, 1 << 20);
        quota.force_reserve(64);
        let outcome = auto.write_at(10, b"zz", &quota).expect("promoting write");
        assert!(outcome.replacement.is_some());

        let mut pinned = Storage::bulk_load(StorageKind::Sequential, vec![1u8; 64], 0, 1 << 20);
        assert!(pinned.write_at(10, b"zz", &quota).is_err());

        let mut random = Storage::bulk_load(StorageKind::RandomAccess, vec![1u8; 64], 0, 1 << 20);
        let outcome = random.write_at(10, b"zz", &quota).expect("plain write");
        assert!(outcome.replacement.is_none());
    }
}
