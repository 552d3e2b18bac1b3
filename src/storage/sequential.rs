//! Defines [`SequentialStorage`] --- the append-optimized chunked byte
//! store.

use tracing::trace;

use crate::error::{Error, Result};
use crate::quota::QuotaManager;
use crate::storage::{RandomStorage, Storage, WriteOutcome};

/// Ordered sequence of immutable byte chunks with a prefix-sum index.
///
/// Chunks are never mutated in place; a write at the current end
/// appends a new chunk in O(1), and a random read locates its starting
/// chunk by binary search over the cumulative end positions. A write
/// anywhere else triggers one-way promotion to [`RandomStorage`],
/// unless promotion is disabled or the file has outgrown the hard
/// limit.
#[derive(Debug)]
pub(crate) struct SequentialStorage {
    chunks: Vec<Box<[u8]>>,
    /// Cumulative chunk end positions; `cumulative[i]` is the offset
    /// one past the end of `chunks[i]`.
    cumulative: Vec<u64>,
    size: u64,
    chunk_overhead: u64,
    /// `Some(limit)` allows promotion for sizes up to `limit`;
    /// `None` refuses every non-tail write.
    promotion_hard_limit: Option<u64>,
}

impl SequentialStorage {
    pub fn new(chunk_overhead: u64, promotion_hard_limit: Option<u64>) -> Self {
        Self {
            chunks: Vec::new(),
            cumulative: Vec::new(),
            size: 0,
            chunk_overhead,
            promotion_hard_limit,
        }
    }

    /// Single-chunk storage holding `data`. The caller accounts the
    /// bytes and the one-chunk overhead.
    pub fn preloaded(
        data: Vec<u8>,
        chunk_overhead: u64,
        promotion_hard_limit: Option<u64>,
    ) -> Self {
        let mut storage = Self::new(chunk_overhead, promotion_hard_limit);
        if !data.is_empty() {
            storage.size = data.len() as u64;
            storage.cumulative.push(storage.size);
            storage.chunks.push(data.into_boxed_slice());
        }
        storage
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn quota_usage(&self) -> u64 {
        self.size + self.chunks.len() as u64 * self.chunk_overhead
    }

    pub fn read_at(&self, offset: u64, count: Option<usize>) -> Vec<u8> {
        if offset >= self.size {
            return Vec::new();
        }
        let end = match count {
            Some(count) => self.size.min(offset + count as u64),
            None => self.size,
        };
        if end <= offset {
            return Vec::new();
        }

        let mut result = Vec::with_capacity((end - offset) as usize);
        // First chunk whose cumulative end lies past the offset.
        let mut index = self.cumulative.partition_point(|&chunk_end| chunk_end <= offset);
        let mut position = offset;
        while position < end {
            let chunk = &self.chunks[index];
            let chunk_start = self.cumulative[index] - chunk.len() as u64;
            let from = (position - chunk_start) as usize;
            let to = chunk.len().min((end - chunk_start) as usize);
            result.extend_from_slice(&chunk[from..to]);
            position = chunk_start + to as u64;
            index += 1;
        }
        result
    }

    pub fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
        quota: &QuotaManager,
    ) -> Result<WriteOutcome> {
        if data.is_empty() {
            return Ok(WriteOutcome::plain(0));
        }
        if offset == self.size {
            let reservation = quota.reserve(data.len() as u64 + self.chunk_overhead)?;
            self.size += data.len() as u64;
            self.cumulative.push(self.size);
            self.chunks.push(data.to_vec().into_boxed_slice());
            reservation.commit();
            return Ok(WriteOutcome::plain(data.len()));
        }
        self.promote_and_write(offset, data, quota)
    }

    /// Convert to a contiguous buffer, then forward the non-tail write
    /// to it.
    ///
    /// The contiguous copy is reserved up front, which doubles this
    /// file's accounted footprint until the caller swaps the backend
    /// in and releases the retired sequential footprint.
    fn promote_and_write(
        &mut self,
        offset: u64,
        data: &[u8],
        quota: &QuotaManager,
    ) -> Result<WriteOutcome> {
        let Some(limit) = self.promotion_hard_limit else {
            return Err(Error::unsupported(
                "sequential storage only supports writes at the current end",
            ));
        };
        if self.size > limit {
            return Err(Error::unsupported(format!(
                "file of {} bytes exceeds the promotion hard limit of {limit} bytes",
                self.size
            )));
        }

        let reservation = quota.reserve(self.size)?;
        let mut contiguous = Vec::with_capacity(self.size as usize);
        for chunk in &self.chunks {
            contiguous.extend_from_slice(chunk);
        }
        reservation.commit();
        trace!(size = self.size, chunks = self.chunks.len(), "promoting sequential storage");

        let mut replacement = RandomStorage::preloaded(contiguous);
        let written = match replacement.write_at(offset, data, quota) {
            Ok(written) => written,
            Err(err) => {
                // The copy never reached the caller; hand its bytes back.
                quota.release(replacement.size());
                return Err(err);
            }
        };
        Ok(WriteOutcome {
            written,
            replacement: Some(Storage::RandomAccess(replacement)),
            retired_footprint: self.quota_usage(),
        })
    }

    pub fn truncate(&mut self, size: u64, quota: &QuotaManager) -> Result<()> {
        if size == self.size {
            return Ok(());
        }
        if size > self.size {
            // Zero-fill growth is an ordinary tail append.
            let fill = vec![0u8; (size - self.size) as usize];
            self.write_at(self.size, &fill, quota)?;
            return Ok(());
        }

        let retained = self.read_at(0, Some(size as usize));
        let old_usage = self.quota_usage();
        self.chunks.clear();
        self.cumulative.clear();
        self.size = 0;
        if !retained.is_empty() {
            self.size = retained.len() as u64;
            self.cumulative.push(self.size);
            self.chunks.push(retained.into_boxed_slice());
        }
        quota.release(old_usage - self.quota_usage());
        Ok(())
    }
}
