//! Defines [`QuotaManager`] --- the process-wide byte ledger consulted
//! before every storage growth.

use std::sync::Mutex;

use crate::error::{Error, Result};

/// Atomic view of the ledger returned by [`QuotaManager::snapshot`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Upper bound of the ledger in bytes.
    pub maximum: u64,
    /// Bytes currently reserved.
    pub used: u64,
    /// Bytes still available, `maximum - used`.
    pub free: u64,
}

/// Centralized admission control for the byte budget.
///
/// All file-byte growth funnels through this ledger; a write that
/// would exceed the budget fails before any storage mutation.
#[derive(Debug)]
pub struct QuotaManager {
    maximum: u64,
    used: Mutex<u64>,
}

impl QuotaManager {
    pub fn new(maximum: u64) -> Self {
        Self { maximum, used: Mutex::new(0) }
    }

    /// Atomically read `(maximum, used, free)`.
    pub fn snapshot(&self) -> QuotaSnapshot {
        let used = *self.used.lock().expect("quota mutex poisoned");
        QuotaSnapshot { maximum: self.maximum, used, free: self.maximum - used }
    }

    /// Reserve `bytes` from the budget.
    ///
    /// The returned guard releases the reservation when dropped unless
    /// [`Reservation::commit`] consumed it first, which guarantees the
    /// ledger is restored on every failure path. Reserving zero bytes
    /// always succeeds and holds nothing.
    pub fn reserve(&self, bytes: u64) -> Result<Reservation<'_>> {
        if bytes == 0 {
            return Ok(Reservation { ledger: self, bytes: 0, committed: true });
        }
        let mut used = self.used.lock().expect("quota mutex poisoned");
        let free = self.maximum - *used;
        if bytes > free {
            return Err(Error::QuotaExceeded { requested: bytes, available: free });
        }
        *used += bytes;
        Ok(Reservation { ledger: self, bytes, committed: false })
    }

    /// Return `bytes` to the budget, clamped at zero.
    pub fn release(&self, bytes: u64) {
        let mut used = self.used.lock().expect("quota mutex poisoned");
        *used = used.saturating_sub(bytes);
    }

    /// Unchecked reservation.
    ///
    /// Callers must hold the structure lock and must already have
    /// verified `bytes <= free` via [`QuotaManager::snapshot`]. Used
    /// only to conclude batch operations whose delta was computed up
    /// front.
    pub fn force_reserve(&self, bytes: u64) {
        let mut used = self.used.lock().expect("quota mutex poisoned");
        *used += bytes;
    }
}

/// Scoped reservation handed out by [`QuotaManager::reserve`].
#[must_use = "an uncommitted reservation is released on drop"]
#[derive(Debug)]
pub struct Reservation<'a> {
    ledger: &'a QuotaManager,
    bytes: u64,
    committed: bool,
}

impl Reservation<'_> {
    /// Consume the guard, leaving the reserved bytes in the ledger.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.release(self.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_consumes_budget() {
        let quota = QuotaManager::new(100);
        quota.reserve(60).expect("reserve succeeds").commit();
        assert_eq!(quota.snapshot(), QuotaSnapshot { maximum: 100, used: 60, free: 40 });
    }

    #[test]
    fn dropped_reservation_restores_budget() {
        let quota = QuotaManager::new(100);
        {
            let _guard = quota.reserve(60).expect("reserve succeeds");
        }
        assert_eq!(quota.snapshot().used, 0);
    }

    #[test]
    fn oversize_reserve_reports_requested_and_available() {
        let quota = QuotaManager::new(100);
        quota.reserve(90).expect("first reserve").commit();
        let err = quota.reserve(20).expect_err("reserve must fail");
        assert_eq!(err, Error::QuotaExceeded { requested: 20, available: 10 });
        assert_eq!(quota.snapshot().used, 90);
    }

    #[test]
    fn zero_reserve_is_a_noop() {
        let quota = QuotaManager::new(0);
        quota.reserve(0).expect("zero bytes always fit").commit();
        assert_eq!(quota.snapshot().used, 0);
    }

    #[test]
    fn release_clamps_at_zero() {
        let quota = QuotaManager::new(100);
        quota.force_reserve(10);
        quota.release(30);
        assert_eq!(quota.snapshot().used, 0);
    }
}
