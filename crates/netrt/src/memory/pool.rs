//! Memory pool owning the slot buffers behind pooled tensors.
//!
//! The pool is an arena-with-offsets: it allocates one aligned buffer per
//! plan slot at the slot's maximum required size, and tensors are
//! `(slot, byte offset, length)` views into those buffers — never owning
//! pointers. Buffers for a run are exclusively owned by one workspace; the
//! per-slot locks exist to prove disjoint access to the borrow checker, not
//! to serialize work: the plan keeps concurrently live tensors in distinct
//! slots and the executor schedules each slot handover behind the previous
//! tenant's last access, so the locks are never contended.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::EngineResult;
use crate::planner::AllocationPlan;
use crate::tensor::aligned::AlignedBytes;

/// Owns the raw buffers that satisfy an [`AllocationPlan`].
pub struct Pool {
    slots: Vec<RwLock<AlignedBytes>>,
    reserved_bytes: usize,
}

impl Pool {
    /// Allocates backing buffers for every distinct slot in the plan.
    ///
    /// Fails with [`crate::EngineError::OutOfMemory`] if the platform
    /// allocator cannot satisfy a request; nothing is silently truncated
    /// and any buffers already allocated are freed on the error path.
    pub fn reserve(plan: &AllocationPlan) -> EngineResult<Pool> {
        let mut slots = Vec::with_capacity(plan.slots().len());
        let mut reserved_bytes = 0usize;
        for slot in plan.slots() {
            slots.push(RwLock::new(AlignedBytes::try_zeroed(slot.byte_len)?));
            reserved_bytes = reserved_bytes.saturating_add(slot.byte_len);
        }
        Ok(Pool {
            slots,
            reserved_bytes,
        })
    }

    /// Total bytes held across all slot buffers.
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Frees all buffers. Dropping the pool is equivalent; the explicit
    /// form documents the scoped acquisition discipline at call sites.
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn read_slot(&self, slot: usize) -> RwLockReadGuard<'_, AlignedBytes> {
        self.slots[slot].read().expect("pool slot lock poisoned")
    }

    pub(crate) fn write_slot(&self, slot: usize) -> RwLockWriteGuard<'_, AlignedBytes> {
        self.slots[slot].write().expect("pool slot lock poisoned")
    }
}
