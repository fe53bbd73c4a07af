use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use vmarena_core::{SystemMemory, VirtualMemory, VmError};

/// One provider call, as seen by [`RecordingMemory`].
///
/// Bases are recorded as plain addresses so calls can be compared and
/// printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmCall {
    Reserve { size: u64 },
    Commit { base: usize, offset: u64, size: u64 },
    Decommit { base: usize, offset: u64, size: u64 },
    Release { base: usize, size: u64 },
}

#[derive(Debug, Default)]
struct CallLog {
    calls: Vec<VmCall>,
    /// Live reservations (base -> size) in reservation order.
    live: IndexMap<usize, u64>,
}

/// A provider that forwards to `V` and records every call.
///
/// Clones share one log, so a recorder can be handed to several arenas
/// (e.g. all members of a scratch pool) and inspected afterwards. The log
/// is thread-safe: a clone can be moved into a thread and the original
/// checked once the thread has exited.
#[derive(Clone, Debug)]
pub struct RecordingMemory<V = SystemMemory> {
    inner: V,
    log: Arc<Mutex<CallLog>>,
}

impl RecordingMemory<SystemMemory> {
    pub fn new() -> Self {
        Self::wrap(SystemMemory::new())
    }
}

impl Default for RecordingMemory<SystemMemory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RecordingMemory<V> {
    /// Record calls made to `inner`.
    pub fn wrap(inner: V) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<VmCall> {
        self.lock_log().calls.clone()
    }

    /// Sizes of every commit call, oldest first.
    pub fn commit_sizes(&self) -> Vec<u64> {
        self.lock_log()
            .calls
            .iter()
            .filter_map(|call| match call {
                VmCall::Commit { size, .. } => Some(*size),
                _ => None,
            })
            .collect()
    }

    pub fn reserve_count(&self) -> usize {
        self.count(|call| matches!(call, VmCall::Reserve { .. }))
    }

    pub fn commit_count(&self) -> usize {
        self.count(|call| matches!(call, VmCall::Commit { .. }))
    }

    pub fn decommit_count(&self) -> usize {
        self.count(|call| matches!(call, VmCall::Decommit { .. }))
    }

    pub fn release_count(&self) -> usize {
        self.count(|call| matches!(call, VmCall::Release { .. }))
    }

    /// Reservations not yet released, as `(base, size)` in reservation order.
    pub fn live_reservations(&self) -> Vec<(usize, u64)> {
        self.lock_log()
            .live
            .iter()
            .map(|(&base, &size)| (base, size))
            .collect()
    }

    /// Forget recorded calls. Live reservations are still tracked.
    pub fn clear_calls(&self) {
        self.lock_log().calls.clear();
    }

    fn count(&self, pred: impl Fn(&VmCall) -> bool) -> usize {
        self.lock_log().calls.iter().filter(|call| pred(call)).count()
    }

    fn lock_log(&self) -> MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: VmCall) {
        self.lock_log().calls.push(call);
    }
}

#[allow(unsafe_code)]
impl<V: VirtualMemory> VirtualMemory for RecordingMemory<V> {
    fn page_size(&self) -> u64 {
        self.inner.page_size()
    }

    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError> {
        self.record(VmCall::Reserve { size });
        let base = self.inner.reserve(size)?;
        self.lock_log().live.insert(base.as_ptr() as usize, size);
        Ok(base)
    }

    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        self.record(VmCall::Commit {
            base: base.as_ptr() as usize,
            offset,
            size,
        });
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.commit(base, offset, size) }
    }

    unsafe fn decommit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        self.record(VmCall::Decommit {
            base: base.as_ptr() as usize,
            offset,
            size,
        });
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.decommit(base, offset, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError> {
        let addr = base.as_ptr() as usize;
        self.record(VmCall::Release { base: addr, size });
        self.lock_log().live.shift_remove(&addr);
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.release(base, size) }
    }
}
