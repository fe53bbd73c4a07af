use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use vmarena_core::{SystemMemory, VirtualMemory, VmError};

use crate::INJECTED_ERROR_CODE;

#[derive(Debug, Default)]
struct Budget {
    reserves: Cell<usize>,
    commits: Cell<usize>,
    reserve_limit: Cell<Option<usize>>,
    commit_limit: Cell<Option<usize>>,
}

impl Budget {
    /// Count a call and report whether it is over `limit`.
    fn exhausted(count: &Cell<usize>, limit: &Cell<Option<usize>>) -> bool {
        let n = count.get();
        count.set(n + 1);
        limit.get().is_some_and(|limit| n >= limit)
    }
}

/// A system provider that starts failing after a set number of calls.
///
/// By default nothing fails. Clones share their counters.
#[derive(Clone, Debug, Default)]
pub struct FailingMemory {
    inner: SystemMemory,
    budget: Rc<Budget>,
}

impl FailingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the first `n` reserves succeed and fail every later one.
    pub fn fail_reserve_after(self, n: usize) -> Self {
        self.budget.reserve_limit.set(Some(n));
        self
    }

    /// Let the first `n` commits succeed and fail every later one.
    pub fn fail_commit_after(self, n: usize) -> Self {
        self.budget.commit_limit.set(Some(n));
        self
    }

    /// Reserve calls seen so far, failed ones included.
    pub fn reserve_calls(&self) -> usize {
        self.budget.reserves.get()
    }

    /// Commit calls seen so far, failed ones included.
    pub fn commit_calls(&self) -> usize {
        self.budget.commits.get()
    }
}

#[allow(unsafe_code)]
impl VirtualMemory for FailingMemory {
    fn page_size(&self) -> u64 {
        self.inner.page_size()
    }

    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError> {
        if Budget::exhausted(&self.budget.reserves, &self.budget.reserve_limit) {
            return Err(VmError::Reserve {
                size,
                code: INJECTED_ERROR_CODE,
            });
        }
        self.inner.reserve(size)
    }

    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        if Budget::exhausted(&self.budget.commits, &self.budget.commit_limit) {
            return Err(VmError::Commit {
                offset,
                size,
                code: INJECTED_ERROR_CODE,
            });
        }
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.commit(base, offset, size) }
    }

    unsafe fn decommit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.decommit(base, offset, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { self.inner.release(base, size) }
    }
}
