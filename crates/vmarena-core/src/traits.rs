//! The virtual memory provider abstraction.

use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::VmError;

/// A source of reservable, committable address space.
///
/// Arenas never talk to the OS directly; they go through a provider so
/// that tests can count, inspect and fail individual calls. The contract
/// mirrors the classic reserve/commit split:
///
/// - `reserve` claims address space with no backing pages;
/// - `commit` backs a page-aligned sub-range with readable, writable,
///   zero-initialised memory (committing an already committed page is
///   allowed and keeps its contents);
/// - `decommit` returns pages to the OS but keeps the range reserved;
/// - `release` gives the whole reservation back.
///
/// Offsets and sizes passed to `commit`/`decommit` are multiples of
/// [`page_size`](Self::page_size).
#[allow(unsafe_code)]
pub trait VirtualMemory {
    /// The page granularity used to round reserve and commit sizes.
    fn page_size(&self) -> u64;

    /// Reserve `size` bytes of address space.
    ///
    /// `size` is a multiple of the page size. The returned base is page
    /// aligned.
    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError>;

    /// Commit `size` bytes starting `offset` bytes into the reservation at `base`.
    ///
    /// # Safety
    ///
    /// `base` must come from [`reserve`](Self::reserve) on this provider and
    /// must not have been released, and `offset + size` must not exceed the
    /// reserved size.
    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError>;

    /// Decommit `size` bytes starting `offset` bytes into the reservation at `base`.
    ///
    /// # Safety
    ///
    /// Same requirements as [`commit`](Self::commit). In addition, no live
    /// reference may point into the decommitted range.
    unsafe fn decommit(&self, base: NonNull<u8>, offset: u64, size: u64)
        -> Result<(), VmError>;

    /// Release the whole reservation at `base`.
    ///
    /// # Safety
    ///
    /// `base` and `size` must describe exactly one live reservation made by
    /// this provider, and no reference into it may outlive this call.
    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError>;
}

#[allow(unsafe_code)]
impl<V: VirtualMemory + ?Sized> VirtualMemory for &V {
    fn page_size(&self) -> u64 {
        (**self).page_size()
    }

    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError> {
        (**self).reserve(size)
    }

    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).commit(base, offset, size) }
    }

    unsafe fn decommit(
        &self,
        base: NonNull<u8>,
        offset: u64,
        size: u64,
    ) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).decommit(base, offset, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).release(base, size) }
    }
}

#[allow(unsafe_code)]
impl<V: VirtualMemory + ?Sized> VirtualMemory for Rc<V> {
    fn page_size(&self) -> u64 {
        (**self).page_size()
    }

    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError> {
        (**self).reserve(size)
    }

    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).commit(base, offset, size) }
    }

    unsafe fn decommit(
        &self,
        base: NonNull<u8>,
        offset: u64,
        size: u64,
    ) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).decommit(base, offset, size) }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError> {
        // SAFETY: forwarded verbatim; the caller upholds the contract.
        unsafe { (**self).release(base, size) }
    }
}
