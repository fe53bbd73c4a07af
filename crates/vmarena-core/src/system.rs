//! The OS-backed virtual memory provider.
//!
//! Unix uses `mmap(PROT_NONE)` to reserve, `mprotect` to commit,
//! `madvise(MADV_DONTNEED)` + `mprotect(PROT_NONE)` to decommit and
//! `munmap` to release. Windows uses `VirtualAlloc`/`VirtualFree` with
//! `MEM_RESERVE`, `MEM_COMMIT`, `MEM_DECOMMIT` and `MEM_RELEASE`.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::error::VmError;
use crate::traits::VirtualMemory;

/// Virtual memory provider backed by the host operating system.
///
/// The page size is queried once per process and cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemMemory {
    page_size: u64,
}

impl SystemMemory {
    /// Create a provider, querying the OS page size on first use.
    pub fn new() -> Self {
        static PAGE_SIZE: OnceLock<u64> = OnceLock::new();
        Self {
            page_size: *PAGE_SIZE.get_or_init(os::page_size),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn to_len(size: u64) -> Result<usize, VmError> {
    usize::try_from(size).map_err(|_| VmError::SizeOverflow { size })
}

fn last_os_error() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

impl VirtualMemory for SystemMemory {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn reserve(&self, size: u64) -> Result<NonNull<u8>, VmError> {
        let len = to_len(size)?;
        // SAFETY: reserving fresh address space has no preconditions.
        let base = unsafe { os::reserve(len) };
        match base {
            Some(base) => {
                log::trace!("reserved {size} bytes at {base:p}");
                Ok(base)
            }
            None => Err(VmError::Reserve {
                size,
                code: last_os_error(),
            }),
        }
    }

    unsafe fn commit(&self, base: NonNull<u8>, offset: u64, size: u64) -> Result<(), VmError> {
        let start = to_len(offset)?;
        let len = to_len(size)?;
        // SAFETY: the caller guarantees `offset + size` lies in a live
        // reservation starting at `base`.
        let ok = unsafe { os::commit(base.as_ptr().add(start), len) };
        if ok {
            Ok(())
        } else {
            Err(VmError::Commit {
                offset,
                size,
                code: last_os_error(),
            })
        }
    }

    unsafe fn decommit(
        &self,
        base: NonNull<u8>,
        offset: u64,
        size: u64,
    ) -> Result<(), VmError> {
        let start = to_len(offset)?;
        let len = to_len(size)?;
        // SAFETY: as for `commit`; the caller also guarantees nothing
        // borrows the range.
        let ok = unsafe { os::decommit(base.as_ptr().add(start), len) };
        if ok {
            Ok(())
        } else {
            Err(VmError::Decommit {
                offset,
                size,
                code: last_os_error(),
            })
        }
    }

    unsafe fn release(&self, base: NonNull<u8>, size: u64) -> Result<(), VmError> {
        let len = to_len(size)?;
        // SAFETY: the caller guarantees `base`/`size` describe one live
        // reservation that nothing borrows any more.
        let ok = unsafe { os::release(base.as_ptr(), len) };
        if ok {
            log::trace!("released {size} bytes at {base:p}");
            Ok(())
        } else {
            Err(VmError::Release {
                size,
                code: last_os_error(),
            })
        }
    }
}

#[cfg(unix)]
mod os {
    use std::ptr::{self, NonNull};

    pub(super) fn page_size() -> u64 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size < 1 {
            4096
        } else {
            size as u64
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const RESERVE_FLAGS: libc::c_int =
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    pub(super) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
        // SAFETY: anonymous PROT_NONE mapping at an OS-chosen address.
        let ptr =
            unsafe { libc::mmap(ptr::null_mut(), len, libc::PROT_NONE, RESERVE_FLAGS, -1, 0) };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        NonNull::new(ptr.cast())
    }

    pub(super) unsafe fn commit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: upheld by the caller.
        unsafe { libc::mprotect(ptr.cast(), len, libc::PROT_READ | libc::PROT_WRITE) == 0 }
    }

    pub(super) unsafe fn decommit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: upheld by the caller. MADV_DONTNEED drops the pages so the
        // next commit observes zeroes again.
        unsafe {
            libc::madvise(ptr.cast(), len, libc::MADV_DONTNEED) == 0
                && libc::mprotect(ptr.cast(), len, libc::PROT_NONE) == 0
        }
    }

    pub(super) unsafe fn release(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: upheld by the caller.
        unsafe { libc::munmap(ptr.cast(), len) == 0 }
    }
}

#[cfg(windows)]
mod os {
    use std::ptr::{self, NonNull};

    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_NOACCESS, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub(super) fn page_size() -> u64 {
        // SAFETY: SYSTEM_INFO is plain data; GetSystemInfo fills it in.
        let info = unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        u64::from(info.dwPageSize.max(1))
    }

    pub(super) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
        // SAFETY: reserving at an OS-chosen address.
        let ptr = unsafe { VirtualAlloc(ptr::null(), len, MEM_RESERVE, PAGE_NOACCESS) };
        NonNull::new(ptr.cast())
    }

    pub(super) unsafe fn commit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: upheld by the caller.
        let p = unsafe { VirtualAlloc(ptr.cast_const().cast(), len, MEM_COMMIT, PAGE_READWRITE) };
        !p.is_null()
    }

    pub(super) unsafe fn decommit(ptr: *mut u8, len: usize) -> bool {
        // SAFETY: upheld by the caller.
        unsafe { VirtualFree(ptr.cast(), len, MEM_DECOMMIT) != 0 }
    }

    pub(super) unsafe fn release(ptr: *mut u8, _len: usize) -> bool {
        // MEM_RELEASE requires a zero size and frees the whole reservation.
        // SAFETY: upheld by the caller.
        unsafe { VirtualFree(ptr.cast(), 0, MEM_RELEASE) != 0 }
    }
}
