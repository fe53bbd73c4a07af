//! Virtual memory provider errors.

use std::error::Error;
use std::fmt;

/// Errors reported by a [`VirtualMemory`](crate::VirtualMemory) provider.
///
/// `code` carries the raw OS error number (`errno` on Unix,
/// `GetLastError()` on Windows) when one is available, and `0` otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmError {
    /// The address-space reservation could not be made.
    Reserve {
        /// Number of bytes requested.
        size: u64,
        /// Raw OS error code.
        code: i32,
    },
    /// Pages inside a reservation could not be committed.
    Commit {
        /// Offset of the first page from the reservation base.
        offset: u64,
        /// Number of bytes requested.
        size: u64,
        /// Raw OS error code.
        code: i32,
    },
    /// Committed pages could not be returned to the OS.
    Decommit {
        /// Offset of the first page from the reservation base.
        offset: u64,
        /// Number of bytes requested.
        size: u64,
        /// Raw OS error code.
        code: i32,
    },
    /// A reservation could not be released.
    Release {
        /// Size of the reservation.
        size: u64,
        /// Raw OS error code.
        code: i32,
    },
    /// The requested size does not fit in the host's address space.
    SizeOverflow {
        /// The size that overflowed.
        size: u64,
    },
}

impl VmError {
    /// The raw OS error code, if the failure came from the OS.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Reserve { code, .. }
            | Self::Commit { code, .. }
            | Self::Decommit { code, .. }
            | Self::Release { code, .. } => Some(*code).filter(|&c| c != 0),
            Self::SizeOverflow { .. } => None,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserve { size, code } => {
                write!(f, "failed to reserve {size} bytes of address space (os error {code})")
            }
            Self::Commit { offset, size, code } => {
                write!(
                    f,
                    "failed to commit {size} bytes at offset {offset} (os error {code})"
                )
            }
            Self::Decommit { offset, size, code } => {
                write!(
                    f,
                    "failed to decommit {size} bytes at offset {offset} (os error {code})"
                )
            }
            Self::Release { size, code } => {
                write!(f, "failed to release {size}-byte reservation (os error {code})")
            }
            Self::SizeOverflow { size } => {
                write!(f, "size {size} does not fit in the address space")
            }
        }
    }
}

impl Error for VmError {}
