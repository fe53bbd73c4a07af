//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use vmarena_core::VmError;

use crate::arena::ArenaId;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The virtual memory provider refused a reserve or commit.
    Memory(VmError),
    /// A push needs more than the reservation holds and chaining is
    /// disabled for this arena.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: u64,
        /// Bytes reserved by the active segment.
        reserved: u64,
    },
    /// Alignment was zero or not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        align: u64,
    },
    /// A size or position computation overflowed `u64`.
    SizeOverflow,
    /// The arena was pushed through a scope that is not the innermost one.
    ///
    /// While a [`Temp`](crate::Temp) is open only the innermost scope may
    /// allocate; anything else would be freed out from under its owner.
    ScopeConflict {
        /// Depth of the innermost open scope.
        active: u32,
        /// Depth of the caller (0 for the arena itself).
        caller: u32,
    },
    /// The checkpoint was taken on a different arena.
    ForeignCheckpoint {
        /// The arena asked to rewind.
        expected: ArenaId,
        /// The arena the checkpoint belongs to.
        found: ArenaId,
    },
    /// The checkpoint lies beyond the current position, i.e. it was
    /// already rewound past.
    CheckpointAhead {
        /// Position recorded in the checkpoint.
        target: u64,
        /// Current arena position.
        position: u64,
    },
    /// An [`ArenaConfig`](crate::ArenaConfig) or
    /// [`ScratchConfig`](crate::ScratchConfig) invariant was violated.
    InvalidConfig {
        /// Description of which invariant was violated.
        reason: String,
    },
}

impl ArenaError {
    /// Whether the error comes from the environment (address space or
    /// physical memory) rather than from a caller bug.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            Self::Memory(_) | Self::CapacityExceeded { .. } | Self::SizeOverflow
        )
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(err) => write!(f, "virtual memory error: {err}"),
            Self::CapacityExceeded {
                requested,
                reserved,
            } => {
                write!(
                    f,
                    "arena capacity exceeded: requested {requested} bytes, reserved {reserved} bytes"
                )
            }
            Self::InvalidAlignment { align } => {
                write!(f, "alignment {align} is not a power of two")
            }
            Self::SizeOverflow => write!(f, "arena size computation overflowed"),
            Self::ScopeConflict { active, caller } => {
                write!(
                    f,
                    "scope conflict: allocation at depth {caller} while depth {active} is open"
                )
            }
            Self::ForeignCheckpoint { expected, found } => {
                write!(f, "checkpoint from {found} used to rewind {expected}")
            }
            Self::CheckpointAhead { target, position } => {
                write!(
                    f,
                    "checkpoint at {target} is ahead of the current position {position}"
                )
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Memory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VmError> for ArenaError {
    fn from(err: VmError) -> Self {
        Self::Memory(err)
    }
}
