//! Arena and scratch pool configuration.

use bitflags::bitflags;
use vmarena_core::units::{KIB, MIB};

use crate::error::ArenaError;
use crate::segment::ARENA_HEADER_SIZE;

bitflags! {
    /// Behaviour switches for a single arena.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ArenaFlags: u32 {
        /// Never chain a new segment when the reservation is exhausted;
        /// such pushes fail with [`ArenaError::CapacityExceeded`].
        const NO_CHAIN = 1 << 0;
        /// After [`Arena::clear`](crate::Arena::clear), hand the pages above
        /// the initial commit back to the OS.
        const DECOMMIT_ON_CLEAR = 1 << 1;
    }
}

/// Sizing and behaviour of one arena.
///
/// Sizes are rounded up to the provider's page size at creation; the
/// rounded commit size doubles as the commit granularity used whenever a
/// push crosses the committed boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Address space reserved per segment, in bytes.
    ///
    /// Default: 64 MiB. Reservations cost no physical memory, so this is
    /// normally far larger than what is ever touched.
    pub reserve_size: u64,

    /// Bytes committed up front, and the step by which the committed
    /// extent grows afterwards.
    ///
    /// Default: 64 KiB. Must not exceed `reserve_size`.
    pub commit_size: u64,

    /// Behaviour switches. Default: empty (chaining enabled).
    pub flags: ArenaFlags,
}

impl ArenaConfig {
    /// Default reservation: 64 MiB.
    pub const DEFAULT_RESERVE_SIZE: u64 = 64 * MIB;

    /// Default commit step: 64 KiB.
    pub const DEFAULT_COMMIT_SIZE: u64 = 64 * KIB;

    /// Default flags: none.
    pub const DEFAULT_FLAGS: ArenaFlags = ArenaFlags::empty();

    /// Config reserving `reserve_size` bytes with the default commit step.
    pub const fn new(reserve_size: u64) -> Self {
        Self {
            reserve_size,
            commit_size: Self::DEFAULT_COMMIT_SIZE,
            flags: Self::DEFAULT_FLAGS,
        }
    }

    /// Replace the commit step.
    pub const fn with_commit_size(mut self, commit_size: u64) -> Self {
        self.commit_size = commit_size;
        self
    }

    /// Replace the flags.
    pub const fn with_flags(mut self, flags: ArenaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.reserve_size < ARENA_HEADER_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "reserve_size {} is smaller than the {ARENA_HEADER_SIZE}-byte header",
                    self.reserve_size
                ),
            });
        }
        if self.commit_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "commit_size must be nonzero".into(),
            });
        }
        if self.commit_size > self.reserve_size {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "commit_size {} exceeds reserve_size {}",
                    self.commit_size, self.reserve_size
                ),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RESERVE_SIZE)
    }
}

/// Configuration for a [`ScratchPool`](crate::ScratchPool).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchConfig {
    /// Number of independent scratch arenas per pool.
    ///
    /// Default: 2. This bounds how many non-conflicting scratch borrows a
    /// single call stack can hold at once.
    pub pool_size: usize,

    /// Configuration applied to every pool member.
    pub arena: ArenaConfig,
}

impl ScratchConfig {
    /// Default pool cardinality.
    pub const DEFAULT_POOL_SIZE: usize = 2;

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.pool_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "scratch pool_size must be at least 1".into(),
            });
        }
        self.arena.validate()
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            pool_size: Self::DEFAULT_POOL_SIZE,
            arena: ArenaConfig::default(),
        }
    }
}
