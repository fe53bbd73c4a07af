//! Scoped checkpoints.
//!
//! A [`Temp`] records an arena's position when it begins and rewinds to it
//! when it ends, freeing everything pushed through it in between. Scopes on
//! one arena nest strictly:
//!
//! ```text
//! arena            depth 0   push ok while no scope is open
//! └── outer Temp   depth 1   push ok while `inner` is not open
//!     └── inner    depth 2   the only place pushes are accepted
//! ```
//!
//! Pushing through anything but the innermost scope fails with
//! [`ArenaError::ScopeConflict`], and ending an outer scope while an inner
//! one is still open panics.

use std::fmt;
use std::mem::MaybeUninit;

use vmarena_core::{SystemMemory, VirtualMemory};

use crate::arena::{Arena, ArenaId, Checkpoint};
use crate::bump::BumpAlloc;
use crate::error::ArenaError;

/// A scoped checkpoint on an [`Arena`].
///
/// Created by [`Temp::begin`], [`Arena::temp`] or
/// [`ScratchPool::acquire`](crate::ScratchPool::acquire). Ends on
/// [`end`](Self::end) or drop. Slices pushed through a `Temp` borrow it, so
/// they cannot outlive the rewind.
#[must_use = "a Temp rewinds its arena as soon as it is dropped"]
pub struct Temp<'a, V: VirtualMemory = SystemMemory> {
    arena: &'a Arena<V>,
    pos: u64,
    level: u32,
}

impl<'a, V: VirtualMemory> Temp<'a, V> {
    /// Capture `arena`'s position and open a new scope on it.
    pub fn begin(arena: &'a Arena<V>) -> Self {
        let pos = arena.position();
        let level = arena.open_scope();
        log::trace!("{}: begin scope {level} at {pos}", arena.id());
        Self { arena, pos, level }
    }

    /// Rewind the arena to where this scope began.
    ///
    /// # Panics
    ///
    /// Panics if a scope opened after this one is still open.
    pub fn end(self) {}

    /// Open a nested scope on the same arena.
    ///
    /// The child borrows `self` mutably, so the borrow checker rules out
    /// pushing through the parent while the child is alive.
    pub fn temp(&mut self) -> Temp<'_, V> {
        Temp::begin(self.arena)
    }

    /// The arena this scope rewinds.
    pub fn arena(&self) -> &'a Arena<V> {
        self.arena
    }

    /// Position the arena will be rewound to.
    pub fn start(&self) -> u64 {
        self.pos
    }

    /// Current arena position.
    pub fn position(&self) -> u64 {
        self.arena.position()
    }

    /// Bytes pushed since this scope began.
    pub fn used(&self) -> u64 {
        self.arena.position().saturating_sub(self.pos)
    }

    /// Nesting depth of this scope (1 for the outermost).
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The position this scope began at, as a checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            arena: self.arena.id(),
            pos: self.pos,
        }
    }
}

impl<V: VirtualMemory> BumpAlloc for Temp<'_, V> {
    fn try_push_uninit(&self, size: u64, align: u64) -> Result<&mut [MaybeUninit<u8>], ArenaError> {
        self.arena.push_at_level(self.level, size, align)
    }

    fn arena_id(&self) -> ArenaId {
        self.arena.id()
    }
}

impl<V: VirtualMemory> Drop for Temp<'_, V> {
    fn drop(&mut self) {
        log::trace!(
            "{}: end scope {} back to {}",
            self.arena.id(),
            self.level,
            self.pos
        );
        self.arena.close_scope(self.level, self.pos);
    }
}

impl<V: VirtualMemory> fmt::Debug for Temp<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Temp")
            .field("arena", &self.arena.id())
            .field("start", &self.pos)
            .field("level", &self.level)
            .finish()
    }
}
