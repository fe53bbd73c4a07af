//! Pools of general-purpose scratch arenas.
//!
//! A [`ScratchPool`] owns a small fixed set of independent arenas. Any
//! function that needs temporary memory borrows one with
//! [`acquire`](ScratchPool::acquire) and gets a [`Temp`] that rewinds the
//! member when dropped; nothing is ever removed from the pool.
//!
//! The exclusion list solves aliasing between nested users. A function
//! already holding scratch arena A that calls a helper which also wants
//! scratch memory passes A's id down; the helper excludes it and gets a
//! different member, so rewinding the helper's scope cannot free A's data.
//! With the default two members this supports one level of such nesting.

use smallvec::SmallVec;
use vmarena_core::{SystemMemory, VirtualMemory};

use crate::arena::{Arena, ArenaId};
use crate::config::ScratchConfig;
use crate::error::ArenaError;
use crate::temp::Temp;

/// A fixed-size pool of independent scratch arenas.
pub struct ScratchPool<V: VirtualMemory = SystemMemory> {
    arenas: SmallVec<[Arena<V>; ScratchConfig::DEFAULT_POOL_SIZE]>,
}

impl ScratchPool<SystemMemory> {
    /// Create a pool on the system provider.
    pub fn new(config: &ScratchConfig) -> Result<Self, ArenaError> {
        Self::with_memory(SystemMemory::new(), config)
    }
}

impl<V: VirtualMemory + Clone> ScratchPool<V> {
    /// Create a pool whose members all allocate from clones of `vm`.
    ///
    /// Members are named `scratch-0`, `scratch-1`, and so on.
    pub fn with_memory(vm: V, config: &ScratchConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let mut arenas = SmallVec::with_capacity(config.pool_size);
        for index in 0..config.pool_size {
            let name = format!("scratch-{index}");
            arenas.push(Arena::with_memory(vm.clone(), config.arena, Some(&name))?);
        }
        log::debug!("created scratch pool with {} arenas", arenas.len());
        Ok(Self { arenas })
    }
}

impl<V: VirtualMemory> ScratchPool<V> {
    /// Borrow the first member not listed in `exclude`.
    ///
    /// Returns `None` when every member is excluded: the caller is nested
    /// deeper than the pool supports. That is a design limit of the caller,
    /// not an environmental failure, so it is reported at `warn` level and
    /// left to the caller to handle.
    ///
    /// Debug builds do not assert here either. Exhaustion is an ordinary,
    /// observable result that callers may check for, so the loud signal is
    /// the `warn` log rather than a panic.
    pub fn acquire(&self, exclude: &[ArenaId]) -> Option<Temp<'_, V>> {
        let found = self
            .arenas
            .iter()
            .find(|arena| !exclude.contains(&arena.id()));
        match found {
            Some(arena) => Some(Temp::begin(arena)),
            None => {
                log::warn!(
                    "scratch pool exhausted: all {} arenas excluded",
                    self.arenas.len()
                );
                None
            }
        }
    }

    /// Hand a scratch borrow back, rewinding its arena.
    ///
    /// Equivalent to dropping `temp`.
    pub fn release(&self, temp: Temp<'_, V>) {
        debug_assert!(self.contains(temp.arena().id()));
        temp.end();
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Whether the pool has no members. Never true for a validated config.
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// Ids of every member, in acquisition order.
    pub fn ids(&self) -> SmallVec<[ArenaId; ScratchConfig::DEFAULT_POOL_SIZE]> {
        self.arenas.iter().map(Arena::id).collect()
    }

    /// Whether `id` names a member of this pool.
    pub fn contains(&self, id: ArenaId) -> bool {
        self.arenas.iter().any(|arena| arena.id() == id)
    }

    /// The member arenas.
    pub fn arenas(&self) -> &[Arena<V>] {
        &self.arenas
    }
}

impl<V: VirtualMemory> std::fmt::Debug for ScratchPool<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.arenas.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArenaConfig, BumpAlloc};
    use vmarena_core::{KIB, MIB};

    fn pool() -> ScratchPool {
        ScratchPool::new(&ScratchConfig {
            pool_size: 2,
            arena: ArenaConfig::new(MIB).with_commit_size(64 * KIB),
        })
        .unwrap()
    }

    #[test]
    fn members_are_named_and_distinct() {
        let pool = pool();
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_empty());
        assert_eq!(pool.arenas()[0].name(), Some("scratch-0"));
        assert_eq!(pool.arenas()[1].name(), Some("scratch-1"));
        let ids = pool.ids();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn acquire_without_exclusion_takes_first() {
        let pool = pool();
        let scratch = pool.acquire(&[]).unwrap();
        assert_eq!(scratch.arena().id(), pool.ids()[0]);
    }

    #[test]
    fn excluded_member_is_skipped() {
        let pool = pool();
        let first = pool.acquire(&[]).unwrap();
        let second = pool.acquire(&[first.arena().id()]).unwrap();
        assert_ne!(first.arena().id(), second.arena().id());
    }

    #[test]
    fn all_excluded_is_unsatisfiable() {
        let pool = pool();
        let ids = pool.ids();
        assert!(pool.acquire(&ids).is_none());
    }

    #[test]
    fn release_rewinds_member() {
        let pool = pool();
        let scratch = pool.acquire(&[]).unwrap();
        scratch.push(4096, 8);
        let id = scratch.arena_id();
        pool.release(scratch);
        let arena = pool.arenas().iter().find(|a| a.id() == id).unwrap();
        assert_eq!(arena.position(), arena.header_size());
    }

    #[test]
    fn nested_acquire_on_same_member_nests_scopes() {
        let pool = pool();
        let outer = pool.acquire(&[]).unwrap();
        outer.push(64, 8);
        {
            let inner = pool.acquire(&[]).unwrap();
            assert_eq!(inner.arena_id(), outer.arena_id());
            assert_eq!(inner.level(), 2);
            inner.push(64, 8);
        }
        assert!(outer.try_push(64, 8).is_ok());
    }

    #[test]
    fn zero_sized_pool_rejected() {
        let config = ScratchConfig {
            pool_size: 0,
            ..ScratchConfig::default()
        };
        assert!(ScratchPool::new(&config).is_err());
    }
}
