//! The virtual-memory-backed linear arena.
//!
//! An [`Arena`] reserves a large range of address space up front and
//! commits physical pages only as its cursor advances. Memory is released
//! in bulk by rewinding to an earlier [`position`](Arena::position), never
//! per object. When the reservation runs out the arena spills into a fresh
//! segment (unless [`ArenaFlags::NO_CHAIN`] is set), so one arena presents
//! a single growing allocator regardless of how many reservations back it.
//!
//! # Borrowing model
//!
//! Pushes take `&self` and hand out `&mut [u8]` tied to that borrow, so any
//! number of allocations can be live at once. Every operation that frees
//! memory out from under such slices ([`pop_to`](Arena::pop_to),
//! [`clear`](Arena::clear), [`rewind`](Arena::rewind)) takes `&mut self`.
//! Scoped rewinds through a shared reference go through [`Temp`], which
//! checks nesting at runtime.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use vmarena_core::{checked_align_up, checked_round_up, round_up, SystemMemory, VirtualMemory};

use crate::bump::BumpAlloc;
use crate::config::{ArenaConfig, ArenaFlags};
use crate::error::ArenaError;
use crate::raw;
use crate::segment::{Segment, SegmentChain, ARENA_HEADER_SIZE};
use crate::temp::Temp;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an arena.
///
/// Used by scratch pools to exclude arenas a caller is already using, and
/// by [`Checkpoint`]s to refuse rewinding the wrong arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u64);

impl ArenaId {
    fn next() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena#{}", self.0)
    }
}

/// A saved arena position.
///
/// Checkpoints keep nothing alive; they only remember where to rewind to.
/// Pass one to [`Arena::rewind`] to free everything allocated after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct Checkpoint {
    pub(crate) arena: ArenaId,
    pub(crate) pos: u64,
}

impl Checkpoint {
    /// The arena this checkpoint was taken on.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// The absolute position recorded.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

/// A linear allocator over reserved virtual memory.
///
/// See the [module documentation](self) for the borrowing model.
pub struct Arena<V: VirtualMemory = SystemMemory> {
    id: ArenaId,
    vm: V,
    /// Page-rounded reservation per segment.
    reserve_size: u64,
    /// Page-rounded initial commit, also the commit step.
    commit_size: u64,
    flags: ArenaFlags,
    /// Header plus name; the lowest position ever handed out.
    floor: u64,
    name_len: u64,
    chain: RefCell<SegmentChain>,
    /// Number of open `Temp` scopes.
    depth: Cell<u32>,
}

impl Arena<SystemMemory> {
    /// Create an unnamed arena on the system provider.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_memory(SystemMemory::new(), config, None)
    }

    /// Create an arena whose name is stored inline after its header.
    pub fn with_name(config: ArenaConfig, name: &str) -> Result<Self, ArenaError> {
        Self::with_memory(SystemMemory::new(), config, Some(name))
    }

    /// Create an arena over a caller-supplied buffer.
    ///
    /// Shorthand for [`Arena::create`] with the system provider and no name.
    pub fn from_buffer(config: ArenaConfig, buf: &'static mut [u8]) -> Result<Self, ArenaError> {
        Self::create(SystemMemory::new(), config, Some(buf), None)
    }
}

impl<V: VirtualMemory> Arena<V> {
    /// Create an arena on an explicit provider.
    ///
    /// Shorthand for [`Arena::create`] without a backing buffer.
    pub fn with_memory(vm: V, config: ArenaConfig, name: Option<&str>) -> Result<Self, ArenaError> {
        Self::create(vm, config, None, name)
    }

    /// Create an arena.
    ///
    /// Without `backing`, reserves `config.reserve_size` bytes and commits
    /// the first `config.commit_size`, both rounded up to the provider's
    /// page size. With `backing`, the buffer becomes the first segment: it
    /// counts as fully committed and is never reserved, committed or
    /// released by the arena. Segments chained once it is full come from
    /// `vm`, sized by `config`.
    ///
    /// `name` is stored inline after the header of the first segment.
    ///
    /// Fails with [`ArenaError::Memory`] if the provider refuses a request,
    /// and with [`ArenaError::InvalidConfig`] if the config is inconsistent
    /// or the name does not fit the first segment.
    pub fn create(
        vm: V,
        config: ArenaConfig,
        backing: Option<&'static mut [u8]>,
        name: Option<&str>,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let (reserve_size, commit_size) = rounded_sizes(&vm, &config)?;
        let name = name.unwrap_or("");
        let name_len = u32::try_from(name.len()).map_err(|_| ArenaError::InvalidConfig {
            reason: format!("arena name of {} bytes is too long", name.len()),
        })?;

        let mut first = match backing {
            Some(buf) => Segment::borrowed(buf, commit_size)?,
            None => Segment::reserve(&vm, reserve_size, commit_size, commit_size, 0)?,
        };
        if !name.is_empty() {
            if let Err(err) = first.write_name(&vm, name) {
                first.release(&vm);
                return Err(err);
            }
        }
        first.stamp(name_len, config.flags.bits());
        log::debug!(
            "created arena {name:?}: {} bytes reserved, {} committed",
            first.reserved(),
            first.committed()
        );
        Ok(Self::assemble(
            vm,
            config.flags,
            reserve_size,
            commit_size,
            u64::from(name_len),
            first,
        ))
    }

    fn assemble(
        vm: V,
        flags: ArenaFlags,
        reserve_size: u64,
        commit_size: u64,
        name_len: u64,
        first: Segment,
    ) -> Self {
        let floor = first.cursor();
        Self {
            id: ArenaId::next(),
            vm,
            reserve_size,
            commit_size,
            flags,
            floor,
            name_len,
            chain: RefCell::new(SegmentChain::new(first)),
            depth: Cell::new(0),
        }
    }

    /// This arena's identity.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// The name given at creation, if any.
    #[allow(unsafe_code)]
    pub fn name(&self) -> Option<&str> {
        if self.name_len == 0 {
            return None;
        }
        let chain = self.chain.borrow();
        // SAFETY: the first segment lives until `self` is dropped and its
        // name bytes are below the floor, so nothing ever rewrites them.
        Some(unsafe { chain.first().name(self.name_len) })
    }

    /// The provider this arena allocates from.
    pub fn memory(&self) -> &V {
        &self.vm
    }

    /// The behaviour flags.
    pub fn flags(&self) -> ArenaFlags {
        self.flags
    }

    /// Size of the header plus inline name: the position of a fresh arena.
    pub fn header_size(&self) -> u64 {
        self.floor
    }

    /// Current absolute position.
    ///
    /// Positions are opaque tokens for [`pop_to`](Self::pop_to); they grow
    /// monotonically between rewinds, across chained segments too.
    pub fn position(&self) -> u64 {
        self.chain.borrow().position()
    }

    /// Bytes committed in the active segment.
    pub fn committed(&self) -> u64 {
        self.chain.borrow().active().committed()
    }

    /// Bytes reserved by the active segment.
    pub fn reserved(&self) -> u64 {
        self.chain.borrow().active().reserved()
    }

    /// Bytes committed across every segment.
    pub fn total_committed(&self) -> u64 {
        self.chain.borrow().iter().map(Segment::committed).sum()
    }

    /// Bytes reserved across every segment.
    pub fn total_reserved(&self) -> u64 {
        self.chain.borrow().iter().map(Segment::reserved).sum()
    }

    /// Number of segments in the chain (at least 1).
    pub fn segment_count(&self) -> usize {
        self.chain.borrow().len()
    }

    /// Depth of the innermost open [`Temp`] scope, 0 when none is open.
    pub fn scope_depth(&self) -> u32 {
        self.depth.get()
    }

    /// Open a scoped checkpoint on this arena. Shorthand for
    /// [`Temp::begin`].
    pub fn temp(&self) -> Temp<'_, V> {
        Temp::begin(self)
    }

    /// Snapshot the current position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            arena: self.id,
            pos: self.position(),
        }
    }

    /// Rewind to `checkpoint`, freeing everything allocated after it.
    ///
    /// Rejects checkpoints taken on another arena, and checkpoints that lie
    /// ahead of the current position (already rewound past).
    pub fn rewind(&mut self, checkpoint: Checkpoint) -> Result<(), ArenaError> {
        if checkpoint.arena != self.id {
            return Err(ArenaError::ForeignCheckpoint {
                expected: self.id,
                found: checkpoint.arena,
            });
        }
        let position = self.position();
        if checkpoint.pos > position {
            return Err(ArenaError::CheckpointAhead {
                target: checkpoint.pos,
                position,
            });
        }
        self.pop_to(checkpoint.pos);
        Ok(())
    }

    /// Rewind to the absolute position `pos`.
    ///
    /// Segments chained after `pos` are released. The position is clamped
    /// so it never moves below [`header_size`](Self::header_size).
    ///
    /// # Panics
    ///
    /// Panics if `pos` is ahead of the current position.
    pub fn pop_to(&mut self, pos: u64) {
        let position = self.position();
        assert!(
            pos <= position,
            "{}: pop_to({pos}) is ahead of the current position {position}",
            self.id
        );
        // Only reachable with scopes open if a `Temp` was leaked.
        self.depth.set(0);
        let target = pos.max(self.floor);
        self.chain.get_mut().pop_to(&self.vm, target);
    }

    /// Free the last `amount` bytes (saturating at the header).
    pub fn pop(&mut self, amount: u64) {
        let target = self.position().saturating_sub(amount);
        self.pop_to(target);
    }

    /// Rewind to the header, keeping the reservation.
    ///
    /// With [`ArenaFlags::DECOMMIT_ON_CLEAR`] the pages above the initial
    /// commit are also handed back to the provider.
    pub fn clear(&mut self) {
        self.pop_to(0);
        if self.flags.contains(ArenaFlags::DECOMMIT_ON_CLEAR) {
            let keep = round_up(self.floor, self.commit_size).max(self.commit_size);
            let chain = self.chain.get_mut();
            if let Err(err) = chain.first_mut().decommit_above(&self.vm, keep) {
                log::warn!("{}: decommit on clear failed: {err}", self.id);
            }
        }
    }

    /// Decommit pages of the active segment above the cursor.
    ///
    /// Returns the number of bytes handed back. Whole commit steps
    /// covering the cursor stay committed.
    pub fn decommit_unused(&self) -> Result<u64, ArenaError> {
        let mut chain = self.chain.borrow_mut();
        let freed = chain.active_mut().decommit_above(&self.vm, 0)?;
        if freed > 0 {
            log::trace!("{}: decommitted {freed} unused bytes", self.id);
        }
        Ok(freed)
    }

    /// Allocate on behalf of the scope at `level` (0 is the arena itself).
    #[allow(unsafe_code, clippy::mut_from_ref)]
    pub(crate) fn push_at_level(
        &self,
        level: u32,
        size: u64,
        align: u64,
    ) -> Result<&mut [std::mem::MaybeUninit<u8>], ArenaError> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment { align });
        }
        let active = self.depth.get();
        if level != active {
            return Err(ArenaError::ScopeConflict {
                active,
                caller: level,
            });
        }
        let (base, start) = {
            let mut chain = self.chain.borrow_mut();
            self.bump(&mut chain, size, align)?
        };
        // SAFETY: [start, start + size) was just committed and lies past
        // every region handed out before, so it is disjoint from them. It
        // is only freed by `pop_to` (needs `&mut self`, so this borrow has
        // ended) or by closing the innermost scope, whose pushes are tied
        // to the borrow of that scope's `Temp`.
        Ok(unsafe { raw::uninit_bytes(base, start, size) })
    }

    /// Advance the cursor, chaining a new segment when necessary.
    fn bump(
        &self,
        chain: &mut SegmentChain,
        size: u64,
        align: u64,
    ) -> Result<(std::ptr::NonNull<u8>, u64), ArenaError> {
        let active = chain.active_mut();
        let (start, end) = active.place(size, align)?;
        if end <= active.reserved() {
            active.ensure_committed(&self.vm, end)?;
            active.set_cursor(end);
            return Ok((active.base(), start));
        }
        if self.flags.contains(ArenaFlags::NO_CHAIN) {
            return Err(ArenaError::CapacityExceeded {
                requested: size,
                reserved: active.reserved(),
            });
        }

        let need = ARENA_HEADER_SIZE
            .checked_add(size)
            .and_then(|n| n.checked_add(align))
            .ok_or(ArenaError::SizeOverflow)?;
        let reserve = checked_align_up(need, self.vm.page_size())
            .ok_or(ArenaError::SizeOverflow)?
            .max(self.reserve_size);
        let commit = checked_round_up(need, self.commit_size)
            .ok_or(ArenaError::SizeOverflow)?
            .min(reserve);
        let base_pos = chain.next_base_pos().ok_or(ArenaError::SizeOverflow)?;
        let mut segment = Segment::reserve(&self.vm, reserve, commit, self.commit_size, base_pos)?;
        segment.stamp(0, self.flags.bits());
        let (start, end) = segment.place(size, align)?;
        segment.set_cursor(end);
        let base = segment.base();
        log::debug!(
            "{}: chained segment {} for a {size}-byte push",
            self.id,
            chain.len() + 1
        );
        chain.push(segment);
        Ok((base, start))
    }

    /// Enter a new scope level and return it.
    pub(crate) fn open_scope(&self) -> u32 {
        let level = self.depth.get() + 1;
        self.depth.set(level);
        level
    }

    /// Leave scope `level`, rewinding to `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is not the innermost open scope, unless the thread
    /// is already unwinding, in which case nothing is rewound.
    pub(crate) fn close_scope(&self, level: u32, pos: u64) {
        let depth = self.depth.get();
        if depth != level {
            if std::thread::panicking() {
                return;
            }
            panic!(
                "{}: scope at depth {level} ended while depth {depth} is still open",
                self.id
            );
        }
        self.depth.set(level - 1);
        self.chain
            .borrow_mut()
            .pop_to(&self.vm, pos.max(self.floor));
    }
}

fn rounded_sizes<V: VirtualMemory>(vm: &V, config: &ArenaConfig) -> Result<(u64, u64), ArenaError> {
    let page = vm.page_size();
    let reserve = checked_align_up(config.reserve_size, page).ok_or(ArenaError::SizeOverflow)?;
    let commit = checked_align_up(config.commit_size, page).ok_or(ArenaError::SizeOverflow)?;
    Ok((reserve, commit.min(reserve)))
}

impl<V: VirtualMemory> BumpAlloc for Arena<V> {
    fn try_push_uninit(
        &self,
        size: u64,
        align: u64,
    ) -> Result<&mut [std::mem::MaybeUninit<u8>], ArenaError> {
        self.push_at_level(0, size, align)
    }

    fn arena_id(&self) -> ArenaId {
        self.id
    }
}

impl<V: VirtualMemory> fmt::Debug for Arena<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("position", &self.position())
            .field("committed", &self.total_committed())
            .field("reserved", &self.total_reserved())
            .field("segments", &self.segment_count())
            .field("depth", &self.depth.get())
            .finish()
    }
}

impl<V: VirtualMemory> Drop for Arena<V> {
    fn drop(&mut self) {
        log::debug!("{}: releasing {} segment(s)", self.id, self.segment_count());
        self.chain.get_mut().release_all(&self.vm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmarena_core::{align_up, KIB, MIB};

    fn small() -> ArenaConfig {
        ArenaConfig::new(MIB).with_commit_size(64 * KIB)
    }

    #[test]
    fn fresh_arena_position_is_header_size() {
        let arena = Arena::new(small()).unwrap();
        assert_eq!(arena.position(), ARENA_HEADER_SIZE);
        assert_eq!(arena.header_size(), ARENA_HEADER_SIZE);
        assert_eq!(arena.name(), None);
        assert_eq!(arena.segment_count(), 1);
    }

    #[test]
    fn named_arena_floor_covers_name() {
        let arena = Arena::with_name(small(), "frame-arena").unwrap();
        assert_eq!(arena.name(), Some("frame-arena"));
        assert_eq!(arena.header_size(), 2 * ARENA_HEADER_SIZE);
        assert_eq!(arena.position(), arena.header_size());
    }

    #[test]
    fn sizes_round_up_to_page() {
        let arena = Arena::new(ArenaConfig::new(MIB + 1).with_commit_size(1)).unwrap();
        let page = arena.memory().page_size();
        assert_eq!(arena.reserved(), align_up(MIB + 1, page));
        assert_eq!(arena.committed(), page);
    }

    #[test]
    fn pushes_are_ordered_and_aligned() {
        let arena = Arena::new(small()).unwrap();
        let a = arena.push(10, 1).as_ptr() as usize;
        let b = arena.push(4, 4).as_ptr() as usize;
        let c = arena.push(32, 64).as_ptr() as usize;
        assert_eq!(b, a + 12);
        assert_eq!(c % 64, 0);
        assert!(c >= b + 4);
    }

    #[test]
    fn pushed_bytes_are_zeroed_after_rewind() {
        let mut arena = Arena::new(small()).unwrap();
        let start = arena.position();
        arena.push(64, 8).fill(0xAB);
        arena.pop_to(start);
        assert!(arena.push(64, 8).iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_alignment_rejected() {
        let arena = Arena::new(small()).unwrap();
        assert!(matches!(
            arena.try_push(8, 3),
            Err(ArenaError::InvalidAlignment { align: 3 })
        ));
        assert!(matches!(
            arena.try_push(8, 0),
            Err(ArenaError::InvalidAlignment { align: 0 })
        ));
    }

    #[test]
    fn growth_commits_whole_steps() {
        let arena = Arena::new(small()).unwrap();
        arena.push(100 * KIB, 8);
        assert_eq!(arena.committed(), 128 * KIB);
        assert!(arena.committed() >= arena.position());
    }

    #[test]
    fn growth_with_non_power_of_two_step() {
        let mut arena = Arena::new(
            ArenaConfig::new(MIB)
                .with_commit_size(48 * KIB)
                .with_flags(ArenaFlags::DECOMMIT_ON_CLEAR),
        )
        .unwrap();
        let step = align_up(48 * KIB, arena.memory().page_size());
        for size in [60 * KIB, 1, 100 * KIB, 3 * KIB] {
            arena.push(size, 8);
            assert_eq!(arena.committed() % step, 0);
            assert!(arena.committed() >= arena.position());
        }
        arena.clear();
        assert_eq!(arena.committed(), step);
    }

    #[test]
    fn chained_segment_commit_rounds_to_step() {
        let arena = Arena::new(ArenaConfig::new(96 * KIB).with_commit_size(48 * KIB)).unwrap();
        let step = align_up(48 * KIB, arena.memory().page_size());
        arena.push(80 * KIB, 8);
        arena.push(50 * KIB, 8);
        assert_eq!(arena.segment_count(), 2);
        assert_eq!(arena.committed() % step, 0);
        assert!(arena.committed() >= 50 * KIB + ARENA_HEADER_SIZE);
    }

    #[test]
    fn pop_to_then_push_reuses_address() {
        let mut arena = Arena::new(small()).unwrap();
        let p = arena.position();
        let first = arena.push(24, 8).as_ptr();
        arena.push(1000, 16);
        arena.pop_to(p);
        assert_eq!(arena.position(), p);
        assert_eq!(arena.push(24, 8).as_ptr(), first);
    }

    #[test]
    fn pop_saturates_at_header() {
        let mut arena = Arena::with_name(small(), "x").unwrap();
        arena.push(100, 8);
        arena.pop(u64::MAX);
        assert_eq!(arena.position(), arena.header_size());
    }

    #[test]
    #[should_panic(expected = "ahead of the current position")]
    fn pop_to_forward_panics() {
        let mut arena = Arena::new(small()).unwrap();
        let p = arena.position();
        arena.pop_to(p + 8);
    }

    #[test]
    fn clear_twice_equals_once() {
        let mut arena = Arena::with_name(small(), "scratch").unwrap();
        arena.push(4096, 8);
        arena.clear();
        let once = arena.position();
        arena.clear();
        assert_eq!(arena.position(), once);
        assert_eq!(once, arena.header_size());
        assert_eq!(arena.name(), Some("scratch"));
    }

    #[test]
    fn chain_spills_and_pop_releases() {
        let mut arena = Arena::new(ArenaConfig::new(64 * KIB).with_commit_size(64 * KIB)).unwrap();
        let before = arena.checkpoint();
        arena.push(60 * KIB, 8);
        arena.push(16 * KIB, 8);
        assert_eq!(arena.segment_count(), 2);
        assert!(arena.position() > 64 * KIB);
        arena.rewind(before).unwrap();
        assert_eq!(arena.segment_count(), 1);
        assert_eq!(arena.position(), before.position());
    }

    #[test]
    fn oversized_push_gets_its_own_segment() {
        let arena = Arena::new(ArenaConfig::new(64 * KIB).with_commit_size(64 * KIB)).unwrap();
        let bytes = arena.push(MIB, 8);
        assert_eq!(bytes.len() as u64, MIB);
        assert_eq!(arena.segment_count(), 2);
        assert!(arena.reserved() >= MIB + ARENA_HEADER_SIZE);
    }

    #[test]
    fn no_chain_reports_capacity_exceeded() {
        let config = ArenaConfig::new(64 * KIB)
            .with_commit_size(64 * KIB)
            .with_flags(ArenaFlags::NO_CHAIN);
        let arena = Arena::new(config).unwrap();
        let err = arena.try_push(64 * KIB, 8).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
        assert!(err.is_out_of_memory());
        assert_eq!(arena.segment_count(), 1);
        assert_eq!(arena.position(), ARENA_HEADER_SIZE);
    }

    #[test]
    fn foreign_checkpoint_rejected() {
        let a = Arena::new(small()).unwrap();
        let mut b = Arena::new(small()).unwrap();
        let cp = a.checkpoint();
        assert!(matches!(
            b.rewind(cp),
            Err(ArenaError::ForeignCheckpoint { .. })
        ));
    }

    #[test]
    fn checkpoint_ahead_rejected() {
        let mut arena = Arena::new(small()).unwrap();
        arena.push(64, 8);
        let cp = arena.checkpoint();
        arena.clear();
        assert!(matches!(
            arena.rewind(cp),
            Err(ArenaError::CheckpointAhead { .. })
        ));
    }

    #[test]
    fn decommit_unused_returns_pages() {
        let mut arena = Arena::new(small()).unwrap();
        arena.push(300 * KIB, 8);
        arena.pop_to(0);
        let freed = arena.decommit_unused().unwrap();
        assert!(freed > 0);
        assert_eq!(arena.committed(), 64 * KIB);
        assert_eq!(arena.decommit_unused().unwrap(), 0);
    }

    #[test]
    fn name_too_long_for_reservation_rejected() {
        let name = "n".repeat(2 * MIB as usize);
        let err = Arena::with_name(small(), &name).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn from_buffer_uses_caller_memory() {
        let buf: &'static mut [u8] = Box::leak(vec![0u8; 8 * KIB as usize].into_boxed_slice());
        let range = buf.as_ptr_range();
        let arena = Arena::from_buffer(small().with_flags(ArenaFlags::NO_CHAIN), buf).unwrap();
        let bytes = arena.push(128, 8);
        assert!(range.contains(&(bytes.as_ptr() as *const u8)));
        assert!(arena.try_push(8 * KIB, 8).is_err());
    }

    #[test]
    fn ids_are_unique() {
        let a = Arena::new(small()).unwrap();
        let b = Arena::new(small()).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("arena#"));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pushes_never_overlap(
                ops in proptest::collection::vec((0u64..5000, 0u32..8), 1..50),
            ) {
                let config = ArenaConfig::new(256 * KIB).with_commit_size(64 * KIB);
                let arena = Arena::new(config).unwrap();
                let mut last_end = 0usize;
                for (size, shift) in ops {
                    let align = 1u64 << shift;
                    let bytes = arena.push(size, align);
                    let start = bytes.as_ptr() as usize;
                    prop_assert_eq!(start % align as usize, 0);
                    prop_assert_eq!(bytes.len() as u64, size);
                    if arena.segment_count() == 1 {
                        prop_assert!(start >= last_end);
                    }
                    last_end = start + bytes.len();
                    let local = arena.position() - arena.chain.borrow().active().base_pos();
                    prop_assert!(arena.committed() >= local);
                }
            }

            #[test]
            fn rewind_round_trip_is_exact(
                prefix in 0u64..10_000,
                junk in proptest::collection::vec(1u64..50_000, 0..20),
            ) {
                let config = ArenaConfig::new(128 * KIB).with_commit_size(64 * KIB);
                let mut arena = Arena::new(config).unwrap();
                arena.push(prefix, 8);
                let p = arena.position();
                let probe = arena.push(16, 8).as_ptr();
                arena.pop_to(p);
                for size in junk {
                    arena.push(size, 8);
                }
                arena.pop_to(p);
                prop_assert_eq!(arena.position(), p);
                prop_assert_eq!(arena.segment_count(), 1);
                prop_assert_eq!(arena.push(16, 8).as_ptr(), probe);
            }
        }
    }
}
