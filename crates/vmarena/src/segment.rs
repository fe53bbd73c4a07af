//! Virtual memory segments and the chain that strings them together.
//!
//! A [`Segment`] is one contiguous reservation (or one caller-supplied
//! buffer) with a bump cursor and a committed high-water mark. A
//! [`SegmentChain`] is the ordered list of segments backing one arena; the
//! last segment is the active one, and every segment's `base_pos` places it
//! on a single absolute position axis so that positions taken in one segment
//! stay meaningful after the arena has spilled into the next.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use vmarena_core::{checked_align_up, checked_round_up, round_up, VirtualMemory};

use crate::error::ArenaError;
use crate::raw::{self, SegmentHeader};

/// Bytes reserved at the start of every segment for its header.
///
/// The first segment of a named arena additionally stores the name right
/// after the header; see [`Arena::header_size`](crate::Arena::header_size).
pub const ARENA_HEADER_SIZE: u64 = 128;

/// A single contiguous region with bump allocation.
///
/// Invariant: `ARENA_HEADER_SIZE <= cursor <= reserved` and
/// `committed <= reserved`. The cursor may trail `committed` arbitrarily far
/// after a rewind; committed pages are kept until explicitly decommitted.
#[derive(Debug)]
pub(crate) struct Segment {
    base: NonNull<u8>,
    /// Absolute position of byte 0 of this segment.
    base_pos: u64,
    cursor: u64,
    committed: u64,
    reserved: u64,
    commit_step: u64,
    /// `false` for caller buffers, which are never committed or released.
    owned: bool,
}

impl Segment {
    /// Reserve `reserved` bytes and commit the first `commit` of them.
    ///
    /// Both sizes must already be page aligned. On a failed commit the
    /// reservation is handed back before the error is returned.
    pub(crate) fn reserve<V: VirtualMemory>(
        vm: &V,
        reserved: u64,
        commit: u64,
        commit_step: u64,
        base_pos: u64,
    ) -> Result<Self, ArenaError> {
        let base = vm.reserve(reserved)?;
        let commit = commit.min(reserved);
        // SAFETY: `base` was just reserved with `reserved >= commit` bytes.
        if let Err(err) = unsafe { vm.commit(base, 0, commit) } {
            // SAFETY: nothing has been handed out from this reservation.
            if let Err(release_err) = unsafe { vm.release(base, reserved) } {
                log::warn!("failed to release segment after commit error: {release_err}");
            }
            return Err(err.into());
        }
        log::debug!(
            "reserved segment at {:p}: {reserved} bytes reserved, {commit} committed, \
             base_pos {base_pos}",
            base.as_ptr()
        );
        Ok(Self {
            base,
            base_pos,
            cursor: ARENA_HEADER_SIZE,
            committed: commit,
            reserved,
            commit_step,
            owned: true,
        })
    }

    /// Wrap a caller buffer. The whole buffer counts as committed.
    pub(crate) fn borrowed(buf: &'static mut [u8], commit_step: u64) -> Result<Self, ArenaError> {
        let len = buf.len() as u64;
        if len < ARENA_HEADER_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "backing buffer of {len} bytes cannot hold the {ARENA_HEADER_SIZE}-byte header"
                ),
            });
        }
        Ok(Self {
            base: NonNull::from(buf).cast::<u8>(),
            base_pos: 0,
            cursor: ARENA_HEADER_SIZE,
            committed: len,
            reserved: len,
            commit_step,
            owned: false,
        })
    }

    /// Write the segment header, recording `name_len` and `flags`.
    pub(crate) fn stamp(&mut self, name_len: u32, flags: u32) {
        let header = SegmentHeader {
            reserved: self.reserved,
            commit_step: self.commit_step,
            base_pos: self.base_pos,
            name_len,
            flags,
        };
        // SAFETY: every segment has at least ARENA_HEADER_SIZE committed
        // bytes, and the header area is never handed out.
        unsafe { raw::write_header(self.base, header) }
    }

    /// Copy `name` right after the header and move the cursor past it,
    /// aligned to [`ARENA_HEADER_SIZE`]. Returns the new cursor.
    ///
    /// Only called while the segment is fresh; the name area lies below
    /// every cursor the segment will ever have again.
    pub(crate) fn write_name<V: VirtualMemory>(
        &mut self,
        vm: &V,
        name: &str,
    ) -> Result<u64, ArenaError> {
        let end = ARENA_HEADER_SIZE
            .checked_add(name.len() as u64)
            .ok_or(ArenaError::SizeOverflow)?;
        let floor = checked_align_up(end, ARENA_HEADER_SIZE).ok_or(ArenaError::SizeOverflow)?;
        if floor > self.reserved {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "name of {} bytes does not fit a {}-byte reservation",
                    name.len(),
                    self.reserved
                ),
            });
        }
        self.ensure_committed(vm, floor)?;
        // SAFETY: [HEADER, end) is committed and nothing references it.
        let dst = unsafe { raw::uninit_bytes(self.base, ARENA_HEADER_SIZE, name.len() as u64) };
        raw::copy_bytes(dst, name.as_bytes());
        self.cursor = floor;
        Ok(floor)
    }

    /// Read back a name written by [`write_name`](Self::write_name).
    ///
    /// # Safety
    ///
    /// `len` must be the length passed to `write_name`, and the segment must
    /// outlive `'a`.
    pub(crate) unsafe fn name<'a>(&self, len: u64) -> &'a str {
        // SAFETY: upheld by the caller; the name bytes are never rewritten.
        unsafe { raw::str_at(self.base, ARENA_HEADER_SIZE, len) }
    }

    /// Where a push of `size` bytes aligned to `align` would land, as local
    /// `(start, end)` offsets. Alignment applies to the absolute address.
    ///
    /// The result may extend past the reservation; the caller checks.
    pub(crate) fn place(&self, size: u64, align: u64) -> Result<(u64, u64), ArenaError> {
        let base_addr = self.base.as_ptr() as usize as u64;
        let addr = base_addr
            .checked_add(self.cursor)
            .ok_or(ArenaError::SizeOverflow)?;
        let aligned = checked_align_up(addr, align).ok_or(ArenaError::SizeOverflow)?;
        let start = aligned - base_addr;
        let end = start.checked_add(size).ok_or(ArenaError::SizeOverflow)?;
        Ok((start, end))
    }

    /// Grow the committed extent to cover `end`, in one provider call.
    ///
    /// The new extent is `end` rounded up to the commit step and clamped to
    /// the reservation.
    pub(crate) fn ensure_committed<V: VirtualMemory>(
        &mut self,
        vm: &V,
        end: u64,
    ) -> Result<(), ArenaError> {
        if end <= self.committed {
            return Ok(());
        }
        if end > self.reserved {
            return Err(ArenaError::CapacityExceeded {
                requested: end,
                reserved: self.reserved,
            });
        }
        let target = checked_round_up(end, self.commit_step)
            .ok_or(ArenaError::SizeOverflow)?
            .min(self.reserved);
        let grow = target - self.committed;
        // SAFETY: only owned segments can have `committed < reserved`, and
        // [committed, target) lies inside their reservation.
        unsafe { vm.commit(self.base, self.committed, grow)? };
        log::trace!(
            "committed {grow} bytes at {:p}+{} (now {target} of {})",
            self.base.as_ptr(),
            self.committed,
            self.reserved
        );
        self.committed = target;
        Ok(())
    }

    /// Decommit everything above `keep`, rounded up to the commit step.
    ///
    /// Returns the number of bytes decommitted. Caller buffers are left
    /// alone.
    pub(crate) fn decommit_above<V: VirtualMemory>(
        &mut self,
        vm: &V,
        keep: u64,
    ) -> Result<u64, ArenaError> {
        if !self.owned {
            return Ok(0);
        }
        let keep = round_up(keep.max(self.cursor), self.commit_step).min(self.reserved);
        if keep >= self.committed {
            return Ok(0);
        }
        let shrink = self.committed - keep;
        // SAFETY: [keep, committed) is above the cursor, so no live
        // reference points into it.
        unsafe { vm.decommit(self.base, keep, shrink)? };
        log::trace!(
            "decommitted {shrink} bytes at {:p}+{keep}",
            self.base.as_ptr()
        );
        self.committed = keep;
        Ok(shrink)
    }

    /// Hand the reservation back to the provider.
    pub(crate) fn release<V: VirtualMemory>(self, vm: &V) {
        if !self.owned {
            return;
        }
        // SAFETY: the segment is consumed, and the arena only releases a
        // segment once every reference into it has ended.
        match unsafe { vm.release(self.base, self.reserved) } {
            Ok(()) => log::debug!(
                "released segment at {:p} ({} bytes, base_pos {})",
                self.base.as_ptr(),
                self.reserved,
                self.base_pos
            ),
            Err(err) => log::warn!("failed to release segment: {err}"),
        }
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[cfg(test)]
    pub(crate) fn base_pos(&self) -> u64 {
        self.base_pos
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, cursor: u64) {
        debug_assert!(cursor >= ARENA_HEADER_SIZE && cursor <= self.committed);
        self.cursor = cursor;
    }

    pub(crate) fn committed(&self) -> u64 {
        self.committed
    }

    pub(crate) fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Absolute position of the cursor.
    pub(crate) fn position(&self) -> u64 {
        self.base_pos + self.cursor
    }
}

/// The segments backing one arena, oldest first.
///
/// Never empty: the first segment lives as long as the arena.
#[derive(Debug)]
pub(crate) struct SegmentChain {
    segments: Vec<Segment>,
}

impl SegmentChain {
    pub(crate) fn new(first: Segment) -> Self {
        Self {
            segments: vec![first],
        }
    }

    pub(crate) fn first(&self) -> &Segment {
        &self.segments[0]
    }

    pub(crate) fn first_mut(&mut self) -> &mut Segment {
        &mut self.segments[0]
    }

    pub(crate) fn active(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }

    pub(crate) fn active_mut(&mut self) -> &mut Segment {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Absolute position of the next segment's byte 0.
    pub(crate) fn next_base_pos(&self) -> Option<u64> {
        let active = self.active();
        active.base_pos.checked_add(active.reserved)
    }

    /// Link `segment` as the new active segment.
    pub(crate) fn push(&mut self, segment: Segment) {
        debug_assert_eq!(Some(segment.base_pos), self.next_base_pos());
        self.segments.push(segment);
    }

    pub(crate) fn position(&self) -> u64 {
        self.active().position()
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Rewind to the absolute position `pos`.
    ///
    /// Every segment that starts at or after `pos` is released, except the
    /// first. The active cursor is then clamped into
    /// `[ARENA_HEADER_SIZE, cursor]`: a position inside the unused tail left
    /// behind when the chain spilled lands on the old cursor, one inside a
    /// later segment's header lands just past it.
    pub(crate) fn pop_to<V: VirtualMemory>(&mut self, vm: &V, pos: u64) {
        while self.segments.len() > 1 && self.active().base_pos >= pos {
            if let Some(segment) = self.segments.pop() {
                segment.release(vm);
            }
        }
        let active = self.active_mut();
        let local = pos
            .saturating_sub(active.base_pos)
            .max(ARENA_HEADER_SIZE)
            .min(active.cursor);
        active.cursor = local;
    }

    /// Release every segment. The chain must not be used afterwards.
    pub(crate) fn release_all<V: VirtualMemory>(&mut self, vm: &V) {
        while let Some(segment) = self.segments.pop() {
            segment.release(vm);
        }
    }
}
