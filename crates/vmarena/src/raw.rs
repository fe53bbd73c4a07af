//! Low-level primitives for turning arena memory into Rust references.
//!
//! Every cast from arena memory to a slice or `str` happens here. Callers
//! are responsible for only handing in ranges that are committed, disjoint
//! from every other live reference, and kept alive for the returned
//! lifetime.

#![allow(unsafe_code)]

use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;
use std::slice;

/// Bookkeeping written into the first bytes of every segment.
///
/// Nothing reads it back on the allocation path; it exists so the layout
/// of a segment is self-describing in a debugger or a memory dump.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub(crate) struct SegmentHeader {
    pub(crate) reserved: u64,
    pub(crate) commit_step: u64,
    pub(crate) base_pos: u64,
    pub(crate) name_len: u32,
    pub(crate) flags: u32,
}

/// Write `header` at `base`.
///
/// # Safety
///
/// At least `size_of::<SegmentHeader>()` bytes at `base` must be committed
/// and not referenced by anything else.
pub(crate) unsafe fn write_header(base: NonNull<u8>, header: SegmentHeader) {
    // SAFETY: upheld by the caller; unaligned write because caller buffers
    // may start at any address.
    unsafe { base.as_ptr().cast::<SegmentHeader>().write_unaligned(header) }
}

/// Read the header at `base`.
///
/// # Safety
///
/// `base` must point at a header written by [`write_header`].
#[cfg(test)]
pub(crate) unsafe fn read_header(base: NonNull<u8>) -> SegmentHeader {
    // SAFETY: upheld by the caller.
    unsafe { base.as_ptr().cast::<SegmentHeader>().read_unaligned() }
}

/// Borrow `len` bytes at `base + offset` mutably, without asserting
/// anything about their contents.
///
/// # Safety
///
/// The range must be committed, must stay committed for `'a`, and must not
/// overlap any other live reference.
pub(crate) unsafe fn uninit_bytes<'a>(
    base: NonNull<u8>,
    offset: u64,
    len: u64,
) -> &'a mut [MaybeUninit<u8>] {
    // SAFETY: upheld by the caller. Offsets never exceed the reservation,
    // which fits in `usize` because the provider accepted it.
    unsafe {
        slice::from_raw_parts_mut(
            base.as_ptr().add(offset as usize).cast::<MaybeUninit<u8>>(),
            len as usize,
        )
    }
}

/// Borrow `len` bytes at `base + offset` as a `str`.
///
/// # Safety
///
/// As for [`uninit_bytes`], except shared borrows may overlap, and the
/// bytes must be initialised and valid UTF-8.
pub(crate) unsafe fn str_at<'a>(base: NonNull<u8>, offset: u64, len: u64) -> &'a str {
    // SAFETY: upheld by the caller.
    unsafe {
        let bytes = slice::from_raw_parts(base.as_ptr().add(offset as usize), len as usize);
        std::str::from_utf8_unchecked(bytes)
    }
}

/// Copy `src` to the start of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than `src`.
pub(crate) fn copy_bytes(dst: &mut [MaybeUninit<u8>], src: &[u8]) {
    assert!(dst.len() >= src.len());
    // SAFETY: bounds checked above; `&mut` and `&` cannot overlap.
    unsafe {
        std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr().cast::<u8>(), src.len());
    }
}

/// Zero a freshly pushed region and return it as initialised bytes.
pub(crate) fn zeroed(bytes: &mut [MaybeUninit<u8>]) -> &mut [u8] {
    // SAFETY: `write_bytes` initialises every byte of the region.
    unsafe {
        bytes.as_mut_ptr().write_bytes(0, bytes.len());
        &mut *(bytes as *mut [MaybeUninit<u8>] as *mut [u8])
    }
}

/// Reinterpret a freshly pushed byte region as `count` uninitialised `T`s.
///
/// # Panics
///
/// Panics if the region is misaligned or has the wrong length for `T`;
/// both indicate a bug in the push path, not in the caller.
pub(crate) fn typed_slots<T>(bytes: &mut [MaybeUninit<u8>], count: usize) -> &mut [MaybeUninit<T>] {
    assert_eq!(bytes.len(), mem::size_of::<T>() * count);
    assert_eq!(bytes.as_ptr().align_offset(mem::align_of::<T>()), 0);
    // SAFETY: length and alignment checked above; MaybeUninit<T> has no
    // validity requirements, and the borrow of `bytes` is moved into the
    // result.
    unsafe { slice::from_raw_parts_mut(bytes.as_mut_ptr().cast::<MaybeUninit<T>>(), count) }
}

/// Initialise every slot with `f(index)` and return the initialised slice.
pub(crate) fn init_slice<T>(
    slots: &mut [MaybeUninit<T>],
    mut f: impl FnMut(usize) -> T,
) -> &mut [T] {
    for (i, slot) in slots.iter_mut().enumerate() {
        slot.write(f(i));
    }
    // SAFETY: every element was written in the loop above. If `f` panics
    // the slice is never produced and the written values simply leak,
    // which arena memory does anyway.
    unsafe { &mut *(slots as *mut [MaybeUninit<T>] as *mut [T]) }
}

/// Copy `s` into a freshly pushed region of exactly `s.len()` bytes.
pub(crate) fn copy_str<'a>(bytes: &'a mut [MaybeUninit<u8>], s: &str) -> &'a mut str {
    assert_eq!(bytes.len(), s.len());
    copy_bytes(bytes, s.as_bytes());
    // SAFETY: every byte was just copied from a `&str`.
    unsafe {
        let bytes = &mut *(bytes as *mut [MaybeUninit<u8>] as *mut [u8]);
        std::str::from_utf8_unchecked_mut(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_unaligned_storage() {
        let mut buf = [0u8; 64];
        let base = NonNull::new(buf[1..].as_mut_ptr()).unwrap();
        let header = SegmentHeader {
            reserved: 1 << 26,
            commit_step: 1 << 16,
            base_pos: 0,
            name_len: 9,
            flags: 1,
        };
        unsafe {
            write_header(base, header);
            assert_eq!(read_header(base), header);
        }
    }

    #[test]
    fn init_slice_runs_in_index_order() {
        let mut storage = [MaybeUninit::<u64>::uninit(); 4];
        let bytes = unsafe {
            slice::from_raw_parts_mut(storage.as_mut_ptr().cast::<MaybeUninit<u8>>(), 32)
        };
        let slots = typed_slots::<u64>(bytes, 4);
        let values = init_slice(slots, |i| (i as u64) * 10);
        assert_eq!(values, &[0, 10, 20, 30]);
    }

    #[test]
    fn zeroed_clears_dirty_bytes() {
        let mut storage = [MaybeUninit::new(0xAAu8); 16];
        let bytes = zeroed(&mut storage);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn copy_str_preserves_text() {
        let mut storage = [MaybeUninit::<u8>::uninit(); 5];
        let s = copy_str(&mut storage, "arena");
        s.make_ascii_uppercase();
        assert_eq!(s, "ARENA");
    }

    #[test]
    #[should_panic]
    fn typed_slots_rejects_wrong_length() {
        let mut storage = [MaybeUninit::<u64>::uninit(); 2];
        let bytes = unsafe {
            slice::from_raw_parts_mut(storage.as_mut_ptr().cast::<MaybeUninit<u8>>(), 12)
        };
        let _ = typed_slots::<u64>(bytes, 2);
    }
}
