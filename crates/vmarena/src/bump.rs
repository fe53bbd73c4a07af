//! Byte and typed push helpers shared by arenas and scopes.
//!
//! [`BumpAlloc`] is implemented by [`Arena`](crate::Arena) and
//! [`Temp`](crate::Temp). Implementors provide the raw uninitialised push;
//! everything else (zeroing, typed values, copies, strings, and the
//! infallible wrappers) is built on top of it here.
//!
//! Values pushed into an arena are never dropped. Types with a `Drop` impl
//! can be pushed, but their destructors will not run when the arena is
//! rewound.

use std::alloc::{handle_alloc_error, Layout};
use std::mem::{self, MaybeUninit};

use crate::arena::ArenaId;
use crate::error::ArenaError;
use crate::raw;

/// Alignment used by the byte-level helpers when none is given.
pub const DEFAULT_ALIGN: u64 = 8;

/// Alignment used for a push of `T`: its natural alignment, but at least
/// [`DEFAULT_ALIGN`].
pub const fn type_align<T>() -> u64 {
    let natural = mem::align_of::<T>() as u64;
    if natural > DEFAULT_ALIGN {
        natural
    } else {
        DEFAULT_ALIGN
    }
}

/// Bump allocation through a shared reference.
///
/// Every `try_*` method reports failure as an [`ArenaError`]. The
/// infallible counterparts treat environment failures (the provider
/// refusing memory, an exhausted unchained reservation) as fatal: they log
/// at `error` level and call [`handle_alloc_error`]. Caller bugs such as a
/// non-power-of-two alignment or a scope conflict panic instead.
#[allow(clippy::mut_from_ref)]
pub trait BumpAlloc {
    /// Push `size` bytes aligned to `align`, leaving their contents
    /// unspecified.
    fn try_push_uninit(&self, size: u64, align: u64)
        -> Result<&mut [MaybeUninit<u8>], ArenaError>;

    /// The arena the memory comes from.
    fn arena_id(&self) -> ArenaId;

    /// Infallible [`try_push_uninit`](Self::try_push_uninit).
    fn push_uninit(&self, size: u64, align: u64) -> &mut [MaybeUninit<u8>] {
        match self.try_push_uninit(size, align) {
            Ok(bytes) => bytes,
            Err(err) => alloc_failed(err, size, align),
        }
    }

    /// Push `size` zeroed bytes aligned to `align`.
    fn try_push(&self, size: u64, align: u64) -> Result<&mut [u8], ArenaError> {
        self.try_push_uninit(size, align).map(raw::zeroed)
    }

    /// Infallible [`try_push`](Self::try_push).
    fn push(&self, size: u64, align: u64) -> &mut [u8] {
        raw::zeroed(self.push_uninit(size, align))
    }

    /// Push `count` values, the `i`th initialised to `f(i)`.
    fn try_push_with<T>(
        &self,
        count: usize,
        f: impl FnMut(usize) -> T,
    ) -> Result<&mut [T], ArenaError> {
        let size = slice_size::<T>(count)?;
        let bytes = self.try_push_uninit(size, type_align::<T>())?;
        Ok(raw::init_slice(raw::typed_slots::<T>(bytes, count), f))
    }

    /// Infallible [`try_push_with`](Self::try_push_with).
    fn push_with<T>(&self, count: usize, f: impl FnMut(usize) -> T) -> &mut [T] {
        match self.try_push_with(count, f) {
            Ok(values) => values,
            Err(err) => alloc_failed(
                err,
                (mem::size_of::<T>() as u64).saturating_mul(count as u64),
                type_align::<T>(),
            ),
        }
    }

    /// Move `value` into the arena.
    fn try_push_value<T>(&self, value: T) -> Result<&mut T, ArenaError> {
        let bytes = self.try_push_uninit(mem::size_of::<T>() as u64, type_align::<T>())?;
        let slot = &mut raw::typed_slots::<T>(bytes, 1)[0];
        Ok(slot.write(value))
    }

    /// Infallible [`try_push_value`](Self::try_push_value).
    fn push_value<T>(&self, value: T) -> &mut T {
        match self.try_push_value(value) {
            Ok(value) => value,
            Err(err) => alloc_failed(err, mem::size_of::<T>() as u64, type_align::<T>()),
        }
    }

    /// Copy `src` into the arena.
    fn push_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        self.push_with(src.len(), |i| src[i])
    }

    /// Copy `s` into the arena.
    fn push_str(&self, s: &str) -> &mut str {
        raw::copy_str(self.push_uninit(s.len() as u64, DEFAULT_ALIGN), s)
    }
}

fn slice_size<T>(count: usize) -> Result<u64, ArenaError> {
    (mem::size_of::<T>() as u64)
        .checked_mul(count as u64)
        .ok_or(ArenaError::SizeOverflow)
}

#[cold]
#[track_caller]
fn alloc_failed(err: ArenaError, size: u64, align: u64) -> ! {
    if err.is_out_of_memory() {
        log::error!("arena push of {size} bytes (align {align}) failed: {err}");
        let layout = usize::try_from(size)
            .ok()
            .zip(usize::try_from(align).ok())
            .and_then(|(size, align)| Layout::from_size_align(size, align).ok())
            .unwrap_or_else(Layout::new::<u8>);
        handle_alloc_error(layout)
    }
    panic!("arena push of {size} bytes (align {align}) failed: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arena, ArenaConfig};
    use vmarena_core::KIB;

    fn arena() -> Arena {
        Arena::new(ArenaConfig::new(256 * KIB).with_commit_size(64 * KIB)).unwrap()
    }

    #[repr(C, align(32))]
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Wide([f32; 8]);

    #[test]
    fn type_align_is_at_least_default() {
        assert_eq!(type_align::<u8>(), 8);
        assert_eq!(type_align::<u64>(), 8);
        assert_eq!(type_align::<Wide>(), 32);
    }

    #[test]
    fn push_value_round_trips() {
        let arena = arena();
        let v = arena.push_value(Wide([1.5; 8]));
        assert_eq!(&*v as *const Wide as usize % 32, 0);
        v.0[3] = 7.0;
        assert_eq!(v.0[3], 7.0);
    }

    #[test]
    fn push_with_sees_indices_in_order() {
        let arena = arena();
        let squares = arena.push_with(6, |i| (i * i) as u32);
        assert_eq!(squares, &[0, 1, 4, 9, 16, 25]);
    }

    #[test]
    fn push_copy_and_str_are_independent_of_source() {
        let arena = arena();
        let mut source = vec![1u16, 2, 3];
        let copy = arena.push_copy(&source);
        source[0] = 99;
        assert_eq!(copy, &[1, 2, 3]);

        let s = arena.push_str("hello");
        s.make_ascii_uppercase();
        assert_eq!(s, "HELLO");
    }

    #[test]
    fn zero_sized_pushes_do_not_move_much() {
        let arena = arena();
        let before = arena.position();
        let units = arena.push_with(1000, |_| ());
        assert_eq!(units.len(), 1000);
        assert!(arena.position() - before < DEFAULT_ALIGN);
    }

    #[test]
    fn slice_size_overflow_reported() {
        let arena = arena();
        assert!(matches!(
            arena.try_push_with(usize::MAX, |_| 0u64),
            Err(ArenaError::SizeOverflow)
        ));
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn infallible_push_panics_on_bad_alignment() {
        let arena = arena();
        arena.push(16, 12);
    }
}
