//! Byte-size units and power-of-two alignment arithmetic.
//!
//! All sizes and offsets in vmarena are `u64`. Alignments must be nonzero
//! powers of two; the `align_*` helpers debug-assert this rather than
//! checking in release builds, since alignment values come from type
//! layouts or constants in practice. Granularities that come from
//! configuration (commit steps) go through [`round_up`] and
//! [`checked_round_up`], which accept any nonzero step.

/// One kibibyte.
pub const KIB: u64 = 1 << 10;
/// One mebibyte.
pub const MIB: u64 = 1 << 20;
/// One gibibyte.
pub const GIB: u64 = 1 << 30;

/// `n` kibibytes in bytes.
pub const fn kilobytes(n: u64) -> u64 {
    n << 10
}

/// `n` mebibytes in bytes.
pub const fn megabytes(n: u64) -> u64 {
    n << 20
}

/// `n` gibibytes in bytes.
pub const fn gigabytes(n: u64) -> u64 {
    n << 30
}

/// Round `x` up to the next multiple of `align`.
///
/// Uses the `(x + a - 1) & !(a - 1)` formula. Overflows (and panics in
/// debug builds) if `x` is within `align` of `u64::MAX`; use
/// [`checked_align_up`] when `x` is caller-controlled.
#[inline]
pub const fn align_up(x: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

/// Round `x` up to the next multiple of `align`, or `None` on overflow.
#[inline]
pub const fn checked_align_up(x: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match x.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Round `x` down to the previous multiple of `align`.
#[inline]
pub const fn align_down(x: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    x & !(align - 1)
}

/// Round `x` up to the next multiple of `step`, which need not be a power
/// of two.
#[inline]
pub const fn round_up(x: u64, step: u64) -> u64 {
    debug_assert!(step != 0);
    x.div_ceil(step) * step
}

/// Round `x` up to the next multiple of `step`, or `None` on overflow.
#[inline]
pub const fn checked_round_up(x: u64, step: u64) -> Option<u64> {
    debug_assert!(step != 0);
    x.div_ceil(step).checked_mul(step)
}

/// Whether `x` is a multiple of `align`.
#[inline]
pub const fn is_aligned(x: u64, align: u64) -> bool {
    debug_assert!(align.is_power_of_two());
    x & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_constants() {
        assert_eq!(kilobytes(64), 65_536);
        assert_eq!(megabytes(64), 64 * MIB);
        assert_eq!(gigabytes(1), GIB);
        assert_eq!(KIB * 1024, MIB);
    }

    #[test]
    fn align_up_small_values() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(10, 4), 12);
        assert_eq!(align_up(5, 1), 5);
    }

    #[test]
    fn align_up_to_pages() {
        assert_eq!(align_up(100 * KIB, 64 * KIB), 128 * KIB);
        assert_eq!(align_up(64 * KIB, 64 * KIB), 64 * KIB);
        assert_eq!(align_up(4097, 4096), 8192);
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(u64::MAX, 8), None);
        assert_eq!(checked_align_up(u64::MAX - 7, 8), Some(u64::MAX - 7));
        assert_eq!(checked_align_up(13, 16), Some(16));
    }

    #[test]
    fn align_down_and_is_aligned() {
        assert_eq!(align_down(4097, 4096), 4096);
        assert_eq!(align_down(4095, 4096), 0);
        assert!(is_aligned(8192, 4096));
        assert!(!is_aligned(8193, 4096));
        assert!(is_aligned(0, 128));
    }

    #[test]
    fn round_up_any_step() {
        assert_eq!(round_up(0, 48 * KIB), 0);
        assert_eq!(round_up(60 * KIB, 48 * KIB), 96 * KIB);
        assert_eq!(round_up(96 * KIB, 48 * KIB), 96 * KIB);
        assert_eq!(round_up(100 * KIB, 64 * KIB), 128 * KIB);
        assert_eq!(checked_round_up(u64::MAX, 3 * KIB), None);
        assert_eq!(checked_round_up(13, 12), Some(24));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn align_up_is_smallest_aligned_upper_bound(
                x in 0u64..(1 << 40),
                shift in 0u32..16,
            ) {
                let a = 1u64 << shift;
                let r = align_up(x, a);
                prop_assert!(r >= x);
                prop_assert!(is_aligned(r, a));
                prop_assert!(r - x < a);
                prop_assert_eq!(Some(r), checked_align_up(x, a));
                prop_assert_eq!(r, round_up(x, a));
            }

            #[test]
            fn round_up_is_smallest_multiple_above(
                x in 0u64..(1 << 40),
                step in 1u64..(1 << 20),
            ) {
                let r = round_up(x, step);
                prop_assert!(r >= x);
                prop_assert_eq!(r % step, 0);
                prop_assert!(r - x < step);
                prop_assert_eq!(Some(r), checked_round_up(x, step));
            }
        }
    }
}
