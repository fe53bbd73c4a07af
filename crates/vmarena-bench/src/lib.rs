//! Benchmark workloads for vmarena.
//!
//! Provides deterministic push sequences so that benchmark runs are
//! comparable across machines and commits:
//!
//! - [`mixed_workload`]: sizes and alignments resembling engine temporaries
//!   (strings, small structs, vertex batches)

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// One push in a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushOp {
    /// Bytes requested.
    pub size: u64,
    /// Requested alignment, a power of two between 1 and 64.
    pub align: u64,
}

/// Generate `n` pushes from `seed`.
///
/// Roughly 70% are small (up to 256 bytes), 25% medium (up to 4 KiB) and
/// 5% large (up to 64 KiB), with alignments from 1 to 64.
pub fn mixed_workload(seed: u64, n: usize) -> Vec<PushOp> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let bucket = rng.next_u32() % 100;
            let limit = match bucket {
                0..=69 => 256,
                70..=94 => 4096,
                _ => 64 * 1024,
            };
            let size = u64::from(rng.next_u32()) % limit + 1;
            let align = 1u64 << (rng.next_u32() % 7);
            PushOp { size, align }
        })
        .collect()
}

/// Total bytes requested by `ops`, ignoring alignment padding.
pub fn total_bytes(ops: &[PushOp]) -> u64 {
    ops.iter().map(|op| op.size).sum()
}
