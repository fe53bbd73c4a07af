//! Virtual-memory-backed linear arenas for a real-time engine.
//!
//! Provides append-and-rewind allocation over large address-space
//! reservations whose physical pages are committed on demand, scoped
//! checkpoints that free everything pushed since they began, and a
//! per-thread pool of scratch arenas for short-lived temporaries.
//!
//! # Architecture
//!
//! ```text
//! ThreadContext (thread-local)
//! └── ScratchPool
//!     └── Arena × pool_size ("scratch-0", "scratch-1", ...)
//!         └── SegmentChain → Segment[] (reserve/commit via VirtualMemory)
//!
//! Temp ──borrows──▶ Arena      (scoped checkpoint, rewinds on drop)
//! Checkpoint                   (plain position, rewound via &mut Arena)
//! ```
//!
//! # Allocation
//!
//! All allocation goes through the [`BumpAlloc`] trait, implemented by both
//! [`Arena`] and [`Temp`]. `try_*` methods return [`ArenaError`]; the plain
//! methods abort on out-of-memory and panic on misuse.
//!
//! ```
//! use vmarena::{Arena, ArenaConfig, BumpAlloc};
//!
//! let arena = Arena::with_name(ArenaConfig::default(), "frame").unwrap();
//! let scope = arena.temp();
//! let ids = scope.push_copy(&[1u32, 2, 3]);
//! ids[0] = 7;
//! drop(scope);
//! assert_eq!(arena.position(), arena.header_size());
//! ```
//!
//! # Safety
//!
//! `unsafe` is limited to the crate-private `raw` and `segment` modules and
//! to the two arena functions that turn committed memory into references.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod bump;
pub mod config;
pub mod context;
pub mod error;
mod raw;
pub mod scratch;
mod segment;
pub mod temp;

// Public re-exports for the primary API surface.
pub use arena::{Arena, ArenaId, Checkpoint};
pub use bump::{type_align, BumpAlloc, DEFAULT_ALIGN};
pub use config::{ArenaConfig, ArenaFlags, ScratchConfig};
pub use context::{with_scratch, ContextMemory, ThreadContext};
pub use error::ArenaError;
pub use scratch::ScratchPool;
pub use segment::ARENA_HEADER_SIZE;
pub use temp::Temp;
pub use vmarena_core::{SystemMemory, VirtualMemory, VmError};
