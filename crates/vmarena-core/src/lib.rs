//! Core types for the vmarena memory subsystem.
//!
//! This crate holds the pieces every allocator layer builds on:
//!
//! - [`units`]: byte-size constants, power-of-two alignment helpers and
//!   rounding to arbitrary steps.
//! - [`traits`]: the [`VirtualMemory`] provider abstraction (reserve,
//!   commit, decommit, release, page size).
//! - [`system`]: [`SystemMemory`], the provider backed by the host OS.
//! - [`error`]: [`VmError`], returned when the provider cannot satisfy a
//!   request.
//!
//! `unsafe` is denied at the crate root and only allowed inside
//! `system.rs`, where the OS calls live.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod error;
pub mod system;
pub mod traits;
pub mod units;

pub use error::VmError;
pub use system::SystemMemory;
pub use traits::VirtualMemory;
pub use units::{
    align_down, align_up, checked_align_up, checked_round_up, is_aligned, round_up, GIB, KIB, MIB,
};
