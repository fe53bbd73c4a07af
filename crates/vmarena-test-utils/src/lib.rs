//! Test utilities for vmarena development.
//!
//! Provides instrumented [`VirtualMemory`] providers:
//!
//! - [`RecordingMemory`] forwards to a real provider and records every
//!   call, so tests can assert on commit granularity and release order.
//! - [`FailingMemory`] refuses reserves or commits after a set number of
//!   successful calls, for exercising error paths.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod failing;
mod recording;

pub use failing::FailingMemory;
pub use recording::{RecordingMemory, VmCall};

pub use vmarena_core::{SystemMemory, VirtualMemory, VmError};

/// `ENOMEM`, the code reported by injected failures.
pub const INJECTED_ERROR_CODE: i32 = 12;
