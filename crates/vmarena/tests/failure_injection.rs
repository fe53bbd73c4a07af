//! Integration test: provider failures surface as typed errors.
//!
//! The fallible API must report reserve and commit failures as
//! `ArenaError::Memory` and must not leak reservations on the way out.

use vmarena::{Arena, ArenaConfig, ArenaError, BumpAlloc, ScratchConfig, ScratchPool};
use vmarena_core::{VmError, KIB, MIB};
use vmarena_test_utils::{FailingMemory, RecordingMemory, INJECTED_ERROR_CODE};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> ArenaConfig {
    ArenaConfig::new(MIB).with_commit_size(64 * KIB)
}

#[test]
fn reserve_failure_at_creation() {
    init_logging();
    let vm = FailingMemory::new().fail_reserve_after(0);
    let err = Arena::with_memory(vm, config(), None).unwrap_err();
    assert!(matches!(
        err,
        ArenaError::Memory(VmError::Reserve {
            code: INJECTED_ERROR_CODE,
            ..
        })
    ));
    assert!(err.is_out_of_memory());
}

#[test]
fn initial_commit_failure_releases_reservation() {
    init_logging();
    let vm = RecordingMemory::wrap(FailingMemory::new().fail_commit_after(0));
    let err = Arena::with_memory(vm.clone(), config(), Some("doomed")).unwrap_err();
    assert!(matches!(err, ArenaError::Memory(VmError::Commit { .. })));
    assert_eq!(vm.reserve_count(), 1);
    assert!(vm.live_reservations().is_empty());
}

#[test]
fn growth_commit_failure_keeps_arena_usable() {
    init_logging();
    let vm = FailingMemory::new().fail_commit_after(1);
    let arena = Arena::with_memory(vm, config(), None).unwrap();
    let before = arena.position();

    let err = arena.try_push(200 * KIB, 8).unwrap_err();
    assert!(matches!(err, ArenaError::Memory(VmError::Commit { .. })));
    assert_eq!(arena.position(), before);

    // Pushes that fit the initial commit still work.
    assert_eq!(arena.try_push(1024, 8).unwrap().len(), 1024);
}

#[test]
fn chain_reserve_failure_is_reported() {
    init_logging();
    let vm = FailingMemory::new().fail_reserve_after(1);
    let config = ArenaConfig::new(64 * KIB).with_commit_size(64 * KIB);
    let arena = Arena::with_memory(vm, config, None).unwrap();
    arena.push(32 * KIB, 8);
    let err = arena.try_push(64 * KIB, 8).unwrap_err();
    assert!(matches!(err, ArenaError::Memory(VmError::Reserve { .. })));
    assert_eq!(arena.segment_count(), 1);
}

#[test]
fn pool_creation_failure_releases_earlier_members() {
    init_logging();
    let vm = RecordingMemory::wrap(FailingMemory::new().fail_reserve_after(2));
    let config = ScratchConfig {
        pool_size: 3,
        arena: config(),
    };
    let err = ScratchPool::with_memory(vm.clone(), &config).unwrap_err();
    assert!(matches!(err, ArenaError::Memory(_)));
    assert_eq!(vm.reserve_count(), 3);
    assert!(vm.live_reservations().is_empty());
}

#[test]
fn invalid_config_rejected_before_reserving() {
    init_logging();
    let vm = RecordingMemory::new();
    let bad = ArenaConfig::new(64 * KIB).with_commit_size(MIB);
    let err = Arena::with_memory(vm.clone(), bad, None).unwrap_err();
    assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    assert_eq!(vm.reserve_count(), 0);
}
