//! Resident Memory Arena Unit Tests.
//!
//! Verifies alignment, fill, pre-faulting and the bounds checks of the
//! byte and region accessors.

use rowprobe_core::common::{KIB, MIB, ProbeError};
use rowprobe_core::config::ArenaConfig;
use rowprobe_core::memory::Arena;
use rstest::rstest;

// ══════════════════════════════════════════════════════════
// 1. Allocation
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(64)]
#[case(4 * KIB)]
#[case(64 * KIB)]
#[case(2 * MIB)]
fn start_is_aligned(#[case] alignment: usize) {
    let arena = Arena::allocate(MIB, alignment, 0).unwrap();
    assert_eq!(arena.as_ptr() as usize % alignment, 0);
    assert_eq!(arena.alignment(), alignment);
    assert_eq!(arena.len(), MIB);
    assert!(!arena.is_empty());
}

#[test]
fn every_byte_holds_the_fill_pattern() {
    let arena = Arena::allocate(256 * KIB + 17, 64 * KIB, 0xA5).unwrap();
    assert!(arena.as_slice().iter().all(|&b| b == 0xA5));
}

#[test]
fn writes_are_visible_through_accessors() {
    let mut arena = Arena::allocate(64 * KIB, 64 * KIB, 0).unwrap();
    arena.as_mut_slice()[1234] = 7;
    assert_eq!(*arena.byte(1234).unwrap(), 7);
    assert_eq!(arena.region(1233, 3).unwrap(), &[0, 7, 0]);
}

#[test]
fn from_config_uses_section_values() {
    let config = ArenaConfig {
        size_bytes: 128 * KIB,
        alignment: 64 * KIB,
        fill_byte: 0x3C,
        ..ArenaConfig::default()
    };
    let arena = Arena::from_config(&config).unwrap();
    assert_eq!(arena.len(), 128 * KIB);
    assert_eq!(*arena.byte(128 * KIB - 1).unwrap(), 0x3C);
    assert!(!arena.is_locked());
}

// ══════════════════════════════════════════════════════════
// 2. Setup errors
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(0)]
#[case(32)]
#[case(100)]
#[case(3 * KIB)]
fn rejects_bad_alignment(#[case] alignment: usize) {
    let err = Arena::allocate(MIB, alignment, 0).unwrap_err();
    assert!(matches!(err, ProbeError::InvalidAlignment(a) if a == alignment));
    assert!(err.is_fatal());
}

#[test]
fn rejects_zero_size() {
    let err = Arena::allocate(0, 64 * KIB, 0).unwrap_err();
    assert!(matches!(err, ProbeError::Allocation { size: 0, .. }));
}

#[test]
fn accessors_reject_out_of_bounds() {
    let arena = Arena::allocate(4 * KIB, 4 * KIB, 0).unwrap();
    assert!(matches!(
        arena.byte(4 * KIB),
        Err(ProbeError::OutOfBounds { offset, size, .. }) if offset == 4 * KIB && size == 4 * KIB
    ));
    assert!(arena.region(4 * KIB - 8, 9).is_err());
    assert!(arena.region(usize::MAX, 2).is_err());
    assert_eq!(arena.region(4 * KIB - 8, 8).unwrap().len(), 8);
}
